use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use crate::error::ResultOkWarnExt;

use super::{
    Command, Endpoint, Endpoints, Error, Event, Response, Result, SensorChannels, Transport,
};

/// Newline-delimited JSON frames over TCP.
///
/// Connections are dialed lazily and re-dialed until they succeed, so the sensor may
/// come up after the channels were opened. Callers bound every operation with a timeout.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    redial_interval: Duration,
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self {
            redial_interval: Duration::from_millis(100),
        }
    }
}

impl TcpTransport {
    pub fn new(redial_interval: Duration) -> Self {
        Self { redial_interval }
    }
}

impl Transport for TcpTransport {
    type Channels = TcpChannels;

    async fn open(&self, endpoints: &Endpoints) -> Result<TcpChannels> {
        Ok(TcpChannels {
            command: Connection::new(endpoints.command.clone(), self.redial_interval),
            events: Connection::new(endpoints.events.clone(), self.redial_interval),
        })
    }
}

#[derive(Debug)]
pub struct TcpChannels {
    command: Connection,
    events: Connection,
}

impl SensorChannels for TcpChannels {
    async fn request(&mut self, command: &Command) -> Result<Response> {
        // A request that was abandoned half-way leaves an unread response behind.
        if self.command.in_flight {
            log::debug!("dropping stale connection to {}", self.command.endpoint);
            self.command.stream = None;
        }
        self.command.in_flight = true;
        self.command.write_frame(command).await?;
        let response = self.command.read_frame().await?;
        self.command.in_flight = false;

        Ok(response)
    }

    async fn next_event(&mut self) -> Result<Event> {
        self.events.read_frame().await
    }

    async fn close(&mut self) {
        self.command.close().await;
        self.events.close().await;
    }
}

#[derive(Debug)]
struct Connection {
    endpoint: Endpoint,
    redial_interval: Duration,
    stream: Option<BufReader<TcpStream>>,
    in_flight: bool,
}

impl Connection {
    fn new(endpoint: Endpoint, redial_interval: Duration) -> Self {
        Self {
            endpoint,
            redial_interval,
            stream: None,
            in_flight: false,
        }
    }

    async fn stream(&mut self) -> &mut BufReader<TcpStream> {
        let stream = match self.stream.take() {
            Some(stream) => stream,
            None => BufReader::new(self.dial().await),
        };
        self.stream.insert(stream)
    }

    async fn dial(&self) -> TcpStream {
        loop {
            match TcpStream::connect((self.endpoint.host.as_str(), self.endpoint.port)).await {
                Ok(stream) => {
                    stream
                        .set_nodelay(true)
                        .ok_warn(&format!("failed to set TCP_NODELAY on {}", self.endpoint));
                    log::debug!("connected to {}", self.endpoint);
                    return stream;
                }
                Err(err) => {
                    log::trace!("dial {} failed: {}", self.endpoint, err);
                    tokio::time::sleep(self.redial_interval).await;
                }
            }
        }
    }

    async fn write_frame<T: Serialize>(&mut self, frame: &T) -> Result<()> {
        let mut buf = serde_json::to_vec(frame).map_err(Error::Encode)?;
        buf.push(b'\n');
        let endpoint = self.endpoint.to_string();
        let stream = self.stream().await.get_mut();
        let written = match stream.write_all(&buf).await {
            Ok(()) => stream.flush().await,
            Err(err) => Err(err),
        };
        if let Err(source) = written {
            self.stream = None;
            return Err(Error::Io { endpoint, source });
        }

        Ok(())
    }

    async fn read_frame<T: DeserializeOwned>(&mut self) -> Result<T> {
        let endpoint = self.endpoint.to_string();
        let mut line = String::with_capacity(256);
        let read = self.stream().await.read_line(&mut line).await;
        match read {
            Ok(0) => {
                self.stream = None;
                Err(Error::Disconnected { endpoint })
            }
            Ok(_) => serde_json::from_str(line.trim_end()).map_err(Error::Decode),
            Err(source) => {
                self.stream = None;
                Err(Error::Io { endpoint, source })
            }
        }
    }

    async fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let mut stream = stream.into_inner();
            stream
                .shutdown()
                .await
                .ok_warn(&format!("failed to shut down connection to {}", self.endpoint));
        }
        self.in_flight = false;
    }
}
