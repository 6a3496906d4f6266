//! Command and event channels between the inspector and the sensor.
//!
//! The command channel is request/response: every [`Command`] is answered by a
//! [`Response`]. The event channel is subscribe-only and carries [`Event`]s published by
//! the sensor. The wire transport sits behind [`Transport`]; [`ProtocolClient`] adds the
//! timeouts on top of whichever transport is used.
mod error;
mod protocol;
mod tcp;

pub use error::{Error, Result};
pub use protocol::{Command, Event, Response, ResponseStatus, StartMonitor};
pub use tcp::{TcpChannels, TcpTransport};

use std::fmt;
use std::time::Duration;

use crate::config::InspectorConfig;
use crate::container::ContainerHandle;

/// A host-reachable address of one of the sensor's published ports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Addresses of the command and event channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub command: Endpoint,
    pub events: Endpoint,
}

impl Endpoints {
    /// Derives the channel endpoints from the inspected container state.
    ///
    /// Purely local: fails before any connection attempt if the container is not
    /// inspected, has no network info, or does not publish the reserved ports.
    pub fn resolve(handle: &ContainerHandle, config: &InspectorConfig) -> Result<Self> {
        let state = handle
            .state()
            .ok_or(crate::container::Error::NotInspected)?;
        let network = state.comms_network(&config.reserved_ports())?;
        let host_port = |port| {
            network
                .host_binding(&port)
                .map(|binding| binding.host_port)
                .ok_or(crate::container::Error::UnpublishedPort(port))
        };

        Ok(Self {
            command: Endpoint {
                host: config.host_ip.clone(),
                port: host_port(config.cmd_port)?,
            },
            events: Endpoint {
                host: config.host_ip.clone(),
                port: host_port(config.evt_port)?,
            },
        })
    }
}

/// Wire transport that opens the sensor channels.
pub trait Transport {
    type Channels: SensorChannels + Send;

    fn open(
        &self,
        endpoints: &Endpoints,
    ) -> impl std::future::Future<Output = Result<Self::Channels>> + Send;
}

/// An opened pair of sensor channels.
///
/// Implementations may block indefinitely; bounding the wait is the caller's job.
pub trait SensorChannels {
    /// Sends a command on the command channel and waits for its response.
    fn request(
        &mut self,
        command: &Command,
    ) -> impl std::future::Future<Output = Result<Response>> + Send;

    /// Waits for the next event on the event channel.
    fn next_event(&mut self) -> impl std::future::Future<Output = Result<Event>> + Send;

    /// Closes both channels. Must tolerate channels that never connected.
    fn close(&mut self) -> impl std::future::Future<Output = ()> + Send;
}

/// Typed request/response and bounded event wait over the sensor channels.
#[derive(Debug)]
pub struct ProtocolClient<C> {
    channels: Option<C>,
    cmd_timeout: Duration,
    event_timeout: Duration,
}

impl<C: SensorChannels + Send> ProtocolClient<C> {
    pub fn new(channels: C, config: &InspectorConfig) -> Self {
        Self {
            channels: Some(channels),
            cmd_timeout: config.cmd_timeout,
            event_timeout: config.event_timeout,
        }
    }

    /// Sends `command` and waits for the sensor's response.
    ///
    /// # Errors
    ///
    /// * [`Error::Timeout`] if no response arrived within the command timeout.
    /// * [`Error::Rejected`] if the sensor answered with an error status.
    /// * [`Error::Closed`] if the client was already shut down.
    /// * Any transport error.
    pub async fn send(&mut self, command: &Command) -> Result<Response> {
        let channels = self.channels.as_mut().ok_or(Error::Closed)?;
        log::debug!("sending `{}`", command.name());
        let response = tokio::time::timeout(self.cmd_timeout, channels.request(command))
            .await
            .map_err(|_| Error::Timeout {
                operation: command.name(),
                after: self.cmd_timeout,
            })??;
        log::debug!("`{}` response => {:?}", command.name(), response);

        match response.status {
            ResponseStatus::Ok => Ok(response),
            ResponseStatus::Error => Err(Error::Rejected(command.name())),
        }
    }

    /// Waits once, up to the event timeout, for the sensor's next event.
    pub async fn receive_event(&mut self) -> Result<Event> {
        let channels = self.channels.as_mut().ok_or(Error::Closed)?;
        let event = tokio::time::timeout(self.event_timeout, channels.next_event())
            .await
            .map_err(|_| Error::Timeout {
                operation: "receive event",
                after: self.event_timeout,
            })??;
        log::debug!("sensor event => {event:?}");

        Ok(event)
    }

    /// Closes both channels. Calling it again is a no-op.
    pub async fn shutdown(&mut self) {
        if let Some(mut channels) = self.channels.take() {
            channels.close().await;
            log::debug!("sensor channels closed");
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.channels.is_none()
    }
}

/// Resolves the endpoints of a launched container and opens the sensor channels.
pub async fn init_channels<T: Transport>(
    transport: &T,
    handle: &ContainerHandle,
    config: &InspectorConfig,
) -> Result<ProtocolClient<T::Channels>> {
    let endpoints = Endpoints::resolve(handle, config)?;
    log::debug!(
        "sensor endpoints => command={} events={}",
        endpoints.command,
        endpoints.events
    );
    let channels = transport.open(&endpoints).await?;

    Ok(ProtocolClient::new(channels, config))
}
