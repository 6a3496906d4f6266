use std::collections::HashMap;
use std::time::Duration;

use bollard::Docker;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, LogOutput, LogsOptions,
    RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
};
use bollard::models::{HostConfig, NetworkSettings, PortMap};
use futures::TryStreamExt;

use crate::config::Port;
use crate::container::{ContainerID, ContainerState, HostBinding, NetworkState};
use crate::launcher::LaunchSpec;
use crate::overrides::ImageDefaults;

use super::{ContainerLogs, ContainerRuntime, Error, Operation, Result, StopOutcome};

/// [`ContainerRuntime`] backed by the Docker Engine API.
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }

    /// Connects using `DOCKER_HOST` or the platform's default socket.
    pub fn connect() -> Result<Self> {
        let docker =
            Docker::connect_with_local_defaults().map_err(|err| Error::Connect(Box::new(err)))?;
        Ok(Self::new(docker))
    }

    /// Reads the entrypoint and cmd the image was built with.
    pub async fn image_defaults(&self, image: &str) -> Result<ImageDefaults> {
        let info = self
            .docker
            .inspect_image(image)
            .await
            .map_err(|err| Error::api(Operation::InspectImage, image, err))?;
        let config = info.config.unwrap_or_default();

        Ok(ImageDefaults {
            entrypoint: config.entrypoint.unwrap_or_default(),
            cmd: config.cmd.unwrap_or_default(),
        })
    }
}

impl ContainerRuntime for DockerRuntime {
    async fn create_container(&self, spec: &LaunchSpec) -> Result<ContainerID> {
        let options = CreateContainerOptions {
            name: spec.name().to_string(),
            platform: None,
        };
        let response = self
            .docker
            .create_container(Some(options), container_config(spec))
            .await
            .map_err(|err| Error::api(Operation::Create, spec.name().as_ref(), err))?;
        for warning in &response.warnings {
            log::warn!("runtime warning for {} => {}", spec.name(), warning);
        }

        Ok(ContainerID::new(response.id)?)
    }

    async fn start_container(&self, id: &ContainerID) -> Result<()> {
        self.docker
            .start_container(id.as_ref(), None::<StartContainerOptions<String>>)
            .await
            .map_err(|err| Error::api(Operation::Start, id.as_ref(), err))
    }

    async fn inspect_container(&self, id: &ContainerID) -> Result<ContainerState> {
        let info = self
            .docker
            .inspect_container(id.as_ref(), None::<InspectContainerOptions>)
            .await
            .map_err(|err| Error::api(Operation::Inspect, id.as_ref(), err))?;

        Ok(ContainerState {
            running: info.state.and_then(|state| state.running).unwrap_or(false),
            network: info.network_settings.map(network_state).transpose()?,
        })
    }

    async fn stop_container(
        &self,
        id: &ContainerID,
        grace_period: Duration,
    ) -> Result<StopOutcome> {
        // The engine answers a stop of an exited container with `304 Not Modified`,
        // which the client reports as success, so the state is checked up front.
        match self
            .docker
            .inspect_container(id.as_ref(), None::<InspectContainerOptions>)
            .await
        {
            Ok(info) if info.state.as_ref().and_then(|state| state.running) == Some(false) => {
                return Ok(StopOutcome::NotRunning);
            }
            Ok(_) => {}
            Err(err) => log::debug!("failed to inspect {id} before stopping: {err}"),
        }

        let options = StopContainerOptions {
            t: grace_period.as_secs() as i64,
        };
        self.docker
            .stop_container(id.as_ref(), Some(options))
            .await
            .map_err(|err| Error::api(Operation::Stop, id.as_ref(), err))?;

        Ok(StopOutcome::Stopped)
    }

    async fn remove_container(&self, id: &ContainerID) -> Result<()> {
        let options = RemoveContainerOptions {
            v: true,
            force: true,
            ..Default::default()
        };
        self.docker
            .remove_container(id.as_ref(), Some(options))
            .await
            .map_err(|err| Error::api(Operation::Remove, id.as_ref(), err))
    }

    async fn container_logs(&self, id: &ContainerID) -> Result<ContainerLogs> {
        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            ..Default::default()
        };
        let mut stream = std::pin::pin!(self.docker.logs(id.as_ref(), Some(options)));
        let mut logs = ContainerLogs::default();
        while let Some(output) = stream
            .try_next()
            .await
            .map_err(|err| Error::api(Operation::Logs, id.as_ref(), err))?
        {
            match output {
                LogOutput::StdOut { message } | LogOutput::Console { message } => {
                    logs.stdout.extend_from_slice(&message)
                }
                LogOutput::StdErr { message } => logs.stderr.extend_from_slice(&message),
                LogOutput::StdIn { .. } => {}
            }
        }

        Ok(logs)
    }
}

fn non_empty(values: &[String]) -> Option<Vec<String>> {
    if values.is_empty() {
        None
    } else {
        Some(values.to_vec())
    }
}

/// Translates a launch spec into the Engine API's create request body.
fn container_config(spec: &LaunchSpec) -> Config<String> {
    let host_config = HostConfig {
        binds: Some(spec.binds().to_vec()),
        publish_all_ports: Some(spec.publish_all_ports()),
        cap_add: Some(spec.cap_add().iter().map(|cap| cap.to_string()).collect()),
        privileged: Some(spec.privileged()),
        network_mode: spec.network_mode().map(str::to_owned),
        links: non_empty(spec.links()),
        extra_hosts: non_empty(spec.extra_hosts()),
        dns: non_empty(spec.dns_servers()),
        dns_search: non_empty(spec.dns_search_domains()),
        ..Default::default()
    };

    Config {
        image: Some(spec.image().to_owned()),
        entrypoint: Some(spec.entrypoint().to_vec()),
        cmd: Some(spec.cmd().to_vec()),
        env: non_empty(spec.env()),
        labels: Some(spec.labels().clone()),
        hostname: spec.hostname().map(str::to_owned),
        exposed_ports: Some(
            spec.exposed_ports()
                .iter()
                .map(|port| (port.to_string(), HashMap::new()))
                .collect(),
        ),
        host_config: Some(host_config),
        ..Default::default()
    }
}

fn network_state(settings: NetworkSettings) -> Result<NetworkState> {
    Ok(NetworkState {
        ip_address: settings.ip_address.filter(|ip| !ip.is_empty()),
        ports: port_bindings(settings.ports.unwrap_or_default())?,
    })
}

fn port_bindings(ports: PortMap) -> Result<HashMap<Port, Vec<HostBinding>>> {
    let mut out = HashMap::with_capacity(ports.len());
    for (key, bindings) in ports {
        let port = key.parse::<Port>().map_err(|_| Error::InvalidPortBinding {
            port: key.clone(),
            value: key.clone(),
        })?;
        let mut host_bindings = Vec::new();
        for binding in bindings.unwrap_or_default() {
            let Some(host_port) = binding.host_port.filter(|p| !p.is_empty()) else {
                continue;
            };
            let host_port = host_port
                .parse::<u16>()
                .map_err(|_| Error::InvalidPortBinding {
                    port: key.clone(),
                    value: host_port.clone(),
                })?;
            host_bindings.push(HostBinding {
                host_ip: binding.host_ip.filter(|ip| !ip.is_empty()),
                host_port,
            });
        }
        out.insert(port, host_bindings);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InspectorConfig;
    use crate::launcher::LaunchSpecBuilder;
    use crate::overrides::ContainerOverrides;
    use bollard::API_DEFAULT_VERSION;
    use bollard::models::PortBinding;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    /// Serves container inspect and stop requests like the engine would, recording
    /// `"<method> <path>"` of every request.
    async fn engine_stub(running: bool) -> (DockerRuntime, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&requests);

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let seen = Arc::clone(&seen);
                tokio::spawn(async move {
                    let mut stream = BufReader::new(stream);
                    loop {
                        let mut request_line = String::new();
                        if stream.read_line(&mut request_line).await.unwrap_or(0) == 0 {
                            return;
                        }
                        loop {
                            let mut header = String::new();
                            if stream.read_line(&mut header).await.unwrap_or(0) == 0 {
                                return;
                            }
                            if header == "\r\n" {
                                break;
                            }
                        }
                        let mut parts = request_line.split_whitespace();
                        let method = parts.next().unwrap_or_default().to_owned();
                        let path = parts.next().unwrap_or_default().to_owned();
                        seen.lock().unwrap().push(format!("{method} {path}"));

                        let response = if path.contains("/containers/c0ffee/json") {
                            let body = format!(
                                "{{\"Id\":\"c0ffee\",\"State\":{{\"Running\":{running}}}}}"
                            );
                            format!(
                                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\
                                 Content-Length: {}\r\n\r\n{body}",
                                body.len()
                            )
                        } else if path.contains("/containers/c0ffee/stop") && running {
                            "HTTP/1.1 204 No Content\r\n\r\n".to_owned()
                        } else if path.contains("/containers/c0ffee/stop") {
                            "HTTP/1.1 304 Not Modified\r\n\r\n".to_owned()
                        } else {
                            "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n".to_owned()
                        };
                        if stream.get_mut().write_all(response.as_bytes()).await.is_err() {
                            return;
                        }
                    }
                });
            }
        });

        let docker = Docker::connect_with_http(&addr, 4, API_DEFAULT_VERSION).unwrap();
        (DockerRuntime::new(docker), requests)
    }

    fn stop_requests(requests: &Mutex<Vec<String>>) -> Vec<String> {
        requests
            .lock()
            .unwrap()
            .iter()
            .filter(|request| request.contains("/stop"))
            .cloned()
            .collect()
    }

    #[tokio::test]
    async fn test_stop_exited_container_is_not_running() {
        let (runtime, requests) = engine_stub(false).await;
        let id = ContainerID::new("c0ffee").unwrap();

        let outcome = runtime
            .stop_container(&id, Duration::from_secs(9))
            .await
            .unwrap();

        assert_eq!(outcome, StopOutcome::NotRunning);
        assert!(stop_requests(&requests).is_empty());
    }

    #[tokio::test]
    async fn test_stop_running_container() {
        let (runtime, requests) = engine_stub(true).await;
        let id = ContainerID::new("c0ffee").unwrap();

        let outcome = runtime
            .stop_container(&id, Duration::from_secs(9))
            .await
            .unwrap();

        assert_eq!(outcome, StopOutcome::Stopped);
        let stops = stop_requests(&requests);
        assert_eq!(stops.len(), 1);
        assert!(stops[0].starts_with("POST "));
        assert!(stops[0].ends_with("/containers/c0ffee/stop?t=9"));
    }

    #[test]
    fn test_container_config() {
        let overrides = ContainerOverrides {
            network: Some("host".to_owned()),
            dns_servers: vec!["8.8.8.8".to_owned()],
            ..Default::default()
        };
        let mut builder = LaunchSpecBuilder::new(&InspectorConfig::default(), "redis:7");
        builder
            .set_overrides(&overrides)
            .set_artifacts_path("/state/artifacts");
        let spec = builder.build().unwrap();

        let config = container_config(&spec);
        let host_config = config.host_config.as_ref().unwrap();

        assert_eq!(config.image.as_deref(), Some("redis:7"));
        assert_eq!(
            config.entrypoint,
            Some(vec!["/opt/creo/bin/sensor".to_owned()])
        );
        let exposed = config.exposed_ports.as_ref().unwrap();
        assert!(exposed.contains_key("65501/tcp"));
        assert!(exposed.contains_key("65502/tcp"));
        assert_eq!(host_config.publish_all_ports, Some(true));
        assert_eq!(host_config.privileged, Some(true));
        assert_eq!(host_config.cap_add, Some(vec!["SYS_ADMIN".to_owned()]));
        assert_eq!(host_config.network_mode.as_deref(), Some("host"));
        assert_eq!(host_config.dns, Some(vec!["8.8.8.8".to_owned()]));
        assert!(host_config.links.is_none());
        assert!(host_config.dns_search.is_none());
        assert_eq!(host_config.binds.as_ref().unwrap().len(), 2);
    }

    #[test]
    fn test_port_bindings() {
        let ports: PortMap = HashMap::from([
            (
                "65501/tcp".to_owned(),
                Some(vec![PortBinding {
                    host_ip: Some("0.0.0.0".to_owned()),
                    host_port: Some("49153".to_owned()),
                }]),
            ),
            ("8080/tcp".to_owned(), None),
        ]);

        let bindings = port_bindings(ports).unwrap();

        assert_eq!(
            bindings.get(&Port::tcp(65501)).unwrap(),
            &vec![HostBinding {
                host_ip: Some("0.0.0.0".to_owned()),
                host_port: 49153,
            }]
        );
        assert!(bindings.get(&Port::tcp(8080)).unwrap().is_empty());
    }

    #[test]
    fn test_port_bindings_invalid_host_port() {
        let ports: PortMap = HashMap::from([(
            "65501/tcp".to_owned(),
            Some(vec![PortBinding {
                host_ip: None,
                host_port: Some("not-a-port".to_owned()),
            }]),
        )]);

        assert!(matches!(
            port_bindings(ports),
            Err(Error::InvalidPortBinding { .. })
        ));
    }
}
