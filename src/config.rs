//! Immutable inspector configuration.
//!
//! Reserved sensor ports, in-container paths, and protocol timeouts used to be
//! process-wide constants. They are collected into [`InspectorConfig`] and handed
//! to the inspector at construction, so every run (and every test) sees exactly
//! one consistent set of values.
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Default reserved port the sensor listens on for commands.
pub const CMD_PORT_DEFAULT: Port = Port::tcp(65501);
/// Default reserved port the sensor publishes events on.
pub const EVT_PORT_DEFAULT: Port = Port::tcp(65502);
/// Location of the sensor binary inside the instrumented container.
pub const SENSOR_BIN_PATH: &str = "/opt/creo/bin/sensor";
/// Location of the shared artifacts volume inside the instrumented container.
pub const ARTIFACTS_MOUNT_PATH: &str = "/opt/creo/artifacts";
/// File name of the sensor binary next to the inspector executable.
pub const SENSOR_BIN_LOCAL: &str = "creo-sensor";
/// Prefix for generated container names.
pub const CONTAINER_NAME_PREFIX: &str = "creo-inspector";
/// Value of the `type` label attached to every instrumented container.
pub const LABEL_VALUE: &str = "creo-inspector";
/// Host IP used when the Docker daemon is reached over a local socket.
pub const DEFAULT_HOST_IP: &str = "127.0.0.1";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid port `{0}`: expected `<number>/<protocol>`")]
    InvalidPort(String),
    #[error("invalid value for `{var}`: `{value}`")]
    InvalidVar { var: &'static str, value: String },
    #[error("failed to locate the current executable: {0}")]
    CurrentExe(#[source] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Transport protocol of a container port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Protocol {
    Tcp,
    Udp,
    Sctp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
            Protocol::Sctp => "sctp",
        }
    }
}

/// A container port key, e.g. `65501/tcp`.
///
/// # Examples
///
/// ```
/// # use creo_inspector::config::{Port, Protocol};
/// let port: Port = "65501/tcp".parse().unwrap();
/// assert_eq!(port, Port::tcp(65501));
/// assert_eq!(port.to_string(), "65501/tcp");
///
/// // A bare number defaults to tcp, like the Docker API does.
/// let port: Port = "8080".parse().unwrap();
/// assert_eq!(port.protocol(), Protocol::Tcp);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Port {
    number: u16,
    protocol: Protocol,
}

impl Port {
    pub const fn new(number: u16, protocol: Protocol) -> Self {
        Self { number, protocol }
    }

    pub const fn tcp(number: u16) -> Self {
        Self::new(number, Protocol::Tcp)
    }

    pub fn number(&self) -> u16 {
        self.number
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }
}

impl FromStr for Port {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (number, protocol) = match s.split_once('/') {
            Some((number, protocol)) => (number, protocol),
            None => (s, "tcp"),
        };
        let number = number
            .parse::<u16>()
            .map_err(|_| Error::InvalidPort(s.to_owned()))?;
        let protocol = match protocol {
            "tcp" => Protocol::Tcp,
            "udp" => Protocol::Udp,
            "sctp" => Protocol::Sctp,
            _ => return Err(Error::InvalidPort(s.to_owned())),
        };

        Ok(Self::new(number, protocol))
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.number, self.protocol.as_str())
    }
}

/// Configuration shared by every stage of an inspection run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InspectorConfig {
    pub cmd_port: Port,
    pub evt_port: Port,
    pub sensor_bin_path: String,
    pub artifacts_mount_path: String,
    /// Sensor binary on the host, bind-mounted read-only into the container.
    pub sensor_bin_local: PathBuf,
    pub container_name_prefix: String,
    pub label_value: String,
    /// Address the published sensor ports are reachable on.
    pub host_ip: String,
    pub cmd_timeout: Duration,
    pub event_timeout: Duration,
    pub stop_grace_period: Duration,
}

impl Default for InspectorConfig {
    fn default() -> Self {
        Self {
            cmd_port: CMD_PORT_DEFAULT,
            evt_port: EVT_PORT_DEFAULT,
            sensor_bin_path: SENSOR_BIN_PATH.to_owned(),
            artifacts_mount_path: ARTIFACTS_MOUNT_PATH.to_owned(),
            sensor_bin_local: PathBuf::from(SENSOR_BIN_LOCAL),
            container_name_prefix: CONTAINER_NAME_PREFIX.to_owned(),
            label_value: LABEL_VALUE.to_owned(),
            host_ip: DEFAULT_HOST_IP.to_owned(),
            cmd_timeout: Duration::from_secs(10),
            event_timeout: Duration::from_secs(120),
            stop_grace_period: Duration::from_secs(9),
        }
    }
}

impl InspectorConfig {
    /// Builds the configuration from the process environment, falling back to the defaults.
    ///
    /// The local sensor binary is expected next to the current executable unless
    /// `CREO_INSPECTOR_SENSOR_PATH` points elsewhere.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the variables holds an unparsable value.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(port) = lookup("CREO_INSPECTOR_CMD_PORT") {
            config.cmd_port = port.parse()?;
        }
        if let Some(port) = lookup("CREO_INSPECTOR_EVT_PORT") {
            config.evt_port = port.parse()?;
        }
        if let Some(secs) = lookup("CREO_INSPECTOR_CMD_TIMEOUT_SECS") {
            config.cmd_timeout = parse_secs("CREO_INSPECTOR_CMD_TIMEOUT_SECS", secs)?;
        }
        if let Some(secs) = lookup("CREO_INSPECTOR_EVENT_TIMEOUT_SECS") {
            config.event_timeout = parse_secs("CREO_INSPECTOR_EVENT_TIMEOUT_SECS", secs)?;
        }
        config.sensor_bin_local = match lookup("CREO_INSPECTOR_SENSOR_PATH") {
            Some(path) => PathBuf::from(path),
            None => {
                let exe = std::env::current_exe().map_err(Error::CurrentExe)?;
                exe.parent()
                    .map(|dir| dir.join(SENSOR_BIN_LOCAL))
                    .unwrap_or_else(|| PathBuf::from(SENSOR_BIN_LOCAL))
            }
        };
        config.host_ip = docker_host_ip(lookup("DOCKER_HOST").as_deref());

        if config.cmd_port == config.evt_port {
            return Err(Error::InvalidVar {
                var: "CREO_INSPECTOR_EVT_PORT",
                value: config.evt_port.to_string(),
            });
        }

        Ok(config)
    }

    /// The reserved ports that must be published for the sensor channels.
    pub fn reserved_ports(&self) -> [Port; 2] {
        [self.cmd_port, self.evt_port]
    }
}

fn parse_secs(var: &'static str, value: String) -> Result<Duration> {
    match value.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(Error::InvalidVar { var, value }),
    }
}

/// Derives the address of the Docker host from a `DOCKER_HOST` value.
///
/// Only `tcp://` endpoints point at a remote host; everything else is local.
pub fn docker_host_ip(docker_host: Option<&str>) -> String {
    docker_host
        .and_then(|value| value.strip_prefix("tcp://"))
        .and_then(|rest| rest.split(['/', ':']).next())
        .filter(|host| !host.is_empty())
        .unwrap_or(DEFAULT_HOST_IP)
        .to_owned()
}
