use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::config::Port;

mod error;

pub use error::{Error, Result};

/// The maximum allowed length for a [`ContainerID`].
const CONTAINER_ID_MAX_LEN: usize = 255;

/// A validated, runtime-assigned container identifier.
///
/// # Examples
///
/// ```
/// # use creo_inspector::container::{ContainerID, Error};
/// let raw_id = "abc123abc123abc123abc123abc123abc123abc123abc123abc123abc123abcd";
/// let container_id = ContainerID::new(raw_id).unwrap();
/// assert_eq!(container_id.as_ref(), raw_id);
///
/// assert!(ContainerID::new("").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerID(Arc<str>);

impl ContainerID {
    /// Creates a new `ContainerID` from the given raw id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidContainerID`] if the input is empty or its length exceeds
    /// [`CONTAINER_ID_MAX_LEN`].
    pub fn new(src: impl AsRef<str>) -> Result<Self> {
        let src = src.as_ref();
        if src.is_empty() || src.len() > CONTAINER_ID_MAX_LEN {
            return Err(Error::InvalidContainerID(src.to_owned()));
        }

        Ok(Self(src.into()))
    }
}

impl AsRef<str> for ContainerID {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ContainerID {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Name given to the instrumented container, unique per process and launch time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerName(String);

impl ContainerName {
    /// Generates `<prefix>_<pid>_<unix seconds>`.
    pub fn generate(prefix: &str) -> Self {
        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        Self::with_parts(prefix, std::process::id(), timestamp)
    }

    fn with_parts(prefix: &str, pid: u32, timestamp: u64) -> Self {
        Self(format!("{prefix}_{pid}_{timestamp}"))
    }
}

impl AsRef<str> for ContainerName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A host address/port a container port is published on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostBinding {
    pub host_ip: Option<String>,
    pub host_port: u16,
}

/// Network state of a container as reported by the runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkState {
    pub ip_address: Option<String>,
    pub ports: HashMap<Port, Vec<HostBinding>>,
}

impl NetworkState {
    /// Returns the first host binding of the given container port.
    pub fn host_binding(&self, port: &Port) -> Option<&HostBinding> {
        self.ports.get(port).and_then(|bindings| bindings.first())
    }
}

/// Inspected state of a container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerState {
    pub running: bool,
    pub network: Option<NetworkState>,
}

impl ContainerState {
    /// Checks that the sensor can be reached through the published reserved ports.
    ///
    /// This never touches the network; it only looks at the inspected state.
    ///
    /// # Errors
    ///
    /// * [`Error::NotRunning`] if the container already exited.
    /// * [`Error::MissingNetworkInfo`] if the runtime reported no network settings.
    /// * [`Error::MissingCommsPorts`] if fewer ports are published than there are
    ///   reserved ports.
    pub fn comms_network(&self, reserved_ports: &[Port]) -> Result<&NetworkState> {
        if !self.running {
            return Err(Error::NotRunning);
        }
        let network = self.network.as_ref().ok_or(Error::MissingNetworkInfo)?;
        let found = network
            .ports
            .values()
            .filter(|bindings| !bindings.is_empty())
            .count();
        if found < reserved_ports.len() {
            return Err(Error::MissingCommsPorts {
                expected: reserved_ports.len(),
                found,
            });
        }

        Ok(network)
    }
}

/// Handle on the instrumented container for the duration of a run.
#[derive(Debug, Clone)]
pub struct ContainerHandle {
    id: ContainerID,
    name: ContainerName,
    state: Option<ContainerState>,
}

impl ContainerHandle {
    pub fn new(id: ContainerID, name: ContainerName) -> Self {
        Self {
            id,
            name,
            state: None,
        }
    }

    pub fn id(&self) -> &ContainerID {
        &self.id
    }

    pub fn name(&self) -> &ContainerName {
        &self.name
    }

    /// The last inspected state, if the container has been inspected.
    pub fn state(&self) -> Option<&ContainerState> {
        self.state.as_ref()
    }

    pub fn set_state(&mut self, state: ContainerState) {
        self.state = Some(state);
    }
}
