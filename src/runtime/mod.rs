//! Container runtime API used to run the instrumented container.
mod docker;
mod error;

pub use docker::DockerRuntime;
pub use error::{BoxError, Error, Operation, Result};

use std::time::Duration;

use crate::container::{ContainerID, ContainerState};
use crate::launcher::LaunchSpec;

/// Result of asking the runtime to stop a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped,
    /// The container had already exited, typically because the sensor finished.
    NotRunning,
}

/// Combined output captured from a container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerLogs {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

/// The subset of a container runtime API the inspector drives.
pub trait ContainerRuntime {
    fn create_container(
        &self,
        spec: &LaunchSpec,
    ) -> impl std::future::Future<Output = Result<ContainerID>> + Send;

    fn start_container(
        &self,
        id: &ContainerID,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    fn inspect_container(
        &self,
        id: &ContainerID,
    ) -> impl std::future::Future<Output = Result<ContainerState>> + Send;

    /// Stops the container, killing it after `grace_period`.
    fn stop_container(
        &self,
        id: &ContainerID,
        grace_period: Duration,
    ) -> impl std::future::Future<Output = Result<StopOutcome>> + Send;

    /// Force-removes the container together with its anonymous volumes.
    fn remove_container(
        &self,
        id: &ContainerID,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    fn container_logs(
        &self,
        id: &ContainerID,
    ) -> impl std::future::Future<Output = Result<ContainerLogs>> + Send;
}
