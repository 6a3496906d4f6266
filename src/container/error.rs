use crate::config::Port;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid container id: `{0}`")]
    InvalidContainerID(String),
    #[error("container has not been inspected yet")]
    NotInspected,
    #[error("container is not running")]
    NotRunning,
    #[error("no network info")]
    MissingNetworkInfo,
    #[error("missing comms ports: expected at least {expected} published ports, found {found}")]
    MissingCommsPorts { expected: usize, found: usize },
    #[error("reserved port `{0}` is not published")]
    UnpublishedPort(Port),
}

pub type Result<T> = std::result::Result<T, Error>;
