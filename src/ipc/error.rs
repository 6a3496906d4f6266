use std::time::Duration;

use crate::container;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Comms(#[from] container::Error),
    #[error("`{operation}` timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },
    #[error("sensor rejected `{0}`")]
    Rejected(&'static str),
    #[error("channel to `{endpoint}` was closed by the sensor")]
    Disconnected { endpoint: String },
    #[error("sensor channels are shut down")]
    Closed,
    #[error("i/o error on channel to `{endpoint}`: {source}")]
    Io {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode frame: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("failed to decode frame: {0}")]
    Decode(#[source] serde_json::Error),
}

impl Error {
    /// Returns true if the operation gave up waiting rather than failing outright.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
