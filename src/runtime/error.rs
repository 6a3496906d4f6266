use std::fmt;

use crate::container;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Runtime API operation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Start,
    Inspect,
    Stop,
    Remove,
    Logs,
    InspectImage,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::Create => "create",
            Operation::Start => "start",
            Operation::Inspect => "inspect",
            Operation::Stop => "stop",
            Operation::Remove => "remove",
            Operation::Logs => "fetch logs of",
            Operation::InspectImage => "inspect image",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to connect to the container runtime: {0}")]
    Connect(#[source] BoxError),
    #[error("failed to {operation} `{target}`: {source}")]
    Api {
        operation: Operation,
        target: String,
        #[source]
        source: BoxError,
    },
    #[error("runtime returned an invalid container id: {0}")]
    InvalidContainerID(#[from] container::Error),
    #[error("invalid port binding `{value}` for `{port}`")]
    InvalidPortBinding { port: String, value: String },
}

impl Error {
    pub fn api(
        operation: Operation,
        target: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::Api {
            operation,
            target: target.into(),
            source: source.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
