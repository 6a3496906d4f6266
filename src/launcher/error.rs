use crate::container::{self, ContainerID};
use crate::runtime;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("image reference must not be empty")]
    MissingImage,
    #[error("artifacts path must be set")]
    MissingArtifactsPath,
    #[error("volume mount `{0}` needs both a source and a destination")]
    InvalidVolumeMount(String),
    #[error(transparent)]
    Runtime(#[from] runtime::Error),
    #[error("container `{id}` cannot reach the sensor: {source}")]
    Comms {
        id: ContainerID,
        #[source]
        source: container::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
