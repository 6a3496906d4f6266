use crate::{ipc, launcher, postprocess};

use super::SessionState;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("inspector is `{actual:?}`, expected `{expected:?}`")]
    InvalidState {
        expected: SessionState,
        actual: SessionState,
    },
    #[error("failed to launch container: {0}")]
    Launch(#[from] launcher::Error),
    #[error("no container was launched")]
    NotLaunched,
    #[error("failed to open sensor channels: {0}")]
    Channels(#[source] ipc::Error),
    #[error("target command is empty")]
    EmptyCommand,
    #[error("failed to start monitoring: {0}")]
    StartMonitor(#[source] ipc::Error),
    #[error(transparent)]
    PostProcess(#[from] postprocess::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
