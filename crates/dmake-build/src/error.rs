use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Docker connection error: {0}")]
    DockerConnection(#[from] bollard::errors::Error),

    #[error("failed to build: {0}")]
    BuildFailed(String),

    #[error("failed to push: {0}")]
    PushFailed(String),

    #[error(transparent)]
    Core(#[from] dmake_core::DmakeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BuildError>;
