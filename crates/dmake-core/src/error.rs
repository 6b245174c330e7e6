use thiserror::Error;

#[derive(Debug, Error)]
pub enum DmakeError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("wrong configuration: {0}")]
    Validation(String),

    #[error("a build can not depend on itself: {0}")]
    SelfDependency(String),

    #[error("circular dependency between {0}")]
    CircularDependency(String),

    #[error("no such build: {0}")]
    UndefinedBuild(String),

    #[error("undefined template argument: {0}")]
    UndefinedArgument(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DmakeError>;
