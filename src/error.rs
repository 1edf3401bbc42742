// ABOUTME: Application-wide error types for sitepub.
// ABOUTME: Uses thiserror for ergonomic error handling.

use std::path::PathBuf;
use thiserror::Error;

use crate::pipeline::{PipelineError, PublishFailure};
use crate::probe::ProbeError;
use crate::store::StoreError;
use crate::types::IdError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("file already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("configuration file not found in {0}")]
    ConfigNotFound(PathBuf),

    #[error("site not configured: {0}")]
    UnknownSite(String),

    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Publish(Box<PublishFailure>),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Probe(#[from] ProbeError),

    #[error("invalid identifier: {0}")]
    Id(#[from] IdError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<PublishFailure> for Error {
    fn from(failure: PublishFailure) -> Self {
        Error::Publish(Box::new(failure))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
