//! Error types for alignment runs.

use thiserror::Error;

/// Errors raised while configuring, preparing, or running an alignment.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Invalid parameter, unknown mode string, or inconsistent option combination.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Image, reference, or field dimensions do not fit together.
    #[error("Shape mismatch: {0}")]
    Shape(String),

    #[error("Failed to build worker pool: {0}")]
    ThreadPool(String),

    /// The alignment worker thread died before finishing.
    #[error("Alignment worker failed: {0}")]
    Worker(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    pub(crate) fn shape(msg: impl Into<String>) -> Self {
        Error::Shape(msg.into())
    }
}

impl From<strum::ParseError> for Error {
    fn from(err: strum::ParseError) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<rayon::ThreadPoolBuildError> for Error {
    fn from(err: rayon::ThreadPoolBuildError) -> Self {
        Error::ThreadPool(err.to_string())
    }
}
