//! Error types for server startup and plumbing.
//!
//! Per-request failures use [`crate::service::InferError`] instead.

use thiserror::Error;

use crate::metrics::MetricsError;

#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Metric registration error
    #[error("metrics error: {0}")]
    Metrics(#[from] MetricsError),
}

/// Result type alias using the server Error.
pub type Result<T> = std::result::Result<T, Error>;
