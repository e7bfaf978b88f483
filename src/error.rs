// ABOUTME: Crate-wide error type aggregating module errors.
// ABOUTME: Uses thiserror for ergonomic error handling.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid endpoint URI '{uri}': {reason}")]
    InvalidEndpointUri { uri: String, reason: String },

    #[error(transparent)]
    Tunnel(#[from] crate::tunnel::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
