// ABOUTME: Tunnel-specific error types and their caller-facing classification.
// ABOUTME: Covers configuration, trust verification, and connection failures.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid SSH endpoint '{input}': {reason}")]
    InvalidEndpoint { input: String, reason: String },

    #[error("failed to load private key from {path}: {reason}")]
    KeyLoadFailed { path: PathBuf, reason: String },

    #[error("known-hosts file not found: {0}")]
    TrustStoreNotFound(PathBuf),

    #[error("known-hosts file {path} could not be used: {reason}")]
    TrustStoreInvalid { path: PathBuf, reason: String },

    #[error("host key for {host}:{port} is not in the trust store")]
    UnknownHostKey { host: String, port: u16 },

    #[error("host key for {host}:{port} does not match the trusted entry")]
    HostKeyChanged { host: String, port: u16 },

    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("authentication failed for user {0}")]
    AuthenticationFailed(String),

    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("failed to bind local forwarding listener: {0}")]
    ForwardBindFailed(#[source] std::io::Error),

    #[error("SSH protocol error: {0}")]
    Protocol(#[from] russh::Error),
}

/// Coarse classification so callers can tell misconfiguration apart from
/// trust rejections and network failures without matching every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Wrong before any network attempt; never retried.
    Configuration,
    /// The peer's identity was rejected by the enforced policy.
    TrustVerification,
    /// Network, authentication, or timeout failure during establishment.
    Connect,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidEndpoint { .. }
            | Error::KeyLoadFailed { .. }
            | Error::TrustStoreNotFound(_)
            | Error::TrustStoreInvalid { .. } => ErrorKind::Configuration,
            Error::UnknownHostKey { .. } | Error::HostKeyChanged { .. } => {
                ErrorKind::TrustVerification
            }
            Error::ConnectionFailed(_)
            | Error::AuthenticationFailed(_)
            | Error::ConnectTimeout(_)
            | Error::ForwardBindFailed(_)
            | Error::Protocol(_) => ErrorKind::Connect,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
