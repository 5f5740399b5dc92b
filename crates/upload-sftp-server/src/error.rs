//! Server error types.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while configuring or running the server.
///
/// Per-request failures never appear here; they are answered with an SFTP
/// status and the connection stays up.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to read config {}: {source}", path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("invalid bind address {0}")]
    InvalidAddress(String),

    #[error("invalid user entry {0:?}: expected NAME:PASSWORD")]
    InvalidUser(String),

    #[error("failed to load host key {}: {source}", path.display())]
    HostKey {
        path: PathBuf,
        #[source]
        source: russh::keys::Error,
    },

    #[error("failed to generate host key: {0}")]
    KeyGeneration(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Raised by an [`Authenticator`](crate::auth::Authenticator) that could not
/// reach a decision. Always treated as a rejection.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("authentication backend unavailable: {0}")]
    Backend(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
