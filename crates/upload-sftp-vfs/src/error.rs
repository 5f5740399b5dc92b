//! VFS error types.

use std::io;
use thiserror::Error;

use crate::types::Verb;

/// Protocol-level outcome of a request.
///
/// SFTP clients only ever see this binary vocabulary; the detail carried by
/// [`VfsError`] stays on the server side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Ok,
    Eof,
    Failure,
}

/// VFS error type.
#[derive(Debug, Error)]
pub enum VfsError {
    /// A mutating verb arrived before authentication bound an identity.
    #[error("no identity bound to this session")]
    NoIdentityBound,

    /// The session is already bound to a different identity.
    #[error("session already bound to {bound}, refusing {requested}")]
    IdentityAlreadyBound { bound: String, requested: String },

    /// Verb is categorically unsupported by an upload-only filesystem.
    #[error("unsupported operation: {0}")]
    Unsupported(Verb),

    /// Handle could not be turned back into a filename.
    #[error("cannot resolve handle: {0}")]
    HandleResolution(String),

    /// Nothing to read. Reported for every READ and READDIR.
    #[error("end of file")]
    EndOfFile,

    /// I/O error while flushing a write buffer.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl VfsError {
    /// Create a HandleResolution error.
    pub fn handle_resolution(msg: impl Into<String>) -> Self {
        Self::HandleResolution(msg.into())
    }

    /// Create an Other error.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Collapse into the status code reported to the client.
    pub fn status(&self) -> StatusCode {
        match self {
            VfsError::EndOfFile => StatusCode::Eof,
            _ => StatusCode::Failure,
        }
    }
}

/// VFS result type.
pub type VfsResult<T> = Result<T, VfsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_end_of_file_maps_to_eof() {
        assert_eq!(VfsError::EndOfFile.status(), StatusCode::Eof);
        assert_eq!(VfsError::NoIdentityBound.status(), StatusCode::Failure);
        assert_eq!(
            VfsError::Unsupported(Verb::Rename).status(),
            StatusCode::Failure
        );
        assert_eq!(
            VfsError::handle_resolution("bad").status(),
            StatusCode::Failure
        );
    }

    #[test]
    fn unsupported_names_the_verb() {
        let msg = VfsError::Unsupported(Verb::Mkdir).to_string();
        assert_eq!(msg, "unsupported operation: MKDIR");
    }
}
