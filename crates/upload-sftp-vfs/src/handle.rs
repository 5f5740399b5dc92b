//! Handle codec.
//!
//! A handle is the path's UTF-8 bytes, verbatim. There is no handle table:
//! two OPENs of the same path produce equal handles and therefore resolve to
//! the same write buffer. Paths are not validated or normalized here; empty
//! strings and `..` segments pass through untouched.

use std::fmt;

use crate::error::{VfsError, VfsResult};

/// Opaque token a client presents on WRITE, CLOSE, READ, READDIR and FSTAT.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Handle(Vec<u8>);

impl Handle {
    /// Wrap raw bytes received from the protocol layer.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({:?})", String::from_utf8_lossy(&self.0))
    }
}

/// Wire handles arrive as strings; the bytes are kept as-is.
impl From<String> for Handle {
    fn from(s: String) -> Self {
        Self(s.into_bytes())
    }
}

impl From<&str> for Handle {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

/// Encode a client-visible path into a handle.
pub fn encode(path: &str) -> Handle {
    Handle::from(path)
}

/// Recover the path a handle was encoded from.
///
/// Every handle produced by [`encode`] decodes back to the exact input.
/// Bytes that are not UTF-8 can only come from a foreign handle and fail
/// with [`VfsError::HandleResolution`].
pub fn decode(handle: &Handle) -> VfsResult<String> {
    String::from_utf8(handle.0.clone())
        .map_err(|e| VfsError::handle_resolution(format!("handle is not UTF-8: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_stores_path_bytes_verbatim() {
        let handle = encode("report.csv");
        assert_eq!(handle.as_bytes(), b"report.csv");
        assert_eq!(decode(&handle).unwrap(), "report.csv");
    }

    #[test]
    fn no_normalization_is_applied() {
        for path in ["", ".", "../../etc/passwd", "/a//b/", "dir\\file", "naïve.txt"] {
            assert_eq!(decode(&encode(path)).unwrap(), path);
        }
    }

    #[test]
    fn same_path_gives_equal_handles() {
        assert_eq!(encode("a.bin"), encode("a.bin"));
        assert_ne!(encode("a.bin"), encode("b.bin"));
    }

    #[test]
    fn non_utf8_handle_fails_to_decode() {
        let handle = Handle::from_bytes(vec![0xff, 0xfe, b'x']);
        assert!(matches!(decode(&handle), Err(VfsError::HandleResolution(_))));
    }
}
