//! Core VFS types.

use std::fmt;
use std::time::SystemTime;

use strum::{Display, EnumString};

/// The SFTP verbs this filesystem answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "UPPERCASE")]
pub enum Verb {
    Open,
    Close,
    Read,
    Write,
    Opendir,
    Readdir,
    Realpath,
    Fstat,
    Stat,
    Mkdir,
    Remove,
    Rmdir,
    Rename,
}

impl Verb {
    /// Returns true for the metadata-mutating verbs that are always rejected.
    pub fn is_rejected(&self) -> bool {
        matches!(self, Verb::Mkdir | Verb::Remove | Verb::Rmdir | Verb::Rename)
    }
}

/// Authenticated username bound to a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity(String);

impl Identity {
    pub fn new(username: impl Into<String>) -> Self {
        Self(username.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Identity {
    fn from(s: String) -> Self {
        Self(s)
    }
}

const S_IFMT: u32 = 0o170000;
const S_IFDIR: u32 = 0o040000;

/// File attributes as reported to STAT, FSTAT and REALPATH.
#[derive(Debug, Clone, PartialEq)]
pub struct FileAttr {
    /// Size in bytes.
    pub size: u64,
    /// Unix mode: file type bits plus permissions (e.g., `0o040755`).
    pub perm: u32,
    pub uid: u32,
    pub gid: u32,
    /// Last access time.
    pub atime: SystemTime,
    /// Last modification time.
    pub mtime: SystemTime,
}

impl FileAttr {
    /// The fixed attributes every path and handle reports.
    ///
    /// Always a 0755 directory owned by root with zero size, stamped with the
    /// time of the call. Never derived from uploaded content.
    pub fn synthetic() -> Self {
        let now = SystemTime::now();
        Self {
            size: 0,
            perm: S_IFDIR | 0o755,
            uid: 0,
            gid: 0,
            atime: now,
            mtime: now,
        }
    }

    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        self.perm & S_IFMT == S_IFDIR
    }
}

/// One entry of a name-list reply.
#[derive(Debug, Clone, PartialEq)]
pub struct NameEntry {
    pub filename: String,
    pub longname: String,
    pub attrs: FileAttr,
}

/// A fully flushed upload, extracted from the store exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRecord {
    /// Filename exactly as the client sent it to OPEN.
    pub filename: String,
    /// Identity that owned the buffer.
    pub username: String,
    /// Every byte written, in WRITE order.
    pub payload: Vec<u8>,
    /// Total bytes written; always `payload.len()`.
    pub size: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn verb_names_match_protocol() {
        assert_eq!(Verb::Opendir.to_string(), "OPENDIR");
        assert_eq!(Verb::Realpath.to_string(), "REALPATH");
        assert_eq!(Verb::from_str("FSTAT").unwrap(), Verb::Fstat);
    }

    #[test]
    fn only_metadata_mutations_are_rejected() {
        let rejected: Vec<_> = [
            Verb::Open,
            Verb::Close,
            Verb::Read,
            Verb::Write,
            Verb::Opendir,
            Verb::Readdir,
            Verb::Realpath,
            Verb::Fstat,
            Verb::Stat,
            Verb::Mkdir,
            Verb::Remove,
            Verb::Rmdir,
            Verb::Rename,
        ]
        .into_iter()
        .filter(Verb::is_rejected)
        .collect();
        assert_eq!(
            rejected,
            vec![Verb::Mkdir, Verb::Remove, Verb::Rmdir, Verb::Rename]
        );
    }

    #[test]
    fn synthetic_attrs_are_a_root_owned_directory() {
        let attr = FileAttr::synthetic();
        assert!(attr.is_dir());
        assert_eq!(attr.perm & 0o777, 0o755);
        assert_eq!((attr.uid, attr.gid, attr.size), (0, 0, 0));
        assert_eq!(attr.atime, attr.mtime);
    }
}
