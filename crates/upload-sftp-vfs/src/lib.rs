//! Upload-only virtual filesystem.
//!
//! Translates SFTP-shaped verbs arriving on an authenticated connection into a
//! per-connection, per-user set of in-memory write buffers, and hands each
//! completed upload to a consumer exactly once.
//!
//! Key components:
//!
//! - [`Handle`] - Opaque token derived from a client path ([`handle`] codec)
//! - [`VirtualFileStore`] - Identity → filename → [`WriteBuffer`] table
//! - [`SessionFilesystem`] - Per-connection verb dispatch over the store
//! - [`UploadNotifier`] - Delivers an [`UploadRecord`] to an [`UploadConsumer`]
//!
//! ## Design Decisions
//!
//! - **Write-only**: READ and READDIR always report end-of-file; nothing
//!   written can be read back.
//! - **Offset ignored**: WRITE appends in call order regardless of the
//!   offset the client supplies.
//! - **Lazy buffers**: OPEN allocates nothing. A buffer appears on the first
//!   WRITE, so OPEN+CLOSE without data leaves no trace.
//! - **Take-once completion**: a completed buffer is removed from the store
//!   in the same step that produces its [`UploadRecord`].

mod error;
pub mod handle;
mod notifier;
mod session;
mod store;
mod types;

pub use error::{StatusCode, VfsError, VfsResult};
pub use handle::Handle;
pub use notifier::{UploadConsumer, UploadNotifier};
pub use session::SessionFilesystem;
pub use store::{BufferState, VirtualFileStore, WriteBuffer};
pub use types::{FileAttr, Identity, NameEntry, UploadRecord, Verb};
