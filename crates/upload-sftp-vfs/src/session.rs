//! Session filesystem: per-connection verb dispatch.
//!
//! Every path looks like an empty directory. Only OPEN/WRITE/CLOSE touch the
//! store; read and navigation verbs answer with constants so clients that
//! list or stat before uploading keep working.

use std::sync::Arc;

use crate::error::{VfsError, VfsResult};
use crate::handle::{self, Handle};
use crate::notifier::UploadNotifier;
use crate::store::VirtualFileStore;
use crate::types::{FileAttr, Identity, NameEntry, Verb};

/// Filesystem facade bound to one connection.
///
/// Cheap to clone; clones share the same store, so the SSH layer can bind
/// the identity while the SFTP layer dispatches verbs.
#[derive(Debug, Clone)]
pub struct SessionFilesystem {
    store: Arc<VirtualFileStore>,
    notifier: UploadNotifier,
}

impl SessionFilesystem {
    /// Create a session with a fresh, unbound store.
    pub fn new(notifier: UploadNotifier) -> Self {
        Self::with_store(Arc::new(VirtualFileStore::new()), notifier)
    }

    pub fn with_store(store: Arc<VirtualFileStore>, notifier: UploadNotifier) -> Self {
        Self { store, notifier }
    }

    pub fn store(&self) -> &Arc<VirtualFileStore> {
        &self.store
    }

    /// Bind the authenticated username to this connection.
    pub async fn set_current_user(&self, username: &str) -> VfsResult<()> {
        self.store.bind(Identity::new(username)).await
    }

    pub fn current_user(&self) -> Option<Identity> {
        self.store.identity()
    }

    // ========================================================================
    // Upload path
    // ========================================================================

    pub fn open(&self, filename: &str) -> VfsResult<Handle> {
        Ok(self.store.open(filename))
    }

    pub async fn write(&self, handle: &Handle, offset: u64, data: &[u8]) -> VfsResult<()> {
        self.store.write(handle, offset, data).await
    }

    /// Finalize the buffer behind `handle` and deliver it if it completed.
    ///
    /// A consumer failure is logged by the notifier and does not fail the
    /// CLOSE.
    pub async fn close(&self, request_id: u32, handle: &Handle) -> VfsResult<()> {
        self.store.close(handle).await?;
        if let Some(upload) = self.store.take_completed_upload().await {
            self.notifier.notify(upload, request_id).await;
        }
        Ok(())
    }

    // ========================================================================
    // Read and navigation (constant answers)
    // ========================================================================

    /// Always end-of-file; uploaded content is never served back.
    pub fn read(&self, _handle: &Handle, _offset: u64, _len: u32) -> VfsResult<Vec<u8>> {
        Err(VfsError::EndOfFile)
    }

    pub fn opendir(&self, path: &str) -> VfsResult<Handle> {
        Ok(handle::encode(path))
    }

    /// Always end-of-file; directories are permanently empty.
    pub fn readdir(&self, _handle: &Handle) -> VfsResult<Vec<NameEntry>> {
        Err(VfsError::EndOfFile)
    }

    /// Single synthetic entry for `path`, with `.` mapped to `/`.
    pub fn realpath(&self, path: &str) -> VfsResult<Vec<NameEntry>> {
        let normalized = if path == "." { "/" } else { path };
        Ok(vec![NameEntry {
            filename: normalized.to_string(),
            longname: normalized.to_string(),
            attrs: FileAttr::synthetic(),
        }])
    }

    pub fn stat(&self, _path: &str) -> VfsResult<FileAttr> {
        Ok(FileAttr::synthetic())
    }

    pub fn fstat(&self, _handle: &Handle) -> VfsResult<FileAttr> {
        Ok(FileAttr::synthetic())
    }

    // ========================================================================
    // Metadata mutations (always rejected)
    // ========================================================================

    pub fn mkdir(&self, _path: &str) -> VfsResult<()> {
        Err(VfsError::Unsupported(Verb::Mkdir))
    }

    pub fn remove(&self, _path: &str) -> VfsResult<()> {
        Err(VfsError::Unsupported(Verb::Remove))
    }

    pub fn rmdir(&self, _path: &str) -> VfsResult<()> {
        Err(VfsError::Unsupported(Verb::Rmdir))
    }

    pub fn rename(&self, _from: &str, _to: &str) -> VfsResult<()> {
        Err(VfsError::Unsupported(Verb::Rename))
    }

    // ========================================================================
    // Teardown
    // ========================================================================

    /// Drop all buffers for this connection. Returns unfinished filenames.
    pub async fn end_session(&self) -> Vec<String> {
        let abandoned = self.store.discard().await;
        if !abandoned.is_empty() {
            tracing::warn!(
                user = ?self.current_user().map(Identity::into_string),
                count = abandoned.len(),
                files = ?abandoned,
                "discarding unfinished uploads"
            );
        }
        abandoned
    }
}
