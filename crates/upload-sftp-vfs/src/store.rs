//! Virtual file store.
//!
//! Per-connection table of identity → filename → [`WriteBuffer`]. Buffers are
//! created on first WRITE, finalized on CLOSE and removed when their upload is
//! taken. Filenames keep insertion order so "first completed" is oldest-first.

use std::collections::HashMap;

use indexmap::IndexMap;
use parking_lot::RwLock;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;

use crate::error::{VfsError, VfsResult};
use crate::handle::{self, Handle};
use crate::types::{Identity, UploadRecord};

/// Lifecycle of a [`WriteBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    /// Accepting WRITE.
    Open,
    /// CLOSE issued, sink being flushed.
    Finalizing,
    /// Fully flushed, eligible for extraction.
    Completed,
    /// Extracted; the buffer has left the store.
    Consumed,
}

/// In-memory accumulator for one (identity, filename) pair.
#[derive(Debug)]
pub struct WriteBuffer {
    sink: Option<BufWriter<Vec<u8>>>,
    payload: Vec<u8>,
    written: u64,
    state: BufferState,
}

impl Default for WriteBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl WriteBuffer {
    pub fn new() -> Self {
        Self {
            sink: Some(BufWriter::new(Vec::new())),
            payload: Vec::new(),
            written: 0,
            state: BufferState::Open,
        }
    }

    async fn append(&mut self, data: &[u8]) -> VfsResult<()> {
        let sink = match (self.state, self.sink.as_mut()) {
            (BufferState::Open, Some(sink)) => sink,
            (state, _) => {
                return Err(VfsError::other(format!(
                    "write to buffer in state {state:?}"
                )));
            }
        };
        sink.write_all(data).await?;
        self.written += data.len() as u64;
        Ok(())
    }

    /// Flush the sink and move to `Completed`.
    ///
    /// Only an `Open` buffer does any work; closing twice is a no-op.
    async fn finalize(&mut self) -> VfsResult<()> {
        if self.state != BufferState::Open {
            return Ok(());
        }
        let Some(mut sink) = self.sink.take() else {
            return Err(VfsError::other("open buffer without a sink"));
        };
        self.state = BufferState::Finalizing;
        sink.shutdown().await?;
        self.payload = sink.into_inner();
        self.state = BufferState::Completed;
        Ok(())
    }

    fn to_record(&self, filename: &str, identity: &Identity) -> UploadRecord {
        UploadRecord {
            filename: filename.to_string(),
            username: identity.to_string(),
            payload: self.payload.clone(),
            size: self.written,
        }
    }

    fn into_record(mut self, filename: String, identity: &Identity) -> UploadRecord {
        self.state = BufferState::Consumed;
        UploadRecord {
            filename,
            username: identity.to_string(),
            payload: std::mem::take(&mut self.payload),
            size: self.written,
        }
    }
}

type UserFiles = IndexMap<String, WriteBuffer>;

/// Write buffers for the identity bound to one connection.
///
/// The identity lock is never held across an await. The buffer table sits
/// behind an async mutex held for the whole of a WRITE or CLOSE, so a CLOSE
/// that is flushing cannot interleave with a WRITE on the same connection.
#[derive(Debug, Default)]
pub struct VirtualFileStore {
    identity: RwLock<Option<Identity>>,
    users: Mutex<HashMap<Identity, UserFiles>>,
}

impl VirtualFileStore {
    /// Create an empty store with no identity bound.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind the authenticated identity and create its (empty) buffer table.
    ///
    /// Binding the same identity again is a no-op; binding a different one
    /// fails, since an identity is fixed for the connection's lifetime.
    pub async fn bind(&self, identity: Identity) -> VfsResult<()> {
        {
            let mut bound = self.identity.write();
            match bound.as_ref() {
                Some(current) if *current == identity => {}
                Some(current) => {
                    return Err(VfsError::IdentityAlreadyBound {
                        bound: current.to_string(),
                        requested: identity.to_string(),
                    });
                }
                None => *bound = Some(identity.clone()),
            }
        }
        self.users.lock().await.entry(identity).or_default();
        Ok(())
    }

    /// The bound identity, if authentication has completed.
    pub fn identity(&self) -> Option<Identity> {
        self.identity.read().clone()
    }

    fn require_identity(&self) -> VfsResult<Identity> {
        self.identity().ok_or(VfsError::NoIdentityBound)
    }

    /// Hand out a handle for `filename`. Allocates nothing.
    pub fn open(&self, filename: &str) -> Handle {
        handle::encode(filename)
    }

    /// Append `data` to the buffer behind `handle`, creating it if needed.
    ///
    /// `offset` is accepted and ignored: bytes land in call order.
    pub async fn write(&self, handle: &Handle, offset: u64, data: &[u8]) -> VfsResult<()> {
        let identity = self.require_identity()?;
        let filename = handle::decode(handle)?;

        let mut users = self.users.lock().await;
        let buffer = users
            .entry(identity)
            .or_default()
            .entry(filename)
            .or_default();
        tracing::trace!(offset, len = data.len(), "append");
        buffer.append(data).await
    }

    /// Finalize the buffer behind `handle`.
    ///
    /// Unknown handles (directories, opens that never wrote, bytes that were
    /// never an encoded path) are tolerated.
    pub async fn close(&self, handle: &Handle) -> VfsResult<()> {
        let Ok(filename) = handle::decode(handle) else {
            tracing::debug!(?handle, "close on a handle no buffer can own");
            return Ok(());
        };
        let Some(identity) = self.identity() else {
            return Ok(());
        };

        let mut users = self.users.lock().await;
        match users.get_mut(&identity).and_then(|files| files.get_mut(&filename)) {
            Some(buffer) => buffer.finalize().await,
            None => Ok(()),
        }
    }

    /// Oldest completed upload for the bound identity, left in place.
    pub async fn get_completed_upload(&self) -> Option<UploadRecord> {
        let identity = self.identity()?;
        let users = self.users.lock().await;
        users.get(&identity)?.iter().find_map(|(filename, buffer)| {
            (buffer.state == BufferState::Completed).then(|| buffer.to_record(filename, &identity))
        })
    }

    /// Drop the oldest completed buffer. Returns whether one was removed.
    pub async fn remove_completed_upload(&self) -> bool {
        self.take_completed_upload().await.is_some()
    }

    /// Extract and remove the oldest completed upload in one step.
    pub async fn take_completed_upload(&self) -> Option<UploadRecord> {
        let identity = self.identity()?;
        let mut users = self.users.lock().await;
        let files = users.get_mut(&identity)?;
        let index = files
            .values()
            .position(|buffer| buffer.state == BufferState::Completed)?;
        let (filename, buffer) = files.shift_remove_index(index)?;
        Some(buffer.into_record(filename, &identity))
    }

    /// Number of live buffers for the bound identity.
    pub async fn buffer_count(&self) -> usize {
        let Some(identity) = self.identity() else {
            return 0;
        };
        self.users
            .lock()
            .await
            .get(&identity)
            .map_or(0, |files| files.len())
    }

    /// State and byte count of the buffer for `filename`, if one exists.
    pub async fn buffer_status(&self, filename: &str) -> Option<(BufferState, u64)> {
        let identity = self.identity()?;
        let users = self.users.lock().await;
        let buffer = users.get(&identity)?.get(filename)?;
        Some((buffer.state, buffer.written))
    }

    /// Drop every buffer. Returns the filenames that never completed.
    pub async fn discard(&self) -> Vec<String> {
        let mut users = self.users.lock().await;
        users
            .drain()
            .flat_map(|(_, files)| files.into_iter())
            .filter(|(_, buffer)| buffer.state != BufferState::Completed)
            .map(|(filename, _)| filename)
            .collect()
    }
}
