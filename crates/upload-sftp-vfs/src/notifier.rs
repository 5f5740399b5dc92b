//! Upload notifier.
//!
//! Delivers a completed [`UploadRecord`] to the configured consumer. Consumer
//! failures never reach the client: CLOSE still reports success, even when
//! the consumer panics.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tracing::Instrument;

use crate::types::UploadRecord;

/// Receives each completed upload exactly once.
#[async_trait]
pub trait UploadConsumer: Send + Sync {
    /// Called before the CLOSE status is sent. `request_id` is the CLOSE's.
    async fn on_upload(&self, upload: UploadRecord, request_id: u32) -> anyhow::Result<()>;
}

#[async_trait]
impl<F> UploadConsumer for F
where
    F: Fn(UploadRecord, u32) -> anyhow::Result<()> + Send + Sync,
{
    async fn on_upload(&self, upload: UploadRecord, request_id: u32) -> anyhow::Result<()> {
        self(upload, request_id)
    }
}

/// Hands uploads to an optional [`UploadConsumer`].
#[derive(Clone, Default)]
pub struct UploadNotifier {
    consumer: Option<Arc<dyn UploadConsumer>>,
}

impl fmt::Debug for UploadNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadNotifier")
            .field("consumer", &self.consumer.is_some())
            .finish()
    }
}

impl UploadNotifier {
    pub fn new(consumer: Arc<dyn UploadConsumer>) -> Self {
        Self {
            consumer: Some(consumer),
        }
    }

    /// A notifier that drops every upload.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Deliver `upload`. Returns whether the consumer accepted it.
    pub async fn notify(&self, upload: UploadRecord, request_id: u32) -> bool {
        let filename = upload.filename.clone();
        let username = upload.username.clone();
        let size = upload.size;

        let Some(consumer) = &self.consumer else {
            tracing::debug!(%filename, %username, size, "upload completed, no consumer configured");
            return false;
        };

        let span = tracing::info_span!("upload.deliver", %filename, %username, size, request_id);
        let delivery = AssertUnwindSafe(consumer.on_upload(upload, request_id))
            .catch_unwind()
            .instrument(span)
            .await;
        match delivery {
            Ok(Ok(())) => {
                tracing::info!(%filename, %username, size, request_id, "upload delivered");
                true
            }
            Ok(Err(e)) => {
                tracing::warn!(%filename, %username, request_id, "upload consumer failed: {e:#}");
                false
            }
            Err(panic) => {
                tracing::warn!(
                    %filename,
                    %username,
                    request_id,
                    "upload consumer panicked: {}",
                    panic_message(panic.as_ref())
                );
                false
            }
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
