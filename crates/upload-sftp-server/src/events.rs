//! Lifecycle observer callbacks.
//!
//! Informational only: invoked as side effects of connection state changes,
//! never retried, and unable to influence the connection.

use crate::auth::ConnectionInfo;

/// Hooks fired by the SSH layer. All methods default to no-ops.
pub trait LifecycleObserver: Send + Sync {
    /// A TCP connection was accepted.
    fn on_connect(&self, _connection: &ConnectionInfo) {}

    /// A user authenticated and was bound to the connection.
    fn on_authenticated(&self, _username: &str, _payload: Option<&serde_json::Value>) {}

    /// The connection is gone; its unfinished buffers have been discarded.
    fn on_disconnect(&self, _connection: &ConnectionInfo) {}

    /// The SSH session failed.
    fn on_error(&self, _error: &str) {}
}

/// Observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl LifecycleObserver for NoopObserver {}
