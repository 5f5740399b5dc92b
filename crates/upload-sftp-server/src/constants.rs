//! Server configuration constants.
//!
//! Centralizes hardcoded values for easier configuration and documentation.

use std::time::Duration;

/// Default SSH port.
pub const DEFAULT_SSH_PORT: u16 = 2222;

/// Default bind address (all interfaces).
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0";

/// SSH authentication rejection delay (prevents timing attacks).
pub const SSH_AUTH_REJECTION_DELAY: Duration = Duration::from_secs(1);

/// Idle connections are dropped after this long.
pub const SSH_INACTIVITY_TIMEOUT: Duration = Duration::from_secs(600);

/// Subsystem name clients request for SFTP.
pub const SFTP_SUBSYSTEM: &str = "sftp";

/// Service name reported to tracing/OTel.
pub const SERVICE_NAME: &str = "upload-sftp-server";
