//! Upload-only SFTP server library
//!
//! SSH server whose SFTP subsystem accepts uploads into memory and hands
//! each finished file to an [`UploadConsumer`]. Nothing is ever written to
//! disk and nothing can be read back.
//!
//! ```no_run
//! use std::sync::Arc;
//! use upload_sftp_server::{ServerOptions, SshServer, UploadRecord};
//!
//! # async fn run() -> Result<(), upload_sftp_server::ServerError> {
//! let options = ServerOptions::from_file("~/.config/upload-sftp.toml")?;
//! let consumer = |upload: UploadRecord, _request_id: u32| -> anyhow::Result<()> {
//!     println!("{} uploaded {} ({} bytes)", upload.username, upload.filename, upload.size);
//!     Ok(())
//! };
//! SshServer::from_options(&options)?
//!     .with_upload_consumer(Arc::new(consumer))
//!     .run()
//!     .await
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod sftp;
pub mod ssh;

pub use auth::{AuthAttempt, AuthDecision, AuthMethod, Authenticator, ConnectionInfo, StaticUsers};
pub use config::{ServerOptions, UserCredential};
pub use error::{AuthError, ServerError};
pub use events::{LifecycleObserver, NoopObserver};
pub use sftp::SftpSession;
pub use ssh::{BoundServer, SshServer, SshServerConfig};
pub use upload_sftp_vfs::{UploadConsumer, UploadRecord};
