//! Server options.
//!
//! Loaded from a TOML file, then overridden from the command line:
//!
//! ```toml
//! port = 2222
//! host = "0.0.0.0"
//! host_keys = ["~/.ssh/upload_host_ed25519"]
//! debug = false
//!
//! [[users]]
//! username = "alice"
//! password = "wonderland"
//! ```

use std::fmt;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use russh::keys::PrivateKey;
use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_BIND_ADDRESS, DEFAULT_SSH_PORT, SSH_AUTH_REJECTION_DELAY};
use crate::error::ServerError;

/// A username/password pair accepted by the built-in authenticator.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCredential {
    pub username: String,
    pub password: String,
}

impl UserCredential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for UserCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserCredential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Parses `NAME:PASSWORD`. The password may itself contain `:`.
impl FromStr for UserCredential {
    type Err = ServerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((name, password)) if !name.is_empty() => Ok(Self::new(name, password)),
            _ => Err(ServerError::InvalidUser(s.to_string())),
        }
    }
}

/// Everything needed to start a server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerOptions {
    pub port: u16,
    pub host: String,
    /// OpenSSH private key files. Empty means one ephemeral Ed25519 key.
    pub host_keys: Vec<PathBuf>,
    /// Log at debug level unless `RUST_LOG` says otherwise.
    pub debug: bool,
    /// Accounts for the built-in password authenticator.
    pub users: Vec<UserCredential>,
    pub auth_rejection_delay_ms: u64,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            port: DEFAULT_SSH_PORT,
            host: DEFAULT_BIND_ADDRESS.to_string(),
            host_keys: Vec::new(),
            debug: false,
            users: Vec::new(),
            auth_rejection_delay_ms: SSH_AUTH_REJECTION_DELAY.as_millis() as u64,
        }
    }
}

impl ServerOptions {
    /// Read options from a TOML file. `~` in the path is expanded.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ServerError> {
        let path: PathBuf = shellexpand::tilde(&path.as_ref().to_string_lossy())
            .as_ref()
            .into();
        let text = std::fs::read_to_string(&path).map_err(|source| ServerError::ConfigRead {
            path: path.clone(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ServerError> {
        Ok(toml::from_str(text)?)
    }

    /// Resolve `host:port`. Hostnames are looked up once, first address wins.
    pub fn bind_addr(&self) -> Result<SocketAddr, ServerError> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| ServerError::InvalidAddress(format!("{}:{}: {e}", self.host, self.port)))?
            .next()
            .ok_or_else(|| ServerError::InvalidAddress(format!("{}:{}", self.host, self.port)))
    }

    pub fn auth_rejection_delay(&self) -> Duration {
        Duration::from_millis(self.auth_rejection_delay_ms)
    }

    /// Default tracing directive when `RUST_LOG` is unset.
    pub fn log_directive(&self) -> &'static str {
        if self.debug { "debug" } else { "info" }
    }

    /// Load every configured host key, or generate one if none are set.
    pub fn load_host_keys(&self) -> Result<Vec<PrivateKey>, ServerError> {
        if self.host_keys.is_empty() {
            tracing::warn!("no host keys configured, generating an ephemeral Ed25519 key");
            return Ok(vec![ephemeral_host_key()?]);
        }

        self.host_keys
            .iter()
            .map(|path| {
                let expanded: PathBuf = shellexpand::tilde(&path.to_string_lossy()).as_ref().into();
                russh::keys::load_secret_key(&expanded, None).map_err(|source| {
                    ServerError::HostKey {
                        path: expanded.clone(),
                        source,
                    }
                })
            })
            .collect()
    }
}

/// Fresh in-memory Ed25519 key. Clients will see a new fingerprint each run.
pub fn ephemeral_host_key() -> Result<PrivateKey, ServerError> {
    PrivateKey::random(&mut rand::thread_rng(), russh::keys::Algorithm::Ed25519)
        .map_err(|e| ServerError::KeyGeneration(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let options = ServerOptions::default();
        assert_eq!(options.port, 2222);
        assert_eq!(options.host, "0.0.0.0");
        assert!(!options.debug);
        assert!(options.users.is_empty());
        assert_eq!(options.auth_rejection_delay(), Duration::from_secs(1));
        assert_eq!(options.log_directive(), "info");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let options = ServerOptions::from_toml(
            r#"
            port = 2022
            debug = true

            [[users]]
            username = "alice"
            password = "wonderland"
            "#,
        )
        .unwrap();

        assert_eq!(options.port, 2022);
        assert_eq!(options.host, "0.0.0.0");
        assert_eq!(options.log_directive(), "debug");
        assert_eq!(options.users, vec![UserCredential::new("alice", "wonderland")]);
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let result = ServerOptions::from_toml("listen_port = 22");
        assert!(matches!(result, Err(ServerError::ConfigParse(_))));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "host = \"127.0.0.1\"\nport = 0").unwrap();

        let options = ServerOptions::from_file(file.path()).unwrap();
        assert_eq!(options.bind_addr().unwrap(), "127.0.0.1:0".parse().unwrap());
    }

    #[test]
    fn test_missing_file() {
        let result = ServerOptions::from_file("/nonexistent/upload-sftp.toml");
        assert!(matches!(result, Err(ServerError::ConfigRead { .. })));
    }

    #[test]
    fn test_user_credential_parsing() {
        let user: UserCredential = "bob:s3:cret".parse().unwrap();
        assert_eq!(user, UserCredential::new("bob", "s3:cret"));

        assert!("no-colon".parse::<UserCredential>().is_err());
        assert!(":password".parse::<UserCredential>().is_err());
    }

    #[test]
    fn test_password_is_redacted() {
        let debug = format!("{:?}", UserCredential::new("bob", "hunter2"));
        assert!(debug.contains("bob"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_ephemeral_key_when_none_configured() {
        let keys = ServerOptions::default().load_host_keys().unwrap();
        assert_eq!(keys.len(), 1);
    }

    #[test]
    fn test_missing_host_key_file() {
        let options = ServerOptions {
            host_keys: vec![PathBuf::from("/nonexistent/host_key")],
            ..Default::default()
        };
        assert!(matches!(
            options.load_host_keys(),
            Err(ServerError::HostKey { .. })
        ));
    }
}
