//! Authentication decisions.
//!
//! The SSH layer turns every password or public-key attempt into an
//! [`AuthAttempt`] and asks an [`Authenticator`]. Only an
//! [`AuthDecision::Accept`] binds the username to the connection; errors
//! count as rejection.

use std::net::SocketAddr;

use async_trait::async_trait;

use crate::config::UserCredential;
use crate::error::AuthError;

/// Who is on the other end of a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub peer_addr: Option<SocketAddr>,
}

impl ConnectionInfo {
    /// Peer IP as a string, or `"unknown"`.
    pub fn ip(&self) -> String {
        self.peer_addr
            .map(|addr| addr.ip().to_string())
            .unwrap_or_else(|| "unknown".into())
    }
}

/// How the client is trying to authenticate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMethod {
    Password,
    PublicKey { fingerprint: String },
}

impl AuthMethod {
    pub fn name(&self) -> &'static str {
        match self {
            AuthMethod::Password => "password",
            AuthMethod::PublicKey { .. } => "publickey",
        }
    }
}

/// One authentication attempt.
#[derive(Clone)]
pub struct AuthAttempt {
    pub connection: ConnectionInfo,
    pub username: String,
    /// Set only for [`AuthMethod::Password`].
    pub password: Option<String>,
    pub method: AuthMethod,
}

impl std::fmt::Debug for AuthAttempt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthAttempt")
            .field("connection", &self.connection)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("method", &self.method)
            .finish()
    }
}

/// Outcome of an [`Authenticator`].
#[derive(Debug, Clone, PartialEq)]
pub enum AuthDecision {
    /// Accept; `payload` is passed through to the lifecycle observer.
    Accept { payload: Option<serde_json::Value> },
    Reject,
}

impl AuthDecision {
    pub fn accept() -> Self {
        Self::Accept { payload: None }
    }
}

impl From<bool> for AuthDecision {
    fn from(ok: bool) -> Self {
        if ok { Self::accept() } else { Self::Reject }
    }
}

/// Decides whether an attempt may proceed. Called once per attempt.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, attempt: &AuthAttempt) -> Result<AuthDecision, AuthError>;

    /// Only `password` can ever succeed; rejected clients are told so.
    fn password_only(&self) -> bool {
        false
    }
}

/// Built-in authenticator: password only, checked against a fixed list.
#[derive(Debug, Clone, Default)]
pub struct StaticUsers {
    users: Vec<UserCredential>,
}

impl StaticUsers {
    pub fn new(users: Vec<UserCredential>) -> Self {
        Self { users }
    }
}

#[async_trait]
impl Authenticator for StaticUsers {
    async fn authenticate(&self, attempt: &AuthAttempt) -> Result<AuthDecision, AuthError> {
        if attempt.method != AuthMethod::Password {
            return Ok(AuthDecision::Reject);
        }
        let Some(password) = attempt.password.as_deref() else {
            return Ok(AuthDecision::Reject);
        };
        let known = self
            .users
            .iter()
            .any(|user| user.username == attempt.username && user.password == password);
        Ok(known.into())
    }

    fn password_only(&self) -> bool {
        true
    }
}

/// Ask `authenticator`, folding errors into rejection.
pub(crate) async fn decide(authenticator: &dyn Authenticator, attempt: &AuthAttempt) -> AuthDecision {
    match authenticator.authenticate(attempt).await {
        Ok(decision) => decision,
        Err(e) => {
            tracing::warn!(
                username = %attempt.username,
                method = attempt.method.name(),
                "authenticator error, rejecting: {e}"
            );
            AuthDecision::Reject
        }
    }
}
