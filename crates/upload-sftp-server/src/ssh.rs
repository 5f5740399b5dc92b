//! SSH server for upload-sftp
//!
//! Accepts SSH connections, authenticates them, and serves the `sftp`
//! subsystem over a per-connection [`SessionFilesystem`].

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use russh::keys::ssh_key;
use russh::keys::{HashAlg, PrivateKey};
use russh::server::{self, Auth, Msg, Server as _, Session};
use russh::{Channel, ChannelId, MethodKind, MethodSet};
use tokio::net::TcpListener;
use tracing::Instrument;
use upload_sftp_vfs::{SessionFilesystem, UploadConsumer, UploadNotifier};

use crate::auth::{self, AuthAttempt, AuthDecision, AuthMethod, Authenticator, ConnectionInfo, StaticUsers};
use crate::config::{ServerOptions, ephemeral_host_key};
use crate::constants::{SFTP_SUBSYSTEM, SSH_INACTIVITY_TIMEOUT};
use crate::error::ServerError;
use crate::events::{LifecycleObserver, NoopObserver};
use crate::sftp::SftpSession;

/// SSH server configuration
#[derive(Clone)]
pub struct SshServerConfig {
    pub bind_addr: SocketAddr,
    pub host_keys: Vec<PrivateKey>,
    pub auth_rejection_delay: Duration,
}

impl SshServerConfig {
    /// Create config with an ephemeral key on localhost (for testing)
    pub fn ephemeral(port: u16) -> Result<Self, ServerError> {
        Ok(Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], port)),
            host_keys: vec![ephemeral_host_key()?],
            auth_rejection_delay: Duration::ZERO,
        })
    }

    /// Resolve the bind address and load (or generate) host keys.
    pub fn from_options(options: &ServerOptions) -> Result<Self, ServerError> {
        Ok(Self {
            bind_addr: options.bind_addr()?,
            host_keys: options.load_host_keys()?,
            auth_rejection_delay: options.auth_rejection_delay(),
        })
    }
}

/// Collaborators shared by every connection.
#[derive(Clone)]
struct Hooks {
    authenticator: Arc<dyn Authenticator>,
    notifier: UploadNotifier,
    observer: Arc<dyn LifecycleObserver>,
}

/// SSH server
pub struct SshServer {
    config: SshServerConfig,
    hooks: Hooks,
}

impl SshServer {
    /// A server that accepts nobody and drops uploads until configured.
    pub fn new(config: SshServerConfig) -> Self {
        Self {
            config,
            hooks: Hooks {
                authenticator: Arc::new(StaticUsers::default()),
                notifier: UploadNotifier::disabled(),
                observer: Arc::new(NoopObserver),
            },
        }
    }

    /// Server with the built-in password authenticator over `options.users`.
    pub fn from_options(options: &ServerOptions) -> Result<Self, ServerError> {
        let config = SshServerConfig::from_options(options)?;
        Ok(Self::new(config)
            .with_authenticator(Arc::new(StaticUsers::new(options.users.clone()))))
    }

    /// Replace the authenticator. A custom one takes precedence over `users`.
    pub fn with_authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.hooks.authenticator = authenticator;
        self
    }

    pub fn with_upload_consumer(mut self, consumer: Arc<dyn UploadConsumer>) -> Self {
        self.hooks.notifier = UploadNotifier::new(consumer);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn LifecycleObserver>) -> Self {
        self.hooks.observer = observer;
        self
    }

    /// Bind the listening socket without accepting yet.
    pub async fn bind(self) -> Result<BoundServer, ServerError> {
        let mut config = russh::server::Config {
            auth_rejection_time: self.config.auth_rejection_delay,
            auth_rejection_time_initial: Some(Duration::from_secs(0)),
            inactivity_timeout: Some(SSH_INACTIVITY_TIMEOUT),
            keys: self.config.host_keys.clone(),
            ..Default::default()
        };
        if self.hooks.authenticator.password_only() {
            config.methods = password_methods();
        }

        let listener = TcpListener::bind(self.config.bind_addr).await?;
        log::info!("SFTP server listening on {}", listener.local_addr()?);

        Ok(BoundServer {
            listener,
            config: Arc::new(config),
            hooks: self.hooks,
        })
    }

    /// Run the SSH server
    pub async fn run(self) -> Result<(), ServerError> {
        self.bind().await?.serve().await
    }
}

/// A server whose socket is bound; accepts connections once served.
pub struct BoundServer {
    listener: TcpListener,
    config: Arc<russh::server::Config>,
    hooks: Hooks,
}

impl BoundServer {
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until the listener fails.
    pub async fn serve(self) -> Result<(), ServerError> {
        self.serve_until(std::future::pending()).await
    }

    /// Accept connections until `shutdown` resolves.
    ///
    /// Connections already established keep running on their own tasks.
    pub async fn serve_until(self, shutdown: impl Future<Output = ()>) -> Result<(), ServerError> {
        let mut server = Server { hooks: self.hooks };
        tokio::select! {
            result = server.run_on_socket(self.config, &self.listener) => {
                Ok(result?)
            }
            () = shutdown => {
                log::info!("SFTP server shutting down");
                Ok(())
            }
        }
    }
}

/// Server factory - creates handlers for each connection
struct Server {
    hooks: Hooks,
}

impl server::Server for Server {
    type Handler = ConnectionHandler;

    fn new_client(&mut self, peer_addr: Option<SocketAddr>) -> Self::Handler {
        ConnectionHandler::new(ConnectionInfo { peer_addr }, self.hooks.clone())
    }

    fn handle_session_error(&mut self, error: <Self::Handler as server::Handler>::Error) {
        log::error!("Session error: {:?}", error);
        self.hooks.observer.on_error(&error.to_string());
    }
}

/// Handler for a single SSH connection
struct ConnectionHandler {
    connection: ConnectionInfo,
    hooks: Hooks,
    fs: SessionFilesystem,
    channels: HashMap<ChannelId, Channel<Msg>>,
}

impl ConnectionHandler {
    fn new(connection: ConnectionInfo, hooks: Hooks) -> Self {
        log::info!("Client connected from {}", connection.ip());
        hooks.observer.on_connect(&connection);
        Self {
            fs: SessionFilesystem::new(hooks.notifier.clone()),
            connection,
            hooks,
            channels: HashMap::new(),
        }
    }

    /// Rejection, pointing clients at `password` when nothing else can work.
    fn reject(&self) -> Auth {
        if self.hooks.authenticator.password_only() {
            Auth::Reject {
                proceed_with_methods: Some(password_methods()),
                partial_success: false,
            }
        } else {
            Auth::reject()
        }
    }

    async fn authenticate(
        &mut self,
        user: &str,
        password: Option<&str>,
        method: AuthMethod,
    ) -> Result<Auth, russh::Error> {
        let span = tracing::info_span!(
            "ssh.auth",
            user,
            method = method.name(),
            peer = %self.connection.ip()
        );
        let attempt = AuthAttempt {
            connection: self.connection.clone(),
            username: user.to_string(),
            password: password.map(str::to_string),
            method,
        };

        match auth::decide(self.hooks.authenticator.as_ref(), &attempt)
            .instrument(span)
            .await
        {
            AuthDecision::Accept { payload } => {
                if let Err(e) = self.fs.set_current_user(user).await {
                    log::warn!("Refusing second identity on one connection: {}", e);
                    return Ok(self.reject());
                }
                log::info!("User {} authenticated via {}", user, attempt.method.name());
                self.hooks.observer.on_authenticated(user, payload.as_ref());
                Ok(Auth::Accept)
            }
            AuthDecision::Reject => {
                log::info!("Authentication failed for {} via {}", user, attempt.method.name());
                Ok(self.reject())
            }
        }
    }
}

fn password_methods() -> MethodSet {
    MethodSet::from(&[MethodKind::Password][..])
}

impl server::Handler for ConnectionHandler {
    type Error = russh::Error;

    async fn auth_password(&mut self, user: &str, password: &str) -> Result<Auth, Self::Error> {
        self.authenticate(user, Some(password), AuthMethod::Password)
            .await
    }

    async fn auth_publickey(
        &mut self,
        user: &str,
        public_key: &ssh_key::PublicKey,
    ) -> Result<Auth, Self::Error> {
        let fingerprint = public_key.fingerprint(HashAlg::Sha256).to_string();
        self.authenticate(user, None, AuthMethod::PublicKey { fingerprint })
            .await
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        log::debug!("Channel {} opened", channel.id());
        self.channels.insert(channel.id(), channel);
        Ok(true)
    }

    async fn subsystem_request(
        &mut self,
        channel_id: ChannelId,
        name: &str,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        if name != SFTP_SUBSYSTEM {
            log::debug!("Rejecting subsystem {:?} on channel {}", name, channel_id);
            session.channel_failure(channel_id)?;
            return Ok(());
        }
        let Some(channel) = self.channels.remove(&channel_id) else {
            session.channel_failure(channel_id)?;
            return Ok(());
        };

        session.channel_success(channel_id)?;
        log::info!("SFTP session started on channel {}", channel_id);
        russh_sftp::server::run(channel.into_stream(), SftpSession::new(self.fs.clone())).await;
        Ok(())
    }

    async fn channel_close(
        &mut self,
        channel: ChannelId,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        log::debug!("Channel {} closed", channel);
        self.channels.remove(&channel);
        Ok(())
    }
}

impl Drop for ConnectionHandler {
    fn drop(&mut self) {
        log::info!("Client {} disconnected", self.connection.ip());
        let fs = self.fs.clone();
        let observer = self.hooks.observer.clone();
        let connection = self.connection.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    fs.end_session().await;
                    observer.on_disconnect(&connection);
                });
            }
            Err(_) => observer.on_disconnect(&connection),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use russh::server::Server as _;

    #[derive(Default)]
    struct Events(Mutex<Vec<String>>);

    impl LifecycleObserver for Events {
        fn on_connect(&self, _connection: &ConnectionInfo) {
            self.0.lock().push("connect".into());
        }

        fn on_disconnect(&self, _connection: &ConnectionInfo) {
            self.0.lock().push("disconnect".into());
        }

        fn on_error(&self, error: &str) {
            self.0.lock().push(format!("error:{error}"));
        }
    }

    struct AllowAll;

    #[async_trait::async_trait]
    impl Authenticator for AllowAll {
        async fn authenticate(&self, _: &AuthAttempt) -> Result<AuthDecision, crate::AuthError> {
            Ok(AuthDecision::accept())
        }
    }

    fn hooks(authenticator: Arc<dyn Authenticator>, observer: Arc<Events>) -> Hooks {
        Hooks {
            authenticator,
            notifier: UploadNotifier::disabled(),
            observer,
        }
    }

    #[test]
    fn test_static_users_rejection_points_at_password() {
        let handler = ConnectionHandler::new(
            ConnectionInfo { peer_addr: None },
            hooks(Arc::new(StaticUsers::default()), Arc::default()),
        );
        assert!(matches!(
            handler.reject(),
            Auth::Reject {
                proceed_with_methods: Some(_),
                partial_success: false
            }
        ));
    }

    #[test]
    fn test_custom_authenticator_rejection_names_no_methods() {
        let handler = ConnectionHandler::new(
            ConnectionInfo { peer_addr: None },
            hooks(Arc::new(AllowAll), Arc::default()),
        );
        assert!(matches!(
            handler.reject(),
            Auth::Reject {
                proceed_with_methods: None,
                ..
            }
        ));
    }

    #[test]
    fn test_session_error_reaches_observer() {
        let events = Arc::new(Events::default());
        let mut server = Server {
            hooks: hooks(Arc::new(StaticUsers::default()), events.clone()),
        };

        let handler = server.new_client(None);
        server.handle_session_error(russh::Error::Disconnect);
        // No runtime here, so disconnect fires inline on drop.
        drop(handler);

        let seen = events.0.lock().clone();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0], "connect");
        assert!(seen[1].starts_with("error:"));
        assert_eq!(seen[2], "disconnect");
    }
}
