//! End-to-end: a russh client uploads over SFTP to a server on an ephemeral port.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use russh::client;
use russh::keys::PublicKey;
use russh::Disconnect;
use russh_sftp::client::RawSftpSession;
use russh_sftp::protocol::{FileAttributes, OpenFlags, StatusCode};
use tokio::sync::{mpsc, oneshot};
use upload_sftp_server::{
    ConnectionInfo, LifecycleObserver, SshServer, SshServerConfig, StaticUsers, UploadRecord,
    UserCredential,
};

struct AcceptAnyKey;

impl client::Handler for AcceptAnyKey {
    type Error = russh::Error;

    async fn check_server_key(&mut self, _key: &PublicKey) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

#[derive(Default)]
struct RecordingObserver {
    events: Mutex<Vec<String>>,
}

impl RecordingObserver {
    fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    async fn wait_for(&self, event: &str) {
        for _ in 0..100 {
            if self.events().iter().any(|e| e == event) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("observer never saw {event:?}, got {:?}", self.events());
    }
}

impl LifecycleObserver for RecordingObserver {
    fn on_connect(&self, _connection: &ConnectionInfo) {
        self.events.lock().push("connect".into());
    }

    fn on_authenticated(&self, username: &str, _payload: Option<&serde_json::Value>) {
        self.events.lock().push(format!("auth:{username}"));
    }

    fn on_disconnect(&self, _connection: &ConnectionInfo) {
        self.events.lock().push("disconnect".into());
    }
}

struct TestServer {
    addr: SocketAddr,
    uploads: mpsc::UnboundedReceiver<UploadRecord>,
    observer: Arc<RecordingObserver>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

async fn start_server() -> TestServer {
    let (upload_tx, uploads) = mpsc::unbounded_channel();
    let consumer = move |upload: UploadRecord, _request_id: u32| -> anyhow::Result<()> {
        upload_tx
            .send(upload)
            .map_err(|e| anyhow::anyhow!("receiver gone: {e}"))
    };
    let observer = Arc::new(RecordingObserver::default());

    let server = SshServer::new(SshServerConfig::ephemeral(0).unwrap())
        .with_authenticator(Arc::new(StaticUsers::new(vec![UserCredential::new(
            "alice",
            "wonderland",
        )])))
        .with_upload_consumer(Arc::new(consumer))
        .with_observer(observer.clone())
        .bind()
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();

    let (shutdown, stop) = oneshot::channel::<()>();
    tokio::spawn(server.serve_until(async {
        let _ = stop.await;
    }));

    TestServer {
        addr,
        uploads,
        observer,
        shutdown: Some(shutdown),
    }
}

async fn connect(addr: SocketAddr) -> client::Handle<AcceptAnyKey> {
    let config = Arc::new(client::Config::default());
    client::connect(config, addr, AcceptAnyKey).await.unwrap()
}

async fn open_sftp(session: &client::Handle<AcceptAnyKey>) -> RawSftpSession {
    let channel = session.channel_open_session().await.unwrap();
    channel.request_subsystem(true, "sftp").await.unwrap();
    let sftp = RawSftpSession::new(channel.into_stream());
    sftp.init().await.unwrap();
    sftp
}

fn write_flags() -> OpenFlags {
    OpenFlags::CREATE | OpenFlags::TRUNCATE | OpenFlags::WRITE
}

#[tokio::test]
async fn test_upload_reaches_consumer_once() {
    let mut server = start_server().await;
    let mut session = connect(server.addr).await;
    let auth = session.authenticate_password("alice", "wonderland").await.unwrap();
    assert!(auth.success());

    let sftp = open_sftp(&session).await;
    let handle = sftp
        .open("report.csv", write_flags(), FileAttributes::default())
        .await
        .unwrap()
        .handle;
    assert_eq!(handle, "report.csv");

    sftp.write(handle.as_str(), 0, b"a,b\n".to_vec()).await.unwrap();
    sftp.write(handle.as_str(), 4, b"c,d\n".to_vec()).await.unwrap();
    let status = sftp.close(handle.as_str()).await.unwrap();
    assert_eq!(status.status_code, StatusCode::Ok);

    // The consumer runs before CLOSE is answered.
    let upload = server.uploads.try_recv().unwrap();
    assert_eq!(upload.filename, "report.csv");
    assert_eq!(upload.username, "alice");
    assert_eq!(upload.payload, b"a,b\nc,d\n");
    assert_eq!(upload.size, 8);

    // Closing again completes nothing new.
    let _ = sftp.close(handle.as_str()).await;
    assert!(server.uploads.try_recv().is_err());

    let events = server.observer.events();
    assert_eq!(events[..2], ["connect".to_string(), "auth:alice".to_string()]);
}

#[tokio::test]
async fn test_wrong_password_is_rejected() {
    let server = start_server().await;
    let mut session = connect(server.addr).await;

    let auth = session.authenticate_password("alice", "queen").await.unwrap();
    assert!(!auth.success());
    let auth = session.authenticate_password("mallory", "wonderland").await.unwrap();
    assert!(!auth.success());

    assert!(!server.observer.events().iter().any(|e| e.starts_with("auth:")));
}

#[tokio::test]
async fn test_read_only_verbs_reveal_nothing() {
    let server = start_server().await;
    let mut session = connect(server.addr).await;
    assert!(session.authenticate_password("alice", "wonderland").await.unwrap().success());
    let sftp = open_sftp(&session).await;

    let name = sftp.realpath(".").await.unwrap();
    assert_eq!(name.files[0].filename, "/");

    let attrs = sftp.stat("/etc/passwd").await.unwrap().attrs;
    assert!(attrs.is_dir());
    assert_eq!(attrs.size, Some(0));

    let dir = sftp.opendir("/").await.unwrap().handle;
    assert!(sftp.readdir(dir.as_str()).await.is_err());
    assert!(sftp.read("report.csv", 0, 1024).await.is_err());

    let mkdir = sftp.mkdir("uploads", FileAttributes::default()).await;
    assert!(mkdir.map_or(true, |status| status.status_code != StatusCode::Ok));
}

#[tokio::test]
async fn test_disconnect_discards_unfinished_upload() {
    let mut server = start_server().await;
    let mut session = connect(server.addr).await;
    assert!(session.authenticate_password("alice", "wonderland").await.unwrap().success());

    let sftp = open_sftp(&session).await;
    let handle = sftp
        .open("partial.bin", write_flags(), FileAttributes::default())
        .await
        .unwrap()
        .handle;
    sftp.write(handle.as_str(), 0, vec![0u8; 4096]).await.unwrap();

    session
        .disconnect(Disconnect::ByApplication, "bye", "en")
        .await
        .unwrap();
    server.observer.wait_for("disconnect").await;

    assert!(server.uploads.try_recv().is_err());
}
