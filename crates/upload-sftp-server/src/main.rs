//! upload-sftp-server binary
//!
//! Upload-only SFTP server. Completed uploads are logged and dropped; embed
//! the library to do something useful with them.
//!
//! ## Usage
//!
//! ```bash
//! upload-sftp-server --user alice:wonderland
//! upload-sftp-server --config ~/.config/upload-sftp.toml --port 2022 --debug
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use upload_sftp_server::constants::SERVICE_NAME;
use upload_sftp_server::{ServerError, ServerOptions, SshServer, UploadRecord, UserCredential};

#[derive(Parser, Debug)]
#[command(name = "upload-sftp-server")]
#[command(about = "Upload-only SFTP server that keeps files in memory")]
struct Args {
    /// TOML options file; flags below override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// SSH port
    #[arg(long)]
    port: Option<u16>,

    /// Address to bind
    #[arg(long)]
    host: Option<String>,

    /// OpenSSH private host key (repeatable)
    #[arg(long = "host-key")]
    host_keys: Vec<PathBuf>,

    /// Accept NAME:PASSWORD (repeatable)
    #[arg(long = "user", value_parser = parse_user)]
    users: Vec<UserCredential>,

    /// Log at debug level
    #[arg(long)]
    debug: bool,
}

fn parse_user(s: &str) -> Result<UserCredential, String> {
    s.parse().map_err(|e: ServerError| e.to_string())
}

impl Args {
    fn into_options(self) -> anyhow::Result<ServerOptions> {
        let mut options = match &self.config {
            Some(path) => ServerOptions::from_file(path)?,
            None => ServerOptions::default(),
        };
        if let Some(port) = self.port {
            options.port = port;
        }
        if let Some(host) = self.host {
            options.host = host;
        }
        if !self.host_keys.is_empty() {
            options.host_keys = self.host_keys;
        }
        options.users.extend(self.users);
        options.debug |= self.debug;
        Ok(options)
    }
}

fn log_upload(upload: UploadRecord, request_id: u32) -> anyhow::Result<()> {
    tracing::info!(
        filename = %upload.filename,
        username = %upload.username,
        size = upload.size,
        request_id,
        "received upload"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let options = match Args::parse().into_options() {
        Ok(options) => options,
        Err(e) => {
            eprintln!("{e:#}");
            return ExitCode::FAILURE;
        }
    };

    let _telemetry = upload_sftp_telemetry::init(SERVICE_NAME, options.log_directive());

    if let Err(e) = run_server(options).await {
        tracing::error!("Server error: {e:#}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

async fn run_server(options: ServerOptions) -> anyhow::Result<()> {
    if options.users.is_empty() {
        tracing::warn!("no users configured, every login will be rejected");
    }

    let server = SshServer::from_options(&options)?
        .with_upload_consumer(Arc::new(log_upload))
        .bind()
        .await?;
    tracing::info!("Starting upload-sftp server on {}", server.local_addr()?);

    server
        .serve_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("failed to listen for Ctrl-C: {e}");
                std::future::pending::<()>().await;
            }
        })
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_defaults() {
        let args = Args::parse_from([
            "upload-sftp-server",
            "--port",
            "2022",
            "--user",
            "alice:wonderland",
            "--user",
            "bob:builder",
            "--debug",
        ]);
        let options = args.into_options().unwrap();
        assert_eq!(options.port, 2022);
        assert_eq!(options.host, "0.0.0.0");
        assert_eq!(options.users.len(), 2);
        assert_eq!(options.log_directive(), "debug");
    }

    #[test]
    fn test_bad_user_flag_is_rejected() {
        let result = Args::try_parse_from(["upload-sftp-server", "--user", "nopassword"]);
        assert!(result.is_err());
    }
}
