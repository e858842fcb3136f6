//! Sshgate - SOCKS5 and HTTP proxy over a single SSH session
//!
//! This is the main entry point for the Sshgate application.

use anyhow::Result;
use clap::Parser;
use sshgate::config::{load_config, Config, SshAuthKind};
use sshgate::session::{resolve_credentials, SshConnector};
use sshgate::{Gateway, GatewayError};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Sshgate - local SOCKS5 and HTTP proxy tunneled through SSH
#[derive(Parser, Debug)]
#[command(name = "sshgate")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// SSH server host
    #[arg(long)]
    host: Option<String>,

    /// SSH server port
    #[arg(long)]
    port: Option<u16>,

    /// SSH user
    #[arg(long)]
    user: Option<String>,

    /// Private key file
    #[arg(long)]
    key: Option<PathBuf>,

    /// Authenticate with a password instead of a key
    #[arg(short, long)]
    password: bool,

    /// Local bind address for both listeners
    #[arg(long)]
    bind: Option<String>,

    /// Local SOCKS5 port
    #[arg(long)]
    lport: Option<u16>,

    /// Local HTTP proxy port
    #[arg(long)]
    http_port: Option<u16>,

    /// Disable the HTTP proxy listener
    #[arg(long)]
    no_http: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Enable JSON logging format
    #[arg(long)]
    json_log: bool,
}

impl Args {
    /// Apply command-line overrides on top of the file configuration
    fn merge_into(&self, config: &mut Config) {
        if let Some(host) = &self.host {
            config.ssh.host = host.clone();
        }
        if let Some(port) = self.port {
            config.ssh.port = port;
        }
        if let Some(user) = &self.user {
            config.ssh.user = user.clone();
        }
        if let Some(key) = &self.key {
            config.ssh.key_file = Some(key.clone());
            config.ssh.auth = SshAuthKind::Key;
        }
        if self.password {
            config.ssh.auth = SshAuthKind::Password;
        }
        if let Some(bind) = &self.bind {
            config.socks.bind = bind.clone();
            config.http.bind = bind.clone();
        }
        if let Some(port) = self.lport {
            config.socks.port = port;
        }
        if let Some(port) = self.http_port {
            config.http.port = port;
        }
        if self.no_http {
            config.http.enabled = false;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logging
    setup_logging(&args.log_level, args.json_log)?;

    // Load configuration
    let mut config = match &args.config {
        Some(path) => {
            let config = load_config(path)?;
            info!("Configuration loaded from: {:?}", path);
            config
        }
        None => Config::default(),
    };
    args.merge_into(&mut config);
    config.validate().map_err(GatewayError::Config)?;

    info!("Sshgate v{}", sshgate::VERSION);
    info!("SSH server: {}@{}", config.ssh.user, config.ssh.endpoint());

    let auth = resolve_credentials(&config.ssh)?;
    let connector = Arc::new(SshConnector::new(&config.ssh, &config.session, auth));

    let gateway = Gateway::start(&config, connector).await?;

    // Setup shutdown signal
    let (shutdown_tx, _) = broadcast::channel(1);

    // Handle Ctrl+C and termination signals (cross-platform)
    let shutdown_tx_clone = shutdown_tx.clone();
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm = signal(SignalKind::terminate())
                .expect("Failed to setup SIGTERM handler");

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Received Ctrl+C, shutting down...");
                }
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down...");
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
            info!("Received Ctrl+C, shutting down...");
        }

        let _ = shutdown_tx_clone.send(true);
    });

    gateway.run(shutdown_tx).await
}

/// Setup logging based on command-line flags
fn setup_logging(level: &str, json: bool) -> Result<()> {
    let level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    if json {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    Ok(())
}
