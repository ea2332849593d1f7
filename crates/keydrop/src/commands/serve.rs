use anyhow::{Context, Result};
use keydrop_core::{Config, HostKeyPolicy};
use keydrop_http::HttpServer;
use std::path::Path;
use tracing::{info, warn};

use crate::config;

pub async fn init_config(config_path: &Path) -> Result<()> {
    let default_config = Config::default();
    config::save_config(config_path, &default_config).await?;
    println!("Configuration file created at: {}", config_path.display());
    println!("\nSet the vault, SFTP target and transfer paths before starting the server.");
    Ok(())
}

pub async fn run(config: Config) -> Result<()> {
    info!("Starting keydrop upload service...");
    info!(
        vault = %config.vault.url,
        secret = %config.vault.secret_name,
        sftp_host = %config.sftp.host,
        sftp_port = config.sftp.port,
        sftp_username = %config.sftp.username,
        "Configuration loaded"
    );
    if config.sftp.host_key == HostKeyPolicy::InsecureAcceptAny {
        warn!("SFTP host key verification is disabled");
    }

    let state = super::build_state(&config)?;
    let server = HttpServer::new(config.http.clone(), state);

    info!("Keydrop is running. Press Ctrl+C to stop.");

    tokio::select! {
        result = server.run() => result.context("HTTP server error")?,
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for shutdown signal")?;
            info!("Shutting down...");
        }
    }

    Ok(())
}
