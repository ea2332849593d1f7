pub mod check;
pub mod serve;
pub mod upload;

use anyhow::{Context, Result};
use keydrop_core::{Config, TransferJob};
use keydrop_http::AppState;
use keydrop_sftp::{SshConnector, TransferExecutor};
use keydrop_vault::VaultSecretResolver;
use std::sync::Arc;

/// Wire the vault resolver and SFTP executor for the configured job.
pub fn build_state(config: &Config) -> Result<AppState> {
    let resolver = VaultSecretResolver::from_config(&config.vault)
        .context("Failed to initialize vault client")?;
    let uploader = TransferExecutor::new(SshConnector::new(), config.sftp.clone());
    let job = TransferJob {
        local_path: config.transfer.local_path.clone(),
        remote_path: config.transfer.remote_path.clone(),
    };

    Ok(AppState::new(Arc::new(resolver), Arc::new(uploader), job))
}
