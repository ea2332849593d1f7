use anyhow::{Context, Result};
use keydrop_core::Config;
use std::path::Path;
use tokio::fs;

/// Load the config file, apply `KEYDROP_*` overrides and validate.
///
/// A missing file is not an error: defaults plus environment overrides are
/// used instead, so the service can be configured from the environment alone.
pub async fn load_config(path: &Path) -> Result<Config> {
    let mut config = match fs::read_to_string(path).await {
        Ok(contents) => Config::from_toml(&contents)
            .with_context(|| format!("Failed to parse configuration file {}", path.display()))?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            eprintln!(
                "Configuration file {} not found, using defaults and environment",
                path.display()
            );
            Config::default()
        }
        Err(e) => {
            return Err(e)
                .with_context(|| format!("Failed to read configuration file {}", path.display()));
        }
    };

    config
        .apply_env_overrides()
        .context("Invalid environment override")?;
    config.validate().context("Invalid configuration")?;

    Ok(config)
}

pub async fn save_config(path: &Path, config: &Config) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let contents = config.to_toml().context("Failed to serialize configuration")?;

    fs::write(path, contents)
        .await
        .context("Failed to write configuration file")?;

    Ok(())
}
