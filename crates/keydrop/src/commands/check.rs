use anyhow::{Context, Result};
use keydrop_core::Config;

/// Print the effective configuration. It holds no secrets: the key lives
/// only in the vault.
pub fn run(config: &Config) -> Result<()> {
    let rendered = config.to_toml().context("Failed to render configuration")?;
    println!("# Configuration is valid\n{}", rendered);
    Ok(())
}
