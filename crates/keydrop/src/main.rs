mod commands;
mod config;
mod logging;

use clap::{Parser, Subcommand};
use keydrop_core::LogFormat;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "keydrop")]
#[command(about = "Upload a file over SFTP with a private key fetched from Azure Key Vault", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/keydrop/config.toml")]
    config: PathBuf,

    /// Override the configured log format
    #[arg(long, global = true, value_enum)]
    log_format: Option<LogFormat>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the upload endpoint over HTTP
    Serve {
        /// Generate default configuration file
        #[arg(long)]
        init_config: bool,
    },

    /// Run one upload and exit
    Upload,

    /// Validate and print the effective configuration
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Serve { init_config: true } = cli.command {
        return commands::serve::init_config(&cli.config).await;
    }

    let mut config = config::load_config(&cli.config).await?;
    if let Some(format) = cli.log_format {
        config.logging.format = format;
    }
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }

    let _log_guard = logging::init(&config.logging)?;

    match cli.command {
        Commands::Serve { .. } => commands::serve::run(config).await,
        Commands::Upload => commands::upload::run(config).await,
        Commands::CheckConfig => commands::check::run(&config),
    }
}
