use anyhow::{Context, Result, anyhow};
use keydrop_core::{LogFormat, LoggingConfig};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

/// Install the global subscriber. `RUST_LOG` takes precedence over the
/// configured level. Keep the returned guard alive to flush file output.
pub fn init(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)
            .with_context(|| format!("Invalid log level: {}", config.level))?,
    };

    let (writer, guard) = match &config.file {
        Some(log_file) => {
            let dir = log_file
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = log_file
                .file_name()
                .with_context(|| format!("Log file has no file name: {}", log_file.display()))?;

            let file_appender = tracing_appender::rolling::daily(dir, name);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            (BoxMakeWriter::new(non_blocking), Some(guard))
        }
        None => (BoxMakeWriter::new(std::io::stderr), None),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer);

    let installed = match config.format {
        LogFormat::Json => builder
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .try_init(),
        LogFormat::Text => builder.try_init(),
    };
    installed.map_err(|e| anyhow!("Failed to initialize logging: {}", e))?;

    Ok(guard)
}
