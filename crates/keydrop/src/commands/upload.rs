use anyhow::{Result, anyhow};
use keydrop_core::Config;
use keydrop_http::{UPLOAD_FAILED_PREFIX, UPLOAD_SUCCEEDED, run_upload};
use tracing::error;

/// One upload through the same pipeline the HTTP route uses.
pub async fn run(config: Config) -> Result<()> {
    let state = super::build_state(&config)?;

    match run_upload(state.resolver.as_ref(), state.uploader.as_ref(), &state.job).await {
        Ok(report) => {
            println!("{} ({} bytes)", UPLOAD_SUCCEEDED, report.bytes);
            Ok(())
        }
        Err(e) => {
            error!(kind = e.kind(), error = %e, "SFTP upload failed");
            Err(anyhow!("{}{}", UPLOAD_FAILED_PREFIX, e))
        }
    }
}
