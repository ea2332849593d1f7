use axum::{extract::State, http::StatusCode};
use keydrop_core::{Result, SecretResolver, TransferJob, UploadReport, Uploader};
use tracing::{Instrument, error, info, info_span};
use uuid::Uuid;

use crate::AppState;

pub const UPLOAD_SUCCEEDED: &str = "File uploaded successfully.";
pub const UPLOAD_FAILED_PREFIX: &str = "File upload failed: ";

/// Resolve the key, then upload the job with it.
///
/// The uploader is never invoked when the secret cannot be resolved.
pub async fn run_upload(
    resolver: &dyn SecretResolver,
    uploader: &dyn Uploader,
    job: &TransferJob,
) -> Result<UploadReport> {
    info!(
        local_path = %job.local_path.display(),
        remote_path = %job.remote_path,
        "Starting SFTP upload"
    );

    let secret = resolver.resolve().await?;
    info!("Retrieved SSH private key from vault");

    uploader.upload(&secret, job).await
}

// Request method, query and body are ignored.
pub async fn upload(State(state): State<AppState>) -> (StatusCode, String) {
    let request_id = Uuid::new_v4();
    let span = info_span!("upload_request", %request_id);

    async move {
        match run_upload(state.resolver.as_ref(), state.uploader.as_ref(), &state.job).await {
            Ok(_) => (StatusCode::OK, UPLOAD_SUCCEEDED.to_string()),
            Err(e) => {
                error!(kind = e.kind(), error = %e, "SFTP upload failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("{}{}", UPLOAD_FAILED_PREFIX, e),
                )
            }
        }
    }
    .instrument(span)
    .await
}

pub async fn health() -> &'static str {
    "ok"
}
