//! Seams between the request handler and the two sub-operations.

use async_trait::async_trait;
use std::path::PathBuf;

use crate::{Result, SecretValue};

/// Fetches the private key secret from the secret store.
#[async_trait]
pub trait SecretResolver: Send + Sync {
    async fn resolve(&self) -> Result<SecretValue>;
}

/// What to upload and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferJob {
    pub local_path: PathBuf,
    pub remote_path: String,
}

/// Outcome of a completed upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadReport {
    pub bytes: u64,
}

/// Uploads one file using the key carried in a secret.
///
/// Implementations must decode the secret before opening any connection and
/// must close every session and channel they open, on every exit path.
#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(&self, secret: &SecretValue, job: &TransferJob) -> Result<UploadReport>;
}
