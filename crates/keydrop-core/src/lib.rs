pub mod config;
pub mod error;
pub mod secret;
pub mod traits;

pub use config::{
    Config, CredentialSource, HostKeyPolicy, HttpConfig, LogFormat, LoggingConfig, SftpConfig,
    TransferConfig, VaultConfig,
};
pub use error::{KeydropError, Result};
pub use secret::{PrivateKeyBytes, SecretValue};
pub use traits::{SecretResolver, TransferJob, UploadReport, Uploader};
