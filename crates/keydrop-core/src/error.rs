use thiserror::Error;

/// Errors surfaced by the upload pipeline.
///
/// Messages are rendered into HTTP response bodies, so no variant may carry
/// secret values or key material.
#[derive(Error, Debug)]
pub enum KeydropError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Secret not found: {0}")]
    SecretNotFound(String),

    #[error("Invalid credential format: {0}")]
    CredentialFormat(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Transfer error: {0}")]
    Transfer(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl KeydropError {
    /// Short, stable name for structured log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            KeydropError::Authentication(_) => "authentication",
            KeydropError::SecretNotFound(_) => "secret_not_found",
            KeydropError::CredentialFormat(_) => "credential_format",
            KeydropError::Connection(_) => "connection",
            KeydropError::Transfer(_) => "transfer",
            KeydropError::InvalidConfig(_) => "invalid_config",
            KeydropError::Http(_) => "http",
            KeydropError::Io(_) => "io",
        }
    }
}

pub type Result<T> = std::result::Result<T, KeydropError>;
