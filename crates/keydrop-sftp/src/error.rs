//! Error types for SSH/SFTP client operations
//!
//! Messages may reach an HTTP response body, so they describe the failing
//! step and target but never include key material.

use keydrop_core::KeydropError;
use thiserror::Error;

/// Result type alias for SFTP operations
pub type Result<T> = std::result::Result<T, Error>;

/// SFTP client error types
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// SSH protocol error (handshake, encryption, channel requests)
    #[error("SSH error: {0}")]
    Ssh(String),

    /// SFTP subsystem error
    #[error("SFTP protocol error: {0}")]
    Protocol(String),

    /// Server rejected the public key
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Server host key did not pass verification
    #[error("Host key rejected: {0}")]
    HostKeyRejected(String),

    /// Private key could not be parsed
    #[error("Invalid private key: {0}")]
    CredentialFormat(String),

    /// Network connection failures
    #[error("Connection error: {0}")]
    Connection(String),

    /// Local read or remote write failed during the upload
    #[error("Transfer failed: {0}")]
    Transfer(String),

    /// Operation exceeded its time limit
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// SSH channel unexpectedly closed
    #[error("Channel closed: {0}")]
    ChannelClosed(String),
}

impl Error {
    /// Check if error is security-related
    ///
    /// # Returns
    ///
    /// `true` if the failure came from authentication or host verification
    pub fn is_security_event(&self) -> bool {
        matches!(self, Error::Authentication(_) | Error::HostKeyRejected(_))
    }

    /// Create timeout error with context
    pub fn timeout(context: impl Into<String>) -> Self {
        Error::Timeout(context.into())
    }

    /// Create transfer error with context
    pub fn transfer(context: impl Into<String>) -> Self {
        Error::Transfer(context.into())
    }
}

impl From<russh::Error> for Error {
    fn from(err: russh::Error) -> Self {
        match err {
            russh::Error::Disconnect | russh::Error::HUP => Error::ChannelClosed(err.to_string()),
            _ => Error::Ssh(err.to_string()),
        }
    }
}

impl From<russh_sftp::client::error::Error> for Error {
    fn from(err: russh_sftp::client::error::Error) -> Self {
        Error::Protocol(err.to_string())
    }
}

impl From<Error> for KeydropError {
    fn from(err: Error) -> Self {
        match err {
            Error::CredentialFormat(_) => KeydropError::CredentialFormat(err.to_string()),
            Error::Transfer(_) | Error::Io(_) => KeydropError::Transfer(err.to_string()),
            _ => KeydropError::Connection(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_security_event() {
        assert!(Error::Authentication("test".into()).is_security_event());
        assert!(Error::HostKeyRejected("test".into()).is_security_event());
        assert!(!Error::Transfer("test".into()).is_security_event());
        assert!(!Error::Io(std::io::Error::from(std::io::ErrorKind::Other)).is_security_event());
    }

    #[test]
    fn test_maps_to_pipeline_errors() {
        let err: KeydropError = Error::CredentialFormat("not a key".into()).into();
        assert!(matches!(err, KeydropError::CredentialFormat(_)));

        let err: KeydropError = Error::transfer("disk full").into();
        assert!(matches!(err, KeydropError::Transfer(_)));
        assert_eq!(err.to_string(), "Transfer error: Transfer failed: disk full");

        let err: KeydropError = Error::HostKeyRejected("unknown host".into()).into();
        assert!(matches!(err, KeydropError::Connection(_)));

        let err: KeydropError = Error::timeout("connect").into();
        assert!(matches!(err, KeydropError::Connection(_)));
    }

    #[test]
    fn test_russh_disconnect_is_channel_closed() {
        assert!(matches!(
            Error::from(russh::Error::Disconnect),
            Error::ChannelClosed(_)
        ));
    }
}
