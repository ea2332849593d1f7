//! Secret store and identity errors. Raw API response bodies are never exposed.

use keydrop_core::KeydropError;

#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    /// A credential source is not configured in this environment; the chain
    /// moves on to the next one.
    #[error("credential unavailable: {0}")]
    CredentialUnavailable(String),

    /// A configured credential source was rejected, or no source was usable.
    #[error("{0}")]
    Authentication(String),

    #[error("network error communicating with {context}: {source}")]
    Network {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("secret '{0}' not found in vault")]
    NotFound(String),

    #[error("unexpected vault response: status {0}")]
    UnexpectedStatus(u16),

    #[error("invalid response from {0}")]
    InvalidResponse(&'static str),
}

impl VaultError {
    pub(crate) fn network(context: &'static str) -> impl FnOnce(reqwest::Error) -> Self {
        move |source| VaultError::Network { context, source }
    }
}

impl From<VaultError> for KeydropError {
    fn from(err: VaultError) -> Self {
        match err {
            VaultError::CredentialUnavailable(_) | VaultError::Authentication(_) => {
                KeydropError::Authentication(err.to_string())
            }
            _ => KeydropError::SecretNotFound(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_maps_to_pipeline_errors() {
        let err: KeydropError = VaultError::Authentication("all sources failed".into()).into();
        assert!(matches!(err, KeydropError::Authentication(_)));

        let err: KeydropError = VaultError::NotFound("sftp-key".into()).into();
        assert!(matches!(err, KeydropError::SecretNotFound(_)));
        assert_eq!(
            err.to_string(),
            "Secret not found: secret 'sftp-key' not found in vault"
        );

        let err: KeydropError = VaultError::UnexpectedStatus(503).into();
        assert!(matches!(err, KeydropError::SecretNotFound(_)));
    }
}
