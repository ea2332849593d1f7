//! Secret-bearing value types.
//!
//! Both types redact themselves in `Debug` and have no `Display`, so they
//! cannot end up in a log line or a response body through formatting.

use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use secrecy::{ExposeSecret, SecretSlice, SecretString};
use zeroize::Zeroizing;

use crate::{KeydropError, Result};

/// Standard alphabet; trailing `=` padding optional on decode.
const KEY_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Raw secret value as returned by the secret store.
pub struct SecretValue(SecretString);

impl SecretValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self(SecretString::from(value.into()))
    }

    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    /// Decode the base64 payload into private key bytes.
    ///
    /// Line breaks and other ASCII whitespace are ignored, since vault values
    /// are often pasted from wrapped PEM-style output.
    pub fn decode_private_key(&self) -> Result<PrivateKeyBytes> {
        let compact: Zeroizing<String> = Zeroizing::new(
            self.expose()
                .chars()
                .filter(|c| !c.is_ascii_whitespace())
                .collect(),
        );

        if compact.is_empty() {
            return Err(KeydropError::CredentialFormat(
                "secret value is empty".to_string(),
            ));
        }

        // DecodeError's Display echoes the offending byte, so keep it out.
        let bytes = KEY_ENGINE.decode(compact.as_bytes()).map_err(|_| {
            KeydropError::CredentialFormat("secret is not valid base64".to_string())
        })?;

        Ok(PrivateKeyBytes(SecretSlice::from(bytes)))
    }
}

impl std::fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SecretValue").field(&"[REDACTED]").finish()
    }
}

/// Decoded private key material. Zeroized on drop.
pub struct PrivateKeyBytes(SecretSlice<u8>);

impl PrivateKeyBytes {
    pub fn expose(&self) -> &[u8] {
        self.0.expose_secret()
    }

    pub fn len(&self) -> usize {
        self.expose().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Vec<u8>> for PrivateKeyBytes {
    fn from(bytes: Vec<u8>) -> Self {
        Self(SecretSlice::from(bytes))
    }
}

impl std::fmt::Debug for PrivateKeyBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivateKeyBytes")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}
