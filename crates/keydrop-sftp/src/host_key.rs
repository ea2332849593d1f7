//! Server host key verification

use keydrop_core::HostKeyPolicy;
use russh::keys::{HashAlg, PublicKey};
use tracing::{debug, warn};

use crate::{Error, Result};

/// SSH client handler that checks the server key against the configured
/// policy before authentication proceeds.
pub struct HostKeyVerifier {
    host: String,
    port: u16,
    policy: HostKeyPolicy,
}

impl HostKeyVerifier {
    pub fn new(host: impl Into<String>, port: u16, policy: HostKeyPolicy) -> Self {
        Self {
            host: host.into(),
            port,
            policy,
        }
    }

    /// SHA-256 fingerprint in OpenSSH form (`SHA256:<base64>`)
    pub fn fingerprint(key: &PublicKey) -> String {
        key.fingerprint(HashAlg::Sha256).to_string()
    }

    pub fn verify(&self, key: &PublicKey) -> Result<bool> {
        let fingerprint = Self::fingerprint(key);

        match &self.policy {
            HostKeyPolicy::Fingerprint { fingerprints } => {
                if fingerprints.iter().any(|pinned| pinned == &fingerprint) {
                    debug!("Host key verified for {}:{} - {}", self.host, self.port, fingerprint);
                    Ok(true)
                } else {
                    Err(Error::HostKeyRejected(format!(
                        "{}:{} presented unpinned key {}",
                        self.host, self.port, fingerprint
                    )))
                }
            }
            HostKeyPolicy::KnownHosts { path } => {
                match russh::keys::check_known_hosts_path(&self.host, self.port, key, path) {
                    Ok(true) => {
                        debug!("Host key verified for {}:{} - {}", self.host, self.port, fingerprint);
                        Ok(true)
                    }
                    Ok(false) => Err(Error::HostKeyRejected(format!(
                        "{}:{} not listed in {} (key {})",
                        self.host,
                        self.port,
                        path.display(),
                        fingerprint
                    ))),
                    Err(e) => Err(Error::HostKeyRejected(format!(
                        "{}:{} failed known_hosts check against {}: {}",
                        self.host,
                        self.port,
                        path.display(),
                        e
                    ))),
                }
            }
            HostKeyPolicy::InsecureAcceptAny => {
                warn!(
                    "Host key verification disabled, accepting {} for {}:{}",
                    fingerprint, self.host, self.port
                );
                Ok(true)
            }
        }
    }
}

impl russh::client::Handler for HostKeyVerifier {
    type Error = Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        self.verify(server_public_key)
    }
}
