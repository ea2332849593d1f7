//! SFTP client built on russh
//!
//! One [`SshSession`] per upload, one [`SftpChannel`] per session.

use async_trait::async_trait;
use keydrop_core::{PrivateKeyBytes, SftpConfig};
use russh::Disconnect;
use russh::client::{self, Config, Handle};
use russh::keys::{HashAlg, PrivateKey, PrivateKeyWithHashAlg};
use russh_sftp::client::SftpSession as RusshSftpSession;
use russh_sftp::protocol::OpenFlags;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::host_key::HostKeyVerifier;
use crate::transfer::{Channel, Connector, Session};
use crate::{Error, Result};

/// Connects over TCP, verifies the host key and authenticates with a
/// public key. No password fallback.
pub struct SshConnector {
    config: Arc<Config>,
}

impl Default for SshConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl SshConnector {
    pub fn new() -> Self {
        Self {
            config: Arc::new(Config::default()),
        }
    }

    pub fn with_config(config: Config) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    async fn open_stream(target: &SftpConfig) -> Result<TcpStream> {
        let addr = (target.host.as_str(), target.port);
        let connect = TcpStream::connect(addr);

        let stream = match target.connect_timeout_secs {
            Some(secs) => tokio::time::timeout(Duration::from_secs(secs), connect)
                .await
                .map_err(|_| {
                    Error::timeout(format!(
                        "connecting to {}:{} after {}s",
                        target.host, target.port, secs
                    ))
                })?,
            None => connect.await,
        };

        stream.map_err(|e| {
            Error::Connection(format!(
                "Failed to connect to {}:{}: {}",
                target.host, target.port, e
            ))
        })
    }
}

/// Parse OpenSSH or PEM private key text. Passphrase-protected keys are
/// rejected.
pub fn parse_private_key(key: &PrivateKeyBytes) -> Result<PrivateKey> {
    let text = Zeroizing::new(
        std::str::from_utf8(key.expose())
            .map_err(|_| Error::CredentialFormat("decoded key is not UTF-8 text".to_string()))?
            .to_string(),
    );

    russh::keys::decode_secret_key(&text, None)
        .map_err(|e| Error::CredentialFormat(format!("unable to parse private key: {}", e)))
}

#[async_trait]
impl Connector for SshConnector {
    type Session = SshSession;

    async fn connect(&self, target: &SftpConfig, key: &PrivateKeyBytes) -> Result<SshSession> {
        let key = parse_private_key(key)?;

        info!(
            "Connecting to {}:{} as {}",
            target.host, target.port, target.username
        );
        let stream = Self::open_stream(target).await?;

        let verifier = HostKeyVerifier::new(&target.host, target.port, target.host_key.clone());
        let mut handle = client::connect_stream(self.config.clone(), stream, verifier).await?;

        // RSA keys sign with SHA-512; other algorithms use their native hash
        let hash_alg = if key.algorithm().is_rsa() {
            Some(HashAlg::Sha512)
        } else {
            None
        };
        let key = PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg);

        let auth = handle
            .authenticate_publickey(target.username.clone(), key)
            .await;

        let failure = match auth {
            Ok(result) if result.success() => None,
            Ok(_) => Some(Error::Authentication(format!(
                "public key rejected for {}@{}",
                target.username, target.host
            ))),
            Err(e) => Some(Error::from(e)),
        };

        if let Some(e) = failure {
            let session = SshSession { handle };
            if let Err(close_err) = session.close().await {
                debug!("Disconnect after failed authentication: {}", close_err);
            }
            return Err(e);
        }

        Ok(SshSession { handle })
    }
}

/// Authenticated SSH connection
pub struct SshSession {
    handle: Handle<HostKeyVerifier>,
}

#[async_trait]
impl Session for SshSession {
    type Channel = SftpChannel;

    async fn open_channel(&mut self) -> Result<SftpChannel> {
        let channel = self.handle.channel_open_session().await?;

        if let Err(e) = channel.request_subsystem(false, "sftp").await {
            let _ = channel.close().await;
            return Err(e.into());
        }

        let sftp = RusshSftpSession::new(channel.into_stream()).await?;
        Ok(SftpChannel { sftp })
    }

    async fn close(self) -> Result<()> {
        self.handle
            .disconnect(Disconnect::ByApplication, "upload finished", "en")
            .await?;
        Ok(())
    }
}

/// SFTP subsystem channel
pub struct SftpChannel {
    sftp: RusshSftpSession,
}

#[async_trait]
impl Channel for SftpChannel {
    async fn upload(&mut self, local: &Path, remote: &str) -> Result<u64> {
        debug!("Uploading {:?} to {}", local, remote);

        let mut local_file = tokio::fs::File::open(local).await.map_err(|e| {
            Error::transfer(format!(
                "Failed to read local file {}: {}",
                local.display(),
                e
            ))
        })?;

        let mut remote_file = self
            .sftp
            .open_with_flags(
                remote,
                OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::TRUNCATE,
            )
            .await
            .map_err(|e| Error::transfer(format!("Failed to open remote file {}: {}", remote, e)))?;

        let bytes = tokio::io::copy(&mut local_file, &mut remote_file)
            .await
            .map_err(|e| {
                Error::transfer(format!(
                    "Failed to upload {} to {}: {}",
                    local.display(),
                    remote,
                    e
                ))
            })?;

        remote_file
            .shutdown()
            .await
            .map_err(|e| Error::transfer(format!("Failed to finalize {}: {}", remote, e)))?;

        Ok(bytes)
    }

    async fn close(self) -> Result<()> {
        self.sftp.close().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_PRIVATE_KEY: &str = include_str!("../tests/fixtures/test_key");

    #[test]
    fn test_parse_openssh_key() {
        let bytes = PrivateKeyBytes::from(TEST_PRIVATE_KEY.as_bytes().to_vec());
        let key = parse_private_key(&bytes).unwrap();
        assert!(!key.algorithm().is_rsa());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let bytes = PrivateKeyBytes::from(b"testkey".to_vec());
        assert!(matches!(
            parse_private_key(&bytes),
            Err(Error::CredentialFormat(_))
        ));
    }

    #[test]
    fn test_parse_rejects_binary() {
        let bytes = PrivateKeyBytes::from(vec![0xff, 0xfe, 0x00, 0x81]);
        let err = parse_private_key(&bytes).unwrap_err();
        assert!(err.to_string().contains("not UTF-8"));
    }

    #[tokio::test]
    async fn test_connect_rejects_bad_key_before_dialing() {
        // TEST-NET address: reaching the network would hang or fail.
        let target = SftpConfig {
            host: "192.0.2.1".to_string(),
            port: 9,
            ..SftpConfig::default()
        };
        let bytes = PrivateKeyBytes::from(b"testkey".to_vec());

        let err = match SshConnector::new().connect(&target, &bytes).await {
            Ok(_) => panic!("connect should fail"),
            Err(e) => e,
        };
        assert!(matches!(err, Error::CredentialFormat(_)));
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let target = SftpConfig {
            host: "127.0.0.1".to_string(),
            port,
            connect_timeout_secs: Some(5),
            ..SftpConfig::default()
        };
        let bytes = PrivateKeyBytes::from(TEST_PRIVATE_KEY.as_bytes().to_vec());

        let err = match SshConnector::new().connect(&target, &bytes).await {
            Ok(_) => panic!("connect should fail"),
            Err(e) => e,
        };
        assert!(matches!(err, Error::Connection(_)));
    }
}
