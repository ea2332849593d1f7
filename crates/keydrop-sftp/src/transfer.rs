//! Upload state machine
//!
//! `Disconnected -> SessionEstablishing -> SessionReady -> ChannelOpen ->
//! Uploading -> ChannelClosed -> SessionClosed`. Any failure jumps to cleanup,
//! which closes the open channel and then the open session, logs close
//! failures, and returns the original error.

use async_trait::async_trait;
use keydrop_core::{PrivateKeyBytes, SecretValue, SftpConfig, TransferJob, UploadReport, Uploader};
use std::path::Path;
use tracing::{debug, error, info, warn};

use crate::Result;

/// Opens authenticated sessions to the target host
#[async_trait]
pub trait Connector: Send + Sync {
    type Session: Session;

    /// Connect and authenticate with `key`. On error nothing is left open.
    async fn connect(&self, target: &SftpConfig, key: &PrivateKeyBytes) -> Result<Self::Session>;
}

/// Authenticated SSH session
#[async_trait]
pub trait Session: Send {
    type Channel: Channel;

    /// Open the SFTP subsystem channel
    async fn open_channel(&mut self) -> Result<Self::Channel>;

    async fn close(self) -> Result<()>;
}

/// File-transfer channel over a session
#[async_trait]
pub trait Channel: Send {
    /// Stream the whole local file to `remote`, replacing any existing file.
    /// Returns the number of bytes written.
    async fn upload(&mut self, local: &Path, remote: &str) -> Result<u64>;

    async fn close(self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Disconnected,
    SessionEstablishing,
    SessionReady,
    ChannelOpen,
    Uploading,
    ChannelClosed,
    SessionClosed,
}

impl std::fmt::Display for TransferState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TransferState::Disconnected => "disconnected",
            TransferState::SessionEstablishing => "session_establishing",
            TransferState::SessionReady => "session_ready",
            TransferState::ChannelOpen => "channel_open",
            TransferState::Uploading => "uploading",
            TransferState::ChannelClosed => "channel_closed",
            TransferState::SessionClosed => "session_closed",
        };
        f.write_str(name)
    }
}

struct StateTracker {
    state: TransferState,
}

impl StateTracker {
    fn new() -> Self {
        Self {
            state: TransferState::Disconnected,
        }
    }

    fn advance(&mut self, next: TransferState) {
        debug!(from = %self.state, to = %next, "Transfer state change");
        self.state = next;
    }
}

/// Runs one upload per call through a [`Connector`].
pub struct TransferExecutor<C: Connector> {
    connector: C,
    target: SftpConfig,
}

impl<C: Connector> TransferExecutor<C> {
    pub fn new(connector: C, target: SftpConfig) -> Self {
        Self { connector, target }
    }

    /// Decode the key, connect, upload, and tear down.
    pub async fn execute(
        &self,
        secret: &SecretValue,
        job: &TransferJob,
    ) -> keydrop_core::Result<UploadReport> {
        // Decoding happens before any network activity.
        let key = secret.decode_private_key()?;

        let mut tracker = StateTracker::new();
        tracker.advance(TransferState::SessionEstablishing);

        let connected = self.connector.connect(&self.target, &key).await;
        drop(key);
        let mut session = connected.map_err(|e| {
            log_failure(&e, tracker.state);
            e
        })?;
        tracker.advance(TransferState::SessionReady);
        info!(
            host = %self.target.host,
            port = self.target.port,
            username = %self.target.username,
            "SSH session connected"
        );

        let mut channel = match session.open_channel().await {
            Ok(channel) => channel,
            Err(e) => {
                log_failure(&e, tracker.state);
                close_session(session, &mut tracker).await;
                return Err(e.into());
            }
        };
        tracker.advance(TransferState::ChannelOpen);
        info!("SFTP channel connected");

        tracker.advance(TransferState::Uploading);
        let uploaded = channel.upload(&job.local_path, &job.remote_path).await;
        match &uploaded {
            Ok(bytes) => info!(
                bytes,
                remote_path = %job.remote_path,
                "File uploaded successfully to the SFTP server"
            ),
            Err(e) => log_failure(e, tracker.state),
        }

        close_channel(channel, &mut tracker).await;
        close_session(session, &mut tracker).await;
        info!("SFTP session disconnected");

        let bytes = uploaded?;
        Ok(UploadReport { bytes })
    }
}

#[async_trait]
impl<C: Connector> Uploader for TransferExecutor<C> {
    async fn upload(
        &self,
        secret: &SecretValue,
        job: &TransferJob,
    ) -> keydrop_core::Result<UploadReport> {
        self.execute(secret, job).await
    }
}

async fn close_channel<Ch: Channel>(channel: Ch, tracker: &mut StateTracker) {
    if let Err(e) = channel.close().await {
        warn!(error = %e, "Failed to close SFTP channel");
    }
    tracker.advance(TransferState::ChannelClosed);
}

async fn close_session<S: Session>(session: S, tracker: &mut StateTracker) {
    if let Err(e) = session.close().await {
        warn!(error = %e, "Failed to close SSH session");
    }
    tracker.advance(TransferState::SessionClosed);
}

fn log_failure(e: &crate::Error, state: TransferState) {
    if e.is_security_event() {
        warn!(error = %e, %state, security = true, "SFTP security check failed");
    } else {
        error!(error = %e, %state, "SFTP transfer step failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display() {
        assert_eq!(TransferState::SessionEstablishing.to_string(), "session_establishing");
        assert_eq!(TransferState::SessionClosed.to_string(), "session_closed");
    }

    #[test]
    fn test_tracker_starts_disconnected() {
        let mut tracker = StateTracker::new();
        assert_eq!(tracker.state, TransferState::Disconnected);
        tracker.advance(TransferState::SessionEstablishing);
        assert_eq!(tracker.state, TransferState::SessionEstablishing);
    }
}
