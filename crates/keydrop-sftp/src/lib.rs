//! # Keydrop SFTP
//!
//! Single-file SFTP upload over an SSH session authenticated with a private
//! key from the secret store.
//!
//! - Key-based authentication only, no passphrase
//! - Host key checked against pinned fingerprints or a known_hosts file
//! - One session and one channel per upload, always closed in reverse order
//! - [`transfer::Connector`], [`transfer::Session`] and [`transfer::Channel`]
//!   are the transport seams; [`client`] implements them with russh

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::panic))]

pub mod client;
pub mod error;
pub mod host_key;
pub mod transfer;

pub use client::{SftpChannel, SshConnector, SshSession};
pub use error::{Error, Result};
pub use host_key::HostKeyVerifier;
pub use transfer::{Channel, Connector, Session, TransferExecutor, TransferState};
