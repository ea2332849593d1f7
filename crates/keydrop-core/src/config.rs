//! Service configuration
//!
//! Loaded once at startup from TOML, then overridden by `KEYDROP_*`
//! environment variables and validated before the server starts.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use crate::{KeydropError, Result};

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub vault: VaultConfig,

    #[serde(default)]
    pub sftp: SftpConfig,

    #[serde(default)]
    pub transfer: TransferConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,

    #[serde(default = "default_http_port")]
    pub port: u16,
}

/// Secret store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Vault endpoint, e.g. `https://my-vault.vault.azure.net/`
    #[serde(default = "default_vault_url")]
    pub url: String,

    /// Name of the secret holding the base64-encoded private key
    #[serde(default = "default_secret_name")]
    pub secret_name: String,

    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Credential sources, tried in order
    #[serde(default = "default_credential_sources")]
    pub credential_sources: Vec<CredentialSource>,

    #[serde(default = "default_authority_host")]
    pub authority_host: String,

    #[serde(default = "default_imds_endpoint")]
    pub imds_endpoint: String,
}

/// Ambient credential sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialSource {
    /// `AZURE_TENANT_ID` / `AZURE_CLIENT_ID` / `AZURE_CLIENT_SECRET`
    Environment,
    /// Hosting-platform managed identity (App Service or IMDS)
    ManagedIdentity,
    /// Local developer login through the `az` CLI
    AzureCli,
}

/// SFTP target configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SftpConfig {
    #[serde(default = "default_sftp_host")]
    pub host: String,

    #[serde(default = "default_sftp_port")]
    pub port: u16,

    #[serde(default = "default_sftp_username")]
    pub username: String,

    #[serde(default)]
    pub host_key: HostKeyPolicy,

    /// Optional connect timeout; transport defaults apply when unset
    #[serde(default)]
    pub connect_timeout_secs: Option<u64>,
}

/// How the server's host key is verified
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum HostKeyPolicy {
    /// Accept only keys whose SHA-256 fingerprint is listed (`SHA256:...`)
    Fingerprint { fingerprints: Vec<String> },
    /// Accept keys listed for the host in an OpenSSH known_hosts file
    KnownHosts { path: PathBuf },
    /// Accept any host key. Logged as a warning on every connection.
    InsecureAcceptAny,
}

impl Default for HostKeyPolicy {
    fn default() -> Self {
        HostKeyPolicy::KnownHosts {
            path: PathBuf::from("/etc/keydrop/known_hosts"),
        }
    }
}

/// Source and destination of the upload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    #[serde(default = "default_local_path")]
    pub local_path: PathBuf,

    #[serde(default = "default_remote_path")]
    pub remote_path: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (text or json)
    pub format: LogFormat,
    /// Optional log file path (logs to stderr if not specified)
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
            file: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Plain text logging for human readability
    Text,
    /// JSON structured logging for log aggregators
    Json,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_http_port(),
        }
    }
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            url: default_vault_url(),
            secret_name: default_secret_name(),
            api_version: default_api_version(),
            credential_sources: default_credential_sources(),
            authority_host: default_authority_host(),
            imds_endpoint: default_imds_endpoint(),
        }
    }
}

impl Default for SftpConfig {
    fn default() -> Self {
        Self {
            host: default_sftp_host(),
            port: default_sftp_port(),
            username: default_sftp_username(),
            host_key: HostKeyPolicy::default(),
            connect_timeout_secs: None,
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            local_path: default_local_path(),
            remote_path: default_remote_path(),
        }
    }
}

impl Config {
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| KeydropError::InvalidConfig(format!("Failed to parse config: {}", e)))
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| KeydropError::InvalidConfig(format!("Failed to serialize config: {}", e)))
    }

    /// Apply `KEYDROP_*` overrides from the process environment
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("KEYDROP_VAULT_URL") {
            self.vault.url = v;
        }
        if let Some(v) = lookup("KEYDROP_SECRET_NAME") {
            self.vault.secret_name = v;
        }
        if let Some(v) = lookup("KEYDROP_SFTP_USERNAME") {
            self.sftp.username = v;
        }
        if let Some(v) = lookup("KEYDROP_SFTP_HOST") {
            self.sftp.host = v;
        }
        if let Some(v) = lookup("KEYDROP_SFTP_PORT") {
            self.sftp.port = parse_port("KEYDROP_SFTP_PORT", &v)?;
        }
        if let Some(v) = lookup("KEYDROP_HOST_KEY_FINGERPRINT") {
            let fingerprints = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            self.sftp.host_key = HostKeyPolicy::Fingerprint { fingerprints };
        }
        if let Some(v) = lookup("KEYDROP_LOCAL_PATH") {
            self.transfer.local_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("KEYDROP_REMOTE_PATH") {
            self.transfer.remote_path = v;
        }
        if let Some(v) = lookup("KEYDROP_HTTP_PORT") {
            self.http.port = parse_port("KEYDROP_HTTP_PORT", &v)?;
        }
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        validate_vault_url(&self.vault.url)?;

        if self.vault.secret_name.is_empty()
            || !self
                .vault
                .secret_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-')
        {
            return Err(KeydropError::InvalidConfig(format!(
                "secret name must be non-empty and contain only 0-9, a-z, A-Z and '-': {:?}",
                self.vault.secret_name
            )));
        }

        if self.vault.credential_sources.is_empty() {
            return Err(KeydropError::InvalidConfig(
                "at least one credential source is required".to_string(),
            ));
        }

        if self.sftp.host.trim().is_empty() {
            return Err(KeydropError::InvalidConfig("sftp host is empty".to_string()));
        }

        if self.sftp.username.trim().is_empty() {
            return Err(KeydropError::InvalidConfig(
                "sftp username is empty".to_string(),
            ));
        }

        if self.sftp.port == 0 {
            return Err(KeydropError::InvalidConfig("sftp port must be non-zero".to_string()));
        }

        match &self.sftp.host_key {
            HostKeyPolicy::Fingerprint { fingerprints } => {
                if fingerprints.is_empty() {
                    return Err(KeydropError::InvalidConfig(
                        "fingerprint policy requires at least one fingerprint".to_string(),
                    ));
                }
                if let Some(bad) = fingerprints.iter().find(|f| !f.starts_with("SHA256:")) {
                    return Err(KeydropError::InvalidConfig(format!(
                        "host key fingerprint must use the SHA256:<base64> form: {}",
                        bad
                    )));
                }
            }
            HostKeyPolicy::KnownHosts { path } => {
                if path.as_os_str().is_empty() {
                    return Err(KeydropError::InvalidConfig(
                        "known_hosts path is empty".to_string(),
                    ));
                }
            }
            HostKeyPolicy::InsecureAcceptAny => {}
        }

        if self.transfer.local_path.as_os_str().is_empty() {
            return Err(KeydropError::InvalidConfig("local path is empty".to_string()));
        }

        if self.transfer.remote_path.trim().is_empty() {
            return Err(KeydropError::InvalidConfig("remote path is empty".to_string()));
        }

        Ok(())
    }
}

fn parse_port(name: &str, value: &str) -> Result<u16> {
    value
        .trim()
        .parse()
        .map_err(|_| KeydropError::InvalidConfig(format!("{} is not a valid port: {}", name, value)))
}

/// Only https is accepted, except plain http to localhost.
fn validate_vault_url(url: &str) -> Result<()> {
    if url.starts_with("https://") {
        return Ok(());
    }
    if let Some(rest) = url.strip_prefix("http://") {
        let host = rest.split('/').next().unwrap_or("");
        let host = host.split(':').next().unwrap_or("");
        if host == "localhost" || host == "127.0.0.1" {
            return Ok(());
        }
        return Err(KeydropError::InvalidConfig(format!(
            "insecure vault URL rejected: {} (http is permitted for localhost only)",
            url
        )));
    }
    Err(KeydropError::InvalidConfig(format!(
        "unsupported vault URL scheme: {}",
        url
    )))
}

fn default_bind_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_http_port() -> u16 {
    7071
}

fn default_vault_url() -> String {
    "https://your-key-vault-name.vault.azure.net/".to_string()
}

fn default_secret_name() -> String {
    "your-ssh-key-secret-name".to_string()
}

fn default_api_version() -> String {
    "7.4".to_string()
}

fn default_credential_sources() -> Vec<CredentialSource> {
    vec![
        CredentialSource::Environment,
        CredentialSource::ManagedIdentity,
        CredentialSource::AzureCli,
    ]
}

fn default_authority_host() -> String {
    "https://login.microsoftonline.com".to_string()
}

fn default_imds_endpoint() -> String {
    "http://169.254.169.254/metadata/identity/oauth2/token".to_string()
}

fn default_sftp_host() -> String {
    "your-sftp-host".to_string()
}

fn default_sftp_port() -> u16 {
    22
}

fn default_sftp_username() -> String {
    "your-sftp-username".to_string()
}

fn default_local_path() -> PathBuf {
    PathBuf::from("/var/lib/keydrop/outbound/file.txt")
}

fn default_remote_path() -> String {
    "/remote/path/file.txt".to_string()
}
