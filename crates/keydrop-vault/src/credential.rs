//! Ambient credential chain
//!
//! Sources are tried in configured order. A source that is not set up in the
//! current environment reports `CredentialUnavailable` and the chain moves on;
//! a source that is set up but rejected stops the chain.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use keydrop_core::{CredentialSource, VaultConfig};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::VaultError;

const IMDS_API_VERSION: &str = "2018-02-01";
const APP_SERVICE_API_VERSION: &str = "2019-08-01";
const IMDS_TIMEOUT: Duration = Duration::from_secs(2);

/// Bearer token for the secret store
pub struct AccessToken {
    token: SecretString,
    pub expires_on: Option<DateTime<Utc>>,
}

impl AccessToken {
    pub fn new(token: impl Into<String>, expires_on: Option<DateTime<Utc>>) -> Self {
        Self {
            token: SecretString::from(token.into()),
            expires_on,
        }
    }

    pub fn secret(&self) -> &str {
        self.token.expose_secret()
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"[REDACTED]")
            .field("expires_on", &self.expires_on)
            .finish()
    }
}

#[async_trait]
pub trait TokenCredential: Send + Sync {
    /// Source name for logs and error messages
    fn name(&self) -> &'static str;

    /// Acquire a token for `resource` (e.g. `https://vault.azure.net`)
    async fn get_token(&self, resource: &str) -> Result<AccessToken, VaultError>;
}

/// OAuth2 client-credentials grant using `AZURE_*` environment variables
pub struct EnvironmentCredential {
    http: reqwest::Client,
    authority_host: String,
    settings: Option<ClientSecretSettings>,
}

struct ClientSecretSettings {
    tenant_id: String,
    client_id: String,
    client_secret: SecretString,
}

impl EnvironmentCredential {
    pub fn new<F>(http: reqwest::Client, authority_host: &str, lookup: &F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let settings = match (
            lookup("AZURE_TENANT_ID"),
            lookup("AZURE_CLIENT_ID"),
            lookup("AZURE_CLIENT_SECRET"),
        ) {
            (Some(tenant_id), Some(client_id), Some(secret)) => Some(ClientSecretSettings {
                tenant_id,
                client_id,
                client_secret: SecretString::from(secret),
            }),
            _ => None,
        };

        Self {
            http,
            authority_host: authority_host.trim_end_matches('/').to_string(),
            settings,
        }
    }
}

#[derive(Deserialize)]
struct ClientCredentialsResponse {
    access_token: String,
    expires_in: Option<i64>,
}

#[async_trait]
impl TokenCredential for EnvironmentCredential {
    fn name(&self) -> &'static str {
        "environment"
    }

    async fn get_token(&self, resource: &str) -> Result<AccessToken, VaultError> {
        let settings = self.settings.as_ref().ok_or_else(|| {
            VaultError::CredentialUnavailable(
                "AZURE_TENANT_ID, AZURE_CLIENT_ID and AZURE_CLIENT_SECRET are not all set"
                    .to_string(),
            )
        })?;

        let url = format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority_host, settings.tenant_id
        );
        let scope = format!("{}/.default", resource.trim_end_matches('/'));

        let resp = self
            .http
            .post(&url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", settings.client_id.as_str()),
                ("client_secret", settings.client_secret.expose_secret()),
                ("scope", scope.as_str()),
            ])
            .send()
            .await
            .map_err(|e| VaultError::Authentication(format!("token request failed: {}", e)))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(VaultError::Authentication(format!(
                "identity provider rejected client credentials (status {})",
                status.as_u16()
            )));
        }

        let body: ClientCredentialsResponse = resp
            .json()
            .await
            .map_err(|_| VaultError::InvalidResponse("identity provider"))?;

        let expires_on = body
            .expires_in
            .map(|secs| Utc::now() + chrono::Duration::seconds(secs));
        Ok(AccessToken::new(body.access_token, expires_on))
    }
}

/// Managed identity via App Service (`IDENTITY_ENDPOINT`) or IMDS
pub struct ManagedIdentityCredential {
    http: reqwest::Client,
    imds_endpoint: String,
    app_service: Option<(String, SecretString)>,
    client_id: Option<String>,
}

impl ManagedIdentityCredential {
    pub fn new<F>(http: reqwest::Client, imds_endpoint: &str, lookup: &F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let app_service = match (lookup("IDENTITY_ENDPOINT"), lookup("IDENTITY_HEADER")) {
            (Some(endpoint), Some(header)) => Some((endpoint, SecretString::from(header))),
            _ => None,
        };

        Self {
            http,
            imds_endpoint: imds_endpoint.to_string(),
            app_service,
            client_id: lookup("AZURE_CLIENT_ID"),
        }
    }
}

#[derive(Deserialize)]
struct ManagedIdentityResponse {
    access_token: String,
    expires_on: Option<serde_json::Value>,
}

#[async_trait]
impl TokenCredential for ManagedIdentityCredential {
    fn name(&self) -> &'static str {
        "managed_identity"
    }

    async fn get_token(&self, resource: &str) -> Result<AccessToken, VaultError> {
        let request = match &self.app_service {
            Some((endpoint, header)) => {
                let mut query = vec![
                    ("api-version", APP_SERVICE_API_VERSION),
                    ("resource", resource),
                ];
                if let Some(id) = &self.client_id {
                    query.push(("client_id", id.as_str()));
                }
                self.http
                    .get(endpoint)
                    .query(&query)
                    .header("X-IDENTITY-HEADER", header.expose_secret())
            }
            None => {
                let mut query = vec![("api-version", IMDS_API_VERSION), ("resource", resource)];
                if let Some(id) = &self.client_id {
                    query.push(("client_id", id.as_str()));
                }
                self.http
                    .get(&self.imds_endpoint)
                    .query(&query)
                    .header("Metadata", "true")
                    .timeout(IMDS_TIMEOUT)
            }
        };

        let resp = request.send().await.map_err(|e| {
            if self.app_service.is_none() && (e.is_connect() || e.is_timeout()) {
                VaultError::CredentialUnavailable("no managed identity endpoint".to_string())
            } else {
                VaultError::Authentication(format!("managed identity request failed: {}", e))
            }
        })?;

        let status = resp.status().as_u16();
        match status {
            200 => {}
            // IMDS answers 400 when no identity is assigned to the host
            400 if self.app_service.is_none() => {
                return Err(VaultError::CredentialUnavailable(
                    "no managed identity assigned".to_string(),
                ));
            }
            other => {
                return Err(VaultError::Authentication(format!(
                    "managed identity endpoint rejected the request (status {})",
                    other
                )));
            }
        }

        let body: ManagedIdentityResponse = resp
            .json()
            .await
            .map_err(|_| VaultError::InvalidResponse("managed identity endpoint"))?;

        Ok(AccessToken::new(
            body.access_token,
            body.expires_on.as_ref().and_then(parse_epoch),
        ))
    }
}

/// Token from a local `az login` session
pub struct AzureCliCredential {
    program: String,
}

impl AzureCliCredential {
    pub fn new() -> Self {
        Self::with_program("az")
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for AzureCliCredential {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CliTokenResponse {
    access_token: String,
    #[serde(rename = "expires_on")]
    expires_on: Option<serde_json::Value>,
}

#[async_trait]
impl TokenCredential for AzureCliCredential {
    fn name(&self) -> &'static str {
        "azure_cli"
    }

    async fn get_token(&self, resource: &str) -> Result<AccessToken, VaultError> {
        let output = tokio::process::Command::new(&self.program)
            .args([
                "account",
                "get-access-token",
                "--output",
                "json",
                "--resource",
                resource,
            ])
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    VaultError::CredentialUnavailable(format!("{} not installed", self.program))
                } else {
                    VaultError::Authentication(format!("failed to run {}: {}", self.program, e))
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("az login") {
                return Err(VaultError::CredentialUnavailable(
                    "not logged in, run 'az login'".to_string(),
                ));
            }
            return Err(VaultError::Authentication(format!(
                "{} exited with {}",
                self.program, output.status
            )));
        }

        let body: CliTokenResponse = serde_json::from_slice(&output.stdout)
            .map_err(|_| VaultError::InvalidResponse("azure cli"))?;

        Ok(AccessToken::new(
            body.access_token,
            body.expires_on.as_ref().and_then(parse_epoch),
        ))
    }
}

/// Ordered chain of credential sources
pub struct DefaultCredentialChain {
    sources: Vec<Box<dyn TokenCredential>>,
}

impl DefaultCredentialChain {
    pub fn new(sources: Vec<Box<dyn TokenCredential>>) -> Self {
        Self { sources }
    }

    /// Build the chain described by the vault configuration, reading
    /// source settings from the process environment
    pub fn from_config(config: &VaultConfig, http: reqwest::Client) -> Self {
        Self::from_config_with_env(config, http, |name| std::env::var(name).ok())
    }

    pub fn from_config_with_env<F>(config: &VaultConfig, http: reqwest::Client, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let sources = config
            .credential_sources
            .iter()
            .map(|source| -> Box<dyn TokenCredential> {
                match source {
                    CredentialSource::Environment => Box::new(EnvironmentCredential::new(
                        http.clone(),
                        &config.authority_host,
                        &lookup,
                    )),
                    CredentialSource::ManagedIdentity => Box::new(ManagedIdentityCredential::new(
                        http.clone(),
                        &config.imds_endpoint,
                        &lookup,
                    )),
                    CredentialSource::AzureCli => Box::new(AzureCliCredential::new()),
                }
            })
            .collect();

        Self::new(sources)
    }
}

#[async_trait]
impl TokenCredential for DefaultCredentialChain {
    fn name(&self) -> &'static str {
        "default_chain"
    }

    async fn get_token(&self, resource: &str) -> Result<AccessToken, VaultError> {
        let mut skipped = Vec::new();

        for source in &self.sources {
            debug!(source = source.name(), "Trying credential source");
            match source.get_token(resource).await {
                Ok(token) => {
                    info!(source = source.name(), "Acquired access token");
                    return Ok(token);
                }
                Err(VaultError::CredentialUnavailable(reason)) => {
                    debug!(source = source.name(), %reason, "Credential source unavailable");
                    skipped.push(format!("{}: {}", source.name(), reason));
                }
                Err(e) => {
                    return Err(VaultError::Authentication(format!(
                        "{} credential failed: {}",
                        source.name(),
                        e
                    )));
                }
            }
        }

        Err(VaultError::Authentication(if skipped.is_empty() {
            "no credential sources configured".to_string()
        } else {
            format!("no credential source succeeded ({})", skipped.join("; "))
        }))
    }
}

/// Token resource for a vault URL: `https://x.vault.azure.net/` maps to
/// `https://vault.azure.net`.
pub fn vault_resource(vault_url: &str) -> String {
    let host = vault_url
        .split("://")
        .nth(1)
        .and_then(|rest| rest.split('/').next())
        .unwrap_or("");
    let host = host.split(':').next().unwrap_or("");

    match host.split_once('.') {
        Some((_, suffix)) if suffix.starts_with("vault.") => format!("https://{}", suffix),
        _ => "https://vault.azure.net".to_string(),
    }
}

fn parse_epoch(value: &serde_json::Value) -> Option<DateTime<Utc>> {
    let secs = match value {
        serde_json::Value::Number(n) => n.as_i64()?,
        serde_json::Value::String(s) => s.parse().ok()?,
        _ => return None,
    };
    DateTime::from_timestamp(secs, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::{body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct StubCredential {
        name: &'static str,
        outcome: fn() -> Result<AccessToken, VaultError>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl TokenCredential for StubCredential {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn get_token(&self, _resource: &str) -> Result<AccessToken, VaultError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.outcome)()
        }
    }

    fn stub(
        name: &'static str,
        outcome: fn() -> Result<AccessToken, VaultError>,
    ) -> (Box<dyn TokenCredential>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Box::new(StubCredential {
                name,
                outcome,
                calls: calls.clone(),
            }),
            calls,
        )
    }

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn test_vault_resource() {
        assert_eq!(
            vault_resource("https://my-vault.vault.azure.net/"),
            "https://vault.azure.net"
        );
        assert_eq!(
            vault_resource("https://gov.vault.usgovcloudapi.net"),
            "https://vault.usgovcloudapi.net"
        );
        assert_eq!(
            vault_resource("http://127.0.0.1:8200"),
            "https://vault.azure.net"
        );
    }

    #[test]
    fn test_access_token_debug_redacted() {
        let token = AccessToken::new("eyJ0eXAi.secret", None);
        assert!(!format!("{:?}", token).contains("eyJ0eXAi"));
        assert_eq!(token.secret(), "eyJ0eXAi.secret");
    }

    #[tokio::test]
    async fn test_chain_skips_unavailable_sources() {
        let (first, first_calls) = stub("first", || {
            Err(VaultError::CredentialUnavailable("not configured".into()))
        });
        let (second, second_calls) = stub("second", || Ok(AccessToken::new("tok", None)));

        let chain = DefaultCredentialChain::new(vec![first, second]);
        let token = chain.get_token("https://vault.azure.net").await.unwrap();

        assert_eq!(token.secret(), "tok");
        assert_eq!(first_calls.load(Ordering::SeqCst), 1);
        assert_eq!(second_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_chain_stops_on_rejected_source() {
        let (first, _) = stub("first", || Err(VaultError::Authentication("rejected".into())));
        let (second, second_calls) = stub("second", || Ok(AccessToken::new("tok", None)));

        let chain = DefaultCredentialChain::new(vec![first, second]);
        let err = chain.get_token("https://vault.azure.net").await.unwrap_err();

        assert!(matches!(err, VaultError::Authentication(_)));
        assert!(err.to_string().contains("first credential failed"));
        assert_eq!(second_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_chain_all_unavailable() {
        let (a, _) = stub("a", || Err(VaultError::CredentialUnavailable("x".into())));
        let (b, _) = stub("b", || Err(VaultError::CredentialUnavailable("y".into())));

        let err = DefaultCredentialChain::new(vec![a, b])
            .get_token("https://vault.azure.net")
            .await
            .unwrap_err();

        let message = err.to_string();
        assert!(matches!(err, VaultError::Authentication(_)));
        assert!(message.contains("a: x"));
        assert!(message.contains("b: y"));
    }

    #[tokio::test]
    async fn test_environment_credential_unavailable_without_vars() {
        let cred = EnvironmentCredential::new(
            reqwest::Client::new(),
            "https://login.microsoftonline.com",
            &env(&[("AZURE_TENANT_ID", "t")]),
        );
        let err = cred.get_token("https://vault.azure.net").await.unwrap_err();
        assert!(matches!(err, VaultError::CredentialUnavailable(_)));
    }

    #[tokio::test]
    async fn test_environment_credential_ok() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tenant-1/oauth2/v2.0/token"))
            .and(body_string_contains("grant_type=client_credentials"))
            .and(body_string_contains("client_id=app-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "token_type": "Bearer",
                "expires_in": 3599,
                "access_token": "vault-token"
            })))
            .mount(&server)
            .await;

        let cred = EnvironmentCredential::new(
            reqwest::Client::new(),
            &server.uri(),
            &env(&[
                ("AZURE_TENANT_ID", "tenant-1"),
                ("AZURE_CLIENT_ID", "app-1"),
                ("AZURE_CLIENT_SECRET", "s3cret"),
            ]),
        );

        let token = cred.get_token("https://vault.azure.net").await.unwrap();
        assert_eq!(token.secret(), "vault-token");
        assert!(token.expires_on.is_some());
    }

    #[tokio::test]
    async fn test_environment_credential_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid_client"))
            .mount(&server)
            .await;

        let cred = EnvironmentCredential::new(
            reqwest::Client::new(),
            &server.uri(),
            &env(&[
                ("AZURE_TENANT_ID", "tenant-1"),
                ("AZURE_CLIENT_ID", "app-1"),
                ("AZURE_CLIENT_SECRET", "wrong"),
            ]),
        );

        let err = cred.get_token("https://vault.azure.net").await.unwrap_err();
        assert!(matches!(err, VaultError::Authentication(_)));
        assert!(!err.to_string().contains("invalid_client"));
    }

    #[tokio::test]
    async fn test_managed_identity_app_service() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/msi/token"))
            .and(header("x-identity-header", "hdr"))
            .and(query_param("resource", "https://vault.azure.net"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "mi-token",
                "expires_on": "1700000000"
            })))
            .mount(&server)
            .await;

        let endpoint = format!("{}/msi/token", server.uri());
        let cred = ManagedIdentityCredential::new(
            reqwest::Client::new(),
            "http://169.254.169.254/metadata/identity/oauth2/token",
            &env(&[
                ("IDENTITY_ENDPOINT", endpoint.as_str()),
                ("IDENTITY_HEADER", "hdr"),
            ]),
        );

        let token = cred.get_token("https://vault.azure.net").await.unwrap();
        assert_eq!(token.secret(), "mi-token");
        assert_eq!(token.expires_on.map(|t| t.timestamp()), Some(1_700_000_000));
    }

    #[tokio::test]
    async fn test_managed_identity_imds_without_identity() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("metadata", "true"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;

        let cred = ManagedIdentityCredential::new(
            reqwest::Client::new(),
            &format!("{}/metadata/identity/oauth2/token", server.uri()),
            &env(&[]),
        );

        let err = cred.get_token("https://vault.azure.net").await.unwrap_err();
        assert!(matches!(err, VaultError::CredentialUnavailable(_)));
    }

    #[tokio::test]
    async fn test_cli_missing_binary_is_unavailable() {
        let cred = AzureCliCredential::with_program("keydrop-test-no-such-az-binary");
        let err = cred.get_token("https://vault.azure.net").await.unwrap_err();
        assert!(matches!(err, VaultError::CredentialUnavailable(_)));
    }
}
