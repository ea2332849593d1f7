//! Key Vault REST client for secret reads.

use keydrop_core::SecretValue;
use serde::Deserialize;

use crate::credential::AccessToken;
use crate::error::VaultError;

/// Key Vault secrets API client.
#[derive(Debug, Clone)]
pub struct KeyVaultClient {
    http: reqwest::Client,
    base_url: String,
    api_version: String,
}

#[derive(Deserialize)]
struct SecretBundle {
    value: Option<String>,
}

impl KeyVaultClient {
    /// Build the user-agent string from crate version.
    pub fn user_agent() -> String {
        format!("keydrop/{}", env!("CARGO_PKG_VERSION"))
    }

    /// Shared HTTP client for vault and identity calls.
    pub fn http_client() -> Result<reqwest::Client, VaultError> {
        reqwest::Client::builder()
            .user_agent(Self::user_agent())
            .build()
            .map_err(VaultError::network("http client"))
    }

    pub fn new(http: reqwest::Client, vault_url: &str, api_version: &str) -> Self {
        Self {
            http,
            base_url: vault_url.trim_end_matches('/').to_string(),
            api_version: api_version.to_string(),
        }
    }

    /// Read the current version of a secret.
    pub async fn get_secret(
        &self,
        token: &AccessToken,
        name: &str,
    ) -> Result<SecretValue, VaultError> {
        if name.is_empty() {
            return Err(VaultError::NotFound(String::new()));
        }

        let url = format!("{}/secrets/{}", self.base_url, name);
        let resp = self
            .http
            .get(&url)
            .query(&[("api-version", self.api_version.as_str())])
            .bearer_auth(token.secret())
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(VaultError::network("vault"))?;

        match resp.status().as_u16() {
            200 => {
                let bundle: SecretBundle = resp
                    .json()
                    .await
                    .map_err(|_| VaultError::InvalidResponse("vault"))?;
                bundle
                    .value
                    .map(SecretValue::new)
                    .ok_or_else(|| VaultError::NotFound(name.to_string()))
            }
            401 | 403 => Err(VaultError::Authentication(format!(
                "vault denied access to secret '{}'",
                name
            ))),
            404 => Err(VaultError::NotFound(name.to_string())),
            other => Err(VaultError::UnexpectedStatus(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> KeyVaultClient {
        KeyVaultClient::new(KeyVaultClient::http_client().unwrap(), &server.uri(), "7.4")
    }

    #[test]
    fn user_agent_contains_version() {
        assert!(KeyVaultClient::user_agent().starts_with("keydrop/"));
    }

    #[tokio::test]
    async fn get_secret_ok() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/secrets/sftp-key"))
            .and(query_param("api-version", "7.4"))
            .and(header("authorization", "Bearer vault-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "value": "dGVzdGtleQ==",
                "id": "https://v.vault.azure.net/secrets/sftp-key/abc"
            })))
            .mount(&server)
            .await;

        let token = AccessToken::new("vault-token", None);
        let value = client(&server).get_secret(&token, "sftp-key").await.unwrap();
        assert_eq!(value.expose(), "dGVzdGtleQ==");
    }

    #[tokio::test]
    async fn get_secret_trailing_slash_in_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/secrets/k"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "value": "eA=="
            })))
            .mount(&server)
            .await;

        let vault = KeyVaultClient::new(
            reqwest::Client::new(),
            &format!("{}/", server.uri()),
            "7.4",
        );
        let value = vault
            .get_secret(&AccessToken::new("t", None), "k")
            .await
            .unwrap();
        assert_eq!(value.expose(), "eA==");
    }

    #[tokio::test]
    async fn get_secret_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "error": { "code": "SecretNotFound" }
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .get_secret(&AccessToken::new("t", None), "missing")
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::NotFound(ref n) if n == "missing"));
    }

    #[tokio::test]
    async fn get_secret_forbidden() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let err = client(&server)
            .get_secret(&AccessToken::new("t", None), "sftp-key")
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::Authentication(_)));
    }

    #[tokio::test]
    async fn get_secret_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = client(&server)
            .get_secret(&AccessToken::new("t", None), "sftp-key")
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::UnexpectedStatus(503)));
    }

    #[tokio::test]
    async fn get_secret_missing_value_field() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "x"
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .get_secret(&AccessToken::new("t", None), "sftp-key")
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::NotFound(_)));
    }
}
