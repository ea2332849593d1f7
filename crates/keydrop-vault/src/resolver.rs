use async_trait::async_trait;
use keydrop_core::{Result, SecretResolver, SecretValue, VaultConfig};
use std::sync::Arc;
use tracing::{debug, info};

use crate::client::KeyVaultClient;
use crate::credential::{DefaultCredentialChain, TokenCredential, vault_resource};

/// Resolves one named secret from Key Vault, fresh on every call.
pub struct VaultSecretResolver {
    credential: Arc<dyn TokenCredential>,
    client: KeyVaultClient,
    resource: String,
    secret_name: String,
}

impl VaultSecretResolver {
    pub fn new(
        credential: Arc<dyn TokenCredential>,
        client: KeyVaultClient,
        resource: String,
        secret_name: String,
    ) -> Self {
        Self {
            credential,
            client,
            resource,
            secret_name,
        }
    }

    /// Resolver for the configured vault using the ambient credential chain.
    pub fn from_config(config: &VaultConfig) -> Result<Self> {
        let http = KeyVaultClient::http_client()?;
        let credential = DefaultCredentialChain::from_config(config, http.clone());
        let client = KeyVaultClient::new(http, &config.url, &config.api_version);

        Ok(Self::new(
            Arc::new(credential),
            client,
            vault_resource(&config.url),
            config.secret_name.clone(),
        ))
    }
}

#[async_trait]
impl SecretResolver for VaultSecretResolver {
    async fn resolve(&self) -> Result<SecretValue> {
        debug!(resource = %self.resource, "Requesting vault access token");
        let token = self.credential.get_token(&self.resource).await?;

        let value = self.client.get_secret(&token, &self.secret_name).await?;
        info!(secret = %self.secret_name, "Retrieved secret from vault");
        Ok(value)
    }
}
