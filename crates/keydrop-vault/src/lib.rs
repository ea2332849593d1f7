//! # Keydrop Vault
//!
//! Secret resolution: an ambient credential chain (environment client
//! secret, managed identity, developer CLI login) and a Key Vault client that
//! reads one named secret per request. Nothing is cached between requests.

pub mod client;
pub mod credential;
pub mod error;
pub mod resolver;

pub use client::KeyVaultClient;
pub use credential::{
    AccessToken, AzureCliCredential, DefaultCredentialChain, EnvironmentCredential,
    ManagedIdentityCredential, TokenCredential,
};
pub use error::VaultError;
pub use resolver::VaultSecretResolver;
