use async_trait::async_trait;

use crate::{
    error::StoreError,
    secret::{SecretId, TlsSecret},
};

/// The system holding the TLS secrets, normally the Kubernetes API.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// List all secrets in the given namespaces. An empty list means every namespace.
    async fn list(&self, namespaces: &[String]) -> Result<Vec<TlsSecret>, StoreError>;

    /// Get one secret, `None` if it does not exist.
    async fn get(&self, id: &SecretId) -> Result<Option<TlsSecret>, StoreError>;

    /// Set a single annotation on a secret, leaving all other annotations in place.
    async fn annotate(&self, id: &SecretId, key: &str, value: &str) -> Result<(), StoreError>;
}
