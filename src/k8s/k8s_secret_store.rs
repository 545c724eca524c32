use async_trait::async_trait;
use certsync_domain::{
    error::StoreError,
    secret::{SecretId, TlsSecret},
    store::SecretStore,
};
use k8s_openapi::api::core::v1::Secret;
use kube::{
    api::{ListParams, Patch, PatchParams},
    Api, Client,
};
use serde_json::json;
use tracing::debug;

/// [SecretStore] backed by the Kubernetes API
pub struct KubeSecretStore {
    client: Client,
}

impl KubeSecretStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect using the kubeconfig, falling back to the in-cluster service account
    pub async fn try_default() -> anyhow::Result<Self> {
        Ok(Self::new(Client::try_default().await?))
    }

    fn namespaced(&self, namespace: &str) -> Api<Secret> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl SecretStore for KubeSecretStore {
    async fn list(&self, namespaces: &[String]) -> Result<Vec<TlsSecret>, StoreError> {
        let apis: Vec<Api<Secret>> = if namespaces.is_empty() {
            vec![Api::all(self.client.clone())]
        } else {
            namespaces.iter().map(|ns| self.namespaced(ns)).collect()
        };

        let mut secrets = vec![];
        for api in apis {
            let list = api
                .list(&ListParams::default())
                .await
                .map_err(|err| StoreError::Request(err.into()))?;

            debug!(count = list.items.len(), "listed secrets");
            secrets.extend(list.items.into_iter().filter_map(tls_secret_from_k8s));
        }

        Ok(secrets)
    }

    async fn get(&self, id: &SecretId) -> Result<Option<TlsSecret>, StoreError> {
        let secret = self
            .namespaced(&id.namespace)
            .get_opt(&id.name)
            .await
            .map_err(|err| StoreError::Request(err.into()))?;

        Ok(secret.and_then(tls_secret_from_k8s))
    }

    async fn annotate(&self, id: &SecretId, key: &str, value: &str) -> Result<(), StoreError> {
        let patch = json!({
            "metadata": {
                "annotations": { key: value }
            }
        });

        self.namespaced(&id.namespace)
            .patch(&id.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|err| StoreError::Request(err.into()))?;

        Ok(())
    }
}

fn tls_secret_from_k8s(secret: Secret) -> Option<TlsSecret> {
    let name = secret.metadata.name?;
    let namespace = secret.metadata.namespace.unwrap_or_default();

    Some(TlsSecret {
        id: SecretId::new(namespace, name),
        annotations: secret.metadata.annotations.unwrap_or_default(),
        data: secret
            .data
            .unwrap_or_default()
            .into_iter()
            .map(|(key, value)| (key, value.0))
            .collect(),
    })
}
