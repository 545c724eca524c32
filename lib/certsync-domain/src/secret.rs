use std::{collections::BTreeMap, fmt::Display};

pub const TLS_CRT: &str = "tls.crt";
pub const TLS_KEY: &str = "tls.key";
pub const CA_CRT: &str = "ca.crt";

#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct SecretId {
    pub namespace: String,
    pub name: String,
}

impl SecretId {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl Display for SecretId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// A secret as seen by the sync loop: identity, annotations and raw data.
#[derive(Clone, Debug)]
pub struct TlsSecret {
    pub id: SecretId,
    pub annotations: BTreeMap<String, String>,
    pub data: BTreeMap<String, Vec<u8>>,
}

impl TlsSecret {
    pub fn new(id: SecretId) -> Self {
        Self {
            id,
            annotations: Default::default(),
            data: Default::default(),
        }
    }

    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn tls_crt(&self) -> &[u8] {
        self.data_bytes(TLS_CRT)
    }

    pub fn tls_key(&self) -> &[u8] {
        self.data_bytes(TLS_KEY)
    }

    pub fn ca_crt(&self) -> Option<&[u8]> {
        self.data.get(CA_CRT).map(Vec::as_slice)
    }

    pub fn data_bytes(&self, key: &str) -> &[u8] {
        self.data.get(key).map(Vec::as_slice).unwrap_or_default()
    }

    /// Both certificate and key are present
    pub fn is_tls(&self) -> bool {
        !self.tls_crt().is_empty() && !self.tls_key().is_empty()
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }
}

/// Annotation keys, all prefixed by the configured operator name.
#[derive(Clone, Debug)]
pub struct AnnotationKeys {
    operator_name: String,
    pub sync_enabled: String,
    pub acm_enabled: String,
    pub acm_certificate_arn: String,
    pub incapsula_site_id: String,
    pub incapsula_secret_name: String,
    /// Tag put on newly created destination resources
    pub secret_name_tag: String,
}

impl AnnotationKeys {
    pub fn new(operator_name: &str) -> Self {
        let key = |suffix: &str| format!("{operator_name}/{suffix}");

        Self {
            operator_name: operator_name.to_string(),
            sync_enabled: key("sync-enabled"),
            acm_enabled: key("acm-enabled"),
            acm_certificate_arn: key("acm-certificate-arn"),
            incapsula_site_id: key("incapsula-site-id"),
            incapsula_secret_name: key("incapsula-secret-name"),
            secret_name_tag: key("secret-name"),
        }
    }

    pub fn operator_name(&self) -> &str {
        &self.operator_name
    }

    pub fn is_true(&self, secret: &TlsSecret, key: &str) -> bool {
        secret.annotation(key) == Some("true")
    }

    pub fn is_sync_enabled(&self, secret: &TlsSecret) -> bool {
        self.is_true(secret, &self.sync_enabled)
    }
}
