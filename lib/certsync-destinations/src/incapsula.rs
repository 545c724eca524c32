use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use certsync_domain::{
    bundle::CertificateBundle,
    destination::DestinationAdapter,
    error::DestinationError,
    secret::{AnnotationKeys, SecretId, TlsSecret},
    store::SecretStore,
};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;

pub const DEFAULT_API_URL: &str = "https://my.incapsula.com/api/prov/v1";

const API_ID: &str = "api_id";
const API_KEY: &str = "api_key";

/// Uploads bundles as the custom certificate of an Incapsula site.
///
/// The site id is the address of the certificate, so an upload always replaces
/// the site's current custom certificate in place.
pub struct IncapsulaDestination {
    url: String,
    client: reqwest::Client,
    store: Arc<dyn SecretStore>,
    keys: AnnotationKeys,
}

struct ApiCredentials {
    api_id: String,
    api_key: SecretString,
}

impl IncapsulaDestination {
    pub fn new(
        url: String,
        client: reqwest::Client,
        store: Arc<dyn SecretStore>,
        keys: AnnotationKeys,
    ) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            client,
            store,
            keys,
        }
    }

    /// Credentials live in a separate secret in the same namespace as the TLS secret
    async fn credentials(&self, secret: &TlsSecret) -> Result<ApiCredentials, DestinationError> {
        let name = secret
            .annotation(&self.keys.incapsula_secret_name)
            .ok_or_else(|| {
                DestinationError::Credentials(format!(
                    "missing annotation {}",
                    self.keys.incapsula_secret_name
                ))
            })?;
        let id = SecretId::new(&secret.id.namespace, name);

        let credentials = self
            .store
            .get(&id)
            .await
            .map_err(|err| DestinationError::Credentials(format!("{id}: {err}")))?
            .ok_or_else(|| DestinationError::Credentials(format!("{id}: not found")))?;

        let field = |key: &str| -> Result<String, DestinationError> {
            let value = String::from_utf8(credentials.data_bytes(key).to_vec())
                .map_err(|_| DestinationError::Credentials(format!("{id}: {key} is not UTF-8")))?;
            let value = value.trim();
            if value.is_empty() {
                return Err(DestinationError::Credentials(format!("{id}: missing {key}")));
            }
            Ok(value.to_string())
        };

        Ok(ApiCredentials {
            api_id: field(API_ID)?,
            api_key: SecretString::from(field(API_KEY)?),
        })
    }

    /// Fails with a precondition error unless the site can serve SSL
    async fn check_site(
        &self,
        credentials: &ApiCredentials,
        site_id: &str,
    ) -> Result<(), DestinationError> {
        let url = &self.url;
        let status: SiteStatusOutput = self
            .client
            .post(format!("{url}/sites/status"))
            .form(&[
                (API_ID, credentials.api_id.as_str()),
                (API_KEY, credentials.api_key.expose_secret()),
                ("site_id", site_id),
            ])
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|err| DestinationError::Remote(err.into()))?
            .json()
            .await
            .map_err(|err| DestinationError::Remote(err.into()))?;

        if status.res != 0 {
            return Err(DestinationError::Remote(anyhow!(
                "site status {site_id}: {} (res={})",
                status.res_message,
                status.res
            )));
        }

        let ssl_detected = status
            .ssl
            .and_then(|ssl| ssl.origin_server)
            .is_some_and(|origin| origin.detected);
        if !ssl_detected {
            return Err(DestinationError::Precondition(format!(
                "site {site_id} has no SSL support detected"
            )));
        }

        Ok(())
    }

    async fn upload(
        &self,
        credentials: &ApiCredentials,
        site_id: &str,
        bundle: &CertificateBundle,
    ) -> Result<(), DestinationError> {
        let url = &self.url;
        let certificate = STANDARD.encode(bundle.fullchain());
        let private_key = STANDARD.encode(bundle.private_key());

        let output: ApiOutput = self
            .client
            .post(format!("{url}/sites/customCertificate/upload"))
            .form(&[
                (API_ID, credentials.api_id.as_str()),
                (API_KEY, credentials.api_key.expose_secret()),
                ("site_id", site_id),
                ("certificate", certificate.as_str()),
                ("private_key", private_key.as_str()),
            ])
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|err| DestinationError::Remote(err.into()))?
            .json()
            .await
            .map_err(|err| DestinationError::Remote(err.into()))?;

        if output.res != 0 {
            return Err(DestinationError::Remote(anyhow!(
                "upload to site {site_id}: {} (res={})",
                output.res_message,
                output.res
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl DestinationAdapter for IncapsulaDestination {
    fn name(&self) -> &'static str {
        "incapsula"
    }

    fn selects(&self, secret: &TlsSecret) -> bool {
        secret.annotation(&self.keys.incapsula_site_id).is_some()
    }

    fn reference_annotation(&self) -> Option<&str> {
        None
    }

    async fn sync(
        &self,
        bundle: &CertificateBundle,
        _existing_reference: Option<&str>,
        secret: &TlsSecret,
    ) -> Result<String, DestinationError> {
        let site_id = secret
            .annotation(&self.keys.incapsula_site_id)
            .ok_or_else(|| DestinationError::Rejected("no site id".to_string()))?;

        let credentials = self.credentials(secret).await?;
        self.check_site(&credentials, site_id).await?;
        self.upload(&credentials, site_id, bundle).await?;

        debug!(site_id, "uploaded custom certificate");

        Ok(site_id.to_string())
    }
}

#[derive(Deserialize)]
struct ApiOutput {
    res: i64,
    #[serde(default)]
    res_message: String,
}

#[derive(Deserialize)]
struct SiteStatusOutput {
    res: i64,
    #[serde(default)]
    res_message: String,
    ssl: Option<SiteSsl>,
}

#[derive(Deserialize)]
struct SiteSsl {
    origin_server: Option<OriginServer>,
}

#[derive(Deserialize)]
struct OriginServer {
    #[serde(default)]
    detected: bool,
}
