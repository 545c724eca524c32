use anyhow::anyhow;
use async_trait::async_trait;
use aws_config::{sts::AssumeRoleProvider, BehaviorVersion};
use aws_sdk_acm::{
    config::Region, error::DisplayErrorContext, primitives::Blob, types::Tag, Client,
};
use certsync_domain::{
    bundle::CertificateBundle, destination::DestinationAdapter, error::DestinationError,
    secret::{AnnotationKeys, TlsSecret},
};
use tracing::{debug, info};

const DEFAULT_STS_SESSION_NAME: &str = "certsync";

/// Parameters for the AWS session
#[derive(Clone, Default, Debug)]
pub struct AwsParams {
    pub region: Option<String>,
    /// Role to assume before talking to ACM
    pub sts_role_name: Option<String>,
    pub sts_session_name: Option<String>,
}

/// Replicates bundles to AWS Certificate Manager with `ImportCertificate`.
pub struct AcmDestination {
    client: Client,
    keys: AnnotationKeys,
}

impl AcmDestination {
    pub fn new(client: Client, keys: AnnotationKeys) -> Self {
        Self { client, keys }
    }

    /// Create a client from the default AWS credential chain,
    /// optionally assuming a role.
    pub async fn from_env(params: &AwsParams, keys: AnnotationKeys) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &params.region {
            loader = loader.region(Region::new(region.clone()));
        }
        let sdk_config = loader.load().await;

        let mut acm_config = aws_sdk_acm::config::Builder::from(&sdk_config);

        if let Some(role) = params
            .sts_role_name
            .as_deref()
            .map(str::trim)
            .filter(|role| !role.is_empty())
        {
            info!(role, "assuming role for ACM");
            let provider = AssumeRoleProvider::builder(role)
                .session_name(
                    params
                        .sts_session_name
                        .as_deref()
                        .unwrap_or(DEFAULT_STS_SESSION_NAME),
                )
                .configure(&sdk_config)
                .build()
                .await;
            acm_config = acm_config.credentials_provider(provider);
        }

        Self::new(Client::from_conf(acm_config.build()), keys)
    }
}

#[async_trait]
impl DestinationAdapter for AcmDestination {
    fn name(&self) -> &'static str {
        "acm"
    }

    fn selects(&self, secret: &TlsSecret) -> bool {
        self.keys.is_true(secret, &self.keys.acm_enabled)
    }

    fn reference_annotation(&self) -> Option<&str> {
        Some(&self.keys.acm_certificate_arn)
    }

    async fn sync(
        &self,
        bundle: &CertificateBundle,
        existing_reference: Option<&str>,
        _secret: &TlsSecret,
    ) -> Result<String, DestinationError> {
        if bundle.private_key().is_empty() {
            return Err(DestinationError::Rejected("private key is empty".to_string()));
        }
        if bundle.chain().is_empty() {
            return Err(DestinationError::Rejected(
                "certificate chain is empty".to_string(),
            ));
        }

        let mut request = self
            .client
            .import_certificate()
            .certificate(Blob::new(bundle.leaf()))
            .certificate_chain(Blob::new(bundle.chain()))
            .private_key(Blob::new(bundle.private_key()));

        match existing_reference {
            Some(arn) => {
                debug!(arn, "re-importing certificate");
                request = request.certificate_arn(arn);
            }
            None => {
                // ACM only accepts tags when the certificate is first imported
                let tag = Tag::builder()
                    .key(&self.keys.secret_name_tag)
                    .value(bundle.identity())
                    .build()
                    .map_err(|err| DestinationError::Rejected(err.to_string()))?;
                request = request.tags(tag);
            }
        }

        let output = request
            .send()
            .await
            .map_err(|err| DestinationError::Remote(anyhow!("{}", DisplayErrorContext(&err))))?;

        output
            .certificate_arn()
            .map(str::to_string)
            .ok_or_else(|| DestinationError::Remote(anyhow!("no certificate ARN in response")))
    }
}
