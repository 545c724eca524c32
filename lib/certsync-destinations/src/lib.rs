use std::sync::Arc;

use certsync_domain::{destination::DestinationAdapter, secret::AnnotationKeys, store::SecretStore};
use tracing::info;

pub use acm::{AcmDestination, AwsParams};
pub use incapsula::{IncapsulaDestination, DEFAULT_API_URL as DEFAULT_INCAPSULA_API_URL};

mod acm;
mod incapsula;

/// Builds every destination the controller replicates to.
pub struct DestinationsBuilder {
    pub keys: AnnotationKeys,
    pub aws: AwsParams,
    pub incapsula_api_url: String,
    /// Used by destinations that keep their credentials in secrets
    pub store: Arc<dyn SecretStore>,
    pub http_client: reqwest::Client,
}

impl DestinationsBuilder {
    pub async fn build(self) -> Vec<Arc<dyn DestinationAdapter>> {
        let acm = AcmDestination::from_env(&self.aws, self.keys.clone()).await;
        let incapsula = IncapsulaDestination::new(
            self.incapsula_api_url,
            self.http_client,
            self.store,
            self.keys,
        );

        let destinations: Vec<Arc<dyn DestinationAdapter>> = vec![Arc::new(acm), Arc::new(incapsula)];

        for destination in &destinations {
            info!(destination = destination.name(), "destination configured");
        }

        destinations
    }
}
