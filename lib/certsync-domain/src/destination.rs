use async_trait::async_trait;

use crate::{bundle::CertificateBundle, error::DestinationError, secret::TlsSecret};

/// An external certificate store that bundles get replicated to.
#[async_trait]
pub trait DestinationAdapter: Send + Sync {
    /// Short stable name, also used as the change cache partition
    fn name(&self) -> &'static str;

    /// Whether the secret is configured for replication to this destination
    fn selects(&self, secret: &TlsSecret) -> bool;

    /// The annotation the returned reference is written back to, if any
    fn reference_annotation(&self) -> Option<&str>;

    /// Create or update the certificate at the destination.
    ///
    /// With an `existing_reference` the resource is updated in place,
    /// otherwise a new one is created and tagged with the bundle identity.
    /// Returns the destination reference.
    async fn sync(
        &self,
        bundle: &CertificateBundle,
        existing_reference: Option<&str>,
        secret: &TlsSecret,
    ) -> Result<String, DestinationError>;
}
