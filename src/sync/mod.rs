//! The polling sync loop.
//!
//! Every cycle fetches all candidate secrets once, then runs one task per
//! destination. Within a destination, secrets are processed one after another
//! and a failing secret never stops the others.

use std::{sync::Arc, time::Duration};

use certsync_domain::{
    bundle::{decompose, CertificateBundle},
    cache::CacheHandle,
    destination::DestinationAdapter,
    error::{DestinationError, StoreError},
    secret::{AnnotationKeys, TlsSecret},
    store::SecretStore,
};
use futures_util::future::join_all;
use tokio::time::{timeout, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub use report::{CycleError, CycleReport, Outcome, SecretOutcome, SecretSyncError};

mod report;

/// Cache partition remembering the last decomposed bundle of each secret,
/// so malformed bundles are reported once per data change rather than every cycle.
const MALFORMED_PARTITION: &str = "malformed";

const DEFAULT_REMOTE_TIMEOUT: Duration = Duration::from_secs(30);

pub struct SyncOrchestrator {
    store: Arc<dyn SecretStore>,
    destinations: Vec<Arc<dyn DestinationAdapter>>,
    cache: CacheHandle,
    keys: AnnotationKeys,
    namespaces: Vec<String>,
    remote_timeout: Duration,
}

impl SyncOrchestrator {
    /// Spawns the change cache task, so this must run inside a tokio runtime.
    pub fn new(
        store: Arc<dyn SecretStore>,
        destinations: Vec<Arc<dyn DestinationAdapter>>,
        keys: AnnotationKeys,
    ) -> Self {
        Self {
            store,
            destinations,
            cache: CacheHandle::spawn(),
            keys,
            namespaces: vec![],
            remote_timeout: DEFAULT_REMOTE_TIMEOUT,
        }
    }

    pub fn with_namespaces(mut self, namespaces: Vec<String>) -> Self {
        self.namespaces = namespaces;
        self
    }

    pub fn with_remote_timeout(mut self, remote_timeout: Duration) -> Self {
        self.remote_timeout = remote_timeout;
        self
    }

    /// Run cycles until `shutdown` is cancelled.
    ///
    /// A cycle is always awaited before the next tick is taken, and ticks
    /// missed during a slow cycle are skipped, so cycles never overlap.
    pub async fn run(&self, interval: Duration, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.cancelled() => {
                    info!("exiting sync loop");
                    return;
                }
            }

            if let Err(err) = self.run_cycle().await {
                error!(?err, "sync cycle abandoned");
            }
        }
    }

    pub async fn run_cycle(&self) -> Result<CycleReport, CycleError> {
        let secrets = timeout(self.remote_timeout, self.store.list(&self.namespaces))
            .await
            .unwrap_or(Err(StoreError::Timeout(self.remote_timeout)))
            .map_err(CycleError::Fetch)?;

        let candidates: Vec<TlsSecret> = secrets
            .into_iter()
            .filter(|secret| secret.is_tls() && self.keys.is_sync_enabled(secret))
            .filter(|secret| self.destinations.iter().any(|d| d.selects(secret)))
            .collect();

        debug!(count = candidates.len(), "sync candidates");

        let mut report = CycleReport::default();
        let mut bundles = Vec::with_capacity(candidates.len());

        for secret in candidates {
            match self.decompose(&secret).await {
                Ok(Some(bundle)) => bundles.push((secret, bundle)),
                Ok(None) => {}
                Err(err) => report.outcomes.push(SecretOutcome {
                    destination: None,
                    secret: secret.id,
                    outcome: Outcome::Failed(err),
                }),
            }
        }

        let per_destination = join_all(
            self.destinations
                .iter()
                .map(|destination| self.sync_destination(destination.as_ref(), &bundles)),
        )
        .await;

        report.outcomes.extend(per_destination.into_iter().flatten());
        report.log();

        Ok(report)
    }

    /// Decompose the secret's bundle. Returns `None` for a bundle that was
    /// already reported as malformed and has not changed since.
    async fn decompose(
        &self,
        secret: &TlsSecret,
    ) -> Result<Option<CertificateBundle>, SecretSyncError> {
        let identity = secret.id.to_string();

        match decompose(
            identity.as_str(),
            secret.ca_crt(),
            secret.tls_crt(),
            secret.tls_key(),
        ) {
            Ok(bundle) => {
                // a later return to previously reported bytes must count as a change
                if let Err(cache_err) = self
                    .cache
                    .record(MALFORMED_PARTITION, &identity, secret.tls_crt())
                    .await
                {
                    warn!(?cache_err, "could not remember well-formed bundle");
                }
                Ok(Some(bundle))
            }
            Err(err) => {
                if !self
                    .cache
                    .has_changed(MALFORMED_PARTITION, &identity, secret.tls_crt())
                    .await
                {
                    debug!(secret = %secret.id, "bundle still malformed");
                    return Ok(None);
                }

                if let Err(cache_err) = self
                    .cache
                    .record(MALFORMED_PARTITION, &identity, secret.tls_crt())
                    .await
                {
                    warn!(?cache_err, "could not remember malformed bundle");
                }

                Err(err.into())
            }
        }
    }

    async fn sync_destination(
        &self,
        destination: &dyn DestinationAdapter,
        bundles: &[(TlsSecret, CertificateBundle)],
    ) -> Vec<SecretOutcome> {
        let mut outcomes = vec![];

        for (secret, bundle) in bundles {
            if !destination.selects(secret) {
                continue;
            }

            let outcome = if !self
                .cache
                .has_changed(destination.name(), bundle.identity(), bundle.leaf())
                .await
            {
                debug!(secret = %secret.id, destination = destination.name(), "unchanged");
                Outcome::Unchanged
            } else {
                match self.sync_secret(destination, secret, bundle).await {
                    Ok(reference) => Outcome::Synced { reference },
                    Err(err) => Outcome::Failed(err),
                }
            };

            outcomes.push(SecretOutcome {
                destination: Some(destination.name()),
                secret: secret.id.clone(),
                outcome,
            });
        }

        outcomes
    }

    #[tracing::instrument(skip_all, fields(secret = %secret.id, destination = destination.name()))]
    async fn sync_secret(
        &self,
        destination: &dyn DestinationAdapter,
        secret: &TlsSecret,
        bundle: &CertificateBundle,
    ) -> Result<String, SecretSyncError> {
        match bundle.leaf_info() {
            Ok(leaf) => info!(
                subject = %leaf.subject,
                serial = %leaf.serial,
                not_after = %leaf.not_after,
                "certificate changed"
            ),
            Err(err) => debug!(?err, "certificate changed, leaf not parseable"),
        }

        let reference_key = destination.reference_annotation();
        let existing_reference = reference_key.and_then(|key| secret.annotation(key));

        let reference = timeout(
            self.remote_timeout,
            destination.sync(bundle, existing_reference, secret),
        )
        .await
        .map_err(|_| DestinationError::Timeout(self.remote_timeout))??;

        if let Some(key) = reference_key {
            if existing_reference != Some(reference.as_str()) {
                timeout(
                    self.remote_timeout,
                    self.store.annotate(&secret.id, key, &reference),
                )
                .await
                .unwrap_or(Err(StoreError::Timeout(self.remote_timeout)))
                .map_err(|source| SecretSyncError::WriteBack {
                    reference: reference.clone(),
                    source,
                })?;
            }
        }

        self.cache
            .record(destination.name(), bundle.identity(), bundle.leaf())
            .await?;

        info!(%reference, "synced");

        Ok(reference)
    }
}
