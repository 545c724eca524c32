use certsync_domain::{
    error::{CacheClosed, DestinationError, MalformedCertificateError, StoreError},
    secret::SecretId,
};
use tracing::{error, info, warn};

#[derive(thiserror::Error, Debug)]
pub enum CycleError {
    #[error("could not fetch secrets: {0}")]
    Fetch(#[source] StoreError),
}

/// Why one secret could not be synced to one destination
#[derive(thiserror::Error, Debug)]
pub enum SecretSyncError {
    #[error("malformed certificate: {0}")]
    Malformed(#[from] MalformedCertificateError),

    #[error("destination: {0}")]
    Destination(#[from] DestinationError),

    /// The destination holds the certificate but the secret does not know the reference.
    /// The next cycle syncs again, which may create a duplicate at the destination.
    #[error("synced as {reference} but the reference could not be written back: {source}")]
    WriteBack {
        reference: String,
        #[source]
        source: StoreError,
    },

    #[error(transparent)]
    Cache(#[from] CacheClosed),
}

#[derive(Debug)]
pub enum Outcome {
    Synced { reference: String },
    Unchanged,
    Failed(SecretSyncError),
}

#[derive(Debug)]
pub struct SecretOutcome {
    /// `None` when the secret failed before any destination was involved
    pub destination: Option<&'static str>,
    pub secret: SecretId,
    pub outcome: Outcome,
}

/// Everything that happened during one cycle
#[derive(Default, Debug)]
pub struct CycleReport {
    pub outcomes: Vec<SecretOutcome>,
}

impl CycleReport {
    pub fn synced(&self) -> impl Iterator<Item = (&SecretOutcome, &str)> {
        self.outcomes.iter().filter_map(|o| match &o.outcome {
            Outcome::Synced { reference } => Some((o, reference.as_str())),
            _ => None,
        })
    }

    pub fn failures(&self) -> impl Iterator<Item = (&SecretOutcome, &SecretSyncError)> {
        self.outcomes.iter().filter_map(|o| match &o.outcome {
            Outcome::Failed(err) => Some((o, err)),
            _ => None,
        })
    }

    pub fn unchanged_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.outcome, Outcome::Unchanged))
            .count()
    }

    /// Fails when any secret failed, for callers that turn a cycle into an exit status
    pub fn ensure_success(&self) -> anyhow::Result<()> {
        let failed = self.failures().count();
        if failed > 0 {
            anyhow::bail!("{failed} secrets failed to sync");
        }
        Ok(())
    }

    /// Log all failures and a summary line
    pub fn log(&self) {
        for (outcome, err) in self.failures() {
            let secret = &outcome.secret;
            let destination = outcome.destination.unwrap_or("-");

            match err {
                SecretSyncError::Destination(DestinationError::Precondition(_)) => {
                    warn!(%secret, destination, "{err}");
                }
                SecretSyncError::WriteBack { reference, .. } => {
                    error!(%secret, destination, %reference, "{err}, manual recovery may be needed");
                }
                _ => {
                    error!(%secret, destination, "{err}");
                }
            }
        }

        info!(
            synced = self.synced().count(),
            unchanged = self.unchanged_count(),
            failed = self.failures().count(),
            "cycle finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(name: &str, outcome: Outcome) -> SecretOutcome {
        SecretOutcome {
            destination: Some("acm"),
            secret: SecretId::new("default", name),
            outcome,
        }
    }

    #[test]
    fn success_requires_no_failures() {
        let mut report = CycleReport::default();
        report.outcomes.push(outcome(
            "a",
            Outcome::Synced {
                reference: "arn:example:1".to_string(),
            },
        ));
        report.outcomes.push(outcome("b", Outcome::Unchanged));
        assert!(report.ensure_success().is_ok());

        report.outcomes.push(outcome(
            "c",
            Outcome::Failed(MalformedCertificateError::NoCertificate.into()),
        ));
        let err = report.ensure_success().unwrap_err();
        assert_eq!(err.to_string(), "1 secrets failed to sync");
    }
}
