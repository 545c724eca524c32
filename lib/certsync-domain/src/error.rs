use std::time::Duration;

/// The certificate bundle of a secret could not be decomposed.
///
/// Fatal for that secret until its data changes.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum MalformedCertificateError {
    #[error("no PEM certificate block found in bundle")]
    NoCertificate,

    #[error("leaf certificate block has no end marker")]
    UnterminatedLeaf,
}

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("secret store request failed: {0}")]
    Request(#[source] anyhow::Error),

    #[error("secret store request timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(thiserror::Error, Debug)]
pub enum DestinationError {
    /// The destination is not in a state where the certificate can be accepted.
    /// Nothing was uploaded.
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// The input was refused before any remote call was made
    #[error("rejected: {0}")]
    Rejected(String),

    #[error("credentials: {0}")]
    Credentials(String),

    #[error("remote: {0:#}")]
    Remote(#[source] anyhow::Error),

    /// The outcome at the destination is unknown
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(thiserror::Error, Debug)]
#[error("change cache task is not running")]
pub struct CacheClosed;
