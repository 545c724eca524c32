use std::fmt::Debug;

use crate::error::MalformedCertificateError;

/// The marker every PEM certificate block starts with.
pub const BEGIN_CERTIFICATE: &[u8] = b"-----BEGIN CERTIFICATE-----";

const END_CERTIFICATE: &[u8] = b"-----END CERTIFICATE-----";

/// One TLS identity extracted from a secret.
///
/// A bundle is always built fresh from the current secret data and never mutated.
#[derive(Clone, PartialEq, Eq)]
pub struct CertificateBundle {
    identity: String,
    leaf: Vec<u8>,
    chain: Vec<u8>,
    private_key: Vec<u8>,
}

impl CertificateBundle {
    /// The identity of the secret this bundle was decomposed from
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// The PEM-encoded end-entity certificate
    pub fn leaf(&self) -> &[u8] {
        &self.leaf
    }

    /// The PEM-encoded intermediates following the leaf, possibly empty
    pub fn chain(&self) -> &[u8] {
        &self.chain
    }

    pub fn private_key(&self) -> &[u8] {
        &self.private_key
    }

    /// Leaf followed by the chain, in original order.
    pub fn fullchain(&self) -> Vec<u8> {
        [self.leaf.as_slice(), self.chain.as_slice()].concat()
    }

    /// Parse the leaf certificate for reporting purposes.
    pub fn leaf_info(&self) -> anyhow::Result<LeafInfo> {
        let pem = pem::parse(&self.leaf)?;
        let (_, cert) = x509_parser::parse_x509_certificate(pem.contents())?;

        Ok(LeafInfo {
            subject: cert.subject().to_string(),
            serial: cert.raw_serial_as_string(),
            not_after: cert.validity().not_after.to_string(),
        })
    }
}

impl Debug for CertificateBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateBundle")
            .field("identity", &self.identity)
            .field("leaf_len", &self.leaf.len())
            .field("chain_len", &self.chain.len())
            .finish_non_exhaustive()
    }
}

/// Human readable facts about a leaf certificate
#[derive(Clone, Debug)]
pub struct LeafInfo {
    pub subject: String,
    pub serial: String,
    pub not_after: String,
}

/// Split a concatenated PEM bundle into leaf, chain and key.
///
/// The first certificate block is the leaf, everything from the second block
/// marker onwards is the chain. Bytes before the first marker are discarded.
/// The CA input is accepted but not consumed; it is reserved for validation.
pub fn decompose(
    identity: impl Into<String>,
    _ca: Option<&[u8]>,
    bundle: &[u8],
    private_key: &[u8],
) -> Result<CertificateBundle, MalformedCertificateError> {
    let starts = marker_positions(bundle);

    let Some(&leaf_start) = starts.first() else {
        return Err(MalformedCertificateError::NoCertificate);
    };
    let leaf_end = starts.get(1).copied().unwrap_or(bundle.len());
    let leaf = &bundle[leaf_start..leaf_end];

    if find(&leaf[BEGIN_CERTIFICATE.len()..], END_CERTIFICATE).is_none() {
        return Err(MalformedCertificateError::UnterminatedLeaf);
    }

    Ok(CertificateBundle {
        identity: identity.into(),
        leaf: leaf.to_vec(),
        chain: bundle[leaf_end..].to_vec(),
        private_key: private_key.to_vec(),
    })
}

fn marker_positions(haystack: &[u8]) -> Vec<usize> {
    let mut positions = vec![];
    let mut offset = 0;

    while let Some(pos) = find(&haystack[offset..], BEGIN_CERTIFICATE) {
        positions.push(offset + pos);
        offset += pos + BEGIN_CERTIFICATE.len();
    }

    positions
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
