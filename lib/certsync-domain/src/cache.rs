use std::collections::HashMap;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::error::CacheClosed;

/// Last successfully synced leaf certificate per secret identity.
///
/// Entries are replaced, never merged, and never removed.
#[derive(Default, Debug)]
pub struct ChangeCache {
    entries: HashMap<String, Vec<u8>>,
}

impl ChangeCache {
    /// True if the identity was never recorded or its leaf differs from `leaf`.
    pub fn has_changed(&self, identity: &str, leaf: &[u8]) -> bool {
        !matches!(self.entries.get(identity), Some(stored) if stored == leaf)
    }

    /// Must only be called after the destination sync succeeded.
    pub fn record(&mut self, identity: impl Into<String>, leaf: impl Into<Vec<u8>>) {
        self.entries.insert(identity.into(), leaf.into());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

enum CacheRequest {
    HasChanged {
        destination: &'static str,
        identity: String,
        leaf: Vec<u8>,
        reply: oneshot::Sender<bool>,
    },
    Record {
        destination: &'static str,
        identity: String,
        leaf: Vec<u8>,
        reply: oneshot::Sender<()>,
    },
}

/// Handle to the task owning one [ChangeCache] per destination.
///
/// Every read and write goes through that single task, so concurrent
/// destination tasks never race on the same entry.
#[derive(Clone)]
pub struct CacheHandle {
    tx: mpsc::Sender<CacheRequest>,
}

impl CacheHandle {
    /// Spawn the owning task. It exits when the last handle is dropped.
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(cache_task(rx));
        Self { tx }
    }

    /// Asks whether `leaf` differs from what was last synced to `destination`.
    ///
    /// Answers `true` when the cache task is gone, so the secret gets synced again.
    pub async fn has_changed(&self, destination: &'static str, identity: &str, leaf: &[u8]) -> bool {
        let (reply, rx) = oneshot::channel();
        let request = CacheRequest::HasChanged {
            destination,
            identity: identity.to_string(),
            leaf: leaf.to_vec(),
            reply,
        };

        if self.tx.send(request).await.is_err() {
            warn!("change cache closed, treating {identity} as changed");
            return true;
        }

        rx.await.unwrap_or(true)
    }

    pub async fn record(
        &self,
        destination: &'static str,
        identity: &str,
        leaf: &[u8],
    ) -> Result<(), CacheClosed> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(CacheRequest::Record {
                destination,
                identity: identity.to_string(),
                leaf: leaf.to_vec(),
                reply,
            })
            .await
            .map_err(|_| CacheClosed)?;

        rx.await.map_err(|_| CacheClosed)
    }
}

async fn cache_task(mut rx: mpsc::Receiver<CacheRequest>) {
    let mut caches: HashMap<&'static str, ChangeCache> = HashMap::new();

    while let Some(request) = rx.recv().await {
        match request {
            CacheRequest::HasChanged {
                destination,
                identity,
                leaf,
                reply,
            } => {
                let changed = caches
                    .get(destination)
                    .is_none_or(|cache| cache.has_changed(&identity, &leaf));
                let _ = reply.send(changed);
            }
            CacheRequest::Record {
                destination,
                identity,
                leaf,
                reply,
            } => {
                let cache = caches.entry(destination).or_default();
                cache.record(identity, leaf);
                debug!(destination, entries = cache.len(), "recorded sync");
                let _ = reply.send(());
            }
        }
    }

    debug!("change cache task exiting");
}
