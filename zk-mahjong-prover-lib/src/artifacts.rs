//! Content-addressed artifact cache on top of the persistent [`BlobStore`].
//!
//! Cached bytes are trusted only when their recomputed digest matches the descriptor.
//! A stale or corrupted entry is replaced by a fresh download. A freshly downloaded
//! copy that fails verification is still persisted and returned, with a warning:
//! the consumer of the bytes will reject them if they are unusable, and this layer
//! has no way to repair a bad remote source.

use crate::digest::{DigestAlgorithm, digests_match};
use crate::error::{Error, Result};
use crate::fetch::Fetcher;
use crate::state::BlobStore;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};
use url::Url;

/// Describes one cacheable, externally verifiable blob.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArtifactDescriptor {
    pub key: String,
    pub remote_locator: Url,
    pub expected_digest: String,
    pub algorithm: DigestAlgorithm,
}

/// How [`ArtifactStore::ensure`] obtained the bytes it returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureStatus {
    /// Served from the store; the digest matched.
    Cached,
    /// Missing or stale locally; downloaded and verified.
    Refetched,
    /// Downloaded, but the remote copy did not match the expected digest.
    RefetchedUnverified,
}

#[derive(Debug, Clone)]
pub struct Ensured {
    pub bytes: Bytes,
    pub status: EnsureStatus,
}

/// Cache of setup artifacts: digest-verified downloads plus raw pass-through access.
#[derive(Clone)]
pub struct ArtifactStore {
    blobs: BlobStore,
    fetcher: Arc<dyn Fetcher>,
    // One async lock per key so concurrent ensure() calls download once
    in_flight: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl ArtifactStore {
    pub fn new(blobs: BlobStore, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            blobs,
            fetcher,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn fetcher(&self) -> &Arc<dyn Fetcher> {
        &self.fetcher
    }

    /// Returns the verified bytes of `descriptor`, downloading them when the local
    /// copy is absent or its digest does not match.
    pub async fn ensure(&self, descriptor: &ArtifactDescriptor) -> Result<Ensured> {
        let key_lock = self.key_lock(&descriptor.key)?;
        let _guard = key_lock.lock().await;

        if let Some(cached) = self.blobs.read(&descriptor.key).await? {
            let actual = compute_digest(descriptor.algorithm, cached.clone()).await?;
            if digests_match(&actual, &descriptor.expected_digest) {
                debug!(key = %descriptor.key, "Artifact served from cache");
                return Ok(Ensured {
                    bytes: cached,
                    status: EnsureStatus::Cached,
                });
            }
            let mismatch = Error::IntegrityError {
                key: descriptor.key.clone(),
                expected: descriptor.expected_digest.clone(),
                actual,
            };
            warn!(error = %mismatch, "Cached artifact is stale, refetching");
        }

        info!(key = %descriptor.key, locator = %descriptor.remote_locator, "Fetching artifact");
        let fresh = self.fetcher.fetch(&descriptor.remote_locator).await?;
        let actual = compute_digest(descriptor.algorithm, fresh.clone()).await?;
        let status = if digests_match(&actual, &descriptor.expected_digest) {
            EnsureStatus::Refetched
        } else {
            warn!(
                key = %descriptor.key,
                expected = %descriptor.expected_digest,
                %actual,
                "Downloaded artifact does not match its expected digest"
            );
            EnsureStatus::RefetchedUnverified
        };

        self.blobs.write(&descriptor.key, &fresh).await?;
        info!(key = %descriptor.key, len = fresh.len(), ?status, "Artifact stored");
        Ok(Ensured {
            bytes: fresh,
            status,
        })
    }

    pub async fn exists(&self, key: &str) -> Result<bool> {
        self.blobs.exists(key).await
    }

    pub async fn read_raw(&self, key: &str) -> Result<Option<Bytes>> {
        self.blobs.read(key).await
    }

    pub async fn write_raw(&self, key: &str, data: &[u8]) -> Result<()> {
        self.blobs.write(key, data).await
    }

    /// Explicitly evicts a cached artifact and its metadata.
    pub async fn evict(&self, key: &str) -> Result<bool> {
        let removed = self.blobs.remove(key).await?;
        if removed {
            info!(%key, "Artifact evicted");
        }
        Ok(removed)
    }

    pub fn record<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.blobs.read_record(key)
    }

    pub async fn write_record<T: Serialize>(&self, key: &str, record: &T) -> Result<()> {
        self.blobs.write_record(key, record).await
    }

    pub async fn clear_record(&self, key: &str) -> Result<bool> {
        self.blobs.remove_record(key).await
    }

    fn key_lock(&self, key: &str) -> Result<Arc<tokio::sync::Mutex<()>>> {
        let mut in_flight = self.in_flight.lock()?;
        // Drop locks nobody is holding or waiting on
        in_flight.retain(|_, lock| Arc::strong_count(lock) > 1);
        Ok(in_flight.entry(key.to_string()).or_default().clone())
    }
}

pub(crate) async fn compute_digest(algorithm: DigestAlgorithm, data: Bytes) -> Result<String> {
    Ok(tokio::task::spawn_blocking(move || algorithm.compute(&data)).await?)
}

/// Provenance of a built proving key: the inputs it was derived from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Provenance {
    pub constraint_system_locator: String,
    pub srs_digest: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::CountingFetcher;
    use tempfile::{TempDir, tempdir};

    fn descriptor(key: &str, locator: &str, data: &[u8]) -> ArtifactDescriptor {
        ArtifactDescriptor {
            key: key.to_string(),
            remote_locator: Url::parse(locator).unwrap(),
            expected_digest: DigestAlgorithm::Blake3.compute(data),
            algorithm: DigestAlgorithm::Blake3,
        }
    }

    fn store(fetcher: Arc<CountingFetcher>) -> (TempDir, ArtifactStore) {
        let dir = tempdir().unwrap();
        let blobs = BlobStore::open(dir.path().to_path_buf(), "test").unwrap();
        (dir, ArtifactStore::new(blobs, fetcher))
    }

    const PTAU: &str = "ipfs://bafyptau/pot_08.ptau";

    #[tokio::test]
    async fn downloads_once_then_serves_cache() {
        let fetcher = Arc::new(CountingFetcher::new().with(PTAU, b"tau-08"));
        let (_dir, artifacts) = store(fetcher.clone());
        let d = descriptor("ptau_08", PTAU, b"tau-08");

        let first = artifacts.ensure(&d).await.unwrap();
        assert_eq!(first.status, EnsureStatus::Refetched);
        assert_eq!(&first.bytes[..], b"tau-08");

        let second = artifacts.ensure(&d).await.unwrap();
        assert_eq!(second.status, EnsureStatus::Cached);
        assert_eq!(&second.bytes[..], b"tau-08");
        assert_eq!(fetcher.count(PTAU), 1);
    }

    #[tokio::test]
    async fn stale_cache_is_refetched_exactly_once() {
        let fetcher = Arc::new(CountingFetcher::new().with(PTAU, b"tau-08"));
        let (_dir, artifacts) = store(fetcher.clone());
        let d = descriptor("ptau_08", PTAU, b"tau-08");

        artifacts.write_raw("ptau_08", b"corrupted").await.unwrap();

        let refreshed = artifacts.ensure(&d).await.unwrap();
        assert_eq!(refreshed.status, EnsureStatus::Refetched);
        assert_eq!(&refreshed.bytes[..], b"tau-08");
        assert_eq!(fetcher.count(PTAU), 1);

        // Consistent from now on
        for _ in 0..3 {
            assert_eq!(artifacts.ensure(&d).await.unwrap().status, EnsureStatus::Cached);
        }
        assert_eq!(fetcher.count(PTAU), 1);
    }

    #[tokio::test]
    async fn unverified_download_is_kept_and_returned() {
        let fetcher = Arc::new(CountingFetcher::new().with(PTAU, b"something else"));
        let (_dir, artifacts) = store(fetcher.clone());
        let d = descriptor("ptau_08", PTAU, b"tau-08");

        let ensured = artifacts.ensure(&d).await.unwrap();
        assert_eq!(ensured.status, EnsureStatus::RefetchedUnverified);
        assert_eq!(&ensured.bytes[..], b"something else");
        assert_eq!(
            artifacts.read_raw("ptau_08").await.unwrap().as_deref(),
            Some(&b"something else"[..])
        );

        // Still mismatching, so the next call downloads again
        artifacts.ensure(&d).await.unwrap();
        assert_eq!(fetcher.count(PTAU), 2);
    }

    #[tokio::test]
    async fn fetch_failure_propagates() {
        let fetcher = Arc::new(CountingFetcher::new());
        let (_dir, artifacts) = store(fetcher.clone());
        let d = descriptor("ptau_08", PTAU, b"tau-08");

        let err = artifacts.ensure(&d).await.unwrap_err();
        assert!(matches!(err, Error::FetchError(_)));
        assert!(!artifacts.exists("ptau_08").await.unwrap());
    }

    #[tokio::test]
    async fn concurrent_ensure_downloads_once() {
        let fetcher = Arc::new(CountingFetcher::new().with(PTAU, b"tau-08"));
        let (_dir, artifacts) = store(fetcher.clone());
        let d = descriptor("ptau_08", PTAU, b"tau-08");

        let results =
            futures::future::join_all((0..4).map(|_| artifacts.ensure(&d))).await;
        for result in results {
            assert_eq!(&result.unwrap().bytes[..], b"tau-08");
        }
        assert_eq!(fetcher.count(PTAU), 1);
    }

    #[tokio::test]
    async fn evict_forces_download() {
        let fetcher = Arc::new(CountingFetcher::new().with(PTAU, b"tau-08"));
        let (_dir, artifacts) = store(fetcher.clone());
        let d = descriptor("ptau_08", PTAU, b"tau-08");

        artifacts.ensure(&d).await.unwrap();
        assert!(artifacts.evict("ptau_08").await.unwrap());
        assert_eq!(artifacts.ensure(&d).await.unwrap().status, EnsureStatus::Refetched);
        assert_eq!(fetcher.count(PTAU), 2);
    }
}
