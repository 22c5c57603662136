//! Fakes shared by the unit tests.

use crate::error::{Error, Result};
use crate::fetch::Fetcher;
use crate::proof_system::ProofSystem;
use crate::types::{CircuitArtifacts, FullProof};
use async_trait::async_trait;
use bytes::Bytes;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use url::Url;

pub(crate) fn setup_log() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// In-memory fetcher that counts requests per locator.
#[derive(Default)]
pub(crate) struct CountingFetcher {
    blobs: Mutex<HashMap<String, Bytes>>,
    counts: Mutex<HashMap<String, usize>>,
}

impl CountingFetcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with(self, locator: &str, data: &[u8]) -> Self {
        self.set(locator, data);
        self
    }

    pub(crate) fn set(&self, locator: &str, data: &[u8]) {
        self.blobs
            .lock()
            .unwrap()
            .insert(locator.to_string(), Bytes::copy_from_slice(data));
    }

    pub(crate) fn count(&self, locator: &str) -> usize {
        self.counts
            .lock()
            .unwrap()
            .get(locator)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl Fetcher for CountingFetcher {
    async fn fetch(&self, locator: &Url) -> Result<Bytes> {
        *self
            .counts
            .lock()
            .unwrap()
            .entry(locator.to_string())
            .or_default() += 1;
        // Let concurrent callers interleave
        tokio::task::yield_now().await;
        self.blobs
            .lock()
            .unwrap()
            .get(locator.as_str())
            .cloned()
            .ok_or_else(|| Error::FetchError(format!("no such blob: {}", locator)))
    }
}

/// Deterministic stand-in for the proving backend.
///
/// Proving keys are a hash of their inputs. Job inputs may carry `delay_ms`,
/// `fail` or `panic` to steer the computation.
#[derive(Default)]
pub(crate) struct FakeProofSystem {
    setups: AtomicUsize,
}

impl FakeProofSystem {
    pub(crate) fn setups(&self) -> usize {
        self.setups.load(Ordering::SeqCst)
    }
}

pub(crate) fn fake_proving_key(constraint_system: &[u8], srs: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(constraint_system);
    hasher.update(srs);
    hasher.finalize().to_vec()
}

impl ProofSystem for FakeProofSystem {
    fn setup(&self, constraint_system: &[u8], srs: &[u8]) -> Result<Vec<u8>> {
        self.setups.fetch_add(1, Ordering::SeqCst);
        if constraint_system.starts_with(b"broken") {
            return Err(Error::SetupFailure("constraint system does not parse".into()));
        }
        Ok(fake_proving_key(constraint_system, srs))
    }

    fn prove(&self, input: &serde_json::Value, artifacts: &CircuitArtifacts) -> Result<FullProof> {
        if let Some(ms) = input.get("delay_ms").and_then(|v| v.as_u64()) {
            std::thread::sleep(Duration::from_millis(ms));
        }
        if input.get("panic").is_some() {
            panic!("prover blew up");
        }
        if input.get("fail").is_some() {
            return Err(Error::ComputationFault("unsatisfied constraint".into()));
        }
        Ok(FullProof {
            proof: json!({
                "circuit": artifacts.circuit,
                "zkey": hex::encode(&artifacts.proving_key),
            }),
            public_signals: vec![input.to_string()],
        })
    }
}
