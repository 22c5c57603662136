//! Session setup: shared SRS files, then every configured circuit.
//!
//! Either every circuit ends up provable or [`SetupPipeline::prepare`] fails with one
//! aggregate [`Error::SetupFailure`]; a partially prepared session is never returned.

use crate::artifacts::{ArtifactStore, EnsureStatus, compute_digest};
use crate::config::{ProverConfig, SessionConfig};
use crate::error::{Error, Result};
use crate::fetch::HttpFetcher;
use crate::jobs::{KeyOrigin, PreparedCircuit, SrsMaterial, prepare_circuit};
use crate::proof_system::ProofSystem;
use crate::state::BlobStore;
use crate::types::{CircuitArtifacts, CircuitKind};
use futures::future::join_all;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{error, info};

/// Artifacts of every circuit of a session, keyed by kind.
#[derive(Debug, Clone, Default)]
pub struct PreparedCircuits {
    circuits: BTreeMap<CircuitKind, PreparedCircuit>,
}

impl PreparedCircuits {
    pub fn get(&self, circuit: CircuitKind) -> Option<&CircuitArtifacts> {
        self.circuits.get(&circuit).map(|prepared| &prepared.artifacts)
    }

    pub fn origin(&self, circuit: CircuitKind) -> Option<KeyOrigin> {
        self.circuits.get(&circuit).map(|prepared| prepared.origin)
    }

    pub fn iter(&self) -> impl Iterator<Item = (CircuitKind, &PreparedCircuit)> {
        self.circuits.iter().map(|(kind, prepared)| (*kind, prepared))
    }

    pub fn len(&self) -> usize {
        self.circuits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.circuits.is_empty()
    }
}

#[derive(Clone)]
pub struct SetupPipeline {
    artifacts: ArtifactStore,
    proof_system: Arc<dyn ProofSystem>,
}

impl SetupPipeline {
    pub fn new(artifacts: ArtifactStore, proof_system: Arc<dyn ProofSystem>) -> Self {
        Self {
            artifacts,
            proof_system,
        }
    }

    /// Opens the persistent store described by `config` with an HTTP fetcher.
    pub fn open(config: &ProverConfig, proof_system: Arc<dyn ProofSystem>) -> Result<Self> {
        let blobs = BlobStore::open(config.data_dir.clone(), &config.namespace)?;
        let fetcher = Arc::new(HttpFetcher::new(config.ipfs_gateway.clone()));
        Ok(Self::new(ArtifactStore::new(blobs, fetcher), proof_system))
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    pub fn proof_system(&self) -> &Arc<dyn ProofSystem> {
        &self.proof_system
    }

    pub async fn prepare(&self, session: &SessionConfig) -> Result<PreparedCircuits> {
        session
            .validate()
            .map_err(|e| Error::SetupFailure(e.to_string()))?;
        info!(circuits = session.circuits.len(), "Preparing session");

        // Each degree class is ensured once, however many circuits share it
        let degrees: BTreeSet<u32> = session.circuits.iter().map(|setup| setup.degree).collect();
        let ensured = join_all(degrees.iter().map(|&degree| self.ensure_srs(session, degree))).await;
        let mut srs = BTreeMap::new();
        let mut failures = Vec::new();
        for (degree, result) in degrees.iter().zip(ensured) {
            match result {
                Ok(material) => {
                    srs.insert(*degree, material);
                }
                Err(e) => failures.push(format!("SRS degree {}: {}", degree, e)),
            }
        }
        if !failures.is_empty() {
            return Err(aggregate(failures));
        }

        let prepared = join_all(session.circuits.iter().map(|setup| {
            let srs = &srs;
            async move {
                let material = srs.get(&setup.degree).ok_or_else(|| {
                    Error::Internal(format!("SRS degree {} was not ensured", setup.degree))
                })?;
                prepare_circuit(&self.artifacts, &self.proof_system, setup, material).await
            }
        }))
        .await;

        let mut circuits = BTreeMap::new();
        for (setup, result) in session.circuits.iter().zip(prepared) {
            match result {
                Ok(circuit) => {
                    circuits.insert(setup.circuit, circuit);
                }
                Err(e) => failures.push(format!("{}: {}", setup.circuit, e)),
            }
        }
        if !failures.is_empty() {
            return Err(aggregate(failures));
        }

        info!(circuits = circuits.len(), "Session prepared");
        Ok(PreparedCircuits { circuits })
    }

    async fn ensure_srs(&self, session: &SessionConfig, degree: u32) -> Result<SrsMaterial> {
        let descriptor = session.srs_descriptor(degree).ok_or_else(|| {
            Error::SetupFailure(format!("no SRS configured for degree {}", degree))
        })?;
        let ensured = self.artifacts.ensure(&descriptor).await?;
        let digest = match ensured.status {
            EnsureStatus::RefetchedUnverified => {
                compute_digest(descriptor.algorithm, ensured.bytes.clone()).await?
            }
            EnsureStatus::Cached | EnsureStatus::Refetched => {
                descriptor.expected_digest.trim().to_ascii_lowercase()
            }
        };
        Ok(SrsMaterial {
            bytes: ensured.bytes,
            digest,
        })
    }
}

fn aggregate(failures: Vec<String>) -> Error {
    let message = failures.join("; ");
    error!(%message, "Session setup failed");
    Error::SetupFailure(message)
}
