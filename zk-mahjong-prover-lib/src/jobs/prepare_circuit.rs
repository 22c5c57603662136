use crate::artifacts::{ArtifactStore, Provenance, compute_digest};
use crate::config::CircuitSetup;
use crate::digest::DigestAlgorithm;
use crate::error::Result;
use crate::proof_system::ProofSystem;
use crate::types::{CircuitArtifacts, CircuitKind};
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, info};

/// SRS bytes for one degree class and the digest they are known by.
#[derive(Debug, Clone)]
pub struct SrsMaterial {
    pub bytes: Bytes,
    pub digest: String,
}

/// Whether a proving key came from the store or was built in this session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOrigin {
    Reused,
    Built,
}

#[derive(Debug, Clone)]
pub struct PreparedCircuit {
    pub artifacts: CircuitArtifacts,
    pub origin: KeyOrigin,
}

pub fn proving_key_key(circuit: CircuitKind) -> String {
    format!("zkey_{}", circuit.as_str())
}

pub fn constraint_system_key(sha256_hex: &str) -> String {
    format!("r1cs_{}", sha256_hex)
}

/// Brings one circuit to a provable state.
///
/// The constraint system is fetched and persisted under its content digest. The
/// stored proving key is reused only when its provenance names the same
/// constraint-system locator and the same SRS digest; otherwise a new key is built
/// on the blocking pool and its provenance recorded.
pub async fn prepare_circuit(
    artifacts: &ArtifactStore,
    proof_system: &Arc<dyn ProofSystem>,
    setup: &CircuitSetup,
    srs: &SrsMaterial,
) -> Result<PreparedCircuit> {
    info!(circuit = %setup.circuit, degree = setup.degree, "Preparing circuit");
    let fetcher = artifacts.fetcher();

    let constraint_system = fetcher.fetch(&setup.constraint_system).await?;
    let digest = compute_digest(DigestAlgorithm::Sha256, constraint_system.clone()).await?;
    let r1cs_key = constraint_system_key(&digest);
    if !artifacts.exists(&r1cs_key).await? {
        artifacts.write_raw(&r1cs_key, &constraint_system).await?;
    }
    debug!(circuit = %setup.circuit, key = %r1cs_key, "Constraint system stored");

    let zkey_key = proving_key_key(setup.circuit);
    let provenance = Provenance {
        constraint_system_locator: setup.constraint_system.to_string(),
        srs_digest: srs.digest.clone(),
    };
    let reusable = match artifacts.read_raw(&zkey_key).await? {
        Some(existing) if artifacts.record::<Provenance>(&zkey_key)? == Some(provenance.clone()) => {
            Some(existing)
        }
        _ => None,
    };

    let (proving_key, origin) = match reusable {
        Some(existing) => {
            info!(circuit = %setup.circuit, "Reusing proving key");
            (existing, KeyOrigin::Reused)
        }
        None => {
            info!(circuit = %setup.circuit, "Building proving key");
            // Until the new record lands, the stored key must not match any provenance
            artifacts.clear_record(&zkey_key).await?;
            let system = proof_system.clone();
            let srs_bytes = srs.bytes.clone();
            let r1cs = constraint_system.clone();
            let built = tokio::task::spawn_blocking(move || system.setup(&r1cs, &srs_bytes)).await??;
            artifacts.write_raw(&zkey_key, &built).await?;
            artifacts.write_record(&zkey_key, &provenance).await?;
            (Bytes::from(built), KeyOrigin::Built)
        }
    };

    let witness_generator = fetcher.fetch(&setup.witness_generator).await?;
    info!(circuit = %setup.circuit, ?origin, "Circuit prepared");
    Ok(PreparedCircuit {
        artifacts: CircuitArtifacts {
            circuit: setup.circuit,
            witness_generator,
            proving_key,
        },
        origin,
    })
}
