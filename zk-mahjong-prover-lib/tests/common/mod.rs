use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use zk_mahjong_prover_lib::{CircuitArtifacts, CircuitKind, Error, FullProof, ProofSystem, Result};

pub fn setup_log() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Proof system whose keys are hashes of their inputs and whose proofs echo the input.
///
/// Per-circuit delays make jobs finish in a chosen order.
#[derive(Default)]
pub struct ScriptedProofSystem {
    delays: HashMap<CircuitKind, Duration>,
    setups: AtomicUsize,
}

impl ScriptedProofSystem {
    pub fn with_delay(mut self, circuit: CircuitKind, delay: Duration) -> Self {
        self.delays.insert(circuit, delay);
        self
    }

    pub fn setups(&self) -> usize {
        self.setups.load(Ordering::SeqCst)
    }
}

pub fn proving_key(constraint_system: &[u8], srs: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(constraint_system);
    hasher.update(srs);
    hasher.finalize().to_vec()
}

impl ProofSystem for ScriptedProofSystem {
    fn setup(&self, constraint_system: &[u8], srs: &[u8]) -> Result<Vec<u8>> {
        self.setups.fetch_add(1, Ordering::SeqCst);
        if constraint_system.is_empty() {
            return Err(Error::SetupFailure("empty constraint system".into()));
        }
        Ok(proving_key(constraint_system, srs))
    }

    fn prove(&self, input: &serde_json::Value, artifacts: &CircuitArtifacts) -> Result<FullProof> {
        if let Some(delay) = self.delays.get(&artifacts.circuit) {
            std::thread::sleep(*delay);
        }
        Ok(FullProof {
            proof: json!({
                "circuit": artifacts.circuit,
                "zkey": hex::encode(&artifacts.proving_key),
                "wasm": String::from_utf8_lossy(&artifacts.witness_generator),
            }),
            public_signals: vec![input.to_string()],
        })
    }
}
