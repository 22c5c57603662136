//! The external proving capability: proving-key setup and proof computation.
//!
//! Both operations are CPU bound and blocking. Callers run them on the blocking pool.

use crate::error::{Error, Result};
use crate::types::{CircuitArtifacts, FullProof};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

pub trait ProofSystem: Send + Sync + 'static {
    /// Derives a proving key from a constraint system and a compatible SRS.
    fn setup(&self, constraint_system: &[u8], srs: &[u8]) -> Result<Vec<u8>>;

    /// Computes a proof for `input` with the prepared artifacts of one circuit.
    fn prove(&self, input: &serde_json::Value, artifacts: &CircuitArtifacts) -> Result<FullProof>;
}

/// PLONK through the `snarkjs` command line tool.
///
/// Every call works in its own scratch directory, so concurrent calls do not share files.
#[derive(Debug, Clone)]
pub struct SnarkjsCli {
    program: PathBuf,
}

impl Default for SnarkjsCli {
    fn default() -> Self {
        Self::new("snarkjs")
    }
}

impl SnarkjsCli {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn run(&self, args: &[&Path], context: &str) -> Result<()> {
        let mut command = Command::new(&self.program);
        command.arg("plonk");
        for arg in args {
            command.arg(arg);
        }
        debug!(?command, "Running snarkjs");
        let output = command.output()?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(Error::ComputationFault(format!(
            "snarkjs {} exited with {}: {}",
            context,
            output.status,
            stderr.trim()
        )))
    }
}

impl ProofSystem for SnarkjsCli {
    fn setup(&self, constraint_system: &[u8], srs: &[u8]) -> Result<Vec<u8>> {
        let scratch = tempfile::tempdir()?;
        let r1cs = scratch.path().join("circuit.r1cs");
        let ptau = scratch.path().join("srs.ptau");
        let zkey = scratch.path().join("circuit.zkey");
        std::fs::write(&r1cs, constraint_system)?;
        std::fs::write(&ptau, srs)?;

        self.run(
            &[Path::new("setup"), r1cs.as_path(), ptau.as_path(), zkey.as_path()],
            "setup",
        )
        .map_err(|e| Error::SetupFailure(e.to_string()))?;
        Ok(std::fs::read(&zkey)?)
    }

    fn prove(&self, input: &serde_json::Value, artifacts: &CircuitArtifacts) -> Result<FullProof> {
        let scratch = tempfile::tempdir()?;
        let input_path = scratch.path().join("input.json");
        let wasm = scratch.path().join("circuit.wasm");
        let zkey = scratch.path().join("circuit.zkey");
        let proof_path = scratch.path().join("proof.json");
        let public_path = scratch.path().join("public.json");
        std::fs::write(&input_path, serde_json::to_vec(input)?)?;
        std::fs::write(&wasm, &artifacts.witness_generator)?;
        std::fs::write(&zkey, &artifacts.proving_key)?;

        self.run(
            &[
                Path::new("fullprove"),
                input_path.as_path(),
                wasm.as_path(),
                zkey.as_path(),
                proof_path.as_path(),
                public_path.as_path(),
            ],
            "fullprove",
        )?;

        let proof = serde_json::from_slice(&std::fs::read(&proof_path)?)?;
        let public_signals = serde_json::from_slice(&std::fs::read(&public_path)?)?;
        Ok(FullProof {
            proof,
            public_signals,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CircuitKind;
    use bytes::Bytes;

    #[test]
    fn missing_binary_is_an_error() {
        let cli = SnarkjsCli::new("/nonexistent/snarkjs");
        assert!(cli.setup(b"r1cs", b"ptau").is_err());

        let artifacts = CircuitArtifacts {
            circuit: CircuitKind::Encrypt,
            witness_generator: Bytes::from_static(b"wasm"),
            proving_key: Bytes::from_static(b"zkey"),
        };
        assert!(cli.prove(&serde_json::json!({}), &artifacts).is_err());
    }
}
