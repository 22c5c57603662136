use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

// The circuits this prover can produce proofs for
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "camelCase")]
pub enum CircuitKind {
    /// Knowledge of the ElGamal secret key behind a published public key.
    ElGamalSecretKey,
    /// Masking of a single tile under the aggregated public key.
    Encrypt,
    /// Re-randomised shuffle of the masked deck.
    ShuffleEncrypt,
}

impl CircuitKind {
    /// Stable snake_case name, used to derive store keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitKind::ElGamalSecretKey => "elgamal_secret_key",
            CircuitKind::Encrypt => "encrypt",
            CircuitKind::ShuffleEncrypt => "shuffle_encrypt",
        }
    }
}

impl fmt::Display for CircuitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CircuitKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Accept both the store name and the wire name
        match s {
            "elgamal_secret_key" | "elGamalSecretKey" => Ok(CircuitKind::ElGamalSecretKey),
            "encrypt" => Ok(CircuitKind::Encrypt),
            "shuffle_encrypt" | "shuffleEncrypt" => Ok(CircuitKind::ShuffleEncrypt),
            _ => Err(crate::Error::InvalidInput(format!(
                "Unknown circuit kind: {}",
                s
            ))),
        }
    }
}

// A job for the execution context: which circuit, and its input signals
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobMessage {
    pub circuit: CircuitKind,
    // Circuit signals as produced by the caller, e.g. {"sk": "123"}
    pub input: serde_json::Value,
}

// The generated proof and public signals
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FullProof {
    pub proof: serde_json::Value,
    pub public_signals: Vec<String>,
}

/// Everything a proof computation for one circuit needs once setup is done.
#[derive(Debug, Clone)]
pub struct CircuitArtifacts {
    pub circuit: CircuitKind,
    /// Compiled witness generator (WASM).
    pub witness_generator: Bytes,
    /// Proving key (zkey) built for this circuit.
    pub proving_key: Bytes,
}
