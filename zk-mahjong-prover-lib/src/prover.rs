//! Caller-facing proving API: one prover, one execution context.

use crate::config::SessionConfig;
use crate::context::spawn_prover_context;
use crate::dispatcher::{Pending, Phase, RequestDispatcher};
use crate::error::Result;
use crate::setup::SetupPipeline;
use crate::transport::ContextLink;
use crate::types::{CircuitKind, FullProof, JobMessage};
use num_bigint::BigUint;
use serde_json::{Value, json};

/// Proves mahjong circuits off the caller's thread.
///
/// Call [`init`](Self::init) once and await it; afterwards any number of proofs
/// may be requested concurrently.
pub struct Prover {
    dispatcher: RequestDispatcher<SessionConfig, JobMessage, FullProof>,
}

impl Prover {
    /// Starts a fresh execution context backed by `pipeline`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(pipeline: SetupPipeline) -> Result<Self> {
        Ok(Self::from_link(spawn_prover_context(pipeline)?))
    }

    /// Drives an execution context reachable through `link`.
    pub fn from_link(link: ContextLink) -> Self {
        Self {
            dispatcher: RequestDispatcher::new(link),
        }
    }

    pub fn init(&self, session: SessionConfig) -> Pending<()> {
        self.dispatcher.init(session)
    }

    pub fn prove(&self, circuit: CircuitKind, input: Value) -> Pending<FullProof> {
        self.dispatcher.submit(JobMessage { circuit, input })
    }

    /// Proves knowledge of the ElGamal secret key `sk`.
    pub fn prove_secret_key(&self, sk: &BigUint) -> Pending<FullProof> {
        self.prove(
            CircuitKind::ElGamalSecretKey,
            json!({ "sk": sk.to_string() }),
        )
    }

    pub fn prove_encrypt(&self, input: Value) -> Pending<FullProof> {
        self.prove(CircuitKind::Encrypt, input)
    }

    pub fn prove_shuffle_encrypt(&self, input: Value) -> Pending<FullProof> {
        self.prove(CircuitKind::ShuffleEncrypt, input)
    }

    pub fn phase(&self) -> Phase {
        self.dispatcher.phase()
    }

    pub fn dispose(&self) {
        self.dispatcher.dispose()
    }
}
