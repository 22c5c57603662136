//! zk-mahjong-prover-lib
//! Off-thread PLONK prover for the zk-mahjong circuits: a request dispatcher paired
//! with a single execution context, backed by a digest-verified artifact cache.

// Modules
pub mod artifacts;
pub mod config;
pub mod context;
pub mod digest;
pub mod dispatcher;
pub mod error;
pub mod fetch;
pub mod jobs;
pub mod proof_system;
pub mod protocol;
pub mod prover;
pub mod setup;
pub mod state;
pub mod transport;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

// Re-exports for convenience
pub use artifacts::{ArtifactDescriptor, ArtifactStore, EnsureStatus, Ensured, Provenance};
pub use config::{CircuitSetup, ProverConfig, SessionConfig, SrsEntry};
pub use context::spawn_prover_context;
pub use digest::DigestAlgorithm;
pub use dispatcher::{CorrelationTable, Pending, Phase, RequestDispatcher};
pub use error::{Error, Result};
pub use fetch::{Fetcher, HttpFetcher};
pub use jobs::KeyOrigin;
pub use proof_system::{ProofSystem, SnarkjsCli};
pub use prover::Prover;
pub use setup::{PreparedCircuits, SetupPipeline};
pub use state::BlobStore;
pub use transport::{ContextEnd, ContextLink, LinkEvent};
pub use types::{CircuitArtifacts, CircuitKind, FullProof, JobMessage};
