use crate::proof_system::ProofSystem;
use crate::protocol::{CorrelationId, Response};
use crate::setup::PreparedCircuits;
use crate::types::{FullProof, JobMessage};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Computes the proof for one job and wraps the outcome in the response for `id`.
///
/// Runs on the blocking pool. Failures, including a panicking computation, only
/// affect this job's response.
pub async fn generate_proof(
    proof_system: Arc<dyn ProofSystem>,
    circuits: Arc<PreparedCircuits>,
    id: CorrelationId,
    job: JobMessage,
) -> Response<FullProof> {
    let circuit = job.circuit;
    let Some(artifacts) = circuits.get(circuit).cloned() else {
        warn!(id, %circuit, "Job for a circuit that was not prepared");
        return Response::job(id, Err(format!("circuit {} was not prepared", circuit)));
    };

    debug!(id, %circuit, "Starting proof generation");
    let computed =
        tokio::task::spawn_blocking(move || proof_system.prove(&job.input, &artifacts)).await;

    let outcome = match computed {
        Ok(Ok(proof)) => {
            info!(id, %circuit, "Generated proof successfully");
            Ok(proof)
        }
        Ok(Err(e)) => {
            warn!(id, %circuit, error = %e, "Proof generation failed");
            Err(e.to_string())
        }
        Err(e) => {
            warn!(id, %circuit, error = %e, "Proof computation panicked");
            Err(format!("proof computation aborted: {}", e))
        }
    };
    Response::job(id, outcome)
}
