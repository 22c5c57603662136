//! The execution context: the worker side of a dispatcher session.
//!
//! Runs on its own OS thread with a single-threaded runtime. After one init message
//! it prepares every circuit, then answers job messages concurrently, each with a
//! response carrying the job's correlation id.

use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::jobs::generate_proof;
use crate::protocol::{self, Request, Response};
use crate::setup::{PreparedCircuits, SetupPipeline};
use crate::transport::{ContextEnd, ContextLink, LinkEvent};
use crate::types::{FullProof, JobMessage};
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
enum ContextState {
    Unconfigured,
    Configuring,
    Ready(Arc<PreparedCircuits>),
    /// Setup failed; nothing is processed any more.
    Failed,
}

pub struct ProverContext {
    pipeline: SetupPipeline,
    state: ContextState,
    end: ContextEnd,
}

/// Starts a prover context on a dedicated thread and returns the coordinator's link to it.
///
/// A panic of the context surfaces as [`LinkEvent::Fault`] on the link.
pub fn spawn_prover_context(pipeline: SetupPipeline) -> Result<ContextLink> {
    let (link, end) = ContextLink::pair();
    std::thread::Builder::new()
        .name("prover-context".to_string())
        .spawn(move || {
            let faults = end.outbound.clone();
            let outcome = std::panic::catch_unwind(AssertUnwindSafe(move || {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()?;
                runtime.block_on(ProverContext::new(pipeline, end).run());
                runtime.shutdown_background();
                Ok::<_, Error>(())
            }));
            match outcome {
                Ok(Ok(())) => debug!("Prover context stopped"),
                Ok(Err(e)) => {
                    error!(error = %e, "Prover context failed to start");
                    let _ = faults.send(LinkEvent::Fault(e.to_string()));
                }
                Err(panic) => {
                    let reason = panic_message(panic.as_ref());
                    error!(%reason, "Prover context panicked");
                    let _ = faults.send(LinkEvent::Fault(format!("panicked: {}", reason)));
                }
            }
        })?;
    Ok(link)
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl ProverContext {
    pub fn new(pipeline: SetupPipeline, end: ContextEnd) -> Self {
        Self {
            pipeline,
            state: ContextState::Unconfigured,
            end,
        }
    }

    /// Processes messages until the coordinator releases the context or goes away.
    pub async fn run(mut self) {
        let shutdown = self.end.shutdown.clone();
        loop {
            let message = tokio::select! {
                _ = shutdown.cancelled() => break,
                message = self.end.inbound.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            };
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = self.handle(message) => {}
            }
        }
        info!("Prover context released");
    }

    async fn handle(&mut self, message: Value) {
        if matches!(self.state, ContextState::Failed) {
            debug!("Discarding message after failed setup");
            return;
        }
        let request = match protocol::decode_request::<SessionConfig, JobMessage>(&message) {
            Ok(Some(request)) => request,
            Ok(None) => {
                warn!(raw = %message, "Discarding message of unknown kind");
                return;
            }
            Err(e) => {
                self.end.fault(e.to_string());
                return;
            }
        };

        match request {
            Request::Init { args } => self.configure(args).await,
            Request::Job { id, data } => match &self.state {
                ContextState::Ready(circuits) => {
                    let outbound = self.end.outbound.clone();
                    let proof_system = self.pipeline.proof_system().clone();
                    let circuits = circuits.clone();
                    tokio::spawn(async move {
                        let response = generate_proof(proof_system, circuits, id, data).await;
                        post(&outbound, &response);
                    });
                }
                _ => {
                    warn!(id, "Job received before setup completed");
                    let response =
                        Response::<FullProof>::job(id, Err("prover is not configured".to_string()));
                    post(&self.end.outbound, &response);
                }
            },
        }
    }

    async fn configure(&mut self, session: SessionConfig) {
        if !matches!(self.state, ContextState::Unconfigured) {
            warn!("Ignoring repeated init message");
            return;
        }
        self.state = ContextState::Configuring;
        let response = match self.pipeline.prepare(&session).await {
            Ok(circuits) => {
                self.state = ContextState::Ready(Arc::new(circuits));
                Response::<FullProof>::init_ok()
            }
            Err(e) => {
                error!(error = %e, "Setup failed");
                self.state = ContextState::Failed;
                Response::init_failed(e)
            }
        };
        post(&self.end.outbound, &response);
    }
}

fn post(outbound: &UnboundedSender<LinkEvent>, response: &Response<FullProof>) {
    let event = match protocol::encode(response) {
        Ok(message) => LinkEvent::Message(message),
        Err(e) => LinkEvent::Fault(e.to_string()),
    };
    if outbound.send(event).is_err() {
        debug!("Coordinator is gone; dropping response");
    }
}
