//! Coordinator side of the request/response protocol with one execution context.
//!
//! A [`RequestDispatcher`] owns exactly one execution context for its whole lifetime.
//! It accepts one `init`, then any number of concurrent `submit`s, and pairs each
//! response with its request by correlation id, so jobs may complete in any order.
//!
//! Any transport fault poisons the dispatcher: the context is released for good,
//! every pending caller is rejected, and every later call fails immediately.

use crate::error::{Error, Result};
use crate::protocol::{self, CorrelationId, Reply, Request};
use crate::transport::{ContextLink, LinkEvent, LinkSender};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    Initializing,
    Ready,
    /// Terminal.
    Poisoned,
}

type Settle<T> = oneshot::Sender<Result<T>>;

/// Pending requests keyed by correlation id.
///
/// Every entry leaves the table exactly once: through [`take`](Self::take) when its
/// response arrives, or through [`drain`](Self::drain) when the dispatcher is torn down.
#[derive(Debug)]
pub struct CorrelationTable<H> {
    pending: HashMap<CorrelationId, H>,
}

impl<H> Default for CorrelationTable<H> {
    fn default() -> Self {
        Self {
            pending: HashMap::new(),
        }
    }
}

impl<H> CorrelationTable<H> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, id: CorrelationId, handle: H) {
        let previous = self.pending.insert(id, handle);
        debug_assert!(previous.is_none(), "correlation id {id} reused");
    }

    pub fn take(&mut self, id: CorrelationId) -> Option<H> {
        self.pending.remove(&id)
    }

    pub fn drain(&mut self) -> Vec<(CorrelationId, H)> {
        let mut drained: Vec<_> = self.pending.drain().collect();
        drained.sort_by_key(|(id, _)| *id);
        drained
    }

    pub fn contains(&self, id: CorrelationId) -> bool {
        self.pending.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Eventual outcome of an `init` or `submit` call.
///
/// Precondition checks and the message send happen when the call is made;
/// this future only waits for the matching response.
#[must_use = "a pending request does nothing unless awaited"]
#[derive(Debug)]
pub struct Pending<T> {
    state: PendingState<T>,
}

#[derive(Debug)]
enum PendingState<T> {
    Rejected(Option<Error>),
    Waiting(oneshot::Receiver<Result<T>>),
}

impl<T> Pending<T> {
    fn rejected(error: Error) -> Self {
        Self {
            state: PendingState::Rejected(Some(error)),
        }
    }

    fn waiting(receiver: oneshot::Receiver<Result<T>>) -> Self {
        Self {
            state: PendingState::Waiting(receiver),
        }
    }
}

impl<T> Future for Pending<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().state {
            PendingState::Rejected(error) => Poll::Ready(Err(error.take().unwrap_or_else(|| {
                Error::Internal("Pending request polled after completion".to_string())
            }))),
            PendingState::Waiting(receiver) => Pin::new(receiver).poll(cx).map(|settled| {
                settled.unwrap_or_else(|_| {
                    Err(Error::Poisoned("dispatcher dropped the request".to_string()))
                })
            }),
        }
    }
}

struct DispatcherState<R> {
    phase: Phase,
    pending_init: Option<Settle<()>>,
    jobs: CorrelationTable<Settle<R>>,
    next_id: CorrelationId,
    // None once the context has been released
    link: Option<LinkSender>,
    poison_reason: Option<String>,
}

struct Shared<R> {
    state: Mutex<DispatcherState<R>>,
}

impl<R> Shared<R> {
    fn lock(&self) -> MutexGuard<'_, DispatcherState<R>> {
        // Nothing panics while holding the lock; recover the guard regardless
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_poisoned(&self) -> bool {
        self.lock().phase == Phase::Poisoned
    }

    fn poisoned_error(state: &DispatcherState<R>) -> Error {
        Error::Poisoned(
            state
                .poison_reason
                .clone()
                .unwrap_or_else(|| "execution context released".to_string()),
        )
    }

    /// Moves to `Poisoned`, releases the context and rejects everything pending.
    /// Returns false if already poisoned.
    fn teardown(&self, reason: &str) -> bool {
        let (init, jobs, link) = {
            let mut state = self.lock();
            if state.phase == Phase::Poisoned {
                return false;
            }
            state.phase = Phase::Poisoned;
            state.poison_reason = Some(reason.to_string());
            (
                state.pending_init.take(),
                state.jobs.drain(),
                state.link.take(),
            )
        };

        if let Some(link) = link {
            link.release();
        }
        if let Some(callback) = init {
            let _ = callback.send(Err(Error::Poisoned(reason.to_string())));
        }
        for (id, callback) in jobs {
            debug!(id, "Rejecting pending job");
            let _ = callback.send(Err(Error::Poisoned(reason.to_string())));
        }
        true
    }

    fn poison(&self, reason: &str) {
        if self.teardown(reason) {
            error!(%reason, "Execution context poisoned");
        }
    }

    fn settle(&self, reply: Reply<R>) {
        match reply {
            Reply::InitAck { error } => {
                let mut state = self.lock();
                let Some(callback) = state.pending_init.take() else {
                    warn!(phase = ?state.phase, "Ignoring unexpected init acknowledgement");
                    return;
                };
                match error {
                    None => {
                        state.phase = Phase::Ready;
                        drop(state);
                        info!("Execution context ready");
                        let _ = callback.send(Ok(()));
                    }
                    Some(error) => {
                        drop(state);
                        self.poison(&format!("initialization failed: {}", error));
                        let _ = callback.send(Err(Error::SetupFailure(error)));
                    }
                }
            }
            Reply::Job { id, outcome } => {
                let callback = self.lock().jobs.take(id);
                match callback {
                    Some(callback) => {
                        debug!(id, ok = outcome.is_ok(), "Job settled");
                        let _ = callback.send(outcome.map_err(Error::ComputationFault));
                    }
                    // Stray responses after cleanup are tolerated
                    None => debug!(id, "Ignoring response for unknown job"),
                }
            }
        }
    }
}

/// Routes inbound events until the link ends or the dispatcher is poisoned.
async fn route_events<R: DeserializeOwned>(
    shared: Arc<Shared<R>>,
    mut events: mpsc::UnboundedReceiver<LinkEvent>,
) {
    while let Some(event) = events.recv().await {
        match event {
            LinkEvent::Fault(reason) => {
                shared.poison(&format!("execution context failed: {}", reason));
                return;
            }
            LinkEvent::Message(value) => match protocol::decode_reply::<R>(&value) {
                Ok(Some(reply)) => shared.settle(reply),
                Ok(None) => warn!(raw = %value, "Discarding message of unknown kind"),
                Err(e) => {
                    shared.poison(&e.to_string());
                    return;
                }
            },
        }
        if shared.is_poisoned() {
            return;
        }
    }
    shared.poison("execution context exited");
}

/// Coordinator handle for one execution context.
///
/// `A` is the init payload, `J` the job payload and `R` the job result.
pub struct RequestDispatcher<A, J, R> {
    shared: Arc<Shared<R>>,
    reader: JoinHandle<()>,
    _messages: PhantomData<fn(A, J)>,
}

impl<A, J, R> RequestDispatcher<A, J, R>
where
    A: Serialize,
    J: Serialize,
    R: DeserializeOwned + Send + 'static,
{
    /// Takes ownership of `link` and starts routing its events.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(link: ContextLink) -> Self {
        let (sender, events) = link.split();
        let shared = Arc::new(Shared {
            state: Mutex::new(DispatcherState {
                phase: Phase::Uninitialized,
                pending_init: None,
                jobs: CorrelationTable::new(),
                next_id: 0,
                link: Some(sender),
                poison_reason: None,
            }),
        });
        let reader = tokio::spawn(route_events(shared.clone(), events));
        Self {
            shared,
            reader,
            _messages: PhantomData,
        }
    }

    /// Sends the init message. Resolves once the context acknowledges setup.
    ///
    /// Only the first call on a fresh dispatcher is accepted; every other call
    /// is rejected with [`Error::ConfigError`] without touching the context.
    pub fn init(&self, args: A) -> Pending<()> {
        let mut state = self.shared.lock();
        if state.phase != Phase::Uninitialized {
            return Pending::rejected(Error::ConfigError(format!(
                "init called on a {:?} dispatcher",
                state.phase
            )));
        }
        let message = match protocol::encode(&Request::<A, J>::Init { args }) {
            Ok(message) => message,
            Err(e) => return Pending::rejected(e),
        };

        let (callback, receiver) = oneshot::channel();
        state.pending_init = Some(callback);
        state.phase = Phase::Initializing;
        let sent = Self::send(&state, message);
        drop(state);

        match sent {
            Ok(()) => info!("Init message sent"),
            Err(reason) => self.shared.poison(&reason),
        }
        Pending::waiting(receiver)
    }

    /// Sends a job. Resolves with the response carrying this job's correlation id.
    pub fn submit(&self, data: J) -> Pending<R> {
        let mut state = self.shared.lock();
        match state.phase {
            Phase::Ready => {}
            Phase::Poisoned => return Pending::rejected(Shared::poisoned_error(&state)),
            phase => {
                return Pending::rejected(Error::ConfigError(format!(
                    "submit called on a {:?} dispatcher; init must complete first",
                    phase
                )));
            }
        }

        let id = state.next_id;
        let message = match protocol::encode(&Request::<A, J>::Job { id, data }) {
            Ok(message) => message,
            Err(e) => return Pending::rejected(e),
        };
        state.next_id += 1;

        let (callback, receiver) = oneshot::channel();
        state.jobs.register(id, callback);
        let sent = Self::send(&state, message);
        drop(state);

        match sent {
            Ok(()) => debug!(id, "Job submitted"),
            Err(reason) => self.shared.poison(&reason),
        }
        Pending::waiting(receiver)
    }

    fn send(state: &DispatcherState<R>, message: serde_json::Value) -> std::result::Result<(), String> {
        match &state.link {
            Some(link) => link.send(message),
            None => Err("execution context already released".to_string()),
        }
    }
}

impl<A, J, R> RequestDispatcher<A, J, R> {
    pub fn phase(&self) -> Phase {
        self.shared.lock().phase
    }

    /// Number of submitted jobs still waiting for a response.
    pub fn pending_jobs(&self) -> usize {
        self.shared.lock().jobs.len()
    }

    /// Releases the execution context and rejects everything pending.
    pub fn dispose(&self) {
        if self.shared.teardown("dispatcher disposed") {
            info!("Dispatcher disposed");
        }
        self.reader.abort();
    }
}

impl<A, J, R> Drop for RequestDispatcher<A, J, R> {
    fn drop(&mut self) {
        self.shared.teardown("dispatcher dropped");
        self.reader.abort();
    }
}
