use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// What the coordinator can observe from its execution context.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// A message posted by the context.
    Message(Value),
    /// The context crashed or otherwise failed at transport level.
    Fault(String),
}

/// Coordinator side of the channel pair to one execution context.
#[derive(Debug)]
pub struct ContextLink {
    pub(crate) outbound: mpsc::UnboundedSender<Value>,
    pub(crate) inbound: mpsc::UnboundedReceiver<LinkEvent>,
    pub(crate) shutdown: CancellationToken,
}

/// Execution-context side of the channel pair.
#[derive(Debug)]
pub struct ContextEnd {
    pub inbound: mpsc::UnboundedReceiver<Value>,
    pub outbound: mpsc::UnboundedSender<LinkEvent>,
    pub shutdown: CancellationToken,
}

impl ContextLink {
    /// Creates a connected link and context end.
    pub fn pair() -> (ContextLink, ContextEnd) {
        let (to_context, from_coordinator) = mpsc::unbounded_channel();
        let (to_coordinator, from_context) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        (
            ContextLink {
                outbound: to_context,
                inbound: from_context,
                shutdown: shutdown.clone(),
            },
            ContextEnd {
                inbound: from_coordinator,
                outbound: to_coordinator,
                shutdown,
            },
        )
    }

    /// Splits into the sending half and the event stream.
    pub(crate) fn split(self) -> (LinkSender, mpsc::UnboundedReceiver<LinkEvent>) {
        (
            LinkSender {
                outbound: self.outbound,
                shutdown: self.shutdown,
            },
            self.inbound,
        )
    }
}

/// Sending half of a [`ContextLink`]; releasing it tears the context down.
#[derive(Debug)]
pub(crate) struct LinkSender {
    outbound: mpsc::UnboundedSender<Value>,
    shutdown: CancellationToken,
}

impl LinkSender {
    pub(crate) fn send(&self, message: Value) -> Result<(), String> {
        self.outbound
            .send(message)
            .map_err(|_| "execution context is gone".to_string())
    }

    /// Signals the context to stop; the channel closes when `self` is dropped.
    pub(crate) fn release(self) {
        debug!("Releasing execution context");
        self.shutdown.cancel();
    }
}

impl ContextEnd {
    /// Posts a message to the coordinator. Returns false once the coordinator is gone.
    pub fn post(&self, message: Value) -> bool {
        self.outbound.send(LinkEvent::Message(message)).is_ok()
    }

    /// Reports a transport-level failure to the coordinator.
    pub fn fault(&self, reason: impl Into<String>) -> bool {
        self.outbound.send(LinkEvent::Fault(reason.into())).is_ok()
    }
}
