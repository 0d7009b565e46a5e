//! Probe shipping events over a channel.

use super::Probe;
use crate::event::{Event, ProbeOutcome};
use crate::node::Node;

/// Owned summary of an event, as sent by [`ChannelProbe`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    /// Name of the raising node.
    pub node: String,
    /// Id of the raising node.
    pub node_id: u64,
    /// Event name (see [`Event::name`]).
    pub event: &'static str,
    /// Event payload rendered as text, when there is one.
    pub detail: Option<String>,
}

impl EventRecord {
    fn new(node: &Node, event: &Event<'_>) -> Self {
        let detail = match event {
            Event::Warning(msg) => Some((*msg).to_string()),
            Event::Error(err) | Event::Fatal(err) => Some(err.to_string()),
            Event::NewFlowFormat(fmt) => Some(fmt.to_string()),
            Event::Request(req) => Some(format!("{:?}", req.kind())),
            Event::Backpressure { blocked } => Some(blocked.to_string()),
            Event::Custom { signature, id } => Some(format!("{}:{}", signature, id)),
            _ => None,
        };
        Self {
            node: node.name().to_string(),
            node_id: node.id(),
            event: event.name(),
            detail,
        }
    }
}

/// Sends a record of every event to a [`kanal`] channel.
///
/// Useful to observe nodes running on worker threads from one place, e.g. an
/// application thread or a test harness.
///
/// # Example
///
/// ```rust
/// use pipework::probe::{ChannelProbe, ProbeChain};
///
/// let (probe, events) = ChannelProbe::new();
/// let probes = ProbeChain::new().prepend(probe);
/// // ... allocate nodes with `probes`, then:
/// while let Ok(Some(record)) = events.try_recv() {
///     println!("{} raised {}", record.node, record.event);
/// }
/// ```
#[derive(Clone)]
pub struct ChannelProbe {
    sender: kanal::Sender<EventRecord>,
    outcome: ProbeOutcome,
}

impl ChannelProbe {
    /// Create a probe and the receiver of its records.
    ///
    /// The probe passes every event on (`Unhandled`).
    pub fn new() -> (Self, kanal::Receiver<EventRecord>) {
        let (tx, rx) = kanal::unbounded();
        (
            Self {
                sender: tx,
                outcome: ProbeOutcome::Unhandled,
            },
            rx,
        )
    }

    /// Report every event as handled, ending the chain here.
    pub fn handling(mut self) -> Self {
        self.outcome = ProbeOutcome::Handled;
        self
    }
}

impl Probe for ChannelProbe {
    fn catch(&self, node: &Node, event: &Event<'_>) -> ProbeOutcome {
        // Ignore errors if the receiver was dropped.
        let _ = self.sender.send(EventRecord::new(node, event));
        self.outcome
    }
}

impl std::fmt::Debug for ChannelProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelProbe")
            .field("outcome", &self.outcome)
            .finish()
    }
}
