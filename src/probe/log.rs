//! Logging probe.

use super::Probe;
use crate::event::{Event, ProbeOutcome};
use crate::node::Node;

/// Turns every event passing through the chain into a `tracing` record.
///
/// Never handles anything, so it can sit anywhere in a chain.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProbe;

impl LogProbe {
    /// Create a logging probe.
    pub fn new() -> Self {
        Self
    }
}

impl Probe for LogProbe {
    fn catch(&self, node: &Node, event: &Event<'_>) -> ProbeOutcome {
        let name = node.name();
        match event {
            Event::Fatal(err) => tracing::error!(node = %name, error = %err, "fatal error"),
            Event::Error(err) => tracing::warn!(node = %name, error = %err, "error"),
            Event::Warning(msg) => tracing::warn!(node = %name, "{}", msg),
            Event::NewFlowFormat(fmt) => tracing::debug!(node = %name, format = %fmt, "new flow format"),
            Event::Request(req) => tracing::trace!(
                node = %name,
                kind = ?req.kind(),
                correlation = req.correlation(),
                "resource request"
            ),
            Event::Backpressure { blocked } => {
                tracing::debug!(node = %name, blocked = *blocked, "backpressure")
            }
            other => tracing::debug!(node = %name, event = other.name(), "event"),
        }
        ProbeOutcome::Unhandled
    }
}
