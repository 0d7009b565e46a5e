//! Events raised by nodes on their probe chain.
//!
//! Events travel upward: a node raises one when it cannot resolve something
//! locally (an error, a resource need, a format change, a lifecycle
//! milestone) and the probes of its chain are tried in order until one
//! handles it.

use crate::error::Error;
use crate::format::FlowFormat;
use crate::node::Signature;
use crate::request::ResourceRequest;

/// An event raised on a probe chain.
///
/// Payloads are borrowed from the raising node for the duration of the
/// dispatch.
#[derive(Debug, Clone, Copy)]
#[non_exhaustive]
pub enum Event<'a> {
    /// The node finished allocation and is ready to receive data.
    Ready,
    /// Recoverable anomaly worth reporting.
    Warning(&'a str),
    /// A failure the node recovered from or skipped.
    Error(&'a Error),
    /// A failure the node cannot recover from; the application decides
    /// whether the graph is torn down.
    Fatal(&'a Error),
    /// The node's output flow format changed.
    NewFlowFormat(&'a FlowFormat),
    /// The node needs a resource it does not own.
    Request(&'a ResourceRequest),
    /// The node blocked (`true`) or unblocked (`false`) its upstream pump.
    Backpressure {
        /// New pump state.
        blocked: bool,
    },
    /// A source node delivered its last buffer.
    SourceEnd,
    /// Event private to a node type.
    Custom {
        /// Node type owning the event.
        signature: Signature,
        /// Event identifier within that node type.
        id: u32,
    },
}

impl Event<'_> {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Warning(_) => "warning",
            Self::Error(_) => "error",
            Self::Fatal(_) => "fatal",
            Self::NewFlowFormat(_) => "new_flow_format",
            Self::Request(_) => "request",
            Self::Backpressure { .. } => "backpressure",
            Self::SourceEnd => "source_end",
            Self::Custom { .. } => "custom",
        }
    }

    /// Check whether this is a fatal error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}

/// Result of offering an event to a probe or a whole chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// A probe claimed the event; propagation stopped.
    Handled,
    /// No probe claimed the event.
    Unhandled,
}

impl ProbeOutcome {
    /// Check whether the event was claimed.
    pub fn is_handled(self) -> bool {
        self == Self::Handled
    }
}
