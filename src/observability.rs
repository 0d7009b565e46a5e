//! Tracing integration for structured logging and spans.
//!
//! The library never installs a subscriber; applications choose one. These
//! helpers keep span names and fields consistent across node types.

use std::fmt::Display;
use tracing::{Level, Span, span};

/// Create a span for work done on behalf of a node.
///
/// # Example
///
/// ```rust
/// use pipework::observability::span_node;
///
/// let span = span_node("demux", 3, "qsrc");
/// let _guard = span.enter();
/// // Node work here...
/// ```
#[inline]
pub fn span_node(name: &str, id: u64, signature: impl Display) -> Span {
    span!(
        Level::DEBUG,
        "node",
        node = %name,
        node_id = id,
        signature = %signature
    )
}

/// Create a span for cross-thread queue activity.
#[inline]
pub fn span_queue(queue: &str, side: &'static str) -> Span {
    span!(Level::DEBUG, "queue", queue = %queue, side = side)
}

/// Log a buffer dropped by a node, with the reason.
#[inline]
pub fn trace_buffer_dropped(node: &str, len: usize, reason: &str) {
    tracing::warn!(node = %node, len = len, reason = %reason, "buffer dropped");
}

/// Log a queue state change.
#[inline]
pub fn trace_queue_state(queue: &str, from: &str, to: &str) {
    tracing::debug!(queue = %queue, from = %from, to = %to, "queue state changed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_creation() {
        // Without a subscriber spans are disabled but still constructible.
        let span = span_node("sink", 1, "null");
        let _guard = span.enter();
        let _q = span_queue("q0", "sink").entered();
        trace_queue_state("q0", "idle", "running");
    }
}
