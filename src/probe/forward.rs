//! Generic flow format forwarding.

use super::Probe;
use crate::event::{Event, ProbeOutcome};
use crate::node::{Command, ControlResult, Node};

/// Passes a node's new flow format on to its output.
///
/// On [`Event::NewFlowFormat`] the probe sends
/// [`Command::SetFlowFormat`] to the raising node's output. If the output
/// accepts, the link remembers the format and the event is handled. If it
/// refuses (an error or an unhandled command), the output is detached and
/// the event continues up the chain, so an ancestor can rebuild the graph.
/// A node without output has nothing to forward to and the event is handled.
#[derive(Debug, Default, Clone, Copy)]
pub struct FormatForwarder;

impl FormatForwarder {
    /// Create a forwarder.
    pub fn new() -> Self {
        Self
    }
}

impl Probe for FormatForwarder {
    fn catch(&self, node: &Node, event: &Event<'_>) -> ProbeOutcome {
        let Event::NewFlowFormat(format) = event else {
            return ProbeOutcome::Unhandled;
        };
        let Some(output) = node.output() else {
            return ProbeOutcome::Handled;
        };

        let refusal = match output.control(Command::SetFlowFormat((*format).clone())) {
            Ok(ControlResult::Handled(_)) => {
                node.update_link_format(format);
                return ProbeOutcome::Handled;
            }
            Ok(ControlResult::Unhandled) => "flow formats not handled".to_string(),
            Err(e) => e.to_string(),
        };

        tracing::warn!(
            node = %node.name(),
            output = %output.name(),
            format = %format,
            reason = %refusal,
            "output refused flow format, detaching"
        );
        // Detach only if the output was not replaced meanwhile.
        if node.output().is_some_and(|current| Node::ptr_eq(&current, &output)) {
            let _ = node.clear_output();
        }
        ProbeOutcome::Unhandled
    }
}
