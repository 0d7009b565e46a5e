//! Identity node: forwards buffers and formats unchanged.

use crate::buffer::Buffer;
use crate::error::Result;
use crate::node::{Command, ControlResult, Manager, Node, NodeBehavior, Signature};
use crate::sched::SchedContext;

/// Signature of [`IdentityManager`] nodes.
pub const IDENTITY: Signature = Signature::fourcc(b"idnt");

/// Manager of identity nodes.
///
/// An identity node accepts every flow format and re-announces it as its
/// own output format (raising `NewFlowFormat`), then forwards each buffer to
/// its output. It is the smallest complete filter and a convenient probe
/// attachment point in the middle of a graph.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityManager;

impl Manager for IdentityManager {
    type Args = ();

    fn signature(&self) -> Signature {
        IDENTITY
    }

    fn name(&self) -> &str {
        "identity"
    }

    fn allocate(&self, _args: ()) -> Result<Box<dyn NodeBehavior>> {
        Ok(Box::new(Identity))
    }
}

struct Identity;

impl NodeBehavior for Identity {
    fn control(&mut self, node: &Node, command: &Command) -> Result<ControlResult> {
        match command {
            Command::SetFlowFormat(format) => {
                let _ = node.store_flow_format(format.clone());
                Ok(ControlResult::DONE)
            }
            _ => Ok(ControlResult::Unhandled),
        }
    }

    fn input(&mut self, node: &Node, buffer: Buffer, sched: &mut SchedContext) -> Result<()> {
        node.forward(buffer, sched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::FlowFormat;
    use crate::node::{CommandArg, Reply};
    use crate::nodes::null::{NULL_SINK, NULL_SINK_GET_COUNT, NullSinkConfig, NullSinkManager};
    use crate::probe::{FormatForwarder, ProbeChain};
    use std::sync::Arc;

    #[test]
    fn test_forwards_buffers_and_formats() {
        let sink = Node::allocate(
            &Arc::new(NullSinkManager),
            ProbeChain::new(),
            NULL_SINK,
            NullSinkConfig::accepting("block."),
        )
        .unwrap();
        let identity = Node::allocate(
            &Arc::new(IdentityManager),
            ProbeChain::new().prepend(FormatForwarder::new()),
            IDENTITY,
            (),
        )
        .unwrap();
        identity.set_output(Some(sink.duplicate())).unwrap();

        identity
            .control(Command::SetFlowFormat(FlowFormat::new("block.rtp.")))
            .unwrap();
        match identity.control(Command::GetFlowFormat).unwrap() {
            ControlResult::Handled(Reply::Format(Some(f))) => assert_eq!(f.def(), "block.rtp."),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(
            identity.output_link().and_then(|l| l.format).map(|f| f.def().to_string()),
            Some("block.rtp.".to_string())
        );

        identity
            .input(Buffer::from_vec(vec![1, 2]), &mut SchedContext::new())
            .unwrap();
        let count = sink
            .control(Command::local(NULL_SINK, NULL_SINK_GET_COUNT, CommandArg::None))
            .unwrap()
            .reply()
            .and_then(|r| r.value());
        assert_eq!(count, Some(1));
    }
}
