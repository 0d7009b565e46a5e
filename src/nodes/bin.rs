//! Bin: a decorator node delegating to an inner node.

use crate::buffer::Buffer;
use crate::error::Result;
use crate::node::{Command, ControlResult, Manager, Node, NodeBehavior, Reply, Signature};
use crate::sched::SchedContext;

/// Signature of [`BinManager`] nodes.
pub const BIN: Signature = Signature::fourcc(b"bin_");

/// Local command: get the inner node (`Reply::Output`).
pub const BIN_GET_INNER: u32 = 0;

/// Manager of bins.
///
/// A bin presents an inner node (typically the head of a small subgraph)
/// as a single node. Commands the bin does not recognize itself, including
/// the generic output and format commands, are tried on the inner node, so
/// node-type commands reach it unchanged. Buffers and scheduling callbacks
/// go to the inner node as well.
#[derive(Debug, Default, Clone, Copy)]
pub struct BinManager;

impl Manager for BinManager {
    type Args = Node;

    fn signature(&self) -> Signature {
        BIN
    }

    fn name(&self) -> &str {
        "bin"
    }

    fn allocate(&self, inner: Node) -> Result<Box<dyn NodeBehavior>> {
        Ok(Box::new(Bin { inner }))
    }
}

struct Bin {
    inner: Node,
}

impl NodeBehavior for Bin {
    fn control(&mut self, _node: &Node, command: &Command) -> Result<ControlResult> {
        if let Some((BIN_GET_INNER, _)) = command.local_for(BIN) {
            return Ok(ControlResult::Handled(Reply::Output(Some(self.inner.duplicate()))));
        }
        self.inner.control(command.clone())
    }

    fn input(&mut self, _node: &Node, buffer: Buffer, sched: &mut SchedContext) -> Result<()> {
        self.inner.input(buffer, sched)
    }

    fn wake(&mut self, _node: &Node, sched: &mut SchedContext) -> Result<()> {
        self.inner.wake(sched)
    }
}
