//! Node managers and behaviors.
//!
//! A [`Manager`] is the type-level side of a node: it owns the signature,
//! builds the private state of each node ([`NodeBehavior`]) and answers
//! commands aimed at the node type as a whole. The behavior is the
//! instance-level side, invoked through the [`Node`] handle.

use super::command::{CommandArg, ControlResult};
use super::{Command, Node, Signature};
use crate::buffer::Buffer;
use crate::error::Result;
use crate::sched::SchedContext;

/// Type-level description of a node kind.
///
/// # Example
///
/// ```rust
/// use pipework::buffer::Buffer;
/// use pipework::node::{Manager, Node, NodeBehavior, Signature};
/// use pipework::probe::ProbeChain;
/// use pipework::sched::SchedContext;
/// use std::sync::Arc;
///
/// struct Discard;
///
/// impl NodeBehavior for Discard {
///     fn input(&mut self, _node: &Node, buffer: Buffer, _sched: &mut SchedContext) -> pipework::Result<()> {
///         buffer.release();
///         Ok(())
///     }
/// }
///
/// struct DiscardManager;
///
/// impl Manager for DiscardManager {
///     type Args = ();
///
///     fn signature(&self) -> Signature {
///         Signature::fourcc(b"dscd")
///     }
///
///     fn allocate(&self, _args: ()) -> pipework::Result<Box<dyn NodeBehavior>> {
///         Ok(Box::new(Discard))
///     }
/// }
///
/// let manager = Arc::new(DiscardManager);
/// let node = Node::allocate(&manager, ProbeChain::new(), Signature::fourcc(b"dscd"), ())?;
/// node.input(Buffer::from_vec(vec![0; 4]), &mut SchedContext::new())?;
/// # Ok::<(), pipework::Error>(())
/// ```
pub trait Manager: Send + Sync + 'static {
    /// Arguments needed to build one node.
    type Args;

    /// Signature identifying this node type.
    fn signature(&self) -> Signature;

    /// Name for logs and node names.
    fn name(&self) -> &str {
        "node"
    }

    /// Build the private state of a new node.
    ///
    /// Must not have side effects visible outside the returned behavior, so
    /// that a failed allocation leaves nothing behind.
    fn allocate(&self, args: Self::Args) -> Result<Box<dyn NodeBehavior>>;

    /// Command aimed at the node type rather than one node.
    fn control(&self, command: &ManagerCommand) -> Result<ControlResult> {
        let _ = command;
        Ok(ControlResult::Unhandled)
    }
}

/// Object-safe view of a [`Manager`], kept by every node it built.
pub(crate) trait DynManager: Send + Sync {
    fn signature(&self) -> Signature;
    fn name(&self) -> &str;
    fn control(&self, command: &ManagerCommand) -> Result<ControlResult>;
}

impl<M: Manager> DynManager for M {
    fn signature(&self) -> Signature {
        Manager::signature(self)
    }

    fn name(&self) -> &str {
        Manager::name(self)
    }

    fn control(&self, command: &ManagerCommand) -> Result<ControlResult> {
        Manager::control(self, command)
    }
}

/// Command aimed at a node type.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum ManagerCommand {
    /// Release cached resources (pools, free lists).
    Vacuum,
    /// Command private to the node type owning `signature`.
    Local {
        /// Node type the command belongs to.
        signature: Signature,
        /// Command identifier within that node type.
        id: u32,
        /// Argument.
        arg: CommandArg,
    },
}

/// Per-node private state and operations.
///
/// Every method receives the [`Node`] handle it belongs to, so the behavior
/// can raise events, issue requests and forward buffers. Calls on one node
/// never overlap: the runtime serializes them and reports a re-entrant call
/// as [`Error::Reentrant`](crate::Error::Reentrant).
pub trait NodeBehavior: Send {
    /// Called once after allocation, before the node is handed out.
    ///
    /// This is where resource requests are issued. An error here makes the
    /// allocation fail.
    fn init(&mut self, node: &Node) -> Result<()> {
        let _ = node;
        Ok(())
    }

    /// Apply a control command.
    ///
    /// Unknown commands must return [`ControlResult::Unhandled`].
    fn control(&mut self, node: &Node, command: &Command) -> Result<ControlResult> {
        let _ = (node, command);
        Ok(ControlResult::Unhandled)
    }

    /// Take ownership of one buffer.
    ///
    /// The buffer must be forwarded, kept or released on every path,
    /// including error paths.
    fn input(&mut self, node: &Node, buffer: Buffer, sched: &mut SchedContext) -> Result<()>;

    /// Scheduling callback, run by the node's scheduling context after a
    /// wake-up.
    fn wake(&mut self, node: &Node, sched: &mut SchedContext) -> Result<()> {
        let _ = (node, sched);
        Ok(())
    }
}
