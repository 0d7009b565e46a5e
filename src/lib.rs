//! # Pipework
//!
//! Core runtime of a media pipeline: the plumbing every node relies on,
//! without any codec or protocol logic.
//!
//! ## Building blocks
//!
//! - **Shared handles** ([`shared`]): reference counting with single drop on
//!   the last release, plus a sticky-zero [`RefCount`](shared::RefCount).
//! - **Lock-free containers** ([`lockfree`]): a multi-producer LIFO stack and
//!   a bounded multi-producer single-consumer FIFO.
//! - **Buffers and pools** ([`buffer`], [`memory`]): refcounted byte buffers
//!   with copy-on-write, recycled through bounded pools.
//! - **Nodes** ([`node`]): allocation through managers, control commands,
//!   buffer input, output links and flow format negotiation.
//! - **Probes** ([`probe`]): per-node chains of event handlers answering
//!   resource requests and reacting to format changes.
//! - **Cross-thread queues** ([`nodes::queue`]): move buffers between
//!   scheduling contexts with backpressure.
//!
//! ## Quick start
//!
//! ```rust
//! use pipework::prelude::*;
//! use pipework::nodes::{IDENTITY, IdentityManager, NULL_SINK, NullSinkConfig, NullSinkManager};
//! use std::sync::Arc;
//!
//! let probes = ProbeChain::new().prepend(LogProbe::new()).prepend(FormatForwarder::new());
//! let sink = Node::allocate(&Arc::new(NullSinkManager), probes.clone(), NULL_SINK, NullSinkConfig::any())?;
//! let identity = Node::allocate(&Arc::new(IdentityManager), probes, IDENTITY, ())?;
//! identity.set_output(Some(sink))?;
//!
//! identity.control(Command::SetFlowFormat(FlowFormat::new("block.mpegts.")))?;
//! identity.input(Buffer::from_vec(vec![0x47; 188]), &mut SchedContext::new())?;
//! # Ok::<(), pipework::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod buffer;
pub mod clock;
pub mod config;
pub mod error;
pub mod event;
pub mod format;
pub mod lockfree;
pub mod memory;
pub mod node;
pub mod nodes;
pub mod observability;
pub mod probe;
pub mod request;
pub mod sched;
pub mod shared;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::buffer::{Buffer, Metadata};
    pub use crate::clock::{Clock, ClockTime};
    pub use crate::error::{Error, Result};
    pub use crate::event::{Event, ProbeOutcome};
    pub use crate::format::FlowFormat;
    pub use crate::memory::{BufferAllocator, BufferPool};
    pub use crate::node::{Command, ControlResult, Manager, Node, NodeBehavior, Reply, Signature};
    pub use crate::probe::{FormatForwarder, LogProbe, Probe, ProbeChain, ResourceProvider};
    pub use crate::sched::{Pump, SchedContext, Scheduler};
    pub use crate::shared::Shared;
}

pub use error::{Error, Result};
