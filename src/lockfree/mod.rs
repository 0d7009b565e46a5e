//! Lock-free pool primitives.
//!
//! Both structures follow the same contract: **many producers, exactly one
//! consumer**. Producers may push concurrently from any thread and never
//! block; pops are non-blocking and belong to a single consumer.
//!
//! - [`LifoStack`]: unbounded stack used as the buffer pool free list.
//!   Overlapping pops are detected and reported as an error.
//! - [`bounded`]: fixed-capacity FIFO split into a cloneable
//!   [`FifoProducer`] and a unique [`FifoConsumer`], used for cross-thread
//!   buffer hand-off.
//!
//! Length counters on both are advisory: they may drift by a few units under
//! concurrent producers and converge once producers quiesce. No decision in
//! this crate depends on them for correctness.

mod fifo;
mod lifo;

pub use fifo::{FifoConsumer, FifoProducer, bounded};
pub use lifo::LifoStack;
