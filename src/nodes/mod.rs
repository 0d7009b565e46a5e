//! Built-in node types.
//!
//! | Signature | Manager | Role |
//! |-----------|---------|------|
//! | `nsnk` | [`NullSinkManager`] | releases everything it receives |
//! | `idnt` | [`IdentityManager`] | forwards buffers and formats unchanged |
//! | `bin_` | [`BinManager`] | presents an inner node as one node |
//! | `qsnk` / `qsrc` | [`QueueSinkManager`] / [`QueueSourceManager`] | cross-thread queue pair |

pub mod bin;
pub mod identity;
pub mod null;
pub mod queue;

pub use bin::{BIN, BinManager};
pub use identity::{IDENTITY, IdentityManager};
pub use null::{NULL_SINK, NullSinkConfig, NullSinkManager};
pub use queue::{
    CrossThreadQueue, QUEUE_SINK, QUEUE_SOURCE, QueueSinkManager, QueueSourceHandle,
    QueueSourceManager, QueueState, Rejected,
};
