//! Memory management.
//!
//! # Architecture
//!
//! - [`MemoryAllocator`]: backing allocator producing raw storage; failure is
//!   reported as [`Error::AllocationFailed`](crate::Error::AllocationFailed).
//! - [`BufferAllocator`]: the seam nodes obtain through resource requests to
//!   create [`Buffer`](crate::buffer::Buffer)s.
//! - [`HeapAllocator`]: plain heap allocator implementing both.
//! - [`BufferPool`]: bounded free list of buffer storage built on the
//!   lock-free stack, falling back to its backing allocator on a miss.
//!
//! # Example
//!
//! ```rust
//! use pipework::config::PoolConfig;
//! use pipework::memory::BufferPool;
//!
//! let pool = BufferPool::with_heap(PoolConfig::new(1024, 4))?;
//! let buffer = pool.acquire()?;
//! assert!(buffer.is_pooled());
//!
//! // Storage goes back to the pool when the last handle is released.
//! buffer.release();
//! assert_eq!(pool.depth(), 1);
//! # Ok::<(), pipework::Error>(())
//! ```

mod allocator;
pub mod defaults;
mod pool;

pub use allocator::{BufferAllocator, HeapAllocator, MemoryAllocator};
pub use pool::{BufferPool, PoolStats};

pub(crate) use pool::PoolOrigin;
