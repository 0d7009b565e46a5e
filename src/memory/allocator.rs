//! Allocator traits and the heap allocator.

use crate::buffer::Buffer;
use crate::error::{Error, Result};
use std::sync::atomic::{AtomicU64, Ordering};

/// Backing allocator producing raw buffer storage.
///
/// Implementations must report exhaustion as
/// [`Error::AllocationFailed`] rather than aborting.
pub trait MemoryAllocator: Send + Sync {
    /// Allocate empty storage with room for at least `capacity` bytes.
    fn allocate(&self, capacity: usize) -> Result<Vec<u8>>;

    /// Name for logging.
    fn name(&self) -> &str {
        "allocator"
    }
}

/// Allocator of ready-to-use buffers.
///
/// This is the resource nodes obtain with
/// [`ResourceKind::BufferAllocator`](crate::request::ResourceKind::BufferAllocator).
pub trait BufferAllocator: Send + Sync {
    /// Allocate a buffer of `size` bytes, exclusively owned by the caller.
    fn alloc_buffer(&self, size: usize) -> Result<Buffer>;

    /// Name for logging.
    fn name(&self) -> &str;
}

/// Heap allocator backed by `Vec<u8>`.
///
/// Allocation uses `try_reserve_exact`, so an out-of-memory condition comes
/// back as an error. An optional allocation limit makes exhaustion easy to
/// provoke.
#[derive(Debug)]
pub struct HeapAllocator {
    name: String,
    limit: Option<u64>,
    allocations: AtomicU64,
    failures: AtomicU64,
}

impl HeapAllocator {
    /// Create an unlimited heap allocator.
    pub fn new() -> Self {
        Self::with_name("heap")
    }

    /// Create an unlimited heap allocator with a custom name.
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            limit: None,
            allocations: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    /// Fail every allocation after the first `max` ones.
    pub fn with_allocation_limit(mut self, max: u64) -> Self {
        self.limit = Some(max);
        self
    }

    /// Number of successful allocations so far.
    pub fn allocations(&self) -> u64 {
        self.allocations.load(Ordering::Relaxed)
    }

    /// Number of failed allocations so far.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    fn fail(&self, reason: String) -> Error {
        self.failures.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(allocator = %self.name, %reason, "allocation failed");
        Error::AllocationFailed(reason)
    }
}

impl Default for HeapAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryAllocator for HeapAllocator {
    fn allocate(&self, capacity: usize) -> Result<Vec<u8>> {
        if let Some(limit) = self.limit {
            let reserved = self
                .allocations
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                    (n < limit).then_some(n + 1)
                });
            if reserved.is_err() {
                return Err(self.fail(format!("{}: allocation limit {} reached", self.name, limit)));
            }
        } else {
            self.allocations.fetch_add(1, Ordering::Relaxed);
        }

        let mut storage = Vec::new();
        if let Err(e) = storage.try_reserve_exact(capacity) {
            self.allocations.fetch_sub(1, Ordering::Relaxed);
            return Err(self.fail(format!("{}: {} bytes: {}", self.name, capacity, e)));
        }
        Ok(storage)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl BufferAllocator for HeapAllocator {
    fn alloc_buffer(&self, size: usize) -> Result<Buffer> {
        let mut storage = self.allocate(size)?;
        storage.resize(size, 0);
        Ok(Buffer::from_vec(storage))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
