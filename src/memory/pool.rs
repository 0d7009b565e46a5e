//! Bounded buffer pool.
//!
//! The pool keeps released buffer storage on a [`LifoStack`] and hands it out
//! again before touching the backing allocator:
//!
//! ```text
//!   acquire ──► pop free list ──hit──► Buffer (tagged with pool)
//!                    │
//!                   miss
//!                    ▼
//!             backing allocator ─────► Buffer (tagged with pool)
//!
//!   last handle released ──► depth < max_depth ? push storage : free it
//! ```
//!
//! Releasing may happen on any thread (it is a push). Acquiring pops and so
//! belongs to one thread at a time; overlapping acquires from two threads are
//! reported as [`Error::InvariantViolation`].

use crate::buffer::Buffer;
use crate::config::PoolConfig;
use crate::error::Result;
use crate::lockfree::LifoStack;
use crate::memory::{BufferAllocator, HeapAllocator, MemoryAllocator};
use crate::shared::Shared;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Statistics about pool usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Maximum number of pooled buffers.
    pub max_depth: usize,
    /// Buffers currently pooled (including in-flight returns).
    pub depth: usize,
    /// Acquisitions served from the free list.
    pub hits: u64,
    /// Acquisitions that went to the backing allocator.
    pub backing_allocations: u64,
    /// Released buffers whose storage went back to the free list.
    pub recycled: u64,
    /// Released buffers whose storage was freed (pool full or undersized).
    pub freed: u64,
}

/// Internal statistics tracking.
#[derive(Default)]
struct PoolStatsInner {
    hits: AtomicU64,
    backing_allocations: AtomicU64,
    recycled: AtomicU64,
    freed: AtomicU64,
}

/// Shared pool state (referenced by the pool and every buffer it produced).
struct PoolShared {
    config: PoolConfig,
    free: LifoStack<Vec<u8>>,
    /// Exact number of storage slots reserved on the free list.
    depth: AtomicUsize,
    backing: Shared<dyn MemoryAllocator>,
    stats: PoolStatsInner,
}

impl PoolShared {
    /// Offer released storage back to the pool.
    fn recycle(&self, mut storage: Vec<u8>) {
        if storage.capacity() < self.config.buffer_size {
            self.stats.freed.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let max = self.config.max_depth;
        let reserved = self
            .depth
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |d| {
                (d < max).then_some(d + 1)
            });

        match reserved {
            Ok(_) => {
                storage.clear();
                self.free.push(storage);
                self.stats.recycled.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                self.stats.freed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn pop_free(&self) -> Result<Option<Vec<u8>>> {
        let storage = self.free.pop()?;
        if storage.is_some() {
            self.depth.fetch_sub(1, Ordering::AcqRel);
        }
        Ok(storage)
    }
}

impl Drop for PoolShared {
    fn drop(&mut self) {
        tracing::debug!(
            pool = %self.config.name,
            pooled = self.depth.load(Ordering::Relaxed),
            "buffer pool destroyed"
        );
    }
}

/// Tag carried by pool-backed buffers so their storage returns on release.
pub(crate) struct PoolOrigin {
    pool: Arc<PoolShared>,
}

impl PoolOrigin {
    pub(crate) fn recycle(self, storage: Vec<u8>) {
        self.pool.recycle(storage);
    }
}

/// A bounded pool of reusable buffer storage.
///
/// Cloning the pool is cheap and shares the same free list.
///
/// # Example
///
/// ```rust
/// use pipework::config::PoolConfig;
/// use pipework::memory::BufferPool;
///
/// let pool = BufferPool::with_heap(PoolConfig::new(188 * 7, 2))?;
///
/// let a = pool.acquire()?;
/// let b = a.duplicate();
/// drop(a);
/// assert_eq!(pool.depth(), 0); // still referenced by `b`
///
/// drop(b);
/// assert_eq!(pool.depth(), 1);
/// # Ok::<(), pipework::Error>(())
/// ```
#[derive(Clone)]
pub struct BufferPool {
    shared: Arc<PoolShared>,
}

impl BufferPool {
    /// Create a pool over a backing allocator.
    ///
    /// With [`PoolConfig::preallocated`] the free list is filled to
    /// `max_depth` right away.
    pub fn new(config: PoolConfig, backing: Shared<dyn MemoryAllocator>) -> Result<Self> {
        config.validate()?;

        let pool = Self {
            shared: Arc::new(PoolShared {
                free: LifoStack::new(),
                depth: AtomicUsize::new(0),
                backing,
                stats: PoolStatsInner::default(),
                config,
            }),
        };

        if pool.shared.config.preallocate {
            pool.prefill()?;
        }

        tracing::debug!(
            pool = %pool.shared.config.name,
            buffer_size = pool.shared.config.buffer_size,
            max_depth = pool.shared.config.max_depth,
            "buffer pool created"
        );
        Ok(pool)
    }

    /// Create a pool over a fresh [`HeapAllocator`].
    pub fn with_heap(config: PoolConfig) -> Result<Self> {
        let heap: Arc<dyn MemoryAllocator> = Arc::new(HeapAllocator::with_name(config.name.clone()));
        Self::new(config, Shared::from_arc(heap))
    }

    /// Fill the free list up to `max_depth` from the backing allocator.
    ///
    /// Returns how many storage slots were added.
    pub fn prefill(&self) -> Result<usize> {
        let mut added = 0;
        while self.shared.depth.load(Ordering::Acquire) < self.shared.config.max_depth {
            let storage = self.shared.backing.allocate(self.shared.config.buffer_size)?;
            self.shared
                .stats
                .backing_allocations
                .fetch_add(1, Ordering::Relaxed);
            self.shared.depth.fetch_add(1, Ordering::AcqRel);
            self.shared.free.push(storage);
            added += 1;
        }
        Ok(added)
    }

    /// Acquire a buffer of the pool's `buffer_size`.
    pub fn acquire(&self) -> Result<Buffer> {
        self.acquire_sized(self.shared.config.buffer_size)
    }

    /// Acquire a buffer of `len` bytes.
    ///
    /// Requests larger than `buffer_size` bypass the pool and are not
    /// returned to it on release.
    pub fn acquire_sized(&self, len: usize) -> Result<Buffer> {
        let config = &self.shared.config;

        if len > config.buffer_size {
            tracing::debug!(pool = %config.name, len, "oversized request, bypassing pool");
            let mut storage = self.shared.backing.allocate(len)?;
            storage.resize(len, 0);
            return Ok(Buffer::from_vec(storage));
        }

        let mut storage = match self.shared.pop_free()? {
            Some(storage) => {
                self.shared.stats.hits.fetch_add(1, Ordering::Relaxed);
                storage
            }
            None => {
                let storage = self.shared.backing.allocate(config.buffer_size)?;
                self.shared
                    .stats
                    .backing_allocations
                    .fetch_add(1, Ordering::Relaxed);
                tracing::trace!(pool = %config.name, "pool miss, used backing allocator");
                storage
            }
        };

        storage.resize(len, 0);
        Ok(Buffer::from_pool(
            storage,
            PoolOrigin {
                pool: Arc::clone(&self.shared),
            },
        ))
    }

    /// Free every pooled storage slot. Returns how many were freed.
    pub fn vacuum(&self) -> Result<usize> {
        let mut freed = 0;
        while let Some(storage) = self.shared.pop_free()? {
            drop(storage);
            freed += 1;
        }
        self.shared
            .stats
            .freed
            .fetch_add(freed as u64, Ordering::Relaxed);
        Ok(freed)
    }

    /// Number of pooled storage slots.
    pub fn depth(&self) -> usize {
        self.shared.depth.load(Ordering::Acquire)
    }

    /// Maximum number of pooled storage slots.
    pub fn max_depth(&self) -> usize {
        self.shared.config.max_depth
    }

    /// Size of the buffers this pool hands out.
    pub fn buffer_size(&self) -> usize {
        self.shared.config.buffer_size
    }

    /// Pool name.
    pub fn name(&self) -> &str {
        &self.shared.config.name
    }

    /// Get pool statistics.
    pub fn stats(&self) -> PoolStats {
        let s = &self.shared.stats;
        PoolStats {
            max_depth: self.shared.config.max_depth,
            depth: self.depth(),
            hits: s.hits.load(Ordering::Relaxed),
            backing_allocations: s.backing_allocations.load(Ordering::Relaxed),
            recycled: s.recycled.load(Ordering::Relaxed),
            freed: s.freed.load(Ordering::Relaxed),
        }
    }
}

impl BufferAllocator for BufferPool {
    fn alloc_buffer(&self, size: usize) -> Result<Buffer> {
        self.acquire_sized(size)
    }

    fn name(&self) -> &str {
        &self.shared.config.name
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("name", &self.shared.config.name)
            .field("buffer_size", &self.shared.config.buffer_size)
            .field("depth", &self.depth())
            .field("max_depth", &self.shared.config.max_depth)
            .finish()
    }
}
