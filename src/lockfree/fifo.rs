//! Bounded multi-producer, single-consumer FIFO.
//!
//! A fixed ring of slots with two monotonically increasing positions:
//!
//! ```text
//!   head (consumer only)          tail (producers, CAS)
//!        │                              │
//!        ▼                              ▼
//!   ┌─────┬─────┬─────┬─────┬─────┬─────┬─────┬─────┐
//!   │ rdy │ rdy │ rsv │ rdy │     │     │     │     │
//!   └─────┴─────┴─────┴─────┴─────┴─────┴─────┴─────┘
//! ```
//!
//! Push is a two-phase commit: a producer first reserves a position by
//! advancing `tail` with CAS, then writes the value and flips the slot's
//! `ready` flag. A reserved but unwritten slot (`rsv` above) is the publish
//! reordering case: the consumer sees `head != tail` but the slot at `head`
//! is not ready yet. It spins briefly, then reports "empty" for now; the
//! producer's wakeup follows its publish.
//!
//! Pop order equals reservation order, so a single producer observes exact
//! FIFO order.

use crate::memory::defaults::PUBLISH_SPIN_LIMIT;
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicIsize, AtomicUsize, Ordering};

struct Slot<T> {
    ready: AtomicBool,
    value: UnsafeCell<MaybeUninit<T>>,
}

/// Shared ring state behind both endpoints.
struct Ring<T> {
    /// Next position to pop. Written only by the consumer.
    head: AtomicUsize,
    /// Next position to reserve. Advanced by producers.
    tail: AtomicUsize,
    /// Maximum number of queued items.
    capacity: usize,
    /// `slots.len() - 1`; slot count is a power of two so wrapping positions stay aligned.
    mask: usize,
    /// Advisory item counter.
    count: AtomicIsize,
    slots: Box<[Slot<T>]>,
}

// SAFETY: a slot value is written by exactly one producer (the one that
// reserved its position) and read by the single consumer after observing
// `ready`; the Release/Acquire pair on `ready` orders the accesses.
unsafe impl<T: Send> Send for Ring<T> {}
unsafe impl<T: Send> Sync for Ring<T> {}

impl<T> Ring<T> {
    fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "fifo capacity must be > 0");
        let slot_count = capacity.next_power_of_two();
        let slots = (0..slot_count)
            .map(|_| Slot {
                ready: AtomicBool::new(false),
                value: UnsafeCell::new(MaybeUninit::uninit()),
            })
            .collect();

        Self {
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
            capacity,
            mask: slot_count - 1,
            count: AtomicIsize::new(0),
            slots,
        }
    }

    fn try_push(&self, value: T) -> Result<(), T> {
        loop {
            // Head first: tail never decreases, so tail >= the head we read.
            let head = self.head.load(Ordering::Acquire);
            let tail = self.tail.load(Ordering::Acquire);

            if tail.wrapping_sub(head) >= self.capacity {
                return Err(value);
            }

            match self.tail.compare_exchange_weak(
                tail,
                tail.wrapping_add(1),
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    let slot = &self.slots[tail & self.mask];
                    debug_assert!(!slot.ready.load(Ordering::Relaxed));
                    // SAFETY: position `tail` is reserved by this thread and the
                    // consumer released the slot before advancing head past it.
                    unsafe { (*slot.value.get()).write(value) };
                    slot.ready.store(true, Ordering::Release);
                    self.count.fetch_add(1, Ordering::Relaxed);
                    return Ok(());
                }
                Err(_) => std::hint::spin_loop(),
            }
        }
    }

    /// Consumer-side pop. Caller guarantees a single consumer.
    fn pop(&self) -> Option<T> {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);
        if head == tail {
            return None;
        }

        let slot = &self.slots[head & self.mask];
        for _ in 0..PUBLISH_SPIN_LIMIT {
            if slot.ready.load(Ordering::Acquire) {
                // SAFETY: `ready` was set after the producer initialized the value.
                let value = unsafe { (*slot.value.get()).assume_init_read() };
                slot.ready.store(false, Ordering::Relaxed);
                self.head.store(head.wrapping_add(1), Ordering::Release);
                self.count.fetch_sub(1, Ordering::Relaxed);
                return Some(value);
            }
            std::hint::spin_loop();
        }

        // Producer reserved the slot but has not published it yet.
        None
    }

    fn has_reserved(&self) -> bool {
        self.head.load(Ordering::Relaxed) != self.tail.load(Ordering::Acquire)
    }

    fn len(&self) -> usize {
        self.count.load(Ordering::Relaxed).max(0) as usize
    }
}

impl<T> Drop for Ring<T> {
    fn drop(&mut self) {
        let head = *self.head.get_mut();
        let tail = *self.tail.get_mut();
        let mut pos = head;
        while pos != tail {
            let slot = &mut self.slots[pos & self.mask];
            if *slot.ready.get_mut() {
                // SAFETY: ready slots hold an initialized value nobody else can reach.
                unsafe { slot.value.get_mut().assume_init_drop() };
            }
            pos = pos.wrapping_add(1);
        }
    }
}

/// Create a bounded FIFO holding at most `capacity` items.
///
/// # Panics
///
/// Panics if `capacity` is zero.
///
/// # Example
///
/// ```rust
/// use pipework::lockfree::bounded;
///
/// let (tx, mut rx) = bounded::<u32>(2);
/// tx.push(1).unwrap();
/// tx.push(2).unwrap();
/// assert_eq!(tx.push(3), Err(3)); // full: the caller keeps the item
///
/// assert_eq!(rx.pop(), Some(1));
/// assert_eq!(rx.pop(), Some(2));
/// assert_eq!(rx.pop(), None);
/// ```
pub fn bounded<T>(capacity: usize) -> (FifoProducer<T>, FifoConsumer<T>) {
    let ring = Arc::new(Ring::new(capacity));
    (
        FifoProducer { ring: ring.clone() },
        FifoConsumer { ring },
    )
}

/// Producer endpoint. Cheap to clone; usable from any thread.
pub struct FifoProducer<T> {
    ring: Arc<Ring<T>>,
}

impl<T> FifoProducer<T> {
    /// Push an item without blocking.
    ///
    /// On a full queue the item is handed back in `Err`, so the caller keeps
    /// ownership and can retry.
    pub fn push(&self, value: T) -> Result<(), T> {
        self.ring.try_push(value)
    }

    /// Fixed capacity chosen at construction.
    pub fn capacity(&self) -> usize {
        self.ring.capacity
    }

    /// Advisory number of queued items.
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Advisory emptiness check.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Clone for FifoProducer<T> {
    fn clone(&self) -> Self {
        Self {
            ring: self.ring.clone(),
        }
    }
}

/// Consumer endpoint.
///
/// There is exactly one per queue: it cannot be cloned and `pop` takes
/// `&mut self`, which makes a second concurrent consumer unrepresentable.
pub struct FifoConsumer<T> {
    ring: Arc<Ring<T>>,
}

impl<T> FifoConsumer<T> {
    /// Pop the oldest published item, or `None` if nothing is ready.
    pub fn pop(&mut self) -> Option<T> {
        self.ring.pop()
    }

    /// Pop and drop every item currently published. Returns how many were dropped.
    pub fn drain(&mut self) -> usize {
        let mut n = 0;
        while let Some(item) = self.pop() {
            drop(item);
            n += 1;
        }
        n
    }

    /// Exact check, from the consumer's point of view, that no position is
    /// reserved or published. A producer mid-publish counts as non-empty.
    pub fn is_empty(&self) -> bool {
        !self.ring.has_reserved()
    }

    /// Fixed capacity chosen at construction.
    pub fn capacity(&self) -> usize {
        self.ring.capacity
    }

    /// Advisory number of queued items.
    pub fn len(&self) -> usize {
        self.ring.len()
    }
}

impl<T> std::fmt::Debug for FifoProducer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FifoProducer")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .finish()
    }
}

impl<T> std::fmt::Debug for FifoConsumer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FifoConsumer")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .finish()
    }
}
