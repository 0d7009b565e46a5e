//! Multi-producer, single-consumer LIFO stack.

use crate::error::{Error, Result};
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicIsize, AtomicPtr, Ordering};

struct StackNode<T> {
    value: T,
    next: *mut StackNode<T>,
}

/// Lock-free stack with any number of producers and one consumer.
///
/// # Algorithm
///
/// - **Push (any thread)**: link a freshly boxed node in front of the
///   current head with a CAS retry loop. Never blocks.
/// - **Pop (one consumer at a time)**: CAS the head to its successor and
///   move the value out of the node.
///
/// Pop is only sound with a single consumer: a node can only be freed by a
/// pop, so while one pop runs no other thread can free and recycle the head
/// it observed (no ABA). Two overlapping pops are detected through the
/// `popping` flag and reported as [`Error::InvariantViolation`] instead of
/// racing. Sequential pops from different threads are fine.
///
/// Items are owned by the stack while queued; `pop` hands ownership back,
/// so a popped item has no remaining link into the stack.
///
/// # Length
///
/// [`len`](Self::len) is an advisory counter updated with fetch-add/sub
/// after each successful push/pop. It can be a few units off while producers
/// are active and must not be used to predict whether `pop` succeeds.
pub struct LifoStack<T> {
    head: AtomicPtr<StackNode<T>>,
    len: AtomicIsize,
    popping: AtomicBool,
}

impl<T> LifoStack<T> {
    /// Create an empty stack.
    pub fn new() -> Self {
        Self {
            head: AtomicPtr::new(ptr::null_mut()),
            len: AtomicIsize::new(0),
            popping: AtomicBool::new(false),
        }
    }

    /// Push an item. Callable concurrently from any thread.
    pub fn push(&self, value: T) {
        let node = Box::into_raw(Box::new(StackNode {
            value,
            next: ptr::null_mut(),
        }));

        let mut head = self.head.load(Ordering::Relaxed);
        loop {
            // SAFETY: `node` is not published yet, this thread owns it.
            unsafe { (*node).next = head };
            match self
                .head
                .compare_exchange_weak(head, node, Ordering::Release, Ordering::Relaxed)
            {
                Ok(_) => break,
                Err(actual) => {
                    head = actual;
                    std::hint::spin_loop();
                }
            }
        }

        self.len.fetch_add(1, Ordering::Relaxed);
    }

    /// Pop the most recently pushed item.
    ///
    /// Returns `Ok(None)` if the stack is empty, or an error if another pop
    /// is running at the same time.
    pub fn pop(&self) -> Result<Option<T>> {
        if self.popping.swap(true, Ordering::Acquire) {
            return Err(Error::InvariantViolation(
                "concurrent consumers on a single-consumer stack".into(),
            ));
        }
        let _guard = PopGuard(&self.popping);

        let mut head = self.head.load(Ordering::Acquire);
        loop {
            if head.is_null() {
                return Ok(None);
            }
            // SAFETY: only a pop frees nodes and pops are serialized by
            // `popping`, so `head` is still allocated.
            let next = unsafe { (*head).next };
            match self
                .head
                .compare_exchange_weak(head, next, Ordering::Acquire, Ordering::Acquire)
            {
                Ok(_) => {
                    self.len.fetch_sub(1, Ordering::Relaxed);
                    // SAFETY: the node is unlinked and we are its only owner.
                    let node = unsafe { Box::from_raw(head) };
                    return Ok(Some(node.value));
                }
                Err(actual) => head = actual,
            }
        }
    }

    /// Advisory number of items (approximate under concurrent pushes).
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed).max(0) as usize
    }

    /// Advisory emptiness check.
    pub fn is_empty(&self) -> bool {
        self.head.load(Ordering::Acquire).is_null()
    }
}

impl<T> Default for LifoStack<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for LifoStack<T> {
    fn drop(&mut self) {
        let mut cur = *self.head.get_mut();
        while !cur.is_null() {
            // SAFETY: `&mut self` excludes producers and consumers.
            let node = unsafe { Box::from_raw(cur) };
            cur = node.next;
        }
    }
}

// SAFETY: values move between threads through push/pop; the raw links are
// only dereferenced under the rules documented on the type.
unsafe impl<T: Send> Send for LifoStack<T> {}
unsafe impl<T: Send> Sync for LifoStack<T> {}

struct PopGuard<'a>(&'a AtomicBool);

impl Drop for PopGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<T> std::fmt::Debug for LifoStack<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifoStack").field("len", &self.len()).finish()
    }
}
