//! Shared resource handles.
//!
//! Everything that outlives a single call in the runtime (buffers, allocators,
//! clocks, scheduler handles, nodes) is owned through a reference-counted
//! handle. This module is the single place where counting happens.
//!
//! # Handle semantics
//!
//! - **Duplicate**: [`Shared::duplicate`] increments the count. O(1), never fails.
//! - **Release**: [`Shared::release`] consumes the handle. The payload is
//!   dropped exactly once, when the last handle goes away. Because release
//!   takes the handle by value, releasing twice does not compile.
//! - **Exclusivity**: [`Shared::is_exclusive`] / [`Shared::get_mut`] gate
//!   in-place mutation on being the sole owner.
//!
//! [`RefCount`] is the explicit atomic counter for the one place where a
//! count is dropped from a thread that does not own the counted object (the
//! controller side of a queue source).

use crate::error::{Error, Result};
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A reference-counted handle to a shared payload.
///
/// Cloning is the same operation as [`duplicate`](Self::duplicate).
///
/// # Example
///
/// ```rust
/// use pipework::shared::Shared;
///
/// let a = Shared::new(vec![1u8, 2, 3]);
/// let b = a.duplicate();
/// assert_eq!(a.ref_count(), 2);
///
/// b.release();
/// assert!(a.is_exclusive());
/// ```
pub struct Shared<T: ?Sized> {
    inner: Arc<T>,
}

impl<T> Shared<T> {
    /// Wrap a payload in a new handle with a count of one.
    pub fn new(payload: T) -> Self {
        Self {
            inner: Arc::new(payload),
        }
    }

    /// Take the payload back if this is the last handle.
    ///
    /// Returns the handle unchanged when other owners exist.
    pub fn try_unwrap(self) -> std::result::Result<T, Self> {
        Arc::try_unwrap(self.inner).map_err(|inner| Self { inner })
    }
}

impl<T: ?Sized> Shared<T> {
    /// Wrap an existing `Arc` (used for unsized payloads such as trait objects).
    pub fn from_arc(inner: Arc<T>) -> Self {
        Self { inner }
    }

    /// Create a second owner of the same payload.
    #[inline]
    pub fn duplicate(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Give up this owner's reference.
    ///
    /// The payload is dropped if this was the last handle.
    #[inline]
    pub fn release(self) {
        drop(self);
    }

    /// Check whether this is the only handle to the payload.
    #[inline]
    pub fn is_exclusive(&self) -> bool {
        Arc::strong_count(&self.inner) == 1
    }

    /// Get mutable access to the payload if, and only if, this handle is exclusive.
    #[inline]
    pub fn get_mut(&mut self) -> Option<&mut T> {
        Arc::get_mut(&mut self.inner)
    }

    /// Current number of handles (advisory when other threads hold handles).
    #[inline]
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Check whether two handles point to the same payload.
    #[inline]
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    /// Borrow the underlying `Arc`.
    pub fn as_arc(&self) -> &Arc<T> {
        &self.inner
    }
}

impl<T: ?Sized> Clone for Shared<T> {
    fn clone(&self) -> Self {
        self.duplicate()
    }
}

impl<T: ?Sized> Deref for Shared<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T: ?Sized> From<Arc<T>> for Shared<T> {
    fn from(inner: Arc<T>) -> Self {
        Self { inner }
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for Shared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shared")
            .field("refs", &self.ref_count())
            .field("payload", &&*self.inner)
            .finish()
    }
}

/// Bit marking a counter that already reached zero.
const RELEASED: usize = 1 << (usize::BITS - 1);

/// Atomic reference counter with a sticky zero.
///
/// Once the count transitions to zero it is marked released and can never be
/// acquired again, so a late `acquire` racing the final `release` cannot
/// resurrect the counted object. Both transitions are single CAS loops.
#[derive(Debug)]
pub struct RefCount {
    state: AtomicUsize,
}

impl RefCount {
    /// Create a counter holding `initial` references.
    ///
    /// A counter created with zero references is not released; it can still
    /// be acquired.
    pub fn new(initial: usize) -> Self {
        assert!(initial < RELEASED, "initial refcount too large");
        Self {
            state: AtomicUsize::new(initial),
        }
    }

    /// Add a reference.
    ///
    /// Fails once the counter has been released.
    pub fn acquire(&self) -> Result<()> {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if current & RELEASED != 0 {
                return Err(Error::InvariantViolation(
                    "acquire on a released refcount".into(),
                ));
            }
            if current + 1 >= RELEASED {
                return Err(Error::InvariantViolation("refcount overflow".into()));
            }
            match self.state.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(()),
                Err(actual) => current = actual,
            }
        }
    }

    /// Drop a reference.
    ///
    /// Returns `Ok(true)` for the caller that performed the transition to
    /// zero; that caller owns the teardown. Releasing a counter that holds no
    /// references is reported, never ignored.
    pub fn release(&self) -> Result<bool> {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if current & RELEASED != 0 || current == 0 {
                return Err(Error::InvariantViolation(
                    "release on a refcount with no references".into(),
                ));
            }
            let next = if current == 1 { RELEASED } else { current - 1 };
            match self.state.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(next == RELEASED),
                Err(actual) => current = actual,
            }
        }
    }

    /// Current count (zero once released).
    pub fn count(&self) -> usize {
        self.state.load(Ordering::Acquire) & !RELEASED
    }

    /// Check whether the counter went through its final release.
    pub fn is_released(&self) -> bool {
        self.state.load(Ordering::Acquire) & RELEASED != 0
    }
}
