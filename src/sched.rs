//! Scheduler contract.
//!
//! The runtime does not ship an event loop. It only relies on this contract:
//!
//! - A [`Scheduler`] is a wake-up handle for one scheduling context
//!   (thread). [`Scheduler::wake`] may be called from any thread and never
//!   blocks; the context later calls [`Node::wake`](crate::node::Node::wake)
//!   on the nodes it drives.
//! - A [`Pump`] is the upstream feeder of a subgraph. Nodes block it when they
//!   cannot accept more input and unblock it when they can; the event loop is
//!   expected to stop calling `input` while it is blocked.
//! - A [`SchedContext`] is passed along with every `input` and `wake` so a
//!   node knows which pump is feeding it.
//!
//! [`NotifyScheduler`] implements the contract on top of
//! [`tokio::sync::Notify`], which fits async workers:
//!
//! ```rust
//! use pipework::sched::{NotifyScheduler, Scheduler};
//!
//! # tokio_test_block_on(async {
//! let sched = NotifyScheduler::new("worker");
//! sched.wake(); // permit is stored until someone waits
//! sched.notified().await;
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

/// Wake-up handle of a scheduling context.
pub trait Scheduler: Send + Sync {
    /// Ask the context to run its nodes' scheduling callbacks soon.
    ///
    /// Callable from any thread; never blocks.
    fn wake(&self);

    /// Name for logging.
    fn name(&self) -> &str {
        "scheduler"
    }
}

/// [`Scheduler`] backed by a [`tokio::sync::Notify`].
///
/// Wakes issued while nobody waits are coalesced into a single stored permit.
#[derive(Debug, Clone)]
pub struct NotifyScheduler {
    name: String,
    notify: Arc<Notify>,
}

impl NotifyScheduler {
    /// Create a scheduler handle.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Wait until [`wake`](Scheduler::wake) is called.
    pub async fn notified(&self) {
        self.notify.notified().await;
    }
}

impl Scheduler for NotifyScheduler {
    fn wake(&self) {
        self.notify.notify_one();
    }

    fn name(&self) -> &str {
        &self.name
    }
}

struct PumpInner {
    name: String,
    blocked: AtomicBool,
}

/// Upstream feeder of a subgraph, blockable by the nodes it feeds.
///
/// Cloning yields another handle to the same pump.
#[derive(Clone)]
pub struct Pump {
    inner: Arc<PumpInner>,
}

impl Pump {
    /// Create an unblocked pump.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(PumpInner {
                name: name.into(),
                blocked: AtomicBool::new(false),
            }),
        }
    }

    /// Stop feeding. Returns `true` if the pump was running.
    pub fn block(&self) -> bool {
        let was_blocked = self.inner.blocked.swap(true, Ordering::AcqRel);
        if !was_blocked {
            tracing::debug!(pump = %self.inner.name, "pump blocked");
        }
        !was_blocked
    }

    /// Resume feeding. Returns `true` if the pump was blocked.
    pub fn unblock(&self) -> bool {
        let was_blocked = self.inner.blocked.swap(false, Ordering::AcqRel);
        if was_blocked {
            tracing::debug!(pump = %self.inner.name, "pump unblocked");
        }
        was_blocked
    }

    /// Check whether the pump is blocked.
    pub fn is_blocked(&self) -> bool {
        self.inner.blocked.load(Ordering::Acquire)
    }

    /// Pump name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }
}

impl std::fmt::Debug for Pump {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pump")
            .field("name", &self.inner.name)
            .field("blocked", &self.is_blocked())
            .finish()
    }
}

/// Per-call scheduling information handed to `input` and `wake`.
#[derive(Debug, Clone, Default)]
pub struct SchedContext {
    pump: Option<Pump>,
}

impl SchedContext {
    /// Context without a pump (data pushed directly by the caller).
    pub fn new() -> Self {
        Self::default()
    }

    /// Context for data fed by `pump`.
    pub fn with_pump(pump: Pump) -> Self {
        Self { pump: Some(pump) }
    }

    /// The pump feeding this call, if any.
    pub fn pump(&self) -> Option<&Pump> {
        self.pump.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_pump_transitions() {
        let pump = Pump::new("src");
        assert!(!pump.is_blocked());
        assert!(pump.block());
        assert!(!pump.block());

        let other = pump.clone();
        assert!(other.is_blocked());
        assert!(other.unblock());
        assert!(!pump.unblock());
    }

    #[test]
    fn test_sched_context() {
        assert!(SchedContext::new().pump().is_none());
        let ctx = SchedContext::with_pump(Pump::new("p"));
        assert_eq!(ctx.pump().map(Pump::name), Some("p"));
    }

    #[tokio::test]
    async fn test_notify_scheduler_wakes_waiter() {
        let sched = NotifyScheduler::new("worker");
        let waiter = sched.clone();
        let task = tokio::spawn(async move { waiter.notified().await });

        tokio::task::yield_now().await;
        sched.wake();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }
}
