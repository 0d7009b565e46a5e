//! Probe chains.
//!
//! A probe chain is an immutable singly-linked list of [`Probe`]s, ordered
//! from the node outward to increasingly generic handlers:
//!
//! ```text
//!   node ──raise──► FormatForwarder ──► ResourceProvider ──► LogProbe ──► (unhandled)
//! ```
//!
//! [`ProbeChain::raise`] offers an event to each probe in turn and stops at
//! the first one returning [`ProbeOutcome::Handled`]. When every probe passes,
//! the chain reports `Unhandled` to the raising node.
//!
//! Chains are built by prepending to an existing chain, so many nodes can
//! share the same generic tail. A node owns its chain for its whole life; the
//! chain cannot be released while an event is dispatched on it.
//!
//! # Example
//!
//! ```rust
//! use pipework::event::{Event, ProbeOutcome};
//! use pipework::node::Node;
//! use pipework::probe::{LogProbe, ProbeChain, from_fn};
//!
//! let app = ProbeChain::new()
//!     .prepend(LogProbe::new())
//!     .prepend(from_fn(|_node: &Node, event: &Event<'_>| {
//!         if event.is_fatal() {
//!             ProbeOutcome::Handled
//!         } else {
//!             ProbeOutcome::Unhandled
//!         }
//!     }));
//! assert_eq!(app.depth(), 2);
//! ```

mod channel;
mod forward;
mod log;
mod provider;

pub use channel::{ChannelProbe, EventRecord};
pub use forward::FormatForwarder;
pub use log::LogProbe;
pub use provider::ResourceProvider;

use crate::event::{Event, ProbeOutcome};
use crate::node::Node;
use std::sync::Arc;

/// An event handler in a probe chain.
pub trait Probe: Send + Sync {
    /// Look at an event raised by `node`.
    ///
    /// Return [`ProbeOutcome::Handled`] to stop propagation.
    fn catch(&self, node: &Node, event: &Event<'_>) -> ProbeOutcome;
}

/// Probe built from a closure. See [`from_fn`].
pub struct FnProbe<F> {
    f: F,
}

impl<F> Probe for FnProbe<F>
where
    F: Fn(&Node, &Event<'_>) -> ProbeOutcome + Send + Sync,
{
    fn catch(&self, node: &Node, event: &Event<'_>) -> ProbeOutcome {
        (self.f)(node, event)
    }
}

/// Wrap a closure as a probe.
pub fn from_fn<F>(f: F) -> FnProbe<F>
where
    F: Fn(&Node, &Event<'_>) -> ProbeOutcome + Send + Sync,
{
    FnProbe { f }
}

struct ProbeLink {
    probe: Arc<dyn Probe>,
    next: ProbeChain,
}

/// Shared, immutable list of probes.
///
/// Cloning shares the same links.
#[derive(Clone, Default)]
pub struct ProbeChain {
    head: Option<Arc<ProbeLink>>,
}

impl ProbeChain {
    /// Empty chain: every event comes back unhandled.
    pub fn new() -> Self {
        Self::default()
    }

    /// New chain trying `probe` first, then this chain.
    pub fn prepend(&self, probe: impl Probe + 'static) -> ProbeChain {
        self.prepend_shared(Arc::new(probe))
    }

    /// Like [`prepend`](Self::prepend) for a probe shared with other chains.
    pub fn prepend_shared(&self, probe: Arc<dyn Probe>) -> ProbeChain {
        ProbeChain {
            head: Some(Arc::new(ProbeLink {
                probe,
                next: self.clone(),
            })),
        }
    }

    /// Offer `event` to each probe in order until one handles it.
    pub fn raise(&self, node: &Node, event: &Event<'_>) -> ProbeOutcome {
        let mut cur = self.head.as_deref();
        while let Some(link) = cur {
            if link.probe.catch(node, event).is_handled() {
                return ProbeOutcome::Handled;
            }
            cur = link.next.head.as_deref();
        }
        ProbeOutcome::Unhandled
    }

    /// Number of probes.
    pub fn depth(&self) -> usize {
        let mut n = 0;
        let mut cur = self.head.as_deref();
        while let Some(link) = cur {
            n += 1;
            cur = link.next.head.as_deref();
        }
        n
    }

    /// Check whether the chain has no probe.
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }
}

impl Drop for ProbeChain {
    fn drop(&mut self) {
        // Unlink iteratively so long chains cannot overflow the stack.
        let mut cur = self.head.take();
        while let Some(link) = cur {
            match Arc::try_unwrap(link) {
                Ok(mut link) => cur = link.next.head.take(),
                Err(_) => break,
            }
        }
    }
}

impl std::fmt::Debug for ProbeChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbeChain")
            .field("depth", &self.depth())
            .finish()
    }
}
