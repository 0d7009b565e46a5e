//! Resource requests.
//!
//! A node that needs a resource it does not own (a buffer allocator, a clock,
//! a scheduler handle) raises a [`ResourceRequest`] on its probe chain as
//! [`Event::Request`](crate::event::Event::Request). The first probe that
//! recognizes the [`ResourceKind`] calls [`ResourceRequest::provide`] and
//! reports the event handled. An unclaimed request resolves to
//! [`Error::ResourceUnavailable`]; the requester decides on a fallback.
//!
//! ```rust
//! use pipework::request::{Resource, ResourceKind, ResourceRequest};
//! use pipework::clock::ClockTime;
//!
//! let req = ResourceRequest::new(ResourceKind::SinkLatency);
//! req.provide(Resource::Latency(ClockTime::from_millis(40)))?;
//!
//! // Only one claimant may answer.
//! assert!(req.provide(Resource::Latency(ClockTime::ZERO)).is_err());
//! # Ok::<(), pipework::Error>(())
//! ```

use crate::clock::{Clock, ClockTime};
use crate::error::{Error, Result};
use crate::format::FlowFormat;
use crate::memory::BufferAllocator;
use crate::node::Signature;
use crate::sched::Scheduler;
use crate::shared::Shared;
use std::any::Any;
use std::fmt;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};

/// Which resource is requested.
///
/// The set is open: probes that do not recognize a kind leave the request
/// alone, so an unknown kind simply ends up unavailable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ResourceKind {
    /// A [`BufferAllocator`] to create output buffers with.
    BufferAllocator,
    /// A [`Clock`].
    Clock,
    /// The [`Scheduler`] of the node's scheduling context.
    Scheduler,
    /// A preferred flow format for the node's output.
    FlowFormatHint,
    /// Latency of the sink at the end of the graph.
    SinkLatency,
    /// Resource private to a node type.
    Custom(Signature),
}

/// A provided resource.
#[derive(Clone)]
pub enum Resource {
    /// Answer to [`ResourceKind::BufferAllocator`].
    BufferAllocator(Shared<dyn BufferAllocator>),
    /// Answer to [`ResourceKind::Clock`].
    Clock(Shared<dyn Clock>),
    /// Answer to [`ResourceKind::Scheduler`].
    Scheduler(Shared<dyn Scheduler>),
    /// Answer to [`ResourceKind::FlowFormatHint`].
    FlowFormat(FlowFormat),
    /// Answer to [`ResourceKind::SinkLatency`].
    Latency(ClockTime),
    /// Answer to [`ResourceKind::Custom`].
    Custom(Signature, Shared<dyn Any + Send + Sync>),
}

impl Resource {
    /// The kind of request this resource answers.
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::BufferAllocator(_) => ResourceKind::BufferAllocator,
            Self::Clock(_) => ResourceKind::Clock,
            Self::Scheduler(_) => ResourceKind::Scheduler,
            Self::FlowFormat(_) => ResourceKind::FlowFormatHint,
            Self::Latency(_) => ResourceKind::SinkLatency,
            Self::Custom(sig, _) => ResourceKind::Custom(*sig),
        }
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BufferAllocator(a) => f.debug_tuple("BufferAllocator").field(&a.name()).finish(),
            Self::Clock(c) => f.debug_tuple("Clock").field(&c.name()).finish(),
            Self::Scheduler(s) => f.debug_tuple("Scheduler").field(&s.name()).finish(),
            Self::FlowFormat(fmt) => f.debug_tuple("FlowFormat").field(fmt).finish(),
            Self::Latency(t) => f.debug_tuple("Latency").field(t).finish(),
            Self::Custom(sig, _) => f.debug_tuple("Custom").field(sig).finish(),
        }
    }
}

static NEXT_CORRELATION: AtomicU64 = AtomicU64::new(1);

/// A pending request for a resource.
///
/// The response slot is written at most once.
#[derive(Debug)]
pub struct ResourceRequest {
    kind: ResourceKind,
    correlation: u64,
    response: OnceLock<Resource>,
}

impl ResourceRequest {
    /// Create a request with a fresh correlation token.
    pub fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            correlation: NEXT_CORRELATION.fetch_add(1, Ordering::Relaxed),
            response: OnceLock::new(),
        }
    }

    /// Requested kind.
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Token identifying this request in logs.
    pub fn correlation(&self) -> u64 {
        self.correlation
    }

    /// Answer the request.
    ///
    /// Fails if `resource` is of another kind or if the request was already
    /// answered; the first answer stays in place.
    pub fn provide(&self, resource: Resource) -> Result<()> {
        let provided = resource.kind();
        if provided != self.kind {
            return Err(Error::ResourceMismatch {
                expected: self.kind,
                provided,
            });
        }
        self.response
            .set(resource)
            .map_err(|_| Error::AlreadyProvided(self.kind))
    }

    /// Check whether a probe answered.
    pub fn is_provided(&self) -> bool {
        self.response.get().is_some()
    }

    /// Peek at the answer.
    pub fn resource(&self) -> Option<&Resource> {
        self.response.get()
    }

    /// Take the answer, if any.
    pub fn into_resource(self) -> Option<Resource> {
        self.response.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::Arc;

    #[test]
    fn test_correlation_is_unique() {
        let a = ResourceRequest::new(ResourceKind::Clock);
        let b = ResourceRequest::new(ResourceKind::Clock);
        assert_ne!(a.correlation(), b.correlation());
    }

    #[test]
    fn test_provide_once() {
        let req = ResourceRequest::new(ResourceKind::Clock);
        assert!(!req.is_provided());

        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(ClockTime::from_secs(3)));
        req.provide(Resource::Clock(Shared::from_arc(clock.clone())))
            .unwrap();
        assert_eq!(
            req.provide(Resource::Clock(Shared::from_arc(clock))),
            Err(Error::AlreadyProvided(ResourceKind::Clock))
        );

        match req.into_resource() {
            Some(Resource::Clock(c)) => assert_eq!(c.now().secs(), 3),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_provide_wrong_kind() {
        let req = ResourceRequest::new(ResourceKind::SinkLatency);
        let err = req
            .provide(Resource::FlowFormat(FlowFormat::new("block.")))
            .unwrap_err();
        assert_eq!(
            err,
            Error::ResourceMismatch {
                expected: ResourceKind::SinkLatency,
                provided: ResourceKind::FlowFormatHint,
            }
        );
        assert!(!req.is_provided());
    }

    #[test]
    fn test_custom_kind_matches_signature() {
        let sig = Signature::fourcc(b"test");
        let req = ResourceRequest::new(ResourceKind::Custom(sig));
        let payload: Arc<dyn Any + Send + Sync> = Arc::new(5u32);
        req.provide(Resource::Custom(sig, Shared::from_arc(payload)))
            .unwrap();

        match req.resource() {
            Some(Resource::Custom(_, p)) => assert_eq!(p.downcast_ref::<u32>(), Some(&5)),
            other => panic!("unexpected {:?}", other),
        }
    }
}
