//! Resource-providing probe.

use super::Probe;
use crate::clock::{Clock, ClockTime};
use crate::event::{Event, ProbeOutcome};
use crate::format::FlowFormat;
use crate::memory::BufferAllocator;
use crate::node::Node;
use crate::request::{Resource, ResourceKind};
use crate::sched::Scheduler;
use crate::shared::Shared;

/// Answers resource requests from the resources it was configured with.
///
/// Requests for kinds it holds nothing for pass through untouched.
///
/// # Example
///
/// ```rust
/// use pipework::clock::{Clock, SystemClock};
/// use pipework::config::PoolConfig;
/// use pipework::memory::{BufferAllocator, BufferPool};
/// use pipework::probe::{ProbeChain, ResourceProvider};
/// use pipework::shared::Shared;
/// use std::sync::Arc;
///
/// let pool: Arc<dyn BufferAllocator> = Arc::new(BufferPool::with_heap(PoolConfig::new(1316, 16))?);
/// let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
///
/// let probes = ProbeChain::new().prepend(
///     ResourceProvider::new()
///         .with_allocator(Shared::from_arc(pool))
///         .with_clock(Shared::from_arc(clock)),
/// );
/// # let _ = probes;
/// # Ok::<(), pipework::Error>(())
/// ```
#[derive(Default, Clone)]
pub struct ResourceProvider {
    allocator: Option<Shared<dyn BufferAllocator>>,
    clock: Option<Shared<dyn Clock>>,
    scheduler: Option<Shared<dyn Scheduler>>,
    format_hint: Option<FlowFormat>,
    latency: Option<ClockTime>,
}

impl ResourceProvider {
    /// Create a provider holding nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Provide a buffer allocator.
    pub fn with_allocator(mut self, allocator: Shared<dyn BufferAllocator>) -> Self {
        self.allocator = Some(allocator);
        self
    }

    /// Provide a clock.
    pub fn with_clock(mut self, clock: Shared<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Provide a scheduler handle.
    pub fn with_scheduler(mut self, scheduler: Shared<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Provide a flow format hint.
    pub fn with_format_hint(mut self, format: FlowFormat) -> Self {
        self.format_hint = Some(format);
        self
    }

    /// Provide the sink latency.
    pub fn with_latency(mut self, latency: ClockTime) -> Self {
        self.latency = Some(latency);
        self
    }

    fn resource_for(&self, kind: ResourceKind) -> Option<Resource> {
        match kind {
            ResourceKind::BufferAllocator => self
                .allocator
                .as_ref()
                .map(|a| Resource::BufferAllocator(a.duplicate())),
            ResourceKind::Clock => self.clock.as_ref().map(|c| Resource::Clock(c.duplicate())),
            ResourceKind::Scheduler => self
                .scheduler
                .as_ref()
                .map(|s| Resource::Scheduler(s.duplicate())),
            ResourceKind::FlowFormatHint => self.format_hint.clone().map(Resource::FlowFormat),
            ResourceKind::SinkLatency => self.latency.map(Resource::Latency),
            _ => None,
        }
    }
}

impl Probe for ResourceProvider {
    fn catch(&self, node: &Node, event: &Event<'_>) -> ProbeOutcome {
        let Event::Request(request) = event else {
            return ProbeOutcome::Unhandled;
        };
        let Some(resource) = self.resource_for(request.kind()) else {
            return ProbeOutcome::Unhandled;
        };

        match request.provide(resource) {
            Ok(()) => {
                tracing::trace!(
                    node = %node.name(),
                    kind = ?request.kind(),
                    correlation = request.correlation(),
                    "resource provided"
                );
                ProbeOutcome::Handled
            }
            Err(e) => {
                tracing::warn!(node = %node.name(), error = %e, "could not provide resource");
                ProbeOutcome::Unhandled
            }
        }
    }
}
