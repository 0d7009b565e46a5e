//! Nodes: the units of processing.
//!
//! A [`Node`] is a reference-counted handle. Its lifecycle is:
//!
//! - **allocate**: [`Node::allocate`] asks a [`Manager`] for the node's private
//!   state, runs its `init` hook and raises [`Event::Ready`]. Either a
//!   complete node comes back or an error does.
//! - **control**: [`Node::control`] is the single configuration entry point.
//!   Unknown commands come back as [`ControlResult::Unhandled`].
//! - **input**: [`Node::input`] consumes a buffer.
//! - **release**: [`Node::release`] consumes the handle. The last release
//!   drops the output link, the probe chain and the private state.
//!
//! Calls on one node are serialized. A node is driven by one scheduling
//! context; a call that re-enters a node already dispatching is reported as
//! [`Error::Reentrant`] rather than run.
//!
//! # Flow formats
//!
//! A node announces a new output format with [`Node::store_flow_format`],
//! which raises [`Event::NewFlowFormat`] on its probe chain. The generic
//! [`FormatForwarder`](crate::probe::FormatForwarder) probe passes it on to
//! the output node and detaches that output if it refuses.

mod command;
mod manager;

pub use command::{Command, CommandArg, ControlResult, Reply};
pub use manager::{Manager, ManagerCommand, NodeBehavior};

use crate::buffer::Buffer;
use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::event::{Event, ProbeOutcome};
use crate::format::FlowFormat;
use crate::memory::BufferAllocator;
use crate::observability;
use crate::probe::ProbeChain;
use crate::request::{Resource, ResourceKind, ResourceRequest};
use crate::sched::{SchedContext, Scheduler};
use crate::shared::Shared;
use manager::DynManager;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};

/// Four-character code identifying a node type.
///
/// ```rust
/// use pipework::node::Signature;
///
/// const QUEUE_SINK: Signature = Signature::fourcc(b"qsnk");
/// assert_eq!(QUEUE_SINK.to_string(), "qsnk");
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature(u32);

impl Signature {
    /// Build a signature from four bytes.
    pub const fn fourcc(code: &[u8; 4]) -> Self {
        Self(u32::from_be_bytes(*code))
    }

    /// Raw value.
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.0.to_be_bytes();
        if bytes.iter().all(|b| b.is_ascii_graphic()) {
            for b in bytes {
                write!(f, "{}", b as char)?;
            }
            Ok(())
        } else {
            write!(f, "{:#010x}", self.0)
        }
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", self)
    }
}

/// Output link: the downstream node and the format negotiated with it.
#[derive(Debug, Clone)]
pub struct Link {
    /// Downstream node.
    pub node: Node,
    /// Last format the downstream node accepted.
    pub format: Option<FlowFormat>,
}

#[derive(Default)]
struct Links {
    output: Option<Link>,
    flow_format: Option<FlowFormat>,
}

struct NodeInner {
    id: u64,
    name: String,
    manager: Arc<dyn DynManager>,
    probes: ProbeChain,
    links: Mutex<Links>,
    behavior: Mutex<Box<dyn NodeBehavior>>,
}

impl Drop for NodeInner {
    fn drop(&mut self) {
        tracing::debug!(node = %self.name, node_id = self.id, "node released");

        // Unlink the output chain iteratively so long pipelines cannot
        // overflow the stack.
        let links = self.links.get_mut().unwrap_or_else(PoisonError::into_inner);
        let mut next = links.output.take();
        while let Some(link) = next {
            match Arc::try_unwrap(link.node.inner) {
                Ok(mut inner) => {
                    let links = inner.links.get_mut().unwrap_or_else(PoisonError::into_inner);
                    next = links.output.take();
                }
                Err(_) => break,
            }
        }
    }
}

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// A reference-counted handle to a node.
///
/// Cloning is the same operation as [`duplicate`](Self::duplicate).
#[derive(Clone)]
pub struct Node {
    inner: Arc<NodeInner>,
}

impl Node {
    /// Allocate a node of the manager's type.
    ///
    /// `signature` must be the manager's own; it guards against handing
    /// arguments to the wrong node type. The node holds `probes` for its
    /// whole life. On failure nothing is left behind.
    pub fn allocate<M: Manager>(
        manager: &Arc<M>,
        probes: ProbeChain,
        signature: Signature,
        args: M::Args,
    ) -> Result<Node> {
        let expected = Manager::signature(manager.as_ref());
        if signature != expected {
            return Err(Error::SignatureMismatch {
                expected,
                got: signature,
            });
        }

        let behavior = Manager::allocate(manager.as_ref(), args)?;
        let id = NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed);
        let name = format!("{}.{}", Manager::name(manager.as_ref()), id);
        let dyn_manager: Arc<dyn DynManager> = manager.clone();

        let node = Node {
            inner: Arc::new(NodeInner {
                id,
                name,
                manager: dyn_manager,
                probes,
                links: Mutex::new(Links::default()),
                behavior: Mutex::new(behavior),
            }),
        };

        node.dispatch(|behavior, node| behavior.init(node))?;
        tracing::debug!(node = %node.name(), signature = %expected, "node allocated");
        let _ = node.raise(&Event::Ready);
        Ok(node)
    }

    /// Create a second owner of this node.
    pub fn duplicate(&self) -> Node {
        self.clone()
    }

    /// Give up this owner's reference.
    ///
    /// The last release tears the node down: output link, probe chain and
    /// private state are released.
    pub fn release(self) {
        drop(self);
    }

    /// Unique node id.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Node name (`<manager>.<id>`).
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Signature of the node's type.
    pub fn signature(&self) -> Signature {
        self.inner.manager.signature()
    }

    /// Current number of handles.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Check whether two handles point to the same node.
    pub fn ptr_eq(a: &Node, b: &Node) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    /// The node's probe chain.
    pub fn probes(&self) -> &ProbeChain {
        &self.inner.probes
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    fn dispatch<T>(&self, f: impl FnOnce(&mut dyn NodeBehavior, &Node) -> Result<T>) -> Result<T> {
        let mut behavior = match self.inner.behavior.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                return Err(Error::Reentrant(self.inner.name.clone()));
            }
        };
        let _span =
            observability::span_node(&self.inner.name, self.inner.id, self.signature()).entered();
        f(&mut **behavior, self)
    }

    /// Apply a control command.
    ///
    /// The node's behavior sees the command first. If it leaves it unhandled,
    /// the runtime answers the generic commands `SetOutput`, `GetOutput` and
    /// `GetFlowFormat` itself.
    pub fn control(&self, command: Command) -> Result<ControlResult> {
        let result = self.dispatch(|behavior, node| behavior.control(node, &command))?;
        if result.is_handled() {
            return Ok(result);
        }

        match command {
            Command::SetOutput(output) => {
                self.set_output(output)?;
                Ok(ControlResult::DONE)
            }
            Command::GetOutput => Ok(ControlResult::Handled(Reply::Output(self.output()))),
            Command::GetFlowFormat => {
                Ok(ControlResult::Handled(Reply::Format(self.flow_format())))
            }
            _ => Ok(ControlResult::Unhandled),
        }
    }

    /// Hand one buffer to the node.
    ///
    /// The buffer is consumed whatever the outcome.
    pub fn input(&self, buffer: Buffer, sched: &mut SchedContext) -> Result<()> {
        self.dispatch(|behavior, node| behavior.input(node, buffer, sched))
    }

    /// Run the node's scheduling callback.
    pub fn wake(&self, sched: &mut SchedContext) -> Result<()> {
        self.dispatch(|behavior, node| behavior.wake(node, sched))
    }

    /// Send a command to the node's manager.
    pub fn manager_control(&self, command: ManagerCommand) -> Result<ControlResult> {
        self.inner.manager.control(&command)
    }

    // ------------------------------------------------------------------
    // Probes and requests
    // ------------------------------------------------------------------

    /// Raise an event on the node's probe chain.
    pub fn raise(&self, event: &Event<'_>) -> ProbeOutcome {
        self.inner.probes.raise(self, event)
    }

    /// Report a fatal error on the probe chain and hand it back.
    pub fn raise_fatal(&self, error: Error) -> Error {
        let _ = self.raise(&Event::Fatal(&error));
        error
    }

    /// Ask the probe chain for a resource.
    ///
    /// Returns [`Error::ResourceUnavailable`] when no probe answers; the
    /// caller decides on a fallback.
    pub fn request(&self, kind: ResourceKind) -> Result<Resource> {
        let request = ResourceRequest::new(kind);
        let outcome = self.raise(&Event::Request(&request));
        let correlation = request.correlation();

        match request.into_resource() {
            Some(resource) => Ok(resource),
            None => {
                if outcome.is_handled() {
                    tracing::warn!(
                        node = %self.name(),
                        ?kind,
                        correlation,
                        "request handled without a resource"
                    );
                } else {
                    tracing::debug!(node = %self.name(), ?kind, correlation, "request unclaimed");
                }
                Err(Error::ResourceUnavailable(kind))
            }
        }
    }

    /// Ask for a resource, falling back to `default` when none is provided.
    pub fn request_or(&self, kind: ResourceKind, default: impl FnOnce() -> Resource) -> Resource {
        match self.request(kind) {
            Ok(resource) => resource,
            Err(_) => default(),
        }
    }

    /// Ask the probe chain for a buffer allocator.
    pub fn request_allocator(&self) -> Result<Shared<dyn BufferAllocator>> {
        match self.request(ResourceKind::BufferAllocator)? {
            Resource::BufferAllocator(allocator) => Ok(allocator),
            other => Err(mismatch(ResourceKind::BufferAllocator, &other)),
        }
    }

    /// Ask the probe chain for a clock.
    pub fn request_clock(&self) -> Result<Shared<dyn Clock>> {
        match self.request(ResourceKind::Clock)? {
            Resource::Clock(clock) => Ok(clock),
            other => Err(mismatch(ResourceKind::Clock, &other)),
        }
    }

    /// Ask the probe chain for the scheduler of the node's context.
    pub fn request_scheduler(&self) -> Result<Shared<dyn Scheduler>> {
        match self.request(ResourceKind::Scheduler)? {
            Resource::Scheduler(sched) => Ok(sched),
            other => Err(mismatch(ResourceKind::Scheduler, &other)),
        }
    }

    // ------------------------------------------------------------------
    // Links and formats
    // ------------------------------------------------------------------

    fn links(&self) -> MutexGuard<'_, Links> {
        self.inner
            .links
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Current output node.
    pub fn output(&self) -> Option<Node> {
        self.links().output.as_ref().map(|link| link.node.clone())
    }

    /// Current output link.
    pub fn output_link(&self) -> Option<Link> {
        self.links().output.clone()
    }

    /// Replace the output.
    ///
    /// If this node already has a flow format, the new output must accept it
    /// first; a refusal leaves the current output untouched and returns
    /// [`Error::Refused`].
    pub fn set_output(&self, output: Option<Node>) -> Result<()> {
        let format = self.flow_format();

        if let (Some(out), Some(fmt)) = (&output, &format) {
            match out.control(Command::SetFlowFormat(fmt.clone()))? {
                ControlResult::Handled(_) => {}
                ControlResult::Unhandled => {
                    return Err(Error::Refused(format!(
                        "{} does not handle flow formats",
                        out.name()
                    )));
                }
            }
        }

        let previous = {
            let mut links = self.links();
            let link = output.map(|node| Link { node, format });
            std::mem::replace(&mut links.output, link)
        };

        tracing::debug!(
            node = %self.name(),
            output = self.output().as_ref().map(Node::name).unwrap_or("none"),
            "output set"
        );
        drop(previous);
        Ok(())
    }

    /// Detach the output. Returns the previous output node.
    pub fn clear_output(&self) -> Option<Node> {
        let previous = self.links().output.take();
        previous.map(|link| {
            tracing::debug!(node = %self.name(), output = %link.node.name(), "output cleared");
            link.node
        })
    }

    /// The node's current output flow format.
    pub fn flow_format(&self) -> Option<FlowFormat> {
        self.links().flow_format.clone()
    }

    /// Record a new output flow format and announce it on the probe chain.
    ///
    /// The announcement happens without any lock held, so probes may
    /// reconfigure this node's output.
    pub fn store_flow_format(&self, format: FlowFormat) -> ProbeOutcome {
        self.links().flow_format = Some(format.clone());
        tracing::debug!(node = %self.name(), format = %format, "new flow format");
        self.raise(&Event::NewFlowFormat(&format))
    }

    /// Record that the current output accepted `format`.
    pub fn update_link_format(&self, format: &FlowFormat) {
        if let Some(link) = self.links().output.as_mut() {
            link.format = Some(format.clone());
        }
    }

    /// Pass a buffer to the output node.
    ///
    /// Without an output the buffer is released and a warning logged.
    pub fn forward(&self, buffer: Buffer, sched: &mut SchedContext) -> Result<()> {
        match self.output() {
            Some(out) => out.input(buffer, sched),
            None => {
                observability::trace_buffer_dropped(self.name(), buffer.len(), "no output");
                buffer.release();
                Ok(())
            }
        }
    }
}

fn mismatch(expected: ResourceKind, provided: &Resource) -> Error {
    Error::ResourceMismatch {
        expected,
        provided: provided.kind(),
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.inner.name)
            .field("signature", &self.signature())
            .field("refs", &self.ref_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ClockTime, ManualClock};
    use crate::probe::{ProbeChain, ResourceProvider, from_fn};
    use std::sync::atomic::AtomicUsize;

    const COUNTER: Signature = Signature::fourcc(b"cntr");

    struct CounterManager {
        inits: AtomicUsize,
    }

    struct Counter {
        seen: usize,
        fail_init: bool,
        clock: Option<Shared<dyn Clock>>,
    }

    impl Manager for CounterManager {
        type Args = bool;

        fn signature(&self) -> Signature {
            COUNTER
        }

        fn name(&self) -> &str {
            "counter"
        }

        fn allocate(&self, fail_init: bool) -> Result<Box<dyn NodeBehavior>> {
            Ok(Box::new(Counter {
                seen: 0,
                fail_init,
                clock: None,
            }))
        }

        fn control(&self, command: &ManagerCommand) -> Result<ControlResult> {
            match command {
                ManagerCommand::Vacuum => Ok(ControlResult::Handled(Reply::Value(
                    self.inits.load(Ordering::Relaxed) as u64,
                ))),
                _ => Ok(ControlResult::Unhandled),
            }
        }
    }

    impl NodeBehavior for Counter {
        fn init(&mut self, node: &Node) -> Result<()> {
            if self.fail_init {
                return Err(Error::InvalidConfig("refusing to start".into()));
            }
            self.clock = node.request_clock().ok();
            Ok(())
        }

        fn control(&mut self, node: &Node, command: &Command) -> Result<ControlResult> {
            match command.local_for(COUNTER) {
                Some((0, _)) => Ok(ControlResult::Handled(Reply::Value(self.seen as u64))),
                Some((1, _)) => {
                    // Re-entering our own node must be refused.
                    node.control(Command::GetOutput).map(|_| ControlResult::DONE)
                }
                _ => Ok(ControlResult::Unhandled),
            }
        }

        fn input(&mut self, _node: &Node, buffer: Buffer, _sched: &mut SchedContext) -> Result<()> {
            self.seen += 1;
            buffer.release();
            Ok(())
        }
    }

    fn manager() -> Arc<CounterManager> {
        Arc::new(CounterManager {
            inits: AtomicUsize::new(7),
        })
    }

    #[test]
    fn test_signature_display() {
        assert_eq!(COUNTER.to_string(), "cntr");
        assert_eq!(Signature(0x0102_0304).to_string(), "0x01020304");
        assert_eq!(format!("{:?}", COUNTER), "Signature(cntr)");
    }

    #[test]
    fn test_allocate_checks_signature() {
        let err = Node::allocate(&manager(), ProbeChain::new(), Signature::fourcc(b"nope"), false)
            .unwrap_err();
        assert!(matches!(err, Error::SignatureMismatch { .. }));
    }

    #[test]
    fn test_allocate_raises_ready() {
        let readies = Arc::new(AtomicUsize::new(0));
        let r = readies.clone();
        let probes = ProbeChain::new().prepend(from_fn(move |_node: &Node, event: &Event<'_>| {
            if matches!(event, Event::Ready) {
                r.fetch_add(1, Ordering::SeqCst);
            }
            ProbeOutcome::Unhandled
        }));

        let node = Node::allocate(&manager(), probes, COUNTER, false).unwrap();
        assert_eq!(readies.load(Ordering::SeqCst), 1);
        assert!(node.name().starts_with("counter."));
    }

    #[test]
    fn test_failed_init_fails_allocation() {
        let err = Node::allocate(&manager(), ProbeChain::new(), COUNTER, true).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_init_gets_clock_from_provider() {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(ClockTime::from_secs(5)));
        let probes = ProbeChain::new()
            .prepend(ResourceProvider::new().with_clock(Shared::from_arc(clock)));
        let node = Node::allocate(&manager(), probes, COUNTER, false).unwrap();

        assert_eq!(node.request_clock().unwrap().now().secs(), 5);
        assert!(matches!(
            node.request_allocator(),
            Err(Error::ResourceUnavailable(ResourceKind::BufferAllocator))
        ));
    }

    #[test]
    fn test_request_or_falls_back() {
        let node = Node::allocate(&manager(), ProbeChain::new(), COUNTER, false).unwrap();
        let resource = node.request_or(ResourceKind::SinkLatency, || {
            Resource::Latency(ClockTime::from_millis(20))
        });
        assert!(matches!(resource, Resource::Latency(t) if t.millis() == 20));
    }

    #[test]
    fn test_input_and_local_command() {
        let node = Node::allocate(&manager(), ProbeChain::new(), COUNTER, false).unwrap();
        let mut sched = SchedContext::new();
        node.input(Buffer::from_vec(vec![1]), &mut sched).unwrap();
        node.input(Buffer::from_vec(vec![2]), &mut sched).unwrap();

        let reply = node
            .control(Command::local(COUNTER, 0, CommandArg::None))
            .unwrap()
            .reply()
            .and_then(|r| r.value());
        assert_eq!(reply, Some(2));

        // Another node type's command is not ours.
        let other = Command::local(Signature::fourcc(b"othr"), 0, CommandArg::None);
        assert!(!node.control(other).unwrap().is_handled());
        assert!(!node.control(Command::Flush).unwrap().is_handled());
    }

    #[test]
    fn test_reentrant_call_is_reported() {
        let node = Node::allocate(&manager(), ProbeChain::new(), COUNTER, false).unwrap();
        let err = node
            .control(Command::local(COUNTER, 1, CommandArg::None))
            .unwrap_err();
        assert!(matches!(err, Error::Reentrant(_)));

        // The node is usable afterwards.
        assert!(node.control(Command::GetOutput).unwrap().is_handled());
    }

    #[test]
    fn test_generic_output_commands() {
        let m = manager();
        let a = Node::allocate(&m, ProbeChain::new(), COUNTER, false).unwrap();
        let b = Node::allocate(&m, ProbeChain::new(), COUNTER, false).unwrap();

        a.control(Command::SetOutput(Some(b.duplicate()))).unwrap();
        match a.control(Command::GetOutput).unwrap() {
            ControlResult::Handled(Reply::Output(Some(out))) => assert!(Node::ptr_eq(&out, &b)),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(b.ref_count(), 2);

        a.forward(Buffer::from_vec(vec![0]), &mut SchedContext::new())
            .unwrap();
        let seen = b
            .control(Command::local(COUNTER, 0, CommandArg::None))
            .unwrap()
            .reply()
            .and_then(|r| r.value());
        assert_eq!(seen, Some(1));

        // Releasing the upstream node releases its link.
        a.release();
        assert_eq!(b.ref_count(), 1);
    }

    #[test]
    fn test_long_output_chain_releases() {
        let m = manager();
        let tail = Node::allocate(&m, ProbeChain::new(), COUNTER, false).unwrap();
        let mut head = tail.duplicate();
        for _ in 0..50_000 {
            let node = Node::allocate(&m, ProbeChain::new(), COUNTER, false).unwrap();
            node.set_output(Some(head)).unwrap();
            head = node;
        }
        assert_eq!(tail.ref_count(), 2);

        head.release();
        assert_eq!(tail.ref_count(), 1);
    }

    #[test]
    fn test_set_output_negotiates_current_format() {
        let m = manager();
        let a = Node::allocate(&m, ProbeChain::new(), COUNTER, false).unwrap();
        let b = Node::allocate(&m, ProbeChain::new(), COUNTER, false).unwrap();

        let _ = a.store_flow_format(FlowFormat::new("block."));
        // The counter does not handle formats, so it cannot become an output.
        let err = a.set_output(Some(b)).unwrap_err();
        assert!(matches!(err, Error::Refused(_)));
        assert!(a.output().is_none());
    }

    #[test]
    fn test_forward_without_output_releases() {
        let node = Node::allocate(&manager(), ProbeChain::new(), COUNTER, false).unwrap();
        let buffer = Buffer::from_vec(vec![0; 8]);
        let probe = buffer.duplicate();
        node.forward(buffer, &mut SchedContext::new()).unwrap();
        assert!(probe.is_exclusive());
    }

    #[test]
    fn test_manager_control() {
        let node = Node::allocate(&manager(), ProbeChain::new(), COUNTER, false).unwrap();
        let reply = node.manager_control(ManagerCommand::Vacuum).unwrap();
        assert_eq!(reply.reply().and_then(|r| r.value()), Some(7));
    }
}
