//! Cross-thread queue node pair.
//!
//! A [`CrossThreadQueue`] moves buffers from one scheduling context to
//! another through a bounded lock-free FIFO:
//!
//! ```text
//!   thread A                                         thread B
//!   ─────────                                        ─────────
//!   upstream ──input──► queue sink ──push──► FIFO ──pop──► queue source ──input──► downstream
//!      ▲                   │     ▲                            │
//!      └── pump blocked ◄──┘     └──────── writable wake ◄────┘
//! ```
//!
//! - The **sink** (thread A) pushes every buffer. When the FIFO is full it
//!   keeps the buffer, blocks the [`Pump`] of the calling context and raises
//!   [`Event::Backpressure`]. Its scheduling callback retries once the source
//!   made room, then unblocks the pump. A sink holds at most `capacity`
//!   buffers; past that, input fails with [`Error::QueueFull`]. Several sinks
//!   may feed one queue, each from its own context.
//! - The **source** (thread B) forwards up to `burst` buffers per scheduling
//!   callback and reschedules itself while more are waiting.
//!
//! A flow format change travels through the FIFO attached to the next
//! buffer, so the source announces it downstream right before that buffer.
//!
//! # States
//!
//! `Idle` until a source is attached, then `Running`. The queue enters
//! `Draining` when its last sink is released or when the last controller
//! handle ([`QueueSourceHandle`]) is released from another thread. It becomes
//! `Closed` once the source emptied the FIFO: forwarded in the first case,
//! released without forwarding in the second. Buffers are never abandoned
//! in the FIFO.

use crate::buffer::Buffer;
use crate::config::QueueConfig;
use crate::error::{Error, Result};
use crate::event::Event;
use crate::format::FlowFormat;
use crate::lockfree::{FifoConsumer, FifoProducer, bounded};
use crate::node::{Command, ControlResult, Manager, Node, NodeBehavior, Reply, Signature};
use crate::observability::{self, span_queue, trace_queue_state};
use crate::sched::{Pump, SchedContext, Scheduler};
use crate::shared::{RefCount, Shared};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

/// Signature of queue sink nodes.
pub const QUEUE_SINK: Signature = Signature::fourcc(b"qsnk");
/// Signature of queue source nodes.
pub const QUEUE_SOURCE: Signature = Signature::fourcc(b"qsrc");

/// Lifecycle state of a cross-thread queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum QueueState {
    /// No source attached yet.
    Idle = 0,
    /// Source attached, buffers flowing.
    Running = 1,
    /// No more input; the source is emptying the FIFO.
    Draining = 2,
    /// FIFO emptied; the queue accepts nothing anymore.
    Closed = 3,
}

impl QueueState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Idle,
            1 => Self::Running,
            2 => Self::Draining,
            _ => Self::Closed,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Closed => "closed",
        }
    }
}

/// What travels through the FIFO.
struct QueueItem {
    /// Format change taking effect with this buffer.
    format: Option<FlowFormat>,
    buffer: Buffer,
}

struct QueueShared {
    config: QueueConfig,
    producer: FifoProducer<QueueItem>,
    consumer: Mutex<Option<FifoConsumer<QueueItem>>>,
    state: AtomicU8,
    /// Drop queued buffers instead of forwarding them.
    discard: AtomicBool,
    sinks: AtomicUsize,
    /// Pushes between their state check and their completion.
    pushing: AtomicUsize,
    /// Scheduler of the source's context.
    readable: OnceLock<Shared<dyn Scheduler>>,
    /// Schedulers of the sinks' contexts.
    writable: Mutex<Vec<Shared<dyn Scheduler>>>,
    controllers: RefCount,
}

/// Why [`QueueShared::push`] handed an item back.
enum PushRefused {
    Full(QueueItem),
    Closed(QueueItem),
}

impl QueueShared {
    fn state(&self) -> QueueState {
        QueueState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Move from any of `from` to `to`. Returns whether this call moved it.
    fn transition(&self, from: &[QueueState], to: QueueState) -> bool {
        let moved = self
            .state
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |s| {
                from.contains(&QueueState::from_u8(s)).then_some(to as u8)
            });
        match moved {
            Ok(prev) => {
                trace_queue_state(&self.config.name, QueueState::from_u8(prev).as_str(), to.as_str());
                true
            }
            Err(_) => false,
        }
    }

    fn begin_draining(&self) -> bool {
        let moved = self.transition(&[QueueState::Idle, QueueState::Running], QueueState::Draining);
        self.wake_readable();
        moved
    }

    fn accepts_input(&self) -> bool {
        self.state() < QueueState::Draining
    }

    /// Push one item unless the queue stopped accepting input.
    ///
    /// The state check and the push are bracketed by `pushing`, and the
    /// source only closes once it is zero, so an item can never land in a
    /// closed queue.
    fn push(&self, item: QueueItem) -> std::result::Result<(), PushRefused> {
        self.pushing.fetch_add(1, Ordering::SeqCst);
        let result = if self.accepts_input() {
            self.producer.push(item).map_err(PushRefused::Full)
        } else {
            Err(PushRefused::Closed(item))
        };
        self.pushing.fetch_sub(1, Ordering::SeqCst);
        if result.is_ok() {
            self.wake_readable();
        }
        result
    }

    fn push_in_flight(&self) -> bool {
        self.pushing.load(Ordering::SeqCst) != 0
    }

    fn wake_readable(&self) {
        if let Some(sched) = self.readable.get() {
            sched.wake();
        }
    }

    fn add_writable(&self, sched: Shared<dyn Scheduler>) {
        self.writable
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sched);
    }

    fn remove_writable(&self, sched: &Shared<dyn Scheduler>) {
        self.writable
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|s| !Shared::ptr_eq(s, sched));
    }

    fn wake_writable(&self) {
        // Woken outside the lock: a scheduler may run sink callbacks inline.
        let scheds = self
            .writable
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for sched in scheds {
            sched.wake();
        }
    }
}

/// A bounded queue connecting a sink node on one thread to a source node on
/// another.
///
/// Cloning yields another handle to the same queue.
///
/// # Example
///
/// ```rust
/// use pipework::config::QueueConfig;
/// use pipework::nodes::queue::{
///     CrossThreadQueue, QUEUE_SINK, QUEUE_SOURCE, QueueSinkManager, QueueSourceManager, QueueState,
/// };
/// use pipework::node::Node;
/// use pipework::probe::ProbeChain;
/// use std::sync::Arc;
///
/// let queue = CrossThreadQueue::new(QueueConfig::new(64).with_name("demux-out"))?;
/// let source = Node::allocate(&Arc::new(QueueSourceManager), ProbeChain::new(), QUEUE_SOURCE, queue.clone())?;
/// let sink = Node::allocate(&Arc::new(QueueSinkManager), ProbeChain::new(), QUEUE_SINK, queue.clone())?;
/// assert_eq!(queue.state(), QueueState::Running);
///
/// // Releasing the last sink ends the stream.
/// sink.release();
/// assert_eq!(queue.state(), QueueState::Draining);
/// # let _ = source;
/// # Ok::<(), pipework::Error>(())
/// ```
#[derive(Clone)]
pub struct CrossThreadQueue {
    shared: Arc<QueueShared>,
}

impl CrossThreadQueue {
    /// Create a queue.
    pub fn new(config: QueueConfig) -> Result<Self> {
        config.validate()?;
        let (producer, consumer) = bounded(config.capacity);
        tracing::debug!(queue = %config.name, capacity = config.capacity, "queue created");
        Ok(Self {
            shared: Arc::new(QueueShared {
                config,
                producer,
                consumer: Mutex::new(Some(consumer)),
                state: AtomicU8::new(QueueState::Idle as u8),
                discard: AtomicBool::new(false),
                sinks: AtomicUsize::new(0),
                pushing: AtomicUsize::new(0),
                readable: OnceLock::new(),
                writable: Mutex::new(Vec::new()),
                controllers: RefCount::new(0),
            }),
        })
    }

    /// Current state.
    pub fn state(&self) -> QueueState {
        self.shared.state()
    }

    /// Queue name.
    pub fn name(&self) -> &str {
        &self.shared.config.name
    }

    /// Maximum number of queued items.
    pub fn capacity(&self) -> usize {
        self.shared.config.capacity
    }

    /// Advisory number of queued items.
    pub fn len(&self) -> usize {
        self.shared.producer.len()
    }

    /// Advisory emptiness check.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Push a buffer without going through a sink node.
    ///
    /// A full or closed queue hands the buffer back untouched, so the caller
    /// keeps ownership and can retry.
    pub fn try_push(&self, buffer: Buffer) -> std::result::Result<(), Rejected> {
        let item = QueueItem {
            format: None,
            buffer,
        };
        self.shared.push(item).map_err(|refused| match refused {
            PushRefused::Full(item) => Rejected {
                error: Error::QueueFull,
                buffer: item.buffer,
            },
            PushRefused::Closed(item) => Rejected {
                error: Error::QueueClosed,
                buffer: item.buffer,
            },
        })
    }

    /// Get a handle allowing another thread to tear the source side down.
    ///
    /// When the last handle is released the queue stops accepting input and
    /// the source releases everything still queued without forwarding it,
    /// then closes. Fails once that teardown has started.
    pub fn controller(&self) -> Result<QueueSourceHandle> {
        self.shared.controllers.acquire()?;
        Ok(QueueSourceHandle {
            queue: Some(self.shared.clone()),
        })
    }
}

impl std::fmt::Debug for CrossThreadQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrossThreadQueue")
            .field("name", &self.name())
            .field("state", &self.state())
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .finish()
    }
}

/// A buffer [`CrossThreadQueue::try_push`] did not queue.
#[derive(Debug)]
pub struct Rejected {
    /// [`Error::QueueFull`] or [`Error::QueueClosed`].
    pub error: Error,
    /// The caller's buffer.
    pub buffer: Buffer,
}

/// Controller-side reference on a queue's source, releasable from any
/// thread.
///
/// This is the one place where a count is dropped outside the thread
/// driving the node: the transition to zero is a single CAS, and only the
/// caller performing it starts the teardown.
pub struct QueueSourceHandle {
    queue: Option<Arc<QueueShared>>,
}

impl QueueSourceHandle {
    /// Release this reference. Returns `true` if it started the teardown.
    pub fn release(mut self) -> Result<bool> {
        match self.queue.take() {
            Some(queue) => release_controller(&queue),
            None => Ok(false),
        }
    }
}

fn release_controller(queue: &QueueShared) -> Result<bool> {
    let last = queue.controllers.release()?;
    if last {
        tracing::debug!(queue = %queue.config.name, "controller released, discarding queued buffers");
        queue.discard.store(true, Ordering::Release);
        queue.begin_draining();
    }
    Ok(last)
}

impl Drop for QueueSourceHandle {
    fn drop(&mut self) {
        if let Some(queue) = self.queue.take() {
            if let Err(e) = release_controller(&queue) {
                tracing::error!(queue = %queue.config.name, error = %e, "controller release failed");
            }
        }
    }
}

// ============================================================================
// Sink
// ============================================================================

/// Manager of queue sinks. Arguments: the queue to feed.
#[derive(Debug, Default, Clone, Copy)]
pub struct QueueSinkManager;

impl Manager for QueueSinkManager {
    type Args = CrossThreadQueue;

    fn signature(&self) -> Signature {
        QUEUE_SINK
    }

    fn name(&self) -> &str {
        "qsink"
    }

    fn allocate(&self, queue: CrossThreadQueue) -> Result<Box<dyn NodeBehavior>> {
        queue.shared.sinks.fetch_add(1, Ordering::AcqRel);
        Ok(Box::new(QueueSink {
            queue: queue.shared,
            pending: VecDeque::new(),
            next_format: None,
            backpressured: false,
            blocked_pump: None,
            sched: None,
        }))
    }
}

struct QueueSink {
    queue: Arc<QueueShared>,
    /// Items the FIFO had no room for, oldest first.
    pending: VecDeque<QueueItem>,
    /// Format change waiting for the next buffer.
    next_format: Option<FlowFormat>,
    backpressured: bool,
    blocked_pump: Option<Pump>,
    /// Scheduler registered as writable by this sink.
    sched: Option<Shared<dyn Scheduler>>,
}

impl QueueSink {
    /// Push held items. Returns whether the pending list is now empty.
    ///
    /// If the queue stopped accepting input, held items are released.
    fn flush_pending(&mut self) -> bool {
        while let Some(item) = self.pending.pop_front() {
            match self.queue.push(item) {
                Ok(()) => {}
                Err(PushRefused::Full(item)) => {
                    self.pending.push_front(item);
                    break;
                }
                Err(PushRefused::Closed(_)) => {
                    tracing::warn!(
                        queue = %self.queue.config.name,
                        dropped = self.pending.len() + 1,
                        "queue closed, released held buffers"
                    );
                    self.pending.clear();
                }
            }
        }
        self.pending.is_empty()
    }

    fn enqueue(&mut self, node: &Node, item: QueueItem, sched: &SchedContext) -> Result<()> {
        let item = if self.pending.is_empty() || self.flush_pending() {
            match self.queue.push(item) {
                Ok(()) => return Ok(()),
                Err(PushRefused::Closed(_)) => return Err(Error::QueueClosed),
                Err(PushRefused::Full(item)) => item,
            }
        } else {
            item
        };
        if self.pending.len() >= self.queue.config.capacity {
            // Upstream kept feeding past backpressure.
            observability::trace_buffer_dropped(node.name(), item.buffer.len(), "sink hold limit reached");
            self.enter_backpressure(node, sched);
            return Err(Error::QueueFull);
        }
        self.pending.push_back(item);
        self.enter_backpressure(node, sched);
        Ok(())
    }

    fn enter_backpressure(&mut self, node: &Node, sched: &SchedContext) {
        if self.blocked_pump.is_none() {
            if let Some(pump) = sched.pump() {
                pump.block();
                self.blocked_pump = Some(pump.clone());
            }
        }
        if !self.backpressured {
            self.backpressured = true;
            tracing::debug!(node = %node.name(), held = self.pending.len(), "queue full, holding input");
            let _ = node.raise(&Event::Backpressure { blocked: true });
        }
    }

    fn leave_backpressure(&mut self, node: &Node) {
        if let Some(pump) = self.blocked_pump.take() {
            pump.unblock();
        }
        if self.backpressured {
            self.backpressured = false;
            let _ = node.raise(&Event::Backpressure { blocked: false });
        }
    }

    fn drop_pending(&mut self, node: &Node) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        if dropped > 0 {
            tracing::warn!(node = %node.name(), dropped, "released held buffers");
        }
        dropped
    }
}

impl NodeBehavior for QueueSink {
    fn control(&mut self, node: &Node, command: &Command) -> Result<ControlResult> {
        match command {
            Command::SetFlowFormat(format) => {
                if !self.queue.accepts_input() {
                    return Err(Error::QueueClosed);
                }
                tracing::debug!(node = %node.name(), format = %format, "format queued");
                self.next_format = Some(format.clone());
                Ok(ControlResult::DONE)
            }
            Command::GetMaxLength => Ok(ControlResult::Handled(Reply::Value(
                self.queue.config.capacity as u64,
            ))),
            Command::GetLength => Ok(ControlResult::Handled(Reply::Value(
                (self.queue.producer.len() + self.pending.len()) as u64,
            ))),
            Command::Flush => {
                self.drop_pending(node);
                self.leave_backpressure(node);
                Ok(ControlResult::DONE)
            }
            _ => Ok(ControlResult::Unhandled),
        }
    }

    fn input(&mut self, node: &Node, buffer: Buffer, sched: &mut SchedContext) -> Result<()> {
        if !self.queue.accepts_input() {
            buffer.release();
            return Err(Error::QueueClosed);
        }
        let item = QueueItem {
            format: self.next_format.take(),
            buffer,
        };
        self.enqueue(node, item, sched)
    }

    fn wake(&mut self, node: &Node, _sched: &mut SchedContext) -> Result<()> {
        let _span = span_queue(&self.queue.config.name, "sink").entered();
        if !self.queue.accepts_input() {
            self.drop_pending(node);
            self.leave_backpressure(node);
            return Ok(());
        }
        if self.flush_pending() {
            self.leave_backpressure(node);
        }
        Ok(())
    }

    fn init(&mut self, node: &Node) -> Result<()> {
        match node.request_scheduler() {
            Ok(sched) => {
                self.queue.add_writable(sched.clone());
                self.sched = Some(sched);
            }
            Err(_) => tracing::debug!(
                node = %node.name(),
                "no scheduler, held buffers are retried on input or explicit wake"
            ),
        }
        Ok(())
    }
}

impl Drop for QueueSink {
    fn drop(&mut self) {
        if !self.pending.is_empty() && self.queue.accepts_input() {
            self.flush_pending();
        }
        if !self.pending.is_empty() {
            tracing::warn!(
                queue = %self.queue.config.name,
                dropped = self.pending.len(),
                "sink released with held buffers"
            );
            self.pending.clear();
        }
        if let Some(pump) = self.blocked_pump.take() {
            pump.unblock();
        }
        if let Some(sched) = self.sched.take() {
            self.queue.remove_writable(&sched);
        }
        if self.queue.sinks.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.queue.begin_draining();
        }
    }
}

// ============================================================================
// Source
// ============================================================================

/// Manager of queue sources. Arguments: the queue to empty.
///
/// A queue has exactly one source; allocating a second one fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct QueueSourceManager;

impl Manager for QueueSourceManager {
    type Args = CrossThreadQueue;

    fn signature(&self) -> Signature {
        QUEUE_SOURCE
    }

    fn name(&self) -> &str {
        "qsrc"
    }

    fn allocate(&self, queue: CrossThreadQueue) -> Result<Box<dyn NodeBehavior>> {
        let consumer = queue
            .shared
            .consumer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| {
                Error::InvariantViolation(format!("queue {} already has a source", queue.name()))
            })?;
        Ok(Box::new(QueueSource {
            queue: queue.shared,
            consumer,
        }))
    }
}

struct QueueSource {
    queue: Arc<QueueShared>,
    consumer: FifoConsumer<QueueItem>,
}

impl QueueSource {
    /// Close a draining queue once nothing is queued or being pushed.
    fn try_close(&mut self, node: &Node) {
        // In-flight pushes first: a push completed before the check is
        // visible to the emptiness check below.
        if self.queue.push_in_flight() || !self.consumer.is_empty() {
            return;
        }
        if self.queue.transition(&[QueueState::Draining], QueueState::Closed) {
            let _ = node.clear_output();
            let _ = node.raise(&Event::SourceEnd);
            self.queue.wake_writable();
        }
    }
}

impl NodeBehavior for QueueSource {
    fn init(&mut self, node: &Node) -> Result<()> {
        match node.request_scheduler() {
            Ok(sched) => {
                let _ = self.queue.readable.set(sched);
            }
            Err(_) => tracing::debug!(
                node = %node.name(),
                "no scheduler, source must be woken periodically"
            ),
        }
        self.queue.transition(&[QueueState::Idle], QueueState::Running);
        Ok(())
    }

    fn control(&mut self, _node: &Node, command: &Command) -> Result<ControlResult> {
        match command {
            Command::GetMaxLength => Ok(ControlResult::Handled(Reply::Value(
                self.queue.config.capacity as u64,
            ))),
            Command::GetLength => Ok(ControlResult::Handled(Reply::Value(
                self.consumer.len() as u64,
            ))),
            _ => Ok(ControlResult::Unhandled),
        }
    }

    fn input(&mut self, node: &Node, buffer: Buffer, _sched: &mut SchedContext) -> Result<()> {
        buffer.release();
        Err(Error::Unsupported(format!("{} takes no input", node.name())))
    }

    fn wake(&mut self, node: &Node, sched: &mut SchedContext) -> Result<()> {
        let _span = span_queue(&self.queue.config.name, "source").entered();
        if self.queue.state() == QueueState::Closed {
            return Ok(());
        }

        if self.queue.discard.load(Ordering::Acquire) {
            let dropped = self.consumer.drain();
            tracing::debug!(node = %node.name(), dropped, "queue torn down");
            self.try_close(node);
            return Ok(());
        }

        let burst = self.queue.config.burst;
        let mut popped = 0;
        while popped < burst {
            let Some(item) = self.consumer.pop() else {
                break;
            };
            popped += 1;
            if let Some(format) = item.format {
                let _ = node.store_flow_format(format);
            }
            if let Err(e) = node.forward(item.buffer, sched) {
                let _ = node.raise(&Event::Error(&e));
            }
        }

        if popped > 0 {
            self.queue.wake_writable();
        }
        if popped == burst {
            // More may be waiting; run again instead of starving the context.
            self.queue.wake_readable();
        } else if self.queue.state() == QueueState::Draining {
            self.try_close(node);
        }
        Ok(())
    }
}

impl Drop for QueueSource {
    fn drop(&mut self) {
        let dropped = self.consumer.drain();
        if dropped > 0 {
            tracing::debug!(queue = %self.queue.config.name, dropped, "source released with queued buffers");
        }
        let _ = self.queue.transition(
            &[QueueState::Idle, QueueState::Running, QueueState::Draining],
            QueueState::Closed,
        );
    }
}
