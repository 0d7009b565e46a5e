//! Integration tests for the cross-thread queue node pair.
//!
//! These tests verify that:
//! - A full queue blocks the upstream pump and reports backpressure
//! - Queued buffers keep their references until forwarded
//! - A controller teardown releases every queued buffer exactly once
//! - Releasing the sink drains the remainder before closing
//! - Buffers cross threads in order under sustained load

use pipework::buffer::{Buffer, Metadata};
use pipework::config::QueueConfig;
use pipework::error::Result;
use pipework::format::FlowFormat;
use pipework::node::{Command, CommandArg, Manager, Node, NodeBehavior, Signature};
use pipework::nodes::null::{NULL_SINK, NULL_SINK_GET_COUNT, NullSinkConfig, NullSinkManager};
use pipework::nodes::queue::{
    CrossThreadQueue, QUEUE_SINK, QUEUE_SOURCE, QueueSinkManager, QueueSourceManager, QueueState,
};
use pipework::probe::{ChannelProbe, EventRecord, ProbeChain, ResourceProvider};
use pipework::sched::{NotifyScheduler, Pump, SchedContext, Scheduler};
use pipework::shared::Shared;
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct Pair {
    queue: CrossThreadQueue,
    sink: Node,
    source: Node,
    downstream: Node,
    events: kanal::Receiver<EventRecord>,
}

fn pair(config: QueueConfig) -> Pair {
    let (probe, events) = ChannelProbe::new();
    let probes = ProbeChain::new().prepend(probe);
    let queue = CrossThreadQueue::new(config).unwrap();

    let downstream = Node::allocate(
        &Arc::new(NullSinkManager),
        ProbeChain::new(),
        NULL_SINK,
        NullSinkConfig::any(),
    )
    .unwrap();
    let source = Node::allocate(
        &Arc::new(QueueSourceManager),
        probes.clone(),
        QUEUE_SOURCE,
        queue.clone(),
    )
    .unwrap();
    source.set_output(Some(downstream.duplicate())).unwrap();
    let sink = Node::allocate(&Arc::new(QueueSinkManager), probes, QUEUE_SINK, queue.clone()).unwrap();

    while let Ok(Some(_)) = events.try_recv() {}
    Pair {
        queue,
        sink,
        source,
        downstream,
        events,
    }
}

fn records(events: &kanal::Receiver<EventRecord>, name: &str) -> Vec<EventRecord> {
    let mut out = Vec::new();
    while let Ok(Some(record)) = events.try_recv() {
        if record.event == name {
            out.push(record);
        }
    }
    out
}

fn received(node: &Node) -> u64 {
    node.control(Command::local(NULL_SINK, NULL_SINK_GET_COUNT, CommandArg::None))
        .unwrap()
        .reply()
        .and_then(|r| r.value())
        .unwrap_or_default()
}

fn wake_until_closed(queue: &CrossThreadQueue, source: &Node) {
    let mut sched = SchedContext::new();
    for _ in 0..1_000 {
        if queue.state() == QueueState::Closed {
            return;
        }
        source.wake(&mut sched).unwrap();
    }
    panic!("queue {} never closed", queue.name());
}

#[test]
fn test_backpressure_blocks_and_releases_pump() {
    let p = pair(QueueConfig::new(2));
    let pump = Pump::new("demux");
    let mut sched = SchedContext::with_pump(pump.clone());

    p.sink.input(Buffer::from_vec(vec![0]), &mut sched).unwrap();
    p.sink.input(Buffer::from_vec(vec![1]), &mut sched).unwrap();
    assert!(!pump.is_blocked());

    p.sink.input(Buffer::from_vec(vec![2]), &mut sched).unwrap();
    assert!(pump.is_blocked());
    let blocked = records(&p.events, "backpressure");
    assert_eq!(blocked.len(), 1);
    assert_eq!(blocked[0].detail.as_deref(), Some("true"));

    // Source makes room, the sink's scheduling callback retries.
    p.source.wake(&mut SchedContext::new()).unwrap();
    assert_eq!(received(&p.downstream), 2);
    p.sink.wake(&mut SchedContext::new()).unwrap();
    assert!(!pump.is_blocked());
    let released = records(&p.events, "backpressure");
    assert_eq!(released.len(), 1);
    assert_eq!(released[0].detail.as_deref(), Some("false"));

    p.source.wake(&mut SchedContext::new()).unwrap();
    assert_eq!(received(&p.downstream), 3);
}

#[test]
fn test_queued_buffers_are_retained() {
    let p = pair(QueueConfig::new(4));
    let buffer = Buffer::from_vec(vec![9; 32]);
    let watch = buffer.duplicate();

    p.sink.input(buffer, &mut SchedContext::new()).unwrap();
    assert_eq!(watch.ref_count(), 2);
    assert_eq!(p.queue.len(), 1);

    p.source.wake(&mut SchedContext::new()).unwrap();
    assert!(watch.is_exclusive());
    assert!(p.queue.is_empty());
}

#[test]
fn test_controller_release_discards_queued_buffers() {
    let p = pair(QueueConfig::new(8));
    let watches: Vec<_> = (0..5)
        .map(|i| {
            let buffer = Buffer::from_vec(vec![i; 8]);
            let watch = buffer.duplicate();
            p.sink.input(buffer, &mut SchedContext::new()).unwrap();
            watch
        })
        .collect();

    let controller = p.queue.controller().unwrap();
    let last = std::thread::spawn(move || controller.release().unwrap())
        .join()
        .unwrap();
    assert!(last);
    assert_eq!(p.queue.state(), QueueState::Draining);

    wake_until_closed(&p.queue, &p.source);
    assert!(watches.iter().all(Buffer::is_exclusive));
    assert_eq!(received(&p.downstream), 0);
    assert_eq!(records(&p.events, "source_end").len(), 1);
    assert!(p.source.output().is_none());
}

#[test]
fn test_controller_handles_count_down() {
    let p = pair(QueueConfig::new(8));
    let first = p.queue.controller().unwrap();
    let second = p.queue.controller().unwrap();

    assert!(!first.release().unwrap());
    assert_eq!(p.queue.state(), QueueState::Running);

    // Dropping the last handle has the same effect as releasing it.
    drop(second);
    assert_eq!(p.queue.state(), QueueState::Draining);
    assert!(p.queue.controller().is_err());
}

#[test]
fn test_sink_release_drains_before_closing() {
    let Pair {
        queue,
        sink,
        source,
        downstream,
        events,
    } = pair(QueueConfig::new(8).with_burst(2));
    for i in 0..5u8 {
        sink.input(Buffer::from_vec(vec![i]), &mut SchedContext::new()).unwrap();
    }

    sink.release();
    assert_eq!(queue.state(), QueueState::Draining);

    // One burst per scheduling callback.
    source.wake(&mut SchedContext::new()).unwrap();
    assert_eq!(received(&downstream), 2);
    assert_eq!(queue.state(), QueueState::Draining);

    wake_until_closed(&queue, &source);
    assert_eq!(received(&downstream), 5);
    assert_eq!(records(&events, "source_end").len(), 1);
}

#[test]
fn test_format_changes_stay_in_order() {
    let p = pair(QueueConfig::new(8));
    let mut sched = SchedContext::new();

    p.sink.input(Buffer::from_vec(vec![0]), &mut sched).unwrap();
    p.sink
        .control(Command::SetFlowFormat(FlowFormat::new("block.rtp.")))
        .unwrap();
    p.sink.input(Buffer::from_vec(vec![1]), &mut sched).unwrap();
    assert!(p.source.flow_format().is_none());

    // The format is announced with the buffer that follows it.
    p.source.wake(&mut sched).unwrap();
    assert_eq!(
        p.source.flow_format().map(|f| f.def().to_string()),
        Some("block.rtp.".to_string())
    );
    assert_eq!(records(&p.events, "new_flow_format").len(), 1);
    assert_eq!(received(&p.downstream), 2);
}

// ----------------------------------------------------------------------------
// Cross-thread transfer
// ----------------------------------------------------------------------------

const SEQ_CHECK: Signature = Signature::fourcc(b"sqck");

struct SequenceCheckManager;

struct SequenceCheck {
    seen: Arc<Mutex<Vec<u64>>>,
}

impl Manager for SequenceCheckManager {
    type Args = Arc<Mutex<Vec<u64>>>;

    fn signature(&self) -> Signature {
        SEQ_CHECK
    }

    fn allocate(&self, seen: Self::Args) -> Result<Box<dyn NodeBehavior>> {
        Ok(Box::new(SequenceCheck { seen }))
    }
}

impl NodeBehavior for SequenceCheck {
    fn input(&mut self, _node: &Node, buffer: Buffer, _sched: &mut SchedContext) -> Result<()> {
        self.seen.lock().unwrap().push(buffer.metadata().sequence);
        buffer.release();
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cross_thread_transfer_in_order() {
    const COUNT: u64 = 5_000;

    let readable = NotifyScheduler::new("reader");
    let writable = NotifyScheduler::new("writer");
    let as_sched = |s: &NotifyScheduler| -> Shared<dyn Scheduler> {
        let arc: Arc<dyn Scheduler> = Arc::new(s.clone());
        Shared::from_arc(arc)
    };

    let queue = CrossThreadQueue::new(QueueConfig::new(16).with_burst(4).with_name("xfer")).unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let check = Node::allocate(&Arc::new(SequenceCheckManager), ProbeChain::new(), SEQ_CHECK, seen.clone())
        .unwrap();
    let source = Node::allocate(
        &Arc::new(QueueSourceManager),
        ProbeChain::new().prepend(ResourceProvider::new().with_scheduler(as_sched(&readable))),
        QUEUE_SOURCE,
        queue.clone(),
    )
    .unwrap();
    source.set_output(Some(check)).unwrap();
    let sink = Node::allocate(
        &Arc::new(QueueSinkManager),
        ProbeChain::new().prepend(ResourceProvider::new().with_scheduler(as_sched(&writable))),
        QUEUE_SINK,
        queue.clone(),
    )
    .unwrap();

    let consumer_queue = queue.clone();
    let consumer = tokio::spawn(async move {
        let mut sched = SchedContext::new();
        while consumer_queue.state() != QueueState::Closed {
            readable.notified().await;
            source.wake(&mut sched).unwrap();
        }
    });

    let producer = tokio::spawn(async move {
        let pump = Pump::new("producer");
        let mut sched = SchedContext::with_pump(pump.clone());
        for seq in 0..COUNT {
            while pump.is_blocked() {
                writable.notified().await;
                sink.wake(&mut sched).unwrap();
            }
            let buffer = Buffer::from_vec_with(vec![0; 188], Metadata::with_sequence(seq));
            sink.input(buffer, &mut sched).unwrap();
        }
        // Flush what is still held, then end the stream.
        while pump.is_blocked() {
            writable.notified().await;
            sink.wake(&mut sched).unwrap();
        }
        sink.release();
    });

    tokio::time::timeout(Duration::from_secs(30), async {
        producer.await.unwrap();
        consumer.await.unwrap();
    })
    .await
    .expect("transfer timed out");

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len() as u64, COUNT);
    assert!(seen.iter().copied().eq(0..COUNT));
}
