//! Probe chain propagation and resource requests.

use pipework::Error;
use pipework::buffer::Buffer;
use pipework::clock::{ClockTime, ManualClock};
use pipework::event::{Event, ProbeOutcome};
use pipework::node::Node;
use pipework::nodes::null::{NULL_SINK, NullSinkConfig, NullSinkManager};
use pipework::probe::{ProbeChain, ResourceProvider, from_fn};
use pipework::request::{Resource, ResourceKind};
use pipework::shared::Shared;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn counting_chain(depth: usize, handler: Option<usize>, hits: &Arc<Vec<AtomicUsize>>) -> ProbeChain {
    // Built from the tail, so probe 0 ends up first.
    (0..depth).rev().fold(ProbeChain::new(), |chain, i| {
        let hits = hits.clone();
        chain.prepend(from_fn(move |_, event| {
            if matches!(event, Event::Warning(_)) {
                hits[i].fetch_add(1, Ordering::SeqCst);
                if handler == Some(i) {
                    return ProbeOutcome::Handled;
                }
            }
            ProbeOutcome::Unhandled
        }))
    })
}

fn sink(probes: ProbeChain) -> Node {
    Node::allocate(&Arc::new(NullSinkManager), probes, NULL_SINK, NullSinkConfig::any()).unwrap()
}

#[test]
fn test_unclaimed_event_visits_every_probe() {
    let depth = 8;
    let hits = Arc::new((0..depth).map(|_| AtomicUsize::new(0)).collect::<Vec<_>>());
    let node = sink(counting_chain(depth, None, &hits));

    assert_eq!(node.probes().depth(), depth);
    assert_eq!(node.raise(&Event::Warning("late packet")), ProbeOutcome::Unhandled);
    assert!(hits.iter().all(|h| h.load(Ordering::SeqCst) == 1));
}

#[test]
fn test_handling_probe_stops_propagation() {
    let depth = 6;
    for handler in 0..depth {
        let hits = Arc::new((0..depth).map(|_| AtomicUsize::new(0)).collect::<Vec<_>>());
        let node = sink(counting_chain(depth, Some(handler), &hits));

        assert_eq!(node.raise(&Event::Warning("x")), ProbeOutcome::Handled);
        for (i, h) in hits.iter().enumerate() {
            let expected = usize::from(i <= handler);
            assert_eq!(h.load(Ordering::SeqCst), expected, "probe {} with handler {}", i, handler);
        }
    }
}

#[test]
fn test_shared_tail_between_chains() {
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = seen.clone();
    let application = ProbeChain::new().prepend(from_fn(move |_, event| {
        if matches!(event, Event::SourceEnd) {
            counter.fetch_add(1, Ordering::SeqCst);
        }
        ProbeOutcome::Unhandled
    }));

    let left = sink(application.prepend(from_fn(|_, _| ProbeOutcome::Unhandled)));
    let right = sink(application.clone());
    drop(application);

    left.raise(&Event::SourceEnd);
    right.raise(&Event::SourceEnd);
    assert_eq!(seen.load(Ordering::SeqCst), 2);
}

#[test]
fn test_deep_chain_teardown() {
    let chain = (0..100_000).fold(ProbeChain::new(), |chain, _| {
        chain.prepend(from_fn(|_, _| ProbeOutcome::Unhandled))
    });
    assert_eq!(chain.depth(), 100_000);
    drop(chain);
}

#[test]
fn test_nearest_provider_wins() {
    let outer: Arc<dyn pipework::clock::Clock> = Arc::new(ManualClock::new(ClockTime::from_secs(1)));
    let inner: Arc<dyn pipework::clock::Clock> = Arc::new(ManualClock::new(ClockTime::from_secs(2)));

    let probes = ProbeChain::new()
        .prepend(ResourceProvider::new().with_clock(Shared::from_arc(outer)))
        .prepend(ResourceProvider::new().with_clock(Shared::from_arc(inner)));
    let node = sink(probes);

    let clock = node.request_clock().unwrap();
    assert_eq!(clock.now(), ClockTime::from_secs(2));
}

#[test]
fn test_unclaimed_request_and_fallback() {
    let node = sink(ProbeChain::new());
    let err = node.request(ResourceKind::SinkLatency).unwrap_err();
    assert_eq!(err, Error::ResourceUnavailable(ResourceKind::SinkLatency));

    let latency = node.request_or(ResourceKind::SinkLatency, || {
        Resource::Latency(ClockTime::from_millis(40))
    });
    assert!(matches!(latency, Resource::Latency(t) if t == ClockTime::from_millis(40)));
}

#[test]
fn test_errors_reach_the_application() {
    let fatal = Arc::new(AtomicUsize::new(0));
    let counter = fatal.clone();
    let node = sink(ProbeChain::new().prepend(from_fn(move |_, event| {
        if event.is_fatal() {
            counter.fetch_add(1, Ordering::SeqCst);
            return ProbeOutcome::Handled;
        }
        ProbeOutcome::Unhandled
    })));

    let err = node.raise_fatal(Error::AllocationFailed("pool exhausted".into()));
    assert!(matches!(err, Error::AllocationFailed(_)));
    assert_eq!(fatal.load(Ordering::SeqCst), 1);

    // Buffers are unaffected by event traffic.
    node.input(Buffer::from_vec(vec![1]), &mut pipework::sched::SchedContext::new())
        .unwrap();
}
