//! Multi-threaded stress tests for the lock-free containers and the pool.
//!
//! These tests verify that:
//! - Every pushed item is popped exactly once, with nothing lost or duplicated
//! - Per-producer FIFO order holds under contention
//! - Pool depth never exceeds its bound while threads recycle concurrently

use pipework::config::PoolConfig;
use pipework::lockfree::{LifoStack, bounded};
use pipework::memory::BufferPool;
use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::thread;

const PRODUCERS: usize = 4;
const PER_PRODUCER: usize = 10_000;

#[test]
fn test_lifo_concurrent_push_single_popper() {
    let stack = Arc::new(LifoStack::new());
    let barrier = Arc::new(Barrier::new(PRODUCERS + 1));

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let stack = stack.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                for i in 0..PER_PRODUCER {
                    stack.push(p * PER_PRODUCER + i);
                }
            })
        })
        .collect();

    barrier.wait();
    let mut seen = HashSet::new();
    while seen.len() < PRODUCERS * PER_PRODUCER {
        if let Some(v) = stack.pop().unwrap() {
            assert!(seen.insert(v), "value {} popped twice", v);
        } else {
            thread::yield_now();
        }
    }

    for p in producers {
        p.join().unwrap();
    }
    assert!(stack.pop().unwrap().is_none());
    assert!(stack.is_empty());
}

#[test]
fn test_fifo_per_producer_order() {
    let (tx, mut rx) = bounded::<(usize, usize)>(64);

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let tx = tx.clone();
            thread::spawn(move || {
                for i in 0..PER_PRODUCER {
                    let mut item = (p, i);
                    loop {
                        match tx.push(item) {
                            Ok(()) => break,
                            Err(back) => {
                                item = back;
                                thread::yield_now();
                            }
                        }
                    }
                }
            })
        })
        .collect();

    let mut next = [0usize; PRODUCERS];
    let mut received = 0;
    while received < PRODUCERS * PER_PRODUCER {
        match rx.pop() {
            Some((p, i)) => {
                assert_eq!(i, next[p], "producer {} out of order", p);
                next[p] += 1;
                received += 1;
            }
            None => thread::yield_now(),
        }
    }

    for p in producers {
        p.join().unwrap();
    }
    assert!(rx.is_empty());
    assert!(next.iter().all(|&n| n == PER_PRODUCER));
}

#[test]
fn test_pool_depth_bound_with_foreign_releases() {
    const DEPTH: usize = 8;
    const ROUNDS: usize = 4_000;
    let pool = BufferPool::with_heap(PoolConfig::new(256, DEPTH).with_name("stress")).unwrap();

    // Acquire on this thread, release on the workers.
    let (tx, rx) = kanal::bounded::<pipework::buffer::Buffer>(16);
    let workers: Vec<_> = (0..PRODUCERS)
        .map(|_| {
            let rx = rx.clone();
            thread::spawn(move || {
                while let Ok(buffer) = rx.recv() {
                    buffer.release();
                }
            })
        })
        .collect();
    drop(rx);

    for _ in 0..ROUNDS {
        tx.send(pool.acquire().unwrap()).unwrap();
        assert!(pool.depth() <= DEPTH);
    }
    drop(tx);
    for w in workers {
        w.join().unwrap();
    }

    let stats = pool.stats();
    assert!(stats.depth <= DEPTH);
    assert_eq!(stats.hits + stats.backing_allocations, ROUNDS as u64);
    assert_eq!(stats.recycled + stats.freed, ROUNDS as u64);
}
