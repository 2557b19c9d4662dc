//! Producer/consumer properties of the bounded buffer.

#![cfg(not(any(loom, shuttle)))]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use monitor_sync::sync::stress::{self, StressConfig};
use monitor_sync::{BoundedBuffer, Condvar, Mutex};

#[test]
fn capacity_one_preserves_order() {
    let buffer = Arc::new(BoundedBuffer::with_capacity(1).unwrap());

    let producer = {
        let buffer = buffer.clone();
        thread::spawn(move || {
            for item in [1, 2, 3] {
                buffer.put(item);
                assert!(buffer.len() <= 1);
            }
        })
    };
    let consumer = {
        let buffer = buffer.clone();
        thread::spawn(move || {
            (0..3)
                .map(|_| {
                    let item = buffer.take();
                    assert!(buffer.len() <= 1);
                    item
                })
                .collect::<Vec<_>>()
        })
    };

    producer.join().unwrap();
    assert_eq!(consumer.join().unwrap(), [1, 2, 3]);
    assert!(buffer.is_empty());
}

#[test]
fn many_producers_many_consumers() {
    const PRODUCERS: usize = 4;
    const CONSUMERS: usize = 3;
    const PER_PRODUCER: usize = 1_000;
    const CAPACITY: usize = 3;

    let buffer = Arc::new(BoundedBuffer::with_capacity(CAPACITY).unwrap());
    let remaining = Arc::new(AtomicUsize::new(PRODUCERS * PER_PRODUCER));

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let buffer = buffer.clone();
            thread::spawn(move || {
                for seq in 0..PER_PRODUCER {
                    buffer.put((p, seq));
                }
            })
        })
        .collect();

    let consumers: Vec<_> = (0..CONSUMERS)
        .map(|c| {
            let buffer = buffer.clone();
            let remaining = remaining.clone();
            thread::spawn(move || {
                // Every other consumer runs with forced extra wakeups.
                if c % 2 == 0 {
                    stress::enable(StressConfig::spurious_wakeups(200).with_seed(c as u64 + 1));
                }
                let mut got = Vec::new();
                while remaining
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok()
                {
                    got.push(buffer.take());
                    assert!(buffer.len() <= CAPACITY);
                }
                got
            })
        })
        .collect();

    for p in producers {
        p.join().unwrap();
    }
    let per_consumer: Vec<Vec<(usize, usize)>> =
        consumers.into_iter().map(|c| c.join().unwrap()).collect();

    // Each consumer sees every producer's items in the order they were put.
    for got in &per_consumer {
        let mut last: HashMap<usize, usize> = HashMap::new();
        for &(p, seq) in got {
            if let Some(prev) = last.insert(p, seq) {
                assert!(prev < seq, "producer {p}: {prev} taken before {seq}");
            }
        }
    }

    // Multiset taken == multiset put.
    let mut all: Vec<_> = per_consumer.into_iter().flatten().collect();
    all.sort_unstable();
    let expected: Vec<_> = (0..PRODUCERS)
        .flat_map(|p| (0..PER_PRODUCER).map(move |seq| (p, seq)))
        .collect();
    assert_eq!(all, expected);
    assert!(buffer.is_empty());
}

/// The documented bug: waiting under `if` instead of `while`. Kept here only
/// to show that forced wakeups break it.
struct IfWaitBuffer {
    items: Mutex<VecDeque<u32>>,
    capacity: usize,
    not_full: Condvar,
    not_empty: Condvar,
    max_count: AtomicUsize,
}

impl IfWaitBuffer {
    fn new(capacity: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            capacity,
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
            max_count: AtomicUsize::new(0),
        }
    }

    fn put(&self, item: u32) {
        let mut items = self.items.lock();
        if items.len() == self.capacity {
            items = self.not_full.wait(items);
        }
        items.push_back(item);
        self.max_count.fetch_max(items.len(), Ordering::SeqCst);
        self.not_empty.signal();
    }

    fn take(&self) -> Option<u32> {
        let mut items = self.items.lock();
        if items.is_empty() {
            items = self.not_empty.wait(items);
        }
        let item = items.pop_front();
        if item.is_some() {
            self.not_full.signal();
        }
        item
    }
}

#[test]
fn if_wait_violates_capacity_under_forced_wakeups() {
    let buffer = Arc::new(IfWaitBuffer::new(1));
    let producer = {
        let buffer = buffer.clone();
        thread::spawn(move || {
            stress::scoped(StressConfig::spurious_wakeups(1000), || {
                for item in 0..4 {
                    buffer.put(item);
                }
            });
        })
    };
    producer.join().unwrap();

    let max = buffer.max_count.load(Ordering::SeqCst);
    assert!(max > buffer.capacity, "count peaked at {max}");

    // The consumer side of the same bug hands out nothing instead of
    // waiting for an item. Nobody would signal an `if`-wait on an empty
    // buffer, so empty it directly.
    buffer.items.lock().clear();
    let empty_take = stress::scoped(StressConfig::spurious_wakeups(1000), || buffer.take());
    assert_eq!(empty_take, None);
}

#[test]
fn while_wait_holds_capacity_under_forced_wakeups() {
    let buffer = Arc::new(BoundedBuffer::with_capacity(1).unwrap());
    let producer = {
        let buffer = buffer.clone();
        thread::spawn(move || {
            stress::scoped(StressConfig::spurious_wakeups(1000), || {
                for item in 0..4 {
                    buffer.put(item);
                    assert!(buffer.len() <= 1);
                }
            });
        })
    };

    let mut taken = Vec::new();
    for _ in 0..4 {
        thread::sleep(Duration::from_millis(2));
        taken.push(stress::scoped(StressConfig::spurious_wakeups(1000), || {
            buffer.take()
        }));
    }
    producer.join().unwrap();
    assert_eq!(taken, [0, 1, 2, 3]);
}
