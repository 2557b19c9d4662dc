//! Randomized scheduling checks under shuttle.
//!
//! Run with `RUSTFLAGS="--cfg shuttle" cargo test --test shuttle_monitor`.

#![cfg(shuttle)]

use shuttle::sync::Arc;
use shuttle::thread;

use monitor_sync::{AlertToken, BoundedBuffer, RwLock, WaitOutcome};

const ITERATIONS: usize = 1_000;

#[test]
fn buffer_two_producers_two_consumers() {
    shuttle::check_random(
        || {
            let buffer = Arc::new(BoundedBuffer::with_capacity(1).unwrap());
            let producers: Vec<_> = (0..2)
                .map(|p| {
                    let buffer = buffer.clone();
                    thread::spawn(move || {
                        buffer.put(p * 10);
                        buffer.put(p * 10 + 1);
                    })
                })
                .collect();
            let consumers: Vec<_> = (0..2)
                .map(|_| {
                    let buffer = buffer.clone();
                    thread::spawn(move || vec![buffer.take(), buffer.take()])
                })
                .collect();
            for p in producers {
                p.join().unwrap();
            }
            let mut all: Vec<_> = consumers
                .into_iter()
                .flat_map(|c| c.join().unwrap())
                .collect();
            all.sort_unstable();
            assert_eq!(all, [0, 1, 10, 11]);
        },
        ITERATIONS,
    );
}

#[test]
fn rwlock_writer_and_readers() {
    shuttle::check_random(
        || {
            let lock = Arc::new(RwLock::new(0));
            let writer = {
                let lock = lock.clone();
                thread::spawn(move || *lock.write() += 1)
            };
            let readers: Vec<_> = (0..2)
                .map(|_| {
                    let lock = lock.clone();
                    thread::spawn(move || {
                        let guard = lock.read();
                        let state = lock.state();
                        assert!(!state.writer_active);
                        assert!(state.active_readers >= 1);
                        *guard
                    })
                })
                .collect();
            writer.join().unwrap();
            for r in readers {
                assert!(r.join().unwrap() <= 1);
            }
            assert_eq!(*lock.read(), 1);
        },
        ITERATIONS,
    );
}

#[test]
fn alert_wakes_sleeper() {
    shuttle::check_random(
        || {
            let pair = Arc::new((monitor_sync::Mutex::new(()), monitor_sync::Condvar::new()));
            let token = AlertToken::new();
            let sleeper = {
                let (pair, token) = (pair.clone(), token.clone());
                thread::spawn(move || {
                    let (lock, cv) = &*pair;
                    let (_guard, outcome) = cv.wait_or_alert(lock.lock(), &token);
                    outcome
                })
            };
            token.alert();
            assert_eq!(sleeper.join().unwrap(), WaitOutcome::Alerted);
        },
        ITERATIONS,
    );
}
