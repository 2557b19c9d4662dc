//! Bounded producer/consumer buffer.
//!
//! One [`Mutex`] guards the queue; `not_full` holds producers waiting for
//! space and `not_empty` holds consumers waiting for items. Every wait sits
//! in a `while` loop re-checking the count, so a spurious or stale wakeup
//! only costs another trip around the loop.
//!
//! `signal` is enough on both condition variables: every thread waiting on
//! `not_full` is a producer checking the same predicate and doing the same
//! thing once it holds, likewise for `not_empty`, so waking any one of them
//! is always sufficient. Producers and consumers never share a condition
//! variable.

use alloc::collections::VecDeque;
use core::num::NonZeroUsize;
use std::time::{Duration, Instant};

use super::alert::{AlertToken, Alerted};
use super::condvar::Condvar;
use super::mutex::{Mutex, MutexGuard};
use crate::error::{SyncError, fatal};

/// A fixed-capacity FIFO queue with blocking `put` and `take`.
pub struct BoundedBuffer<T> {
    items: Mutex<VecDeque<T>>,
    capacity: usize,
    not_full: Condvar,
    not_empty: Condvar,
}

impl<T> BoundedBuffer<T> {
    /// Creates an empty buffer holding at most `capacity` items.
    pub fn new(capacity: NonZeroUsize) -> Self {
        let capacity = capacity.get();
        Self {
            items: Mutex::named("bounded-buffer", VecDeque::with_capacity(capacity)),
            capacity,
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
        }
    }

    /// Creates an empty buffer from a plain `usize` capacity.
    ///
    /// # Errors
    ///
    /// [`SyncError::ZeroCapacity`] if `capacity` is zero.
    pub fn with_capacity(capacity: usize) -> Result<Self, SyncError> {
        NonZeroUsize::new(capacity)
            .map(Self::new)
            .ok_or(SyncError::ZeroCapacity)
    }

    /// Appends `item`, blocking while the buffer is full.
    pub fn put(&self, item: T) {
        let mut items = self.items.lock();
        while items.len() == self.capacity {
            items = self.not_full.wait(items);
        }
        self.push(&mut items, item);
    }

    /// Removes the oldest item, blocking while the buffer is empty.
    pub fn take(&self) -> T {
        let mut items = self.items.lock();
        loop {
            if let Some(item) = self.pop(&mut items) {
                return item;
            }
            items = self.not_empty.wait(items);
        }
    }

    /// Appends `item` if there is room, otherwise hands it back.
    ///
    /// # Errors
    ///
    /// Returns `Err(item)` if the buffer is full.
    pub fn try_put(&self, item: T) -> Result<(), T> {
        let mut items = self.items.lock();
        if items.len() == self.capacity {
            return Err(item);
        }
        self.push(&mut items, item);
        Ok(())
    }

    /// Removes the oldest item if there is one.
    pub fn try_take(&self) -> Option<T> {
        let mut items = self.items.lock();
        self.pop(&mut items)
    }

    /// Like [`put`](Self::put), but gives up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns `Err(item)` if no space became free in time.
    pub fn put_timeout(&self, item: T, timeout: Duration) -> Result<(), T> {
        let deadline = Instant::now().checked_add(timeout);
        let mut items = self.items.lock();
        while items.len() == self.capacity {
            let Some(remaining) = remaining(deadline) else {
                crate::mtrace!("bounded buffer put timed out");
                return Err(item);
            };
            (items, _) = self.not_full.wait_timeout(items, remaining);
        }
        self.push(&mut items, item);
        Ok(())
    }

    /// Like [`take`](Self::take), but gives up after `timeout`.
    pub fn take_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now().checked_add(timeout);
        let mut items = self.items.lock();
        loop {
            if let Some(item) = self.pop(&mut items) {
                return Some(item);
            }
            let remaining = remaining(deadline)?;
            (items, _) = self.not_empty.wait_timeout(items, remaining);
        }
    }

    /// Like [`put`](Self::put), but stops waiting when `token` is set.
    ///
    /// The alert is only consulted while the buffer is full: if there is
    /// room the item is stored even when the token is already set.
    ///
    /// # Errors
    ///
    /// Returns `Err(item)` if the wait was alerted. The buffer is unchanged.
    pub fn put_or_alert(&self, item: T, token: &AlertToken) -> Result<(), T> {
        let mut items = self.items.lock();
        while items.len() == self.capacity {
            let outcome;
            (items, outcome) = self.not_full.wait_or_alert(items, token);
            if outcome.is_alerted() {
                return Err(item);
            }
        }
        self.push(&mut items, item);
        Ok(())
    }

    /// Like [`take`](Self::take), but stops waiting when `token` is set.
    ///
    /// # Errors
    ///
    /// Returns [`Alerted`] if the wait was alerted while the buffer was
    /// empty.
    pub fn take_or_alert(&self, token: &AlertToken) -> Result<T, Alerted> {
        let mut items = self.items.lock();
        loop {
            if let Some(item) = self.pop(&mut items) {
                return Ok(item);
            }
            let outcome;
            (items, outcome) = self.not_empty.wait_or_alert(items, token);
            if outcome.is_alerted() {
                return Err(Alerted);
            }
        }
    }

    /// Returns the number of buffered items.
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Returns `true` if no items are buffered.
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Returns `true` if the buffer is at capacity.
    pub fn is_full(&self) -> bool {
        self.items.lock().len() == self.capacity
    }

    /// Returns the fixed capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Consumes the buffer, returning the remaining items oldest first.
    pub fn into_inner(self) -> VecDeque<T> {
        self.items.into_inner()
    }

    fn push(&self, items: &mut MutexGuard<'_, VecDeque<T>>, item: T) {
        items.push_back(item);
        self.check_count(items.len());
        self.not_empty.signal();
    }

    fn pop(&self, items: &mut MutexGuard<'_, VecDeque<T>>) -> Option<T> {
        let item = items.pop_front()?;
        self.check_count(items.len());
        self.not_full.signal();
        Some(item)
    }

    fn check_count(&self, count: usize) {
        if count > self.capacity {
            fatal(SyncError::CapacityViolation {
                count,
                capacity: self.capacity,
            });
        }
    }
}

impl<T> core::fmt::Debug for BoundedBuffer<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BoundedBuffer")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

/// Time left until `deadline`, or `None` once it has passed. A deadline
/// that overflowed `Instant` never expires.
fn remaining(deadline: Option<Instant>) -> Option<Duration> {
    match deadline {
        None => Some(Duration::from_secs(u64::from(u32::MAX))),
        Some(deadline) => {
            let now = Instant::now();
            (now < deadline).then(|| deadline - now)
        }
    }
}
