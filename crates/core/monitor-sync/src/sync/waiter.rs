//! Parked-thread records and FIFO wait lists.
//!
//! A [`Waiter`] is created by a thread right before it blocks. It is pushed
//! onto a [`WaitList`] owned by a mutex or condition variable, and the
//! thread then parks until some other thread calls [`Waiter::notify`].
//!
//! `WaitList` carries no lock of its own: every owner keeps it inside the
//! [`SpinLock`](super::spinlock::SpinLock) that also guards the state the
//! waiters are waiting on, so "check state, then enqueue" is one atomic
//! step. Notification always happens after that spin lock is dropped.

use alloc::collections::VecDeque;
use std::time::Instant;

use super::loom_compat::{Arc, AtomicBool, Ordering, Thread, ThreadId, park_timeout, thread};

/// A blocked thread waiting for a wakeup.
pub(crate) struct Waiter {
    thread: Thread,
    notified: AtomicBool,
}

/// Why [`Waiter::park_until`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ParkResult {
    /// [`Waiter::notify`] was called.
    Notified,
    /// The interruption predicate became true first.
    Interrupted,
    /// The deadline passed first.
    TimedOut,
}

impl Waiter {
    /// Creates a waiter record for the calling thread.
    pub(crate) fn current() -> Arc<Self> {
        Arc::new(Self {
            thread: thread::current(),
            notified: AtomicBool::new(false),
        })
    }

    /// Returns the id of the thread that will park on this record.
    pub(crate) fn thread_id(&self) -> ThreadId {
        self.thread.id()
    }

    /// Marks the waiter notified and unparks its thread.
    ///
    /// The flag is published before the unpark, so a waiter that wakes for
    /// any reason observes it.
    pub(crate) fn notify(&self) {
        self.notified.store(true, Ordering::Release);
        self.thread.unpark();
    }

    /// Unparks the thread without notifying it, so it re-evaluates its
    /// interruption predicate.
    pub(crate) fn interrupt(&self) {
        self.thread.unpark();
    }

    /// Returns `true` once [`notify`](Self::notify) has been called.
    pub(crate) fn is_notified(&self) -> bool {
        self.notified.load(Ordering::Acquire)
    }

    /// Parks until notified. Spurious unparks are absorbed.
    pub(crate) fn park(&self) {
        while !self.is_notified() {
            thread::park();
        }
    }

    /// Parks until notified, until `interrupted` returns `true`, or until
    /// `deadline` passes.
    ///
    /// `interrupted` is evaluated after every unpark; whoever makes it true
    /// must call [`interrupt`](Self::interrupt) afterwards.
    pub(crate) fn park_until(
        &self,
        deadline: Option<Instant>,
        interrupted: impl Fn() -> bool,
    ) -> ParkResult {
        loop {
            if self.is_notified() {
                return ParkResult::Notified;
            }
            if interrupted() {
                return ParkResult::Interrupted;
            }
            match deadline {
                None => thread::park(),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return ParkResult::TimedOut;
                    }
                    park_timeout(deadline - now);
                }
            }
        }
    }
}

/// FIFO list of waiters.
#[derive(Default)]
pub(crate) struct WaitList {
    waiters: VecDeque<Arc<Waiter>>,
}

impl WaitList {
    /// Creates an empty list.
    pub(crate) const fn new() -> Self {
        Self {
            waiters: VecDeque::new(),
        }
    }

    /// Appends `waiter` to the tail.
    pub(crate) fn push(&mut self, waiter: Arc<Waiter>) {
        self.waiters.push_back(waiter);
    }

    /// Removes the oldest waiter.
    pub(crate) fn pop(&mut self) -> Option<Arc<Waiter>> {
        self.waiters.pop_front()
    }

    /// Removes every waiter, oldest first.
    pub(crate) fn take_all(&mut self) -> VecDeque<Arc<Waiter>> {
        core::mem::take(&mut self.waiters)
    }

    /// Removes `waiter` if it is still queued. Returns `true` if it was.
    pub(crate) fn remove(&mut self, waiter: &Arc<Waiter>) -> bool {
        match self.waiters.iter().position(|w| Arc::ptr_eq(w, waiter)) {
            Some(idx) => {
                self.waiters.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Returns the number of queued waiters.
    pub(crate) fn len(&self) -> usize {
        self.waiters.len()
    }
}
