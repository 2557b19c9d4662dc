//! Mesa-semantics condition variable.
//!
//! [`Condvar`] lets a thread holding a [`Mutex`] atomically release it and
//! sleep until another thread calls [`signal`](Condvar::signal) or
//! [`broadcast`](Condvar::broadcast). The waiter is enqueued on the
//! condition variable *before* the mutex is released, so any signal issued
//! by a thread that subsequently acquires the mutex finds it in the queue:
//! wakeups cannot be lost between the predicate check and the sleep.
//!
//! Waking only means "something changed". The mutex is reacquired before
//! every return, but the awaited condition may already be false again (a
//! competing thread got there first, a broadcast woke several waiters, or
//! the implementation returned spuriously). Every caller must re-check its
//! predicate in a loop:
//!
//! ```ignore
//! let mut guard = mutex.lock();
//! while !predicate(&guard) {
//!     guard = condvar.wait(guard);
//! }
//! ```
//!
//! [`wait_while`](Condvar::wait_while) packages that loop.

use std::time::{Duration, Instant};

use super::alert::AlertToken;
use super::mutex::{MutexGuard, RawMutex};
use super::spinlock::SpinLock;
use super::stress;
use super::waiter::{ParkResult, WaitList, Waiter};
use crate::error::{SyncError, misuse};

/// How a wait ended.
///
/// In every case the mutex is held again when the outcome is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Signalled, broadcast, or woken spuriously. Re-check the predicate.
    Woken,
    /// The timeout of a timed wait expired.
    TimedOut,
    /// The alert token of an alert-aware wait was set.
    Alerted,
}

impl WaitOutcome {
    /// Returns `true` for [`WaitOutcome::TimedOut`].
    pub fn timed_out(self) -> bool {
        self == Self::TimedOut
    }

    /// Returns `true` for [`WaitOutcome::Alerted`].
    pub fn is_alerted(self) -> bool {
        self == Self::Alerted
    }
}

/// A condition variable.
///
/// A `Condvar` is not bound to a mutex at construction; the mutex is
/// supplied on each wait. By convention a given condition variable is used
/// with a single mutex for its whole life.
pub struct Condvar {
    waiters: SpinLock<WaitList>,
}

impl Condvar {
    /// Creates a new condition variable with no waiters.
    pub fn new() -> Self {
        Self {
            waiters: SpinLock::new(WaitList::new()),
        }
    }

    /// Atomically releases the guard's mutex and sleeps until woken, then
    /// reacquires the mutex and returns the guard.
    pub fn wait<'a, T>(&self, guard: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
        self.wait_guard(&guard, None, None);
        guard
    }

    /// Waits until `condition` returns `false`, re-checking after every
    /// wakeup.
    pub fn wait_while<'a, T>(
        &self,
        mut guard: MutexGuard<'a, T>,
        mut condition: impl FnMut(&mut T) -> bool,
    ) -> MutexGuard<'a, T> {
        while condition(&mut *guard) {
            guard = self.wait(guard);
        }
        guard
    }

    /// Like [`wait`](Self::wait), but gives up after `timeout`.
    ///
    /// Returns [`WaitOutcome::TimedOut`] if the timeout expired without a
    /// wakeup. The mutex is reacquired before returning either way.
    pub fn wait_timeout<'a, T>(
        &self,
        guard: MutexGuard<'a, T>,
        timeout: Duration,
    ) -> (MutexGuard<'a, T>, WaitOutcome) {
        let outcome = self.wait_guard(&guard, Some(deadline_after(timeout)), None);
        (guard, outcome)
    }

    /// Like [`wait`](Self::wait), but also returns when `token` is set.
    ///
    /// If the token is already set on entry, returns
    /// [`WaitOutcome::Alerted`] immediately without releasing the mutex.
    /// Otherwise the thread sleeps until signalled ([`WaitOutcome::Woken`])
    /// or alerted ([`WaitOutcome::Alerted`]). The mutex is held on return
    /// in both cases and the token is left set.
    pub fn wait_or_alert<'a, T>(
        &self,
        guard: MutexGuard<'a, T>,
        token: &AlertToken,
    ) -> (MutexGuard<'a, T>, WaitOutcome) {
        let outcome = self.wait_guard(&guard, None, Some(token));
        (guard, outcome)
    }

    /// Waits on a [`RawMutex`] the caller acquired explicitly.
    ///
    /// # Errors
    ///
    /// [`SyncError::NotOwner`] if the calling thread does not hold `mutex`;
    /// nothing is released or enqueued in that case.
    pub fn wait_raw(&self, mutex: &RawMutex) -> Result<WaitOutcome, SyncError> {
        self.wait_inner(mutex, None, None)
    }

    /// Timed variant of [`wait_raw`](Self::wait_raw).
    ///
    /// # Errors
    ///
    /// See [`wait_raw`](Self::wait_raw).
    pub fn wait_raw_timeout(
        &self,
        mutex: &RawMutex,
        timeout: Duration,
    ) -> Result<WaitOutcome, SyncError> {
        self.wait_inner(mutex, Some(deadline_after(timeout)), None)
    }

    /// Alert-aware variant of [`wait_raw`](Self::wait_raw).
    ///
    /// # Errors
    ///
    /// See [`wait_raw`](Self::wait_raw).
    pub fn wait_raw_or_alert(
        &self,
        mutex: &RawMutex,
        token: &AlertToken,
    ) -> Result<WaitOutcome, SyncError> {
        self.wait_inner(mutex, None, Some(token))
    }

    /// Wakes at most one waiting thread. No-op if nobody is waiting.
    ///
    /// Does not touch any mutex; callers usually signal while holding the
    /// mutex that protects the state they changed, but need not.
    pub fn signal(&self) {
        let next = self.waiters.lock().pop();
        if let Some(w) = next {
            w.notify();
        }
    }

    /// Wakes every thread currently waiting. No-op if nobody is waiting.
    pub fn broadcast(&self) {
        let all = self.waiters.lock().take_all();
        for w in all {
            w.notify();
        }
    }

    /// Alias for [`signal`](Self::signal).
    pub fn notify_one(&self) {
        self.signal();
    }

    /// Alias for [`broadcast`](Self::broadcast).
    pub fn notify_all(&self) {
        self.broadcast();
    }

    /// Returns the number of threads currently enqueued on this variable.
    pub fn waiter_count(&self) -> usize {
        self.waiters.lock().len()
    }

    fn wait_guard<T>(
        &self,
        guard: &MutexGuard<'_, T>,
        deadline: Option<Instant>,
        alert: Option<&AlertToken>,
    ) -> WaitOutcome {
        // The guard proves ownership, so NotOwner here is a crate bug.
        match self.wait_inner(guard.raw(), deadline, alert) {
            Ok(outcome) => outcome,
            Err(err) => misuse(err),
        }
    }

    fn wait_inner(
        &self,
        mutex: &RawMutex,
        deadline: Option<Instant>,
        alert: Option<&AlertToken>,
    ) -> Result<WaitOutcome, SyncError> {
        if !mutex.is_owned_by_current_thread() {
            return Err(SyncError::NotOwner);
        }
        if alert.is_some_and(AlertToken::is_alerted) {
            crate::mtrace!("wait on `{}`: already alerted", mutex.name());
            return Ok(WaitOutcome::Alerted);
        }

        // Enqueue before releasing the mutex: a signaller that acquires the
        // mutex after our release is guaranteed to see us.
        let waiter = Waiter::current();
        self.waiters.lock().push(waiter.clone());
        let registration = alert.map(|token| token.register(&waiter));

        mutex.release()?;

        let parked = if stress::spurious_wakeup() {
            ParkResult::Interrupted
        } else {
            waiter.park_until(deadline, || alert.is_some_and(AlertToken::is_alerted))
        };
        drop(registration);

        // If we are still queued nobody signalled us; take ourselves out so a
        // later signal goes to a thread that is actually asleep.
        let dequeued = self.waiters.lock().remove(&waiter);

        // The order was checked when the mutex was first taken; reacquiring
        // it here restores the same held set.
        if let Err(err) = mutex.acquire_unchecked() {
            misuse(err);
        }

        let outcome = if alert.is_some_and(AlertToken::is_alerted) {
            if !dequeued {
                // We consumed a signal we will not act on; pass it along.
                self.signal();
            }
            crate::mtrace!("wait on `{}`: alerted", mutex.name());
            WaitOutcome::Alerted
        } else if !dequeued {
            WaitOutcome::Woken
        } else if parked == ParkResult::TimedOut {
            crate::mtrace!("wait on `{}`: timed out", mutex.name());
            WaitOutcome::TimedOut
        } else {
            WaitOutcome::Woken
        };
        Ok(outcome)
    }
}

impl Default for Condvar {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for Condvar {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Condvar")
            .field("waiters", &self.waiter_count())
            .finish()
    }
}

fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    // Saturate absurd timeouts instead of overflowing `Instant`.
    now.checked_add(timeout)
        .unwrap_or_else(|| now + Duration::from_secs(60 * 60 * 24 * 365))
}
