//! Counting semaphore.
//!
//! [`Semaphore`] limits concurrent access to a resource. Threads acquire
//! permits before proceeding and release them when done.
//!
//! Built as a monitor over a permit count: one [`Mutex`] and one
//! [`Condvar`]. Every waiter wants the same thing (one permit), so a
//! release signals rather than broadcasts.

use super::alert::{AlertToken, Alerted};
use super::condvar::Condvar;
use super::mutex::Mutex;
use crate::error::{SyncError, misuse};

/// A counting semaphore.
///
/// # Example
///
/// ```ignore
/// let sem = Semaphore::new(3); // 3 concurrent permits
///
/// let _permit = sem.acquire();
/// // ... use the resource ...
/// // permit is released on drop
/// ```
pub struct Semaphore {
    permits: Mutex<usize>,
    available: Condvar,
}

impl Semaphore {
    /// Creates a new semaphore with the given number of permits.
    pub fn new(permits: usize) -> Self {
        Self {
            permits: Mutex::named("semaphore", permits),
            available: Condvar::new(),
        }
    }

    /// Acquires a permit, blocking until one is available.
    pub fn acquire(&self) -> SemaphorePermit<'_> {
        let mut permits = self.available.wait_while(self.permits.lock(), |p| *p == 0);
        *permits -= 1;
        SemaphorePermit { sem: self }
    }

    /// Tries to acquire a permit without blocking.
    ///
    /// Returns `Some(permit)` if a permit was available, `None` otherwise.
    pub fn try_acquire(&self) -> Option<SemaphorePermit<'_>> {
        let mut permits = self.permits.lock();
        if *permits == 0 {
            return None;
        }
        *permits -= 1;
        Some(SemaphorePermit { sem: self })
    }

    /// Acquires a permit unless `token` is set while waiting for one.
    ///
    /// # Errors
    ///
    /// [`Alerted`] if the token was set while no permit was available.
    pub fn acquire_or_alert(&self, token: &AlertToken) -> Result<SemaphorePermit<'_>, Alerted> {
        let mut permits = self.permits.lock();
        while *permits == 0 {
            let outcome;
            (permits, outcome) = self.available.wait_or_alert(permits, token);
            if outcome.is_alerted() {
                return Err(Alerted);
            }
        }
        *permits -= 1;
        Ok(SemaphorePermit { sem: self })
    }

    /// Returns the number of currently available permits.
    pub fn available_permits(&self) -> usize {
        *self.permits.lock()
    }

    /// Adds `n` permits, waking up to `n` blocked acquirers.
    ///
    /// # Panics
    ///
    /// Panics with [`SyncError::PermitOverflow`] if the count would
    /// overflow `usize`.
    pub fn add_permits(&self, n: usize) {
        let mut permits = self.permits.lock();
        let Some(total) = permits.checked_add(n) else {
            drop(permits);
            misuse(SyncError::PermitOverflow);
        };
        *permits = total;
        if n >= self.available.waiter_count() {
            self.available.broadcast();
        } else {
            for _ in 0..n {
                self.available.signal();
            }
        }
    }

    /// Releases a permit back to the semaphore.
    ///
    /// Usually called automatically by [`SemaphorePermit::drop`].
    fn release(&self) {
        let mut permits = self.permits.lock();
        *permits += 1;
        self.available.signal();
    }
}

impl core::fmt::Debug for Semaphore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Semaphore")
            .field("available", &self.available_permits())
            .finish_non_exhaustive()
    }
}

/// RAII permit guard. Releases the permit back to the semaphore on drop.
pub struct SemaphorePermit<'a> {
    sem: &'a Semaphore,
}

impl SemaphorePermit<'_> {
    /// Keeps the permit taken for good instead of returning it on drop.
    pub fn forget(self) {
        core::mem::forget(self);
    }
}

impl Drop for SemaphorePermit<'_> {
    fn drop(&mut self) {
        self.sem.release();
    }
}

#[cfg(all(test, not(any(loom, shuttle))))]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn permits_are_counted() {
        let sem = Semaphore::new(2);
        let a = sem.acquire();
        let b = sem.try_acquire().unwrap();
        assert_eq!(sem.available_permits(), 0);
        assert!(sem.try_acquire().is_none());
        drop(a);
        assert_eq!(sem.available_permits(), 1);
        drop(b);
        assert_eq!(sem.available_permits(), 2);
    }

    #[test]
    fn forget_keeps_permit() {
        let sem = Semaphore::new(1);
        sem.acquire().forget();
        assert_eq!(sem.available_permits(), 0);
        sem.add_permits(2);
        assert_eq!(sem.available_permits(), 2);
    }

    #[test]
    #[should_panic(expected = "semaphore permit count overflow")]
    fn add_permits_overflow_is_reported() {
        let sem = Semaphore::new(1);
        sem.add_permits(usize::MAX);
    }

    #[test]
    fn add_many_permits_without_waiters() {
        let sem = Semaphore::new(0);
        sem.add_permits(usize::MAX - 1);
        assert_eq!(sem.available_permits(), usize::MAX - 1);
        assert!(sem.try_acquire().is_some());
    }

    #[test]
    fn add_permits_wakes_blocked_acquirers() {
        let sem = Arc::new(Semaphore::new(0));
        let handles: Vec<_> = (0..3)
            .map(|_| {
                let sem = sem.clone();
                thread::spawn(move || sem.acquire().forget())
            })
            .collect();
        while sem.available.waiter_count() < 3 {
            thread::yield_now();
        }
        sem.add_permits(5);
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(sem.available_permits(), 2);
    }

    #[test]
    fn concurrency_is_bounded() {
        const LIMIT: usize = 3;
        let sem = Arc::new(Semaphore::new(LIMIT));
        let inside = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..12)
            .map(|_| {
                let (sem, inside, peak) = (sem.clone(), inside.clone(), peak.clone());
                thread::spawn(move || {
                    for _ in 0..50 {
                        let _permit = sem.acquire();
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        thread::yield_now();
                        inside.fetch_sub(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= LIMIT);
        assert_eq!(sem.available_permits(), LIMIT);
    }

    #[test]
    fn alerted_acquire_gives_up() {
        let sem = Arc::new(Semaphore::new(0));
        let token = AlertToken::new();
        let (s2, t2) = (sem.clone(), token.clone());
        let h = thread::spawn(move || s2.acquire_or_alert(&t2).map(SemaphorePermit::forget));
        while sem.available.waiter_count() == 0 {
            thread::yield_now();
        }
        token.alert();
        assert_eq!(h.join().unwrap(), Err(Alerted));
        assert_eq!(sem.available_permits(), 0);
    }
}
