//! Cooperative alert tokens.
//!
//! An [`AlertToken`] is a shared flag that asks the threads watching it to
//! stop what they are doing. Setting it never revokes a lock or interrupts
//! running code; it only has an effect at two kinds of places:
//!
//! - alert-aware waits ([`Condvar::wait_or_alert`] and the `*_or_alert`
//!   operations built on it), which return [`WaitOutcome::Alerted`] with the
//!   mutex held again, and
//! - explicit [`checkpoint`](AlertToken::checkpoint)s in long-running code.
//!
//! A thread that observes an alert still holds every lock it held, must
//! restore any monitor invariant it broke, and must release its locks
//! normally (usually by letting guards drop while the alert propagates up
//! as an error or `ControlFlow::Break`).
//!
//! [`Condvar::wait_or_alert`]: super::Condvar::wait_or_alert
//! [`WaitOutcome::Alerted`]: super::WaitOutcome::Alerted

use core::ops::ControlFlow;

use super::loom_compat::{Arc, AtomicBool, Ordering};
use super::spinlock::SpinLock;
use super::waiter::Waiter;

/// Marker returned through [`ControlFlow::Break`] by
/// [`AlertToken::checkpoint`] once the token is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Alerted;

impl core::fmt::Display for Alerted {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("alerted")
    }
}

struct Inner {
    alerted: AtomicBool,
    /// Waiters currently parked in an alert-aware wait on this token.
    sleepers: SpinLock<Vec<Arc<Waiter>>>,
}

/// A shared, clonable alert flag.
///
/// Clones refer to the same flag, so a supervisor can keep one clone and
/// hand the others to worker threads.
#[derive(Clone)]
pub struct AlertToken {
    inner: Arc<Inner>,
}

impl AlertToken {
    /// Creates a new, unset token.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                alerted: AtomicBool::new(false),
                sleepers: SpinLock::new(Vec::new()),
            }),
        }
    }

    /// Sets the token and wakes every thread sleeping in an alert-aware wait
    /// on it. Idempotent.
    pub fn alert(&self) {
        self.inner.alerted.store(true, Ordering::SeqCst);
        // The flag is visible before we look at the sleepers: a sleeper that
        // registers after this lock is released re-checks the flag before
        // parking.
        let sleepers = self.inner.sleepers.lock();
        crate::mdebug!("alert: waking {} sleeper(s)", sleepers.len());
        for w in sleepers.iter() {
            w.interrupt();
        }
    }

    /// Returns `true` if the token is set.
    pub fn is_alerted(&self) -> bool {
        self.inner.alerted.load(Ordering::SeqCst)
    }

    /// Clears the token.
    pub fn clear(&self) {
        self.inner.alerted.store(false, Ordering::SeqCst);
    }

    /// Clears the token and returns whether it was set.
    pub fn take(&self) -> bool {
        self.inner.alerted.swap(false, Ordering::SeqCst)
    }

    /// Polls the token from long-running code.
    ///
    /// Returns `ControlFlow::Break(Alerted)` once the token is set, so the
    /// caller can bail out with `?`-style control flow:
    ///
    /// ```ignore
    /// for chunk in work {
    ///     if token.checkpoint().is_break() {
    ///         break;
    ///     }
    ///     process(chunk);
    /// }
    /// ```
    pub fn checkpoint(&self) -> ControlFlow<Alerted> {
        if self.is_alerted() {
            ControlFlow::Break(Alerted)
        } else {
            ControlFlow::Continue(())
        }
    }

    /// Returns `true` if both handles refer to the same token.
    pub fn same_token(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Registers `waiter` so that [`alert`](Self::alert) unparks it.
    /// Dropping the returned registration unregisters it.
    pub(crate) fn register(&self, waiter: &Arc<Waiter>) -> Registration<'_> {
        self.inner.sleepers.lock().push(waiter.clone());
        Registration {
            token: self,
            waiter: waiter.clone(),
        }
    }

    fn sleeper_count(&self) -> usize {
        self.inner.sleepers.lock().len()
    }
}

impl Default for AlertToken {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for AlertToken {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AlertToken")
            .field("alerted", &self.is_alerted())
            .field("sleepers", &self.sleeper_count())
            .finish()
    }
}

/// Live registration of a sleeper on an [`AlertToken`].
pub(crate) struct Registration<'a> {
    token: &'a AlertToken,
    waiter: Arc<Waiter>,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        let mut sleepers = self.token.inner.sleepers.lock();
        if let Some(idx) = sleepers.iter().position(|w| Arc::ptr_eq(w, &self.waiter)) {
            sleepers.swap_remove(idx);
        }
    }
}

#[cfg(all(test, not(any(loom, shuttle))))]
mod tests {
    use super::*;
    use crate::sync::waiter::ParkResult;

    #[test]
    fn starts_clear() {
        let t = AlertToken::new();
        assert!(!t.is_alerted());
        assert_eq!(t.checkpoint(), ControlFlow::Continue(()));
    }

    #[test]
    fn alert_is_shared_between_clones() {
        let a = AlertToken::new();
        let b = a.clone();
        assert!(a.same_token(&b));
        assert!(!a.same_token(&AlertToken::new()));
        b.alert();
        assert!(a.is_alerted());
        assert_eq!(a.checkpoint(), ControlFlow::Break(Alerted));
    }

    #[test]
    fn alert_is_idempotent_and_clearable() {
        let t = AlertToken::new();
        t.alert();
        t.alert();
        assert!(t.is_alerted());
        t.clear();
        assert!(!t.is_alerted());
    }

    #[test]
    fn take_clears() {
        let t = AlertToken::new();
        assert!(!t.take());
        t.alert();
        assert!(t.take());
        assert!(!t.is_alerted());
    }

    #[test]
    fn registration_is_dropped() {
        let t = AlertToken::new();
        let w = Waiter::current();
        {
            let _reg = t.register(&w);
            assert_eq!(t.sleeper_count(), 1);
        }
        assert_eq!(t.sleeper_count(), 0);
    }

    #[test]
    fn alert_unparks_registered_sleeper() {
        let t = AlertToken::new();
        let t2 = t.clone();
        let h = std::thread::spawn(move || {
            let w = Waiter::current();
            let _reg = t2.register(&w);
            w.park_until(None, || t2.is_alerted())
        });
        while t.sleeper_count() == 0 {
            std::thread::yield_now();
        }
        t.alert();
        assert_eq!(h.join().unwrap(), ParkResult::Interrupted);
    }

    #[test]
    fn alerted_display() {
        assert_eq!(Alerted.to_string(), "alerted");
    }
}
