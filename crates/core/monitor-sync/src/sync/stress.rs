//! Wakeup and contention stress injection.
//!
//! Forces extra wakeups out of condition-variable waits and injects random
//! delays around mutex acquire/release to widen race windows and surface
//! timing-dependent bugs (a wait guarded by `if` instead of `while`, a
//! predicate read outside the lock, a missing signal).
//!
//! Stress is enabled per thread, so a test can stress its own worker
//! threads without disturbing tests running concurrently in the same
//! process.
//!
//! ## Design
//!
//! - **PRNG**: xorshift64, per-thread state, no locking.
//! - **Spurious wakeups**: a stressed thread entering a wait returns
//!   `spurious_wakeup_per_mille / 1000` of the time without being
//!   signalled. The waiter dequeues itself first, so no signal is lost.
//! - **Delay**: spins for a random duration in `[0, max_delay_us)`
//!   microseconds. Disabled under the model checkers, which control
//!   interleavings themselves.

use core::cell::Cell;

use super::loom_compat::thread_local;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Per-thread stress settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StressConfig {
    /// Probability, in thousandths, that a wait returns spuriously.
    pub spurious_wakeup_per_mille: u16,
    /// Upper bound for injected lock delays, in microseconds. 0 disables.
    pub max_delay_us: u32,
    /// PRNG seed. 0 selects a fixed fallback constant.
    pub seed: u64,
}

impl StressConfig {
    /// Only forced wakeups: every wait returns spuriously with the given
    /// probability, no delays.
    pub const fn spurious_wakeups(per_mille: u16) -> Self {
        Self {
            spurious_wakeup_per_mille: per_mille,
            max_delay_us: 0,
            seed: 0,
        }
    }

    /// Returns a copy with `max_delay_us` set.
    #[must_use]
    pub const fn with_delay_us(mut self, max_delay_us: u32) -> Self {
        self.max_delay_us = max_delay_us;
        self
    }

    /// Returns a copy with `seed` set.
    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

const FALLBACK_SEED: u64 = 0xDEAD_BEEF_CAFE_BABE;

thread_local! {
    static CONFIG: Cell<Option<StressConfig>> = Cell::new(None);
    static PRNG_STATE: Cell<u64> = Cell::new(FALLBACK_SEED);
}

/// Enables stress injection on the calling thread.
pub fn enable(config: StressConfig) {
    let seed = if config.seed == 0 {
        FALLBACK_SEED
    } else {
        config.seed
    };
    PRNG_STATE.with(|s| s.set(seed));
    CONFIG.with(|c| c.set(Some(config)));
    crate::minfo!("stress enabled on current thread: {config:?}");
}

/// Disables stress injection on the calling thread.
pub fn disable() {
    CONFIG.with(|c| c.set(None));
}

/// Returns the calling thread's stress settings, if enabled.
pub fn current() -> Option<StressConfig> {
    CONFIG.with(Cell::get)
}

/// Runs `f` with stress enabled on the calling thread, then restores the
/// previous setting (also on unwind).
pub fn scoped<R>(config: StressConfig, f: impl FnOnce() -> R) -> R {
    struct Restore(Option<StressConfig>);

    impl Drop for Restore {
        fn drop(&mut self) {
            match self.0 {
                Some(prev) => enable(prev),
                None => disable(),
            }
        }
    }

    let _restore = Restore(current());
    enable(config);
    f()
}

// ---------------------------------------------------------------------------
// PRNG
// ---------------------------------------------------------------------------

/// Returns the next pseudo-random u64 for the calling thread.
#[inline]
fn next_random() -> u64 {
    PRNG_STATE.with(|state| {
        let mut x = state.get();
        if x == 0 {
            x = FALLBACK_SEED;
        }
        // xorshift64
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        state.set(x);
        x
    })
}

// ---------------------------------------------------------------------------
// Injection points
// ---------------------------------------------------------------------------

/// Returns `true` if the calling thread's next wait should wake spuriously.
#[inline]
pub(crate) fn spurious_wakeup() -> bool {
    match current() {
        Some(cfg) if cfg.spurious_wakeup_per_mille > 0 => {
            next_random() % 1000 < u64::from(cfg.spurious_wakeup_per_mille)
        }
        _ => false,
    }
}

/// Spins for a random duration in `[0, max_delay_us)` microseconds.
///
/// Must not acquire any lock: it is called from lock acquire/release paths.
#[inline]
pub(crate) fn stress_delay() {
    #[cfg(not(any(loom, shuttle)))]
    {
        let Some(cfg) = current() else {
            return;
        };
        if cfg.max_delay_us == 0 {
            return;
        }

        let target_ns = next_random() % (u64::from(cfg.max_delay_us) * 1000);
        if target_ns == 0 {
            return;
        }

        let start = std::time::Instant::now();
        let target = core::time::Duration::from_nanos(target_ns);
        while start.elapsed() < target {
            core::hint::spin_loop();
        }
    }
}

#[cfg(all(test, not(any(loom, shuttle))))]
mod tests {
    use super::*;

    #[test]
    fn disabled_by_default() {
        assert_eq!(current(), None);
        assert!(!spurious_wakeup());
    }

    #[test]
    fn always_and_never() {
        scoped(StressConfig::spurious_wakeups(1000), || {
            assert!((0..100).all(|_| spurious_wakeup()));
        });
        scoped(StressConfig::spurious_wakeups(0), || {
            assert!((0..100).all(|_| !spurious_wakeup()));
        });
    }

    #[test]
    fn rate_is_roughly_respected() {
        let hits = scoped(StressConfig::spurious_wakeups(500).with_seed(42), || {
            (0..10_000).filter(|_| spurious_wakeup()).count()
        });
        assert!((3_000..7_000).contains(&hits), "hits = {hits}");
    }

    #[test]
    fn scoped_restores_previous() {
        let outer = StressConfig::spurious_wakeups(10);
        enable(outer);
        scoped(StressConfig::spurious_wakeups(999), || {
            assert_eq!(current().unwrap().spurious_wakeup_per_mille, 999);
        });
        assert_eq!(current(), Some(outer));
        disable();
        assert_eq!(current(), None);
    }

    #[test]
    fn setting_is_per_thread() {
        enable(StressConfig::spurious_wakeups(1000));
        let other = std::thread::spawn(current).join().unwrap();
        assert_eq!(other, None);
        disable();
    }

    #[test]
    fn same_seed_same_sequence() {
        let run = || {
            scoped(StressConfig::spurious_wakeups(300).with_seed(7), || {
                (0..64).map(|_| spurious_wakeup()).collect::<Vec<_>>()
            })
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn delay_is_bounded() {
        scoped(StressConfig::spurious_wakeups(0).with_delay_us(50), || {
            let start = std::time::Instant::now();
            for _ in 0..10 {
                stress_delay();
            }
            assert!(start.elapsed() < std::time::Duration::from_millis(500));
        });
    }
}
