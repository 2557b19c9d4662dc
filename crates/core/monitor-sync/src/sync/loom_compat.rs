//! Loom and shuttle compatibility shim.
//!
//! When compiled with `cfg(loom)` or `cfg(shuttle)`, re-exports the model
//! checker's atomics, `Arc`, and thread handles. Otherwise, re-exports the
//! standard library types.
//!
//! This allows the primitives to be tested under a deterministic scheduler
//! without code changes. Protected data always lives in
//! `core::cell::UnsafeCell`; only the bookkeeping is modelled.

// ---------------------------------------------------------------------------
// Loom mode
// ---------------------------------------------------------------------------

#[cfg(loom)]
pub(crate) use loom::sync::Arc;
#[cfg(loom)]
pub(crate) use loom::sync::atomic::{AtomicBool, Ordering};
#[cfg(loom)]
pub(crate) use loom::thread::{self, Thread, ThreadId};
#[cfg(loom)]
pub(crate) use loom::thread_local;

// ---------------------------------------------------------------------------
// Shuttle mode
// ---------------------------------------------------------------------------

#[cfg(all(shuttle, not(loom)))]
pub(crate) use shuttle::sync::Arc;
#[cfg(all(shuttle, not(loom)))]
pub(crate) use shuttle::sync::atomic::{AtomicBool, Ordering};
#[cfg(all(shuttle, not(loom)))]
pub(crate) use shuttle::thread::{self, Thread, ThreadId};
#[cfg(all(shuttle, not(loom)))]
pub(crate) use shuttle::thread_local;

// ---------------------------------------------------------------------------
// Normal mode
// ---------------------------------------------------------------------------

#[cfg(not(any(loom, shuttle)))]
pub(crate) use std::sync::Arc;
#[cfg(not(any(loom, shuttle)))]
pub(crate) use std::sync::atomic::{AtomicBool, Ordering};
#[cfg(not(any(loom, shuttle)))]
pub(crate) use std::thread::{self, Thread, ThreadId};
#[cfg(not(any(loom, shuttle)))]
pub(crate) use std::thread_local;

/// Hint for a busy-wait loop.
///
/// Model checkers need an explicit yield point inside spin loops, or they
/// explore the same spinning thread forever.
#[inline]
pub(crate) fn spin_hint() {
    #[cfg(any(loom, shuttle))]
    thread::yield_now();
    #[cfg(not(any(loom, shuttle)))]
    core::hint::spin_loop();
}

/// Parks the current thread for at most `timeout`.
///
/// The model checkers have no timed park; there it degrades to a yield,
/// which callers observe as a spurious wakeup.
#[inline]
pub(crate) fn park_timeout(timeout: core::time::Duration) {
    #[cfg(any(loom, shuttle))]
    {
        let _ = timeout;
        thread::yield_now();
    }
    #[cfg(not(any(loom, shuttle)))]
    thread::park_timeout(timeout);
}
