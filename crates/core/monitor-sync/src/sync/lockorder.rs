//! Runtime lock-order checking.
//!
//! Mutexes created with a [`LockRank`] take part in a global acquisition
//! order: a thread may only acquire a ranked mutex whose rank is strictly
//! greater than every ranked mutex it already holds. Equal ranks never
//! nest, so ranks describe a partial order over lock identities and any
//! program that respects it cannot deadlock on ranked mutexes.
//!
//! Each thread keeps a stack of the ranked mutexes it holds. An acquire is
//! checked against that stack *before* blocking, so a violation is reported
//! even on runs where the bad interleaving never happens.
//!
//! ## Capacity
//!
//! - 32 nesting depth per thread. Deeper nesting silently stops tracking
//!   rather than failing inside the diagnostics.
//!
//! ## Modes
//!
//! - [`OrderMode::Panic`] (default): the offending `lock()` panics.
//! - [`OrderMode::Warn`]: the violation is logged and the acquire proceeds.
//!
//! The `*_checked` acquire variants ignore the mode and return
//! [`SyncError::LockOrder`] instead.
//!
//! Unranked mutexes are invisible to the checker.

use core::cell::RefCell;
use core::fmt;
use core::sync::atomic::{AtomicU8, Ordering};

use planck_noalloc::vec::ArrayVec;

use super::loom_compat::thread_local;
use crate::error::SyncError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Maximum nesting depth tracked per thread (held-lock stack).
const MAX_HELD: usize = 32;

// ---------------------------------------------------------------------------
// Ranks and modes
// ---------------------------------------------------------------------------

/// Position of a mutex in the global acquisition order.
///
/// Lower ranks are acquired first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LockRank(pub u32);

impl fmt::Display for LockRank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rank {}", self.0)
    }
}

/// What a blocking acquire does when it would violate the lock order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OrderMode {
    /// Panic at the offending call site.
    Panic = 0,
    /// Log a warning and acquire anyway.
    Warn = 1,
}

static MODE: AtomicU8 = AtomicU8::new(OrderMode::Panic as u8);

/// Sets the process-wide violation mode.
pub fn set_order_mode(mode: OrderMode) {
    MODE.store(mode as u8, Ordering::Relaxed);
}

/// Returns the process-wide violation mode.
pub fn order_mode() -> OrderMode {
    match MODE.load(Ordering::Relaxed) {
        1 => OrderMode::Warn,
        _ => OrderMode::Panic,
    }
}

// ---------------------------------------------------------------------------
// Per-thread held-lock stack
// ---------------------------------------------------------------------------

/// Entry in the per-thread held-lock stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeldLock {
    /// Rank of the held mutex.
    pub rank: LockRank,
    /// Name given at construction.
    pub name: &'static str,
    /// Identity of the mutex (its address while held).
    id: usize,
}

/// Stack of currently held ranked locks on a single thread.
struct HeldLocks {
    stack: ArrayVec<HeldLock, MAX_HELD>,
}

impl HeldLocks {
    fn new() -> Self {
        Self {
            stack: ArrayVec::new(),
        }
    }

    fn push(&mut self, entry: HeldLock) {
        if !self.stack.is_full() {
            self.stack.push(entry);
        }
    }

    fn pop(&mut self, id: usize) -> Option<HeldLock> {
        // Releases are usually LIFO; search down for hand-over-hand unlocks.
        for i in (0..self.stack.len()).rev() {
            if self.stack[i].id == id {
                return Some(self.stack.remove(i));
            }
        }
        None
    }

    /// Returns the held entry with the highest rank.
    fn highest(&self) -> Option<HeldLock> {
        self.stack.iter().copied().max_by_key(|h| h.rank)
    }
}

thread_local! {
    static HELD: RefCell<HeldLocks> = RefCell::new(HeldLocks::new());
}

// ---------------------------------------------------------------------------
// Hooks called by RawMutex
// ---------------------------------------------------------------------------

/// Checks whether acquiring `(rank, name)` respects the order given the
/// locks the calling thread already holds.
pub(crate) fn check_acquire(rank: LockRank, name: &'static str) -> Result<(), SyncError> {
    HELD.with(|held| match held.borrow().highest() {
        Some(top) if top.rank >= rank => Err(SyncError::LockOrder {
            held: top.name,
            acquiring: name,
        }),
        _ => Ok(()),
    })
}

/// Reports a violation found by a blocking acquire according to the mode.
#[track_caller]
pub(crate) fn report(err: SyncError) {
    let stack = held_locks();
    match order_mode() {
        OrderMode::Warn => {
            crate::mwarn!("{err}; held-lock stack: {stack:?}");
        }
        OrderMode::Panic => {
            crate::merr!("{err}; held-lock stack: {stack:?}");
            panic!("{err}");
        }
    }
}

/// Records that the calling thread now holds the mutex at `id`.
pub(crate) fn lock_acquired(rank: LockRank, name: &'static str, id: usize) {
    HELD.with(|held| held.borrow_mut().push(HeldLock { rank, name, id }));
}

/// Records that the calling thread released the mutex at `id`.
pub(crate) fn lock_released(id: usize) {
    // Mismatched releases are ignored; ownership is enforced by RawMutex.
    HELD.with(|held| {
        let _ = held.borrow_mut().pop(id);
    });
}

/// Returns the ranked locks held by the calling thread, oldest first.
pub fn held_locks() -> Vec<HeldLock> {
    HELD.with(|held| held.borrow().stack.iter().copied().collect())
}
