//! Error types for synchronization primitive misuse.
//!
//! Misuse is never swallowed. The raw APIs return [`SyncError`] to the
//! call site responsible; the invariant kinds ([`SyncError::CapacityViolation`]
//! and [`SyncError::InvariantViolation`]) are raised through [`fatal`],
//! which logs and panics.

use thiserror::Error;

/// Errors reported by the synchronization primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SyncError {
    /// A release or wait was issued by a thread that does not hold the mutex.
    #[error("mutex is not held by the calling thread")]
    NotOwner,
    /// The owning thread tried to acquire a mutex it already holds.
    #[error("mutex is already held by the calling thread")]
    Reentrant,
    /// A non-blocking operation could not complete immediately.
    #[error("operation would block")]
    WouldBlock,
    /// A bounded buffer was requested with capacity zero.
    #[error("bounded buffer capacity must be at least 1")]
    ZeroCapacity,
    /// A bounded buffer's item count left `[0, capacity]`.
    #[error("bounded buffer count {count} outside [0, {capacity}]")]
    CapacityViolation {
        /// Observed item count.
        count: usize,
        /// Fixed capacity of the buffer.
        capacity: usize,
    },
    /// Adding permits would overflow a semaphore's count.
    #[error("semaphore permit count overflow")]
    PermitOverflow,
    /// A reader/writer lock's bookkeeping left its documented invariant.
    #[error("reader/writer lock invariant violated: {0}")]
    InvariantViolation(&'static str),
    /// An acquire would violate the declared lock order.
    #[error("lock order violation: acquiring `{acquiring}` while holding `{held}`")]
    LockOrder {
        /// Name of the held lock that must come later in the order.
        held: &'static str,
        /// Name of the lock being acquired.
        acquiring: &'static str,
    },
}

impl SyncError {
    /// Returns `true` for kinds that indicate corrupted shared state.
    pub const fn is_fatal(self) -> bool {
        matches!(
            self,
            Self::CapacityViolation { .. } | Self::InvariantViolation(_)
        )
    }
}

/// Logs `err` at fatal level and panics with its message.
#[cold]
#[track_caller]
pub(crate) fn fatal(err: SyncError) -> ! {
    crate::mfatal!("{}", err);
    panic!("{err}");
}

/// Logs `err` at error level and panics with its message.
///
/// Used where a guard makes the misuse structurally impossible, so an
/// error here means the crate itself is broken.
#[cold]
#[track_caller]
pub(crate) fn misuse(err: SyncError) -> ! {
    crate::merr!("{}", err);
    panic!("{err}");
}
