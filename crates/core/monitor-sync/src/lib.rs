//! Monitor-style synchronization primitives.
//!
//! This crate provides a blocking [`Mutex`] that owns the data it protects,
//! a Mesa-semantics [`Condvar`] that atomically releases the mutex and
//! sleeps, a cooperative [`AlertToken`] for cancelling waits, and three
//! composites built from those pieces: a [`BoundedBuffer`], a
//! writer-preferring [`RwLock`], and a counting [`Semaphore`].
//!
//! Every blocking primitive parks real threads; there is no spinning on
//! the slow path. The only spin lock in the crate guards the short
//! bookkeeping sections inside the primitives themselves.
//!
//! The primitives can be compiled against loom or shuttle
//! (`--cfg loom` / `--cfg shuttle`) so their interleavings can be model
//! checked without code changes.

#![warn(missing_docs)]

extern crate alloc;

pub mod error;
pub mod log;
pub mod sync;

pub use error::SyncError;
pub use sync::{
    AlertToken, Alerted, BoundedBuffer, Condvar, LockRank, Mutex, MutexGuard, OrderMode,
    RawMutex, RawRwLock, RwLock, RwLockReadGuard, RwLockState, RwLockWriteGuard, Semaphore,
    SemaphorePermit, WaitOutcome,
};
