//! Synchronization primitives.
//!
//! Provides the monitor building blocks ([`Mutex`], [`Condvar`],
//! [`AlertToken`]) and the composites built from them
//! ([`BoundedBuffer`], [`RwLock`], [`Semaphore`]).

mod alert;
mod buffer;
mod condvar;
pub mod lockorder;
mod loom_compat;
mod mutex;
mod rwlock;
mod semaphore;
mod spinlock;
pub mod stress;
mod waiter;

pub use alert::{AlertToken, Alerted};
pub use buffer::BoundedBuffer;
pub use condvar::{Condvar, WaitOutcome};
pub use lockorder::{HeldLock, LockRank, OrderMode, held_locks, set_order_mode};
pub use mutex::{Mutex, MutexGuard, RawMutex};
pub use rwlock::{RawRwLock, RwLock, RwLockReadGuard, RwLockState, RwLockWriteGuard};
pub use semaphore::{Semaphore, SemaphorePermit};
pub use stress::StressConfig;
