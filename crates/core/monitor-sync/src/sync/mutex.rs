//! Blocking mutual exclusion lock.
//!
//! [`RawMutex`] is the bare monitor lock: `acquire`/`release` with an owner
//! check. [`Mutex`] wraps a `RawMutex` together with the data it protects,
//! so the data can only be reached through a [`MutexGuard`]; the guard
//! releases on every exit path, including unwinding.
//!
//! Contended acquirers park on a FIFO queue. Release hands the lock
//! directly to the oldest queued thread instead of letting every waiter
//! race for it, so a waiter is served after at most as many releases as
//! there were threads queued ahead of it.

use core::cell::UnsafeCell;
use core::marker::PhantomData;
use core::ops::{Deref, DerefMut};

use super::lockorder::{self, LockRank};
use super::loom_compat::{ThreadId, thread};
use super::spinlock::SpinLock;
use super::stress::stress_delay;
use super::waiter::{WaitList, Waiter};
use crate::error::SyncError;

/// Bookkeeping protected by the mutex's internal spin lock.
struct MutexState {
    owner: Option<ThreadId>,
    waiters: WaitList,
}

/// A blocking lock with an owner, without attached data.
///
/// Use [`Mutex`] to protect data; `RawMutex` is for callers that need the
/// explicit `acquire`/`release` pair (for example to build their own
/// monitor) and therefore take on the release-on-every-path obligation
/// themselves.
pub struct RawMutex {
    state: SpinLock<MutexState>,
    name: &'static str,
    rank: Option<LockRank>,
}

impl RawMutex {
    /// Creates a new unlocked mutex.
    pub fn new() -> Self {
        Self::build("<unnamed>", None)
    }

    /// Creates a new unlocked mutex with a name for diagnostics.
    pub fn named(name: &'static str) -> Self {
        Self::build(name, None)
    }

    /// Creates a new unlocked mutex that takes part in lock-order checking.
    pub fn ranked(name: &'static str, rank: LockRank) -> Self {
        Self::build(name, Some(rank))
    }

    fn build(name: &'static str, rank: Option<LockRank>) -> Self {
        Self {
            state: SpinLock::new(MutexState {
                owner: None,
                waiters: WaitList::new(),
            }),
            name,
            rank,
        }
    }

    /// Returns the diagnostic name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the lock-order rank, if any.
    pub fn rank(&self) -> Option<LockRank> {
        self.rank
    }

    /// Acquires the mutex, parking the calling thread until it is free.
    ///
    /// # Panics
    ///
    /// Panics if the calling thread already holds this mutex, or if the
    /// acquire violates the lock order while [`OrderMode::Panic`] is active.
    ///
    /// [`OrderMode::Panic`]: super::OrderMode::Panic
    #[track_caller]
    pub fn acquire(&self) {
        if self.is_owned_by_current_thread() {
            crate::error::misuse(SyncError::Reentrant);
        }
        if let Some(rank) = self.rank {
            if let Err(err) = lockorder::check_acquire(rank, self.name) {
                lockorder::report(err);
            }
        }
        if let Err(err) = self.acquire_unchecked() {
            crate::error::misuse(err);
        }
    }

    /// Acquires the mutex, returning an error instead of panicking on
    /// reentrancy or on a lock-order violation.
    ///
    /// # Errors
    ///
    /// [`SyncError::LockOrder`] if the acquire would violate the declared
    /// order, [`SyncError::Reentrant`] if the caller already holds it.
    pub fn acquire_checked(&self) -> Result<(), SyncError> {
        if self.is_owned_by_current_thread() {
            return Err(SyncError::Reentrant);
        }
        if let Some(rank) = self.rank {
            lockorder::check_acquire(rank, self.name)?;
        }
        self.acquire_unchecked()
    }

    /// Blocking acquire without the order check.
    pub(crate) fn acquire_unchecked(&self) -> Result<(), SyncError> {
        stress_delay();
        let me = thread::current().id();

        let mut state = self.state.lock();
        match state.owner {
            None => {
                state.owner = Some(me);
                drop(state);
                self.record_acquired();
                return Ok(());
            }
            Some(owner) if owner == me => return Err(SyncError::Reentrant),
            Some(_) => {}
        }

        let waiter = Waiter::current();
        state.waiters.push(waiter.clone());
        drop(state);

        // Ownership is handed over by `release` before it notifies us.
        waiter.park();
        self.record_acquired();
        Ok(())
    }

    /// Attempts to acquire the mutex without blocking.
    ///
    /// # Errors
    ///
    /// [`SyncError::WouldBlock`] if another thread holds it,
    /// [`SyncError::Reentrant`] if the caller already holds it.
    pub fn try_acquire(&self) -> Result<(), SyncError> {
        let me = thread::current().id();
        let mut state = self.state.lock();
        match state.owner {
            None => {
                state.owner = Some(me);
                drop(state);
                self.record_acquired();
                Ok(())
            }
            Some(owner) if owner == me => Err(SyncError::Reentrant),
            Some(_) => Err(SyncError::WouldBlock),
        }
    }

    /// Releases the mutex and hands it to the oldest queued acquirer.
    ///
    /// # Errors
    ///
    /// [`SyncError::NotOwner`] if the calling thread does not hold the
    /// mutex. The mutex is left untouched in that case.
    pub fn release(&self) -> Result<(), SyncError> {
        let me = thread::current().id();
        let mut state = self.state.lock();
        if state.owner != Some(me) {
            return Err(SyncError::NotOwner);
        }

        let next = state.waiters.pop();
        state.owner = next.as_ref().map(|w| w.thread_id());
        drop(state);

        if self.rank.is_some() {
            lockorder::lock_released(self.id());
        }
        if let Some(next) = next {
            next.notify();
        }
        stress_delay();
        Ok(())
    }

    /// Returns `true` if some thread holds the mutex.
    pub fn is_locked(&self) -> bool {
        self.state.lock().owner.is_some()
    }

    /// Returns `true` if the calling thread holds the mutex.
    pub fn is_owned_by_current_thread(&self) -> bool {
        self.state.lock().owner == Some(thread::current().id())
    }

    /// Returns the id of the holding thread, for diagnostics.
    pub fn owner(&self) -> Option<ThreadId> {
        self.state.lock().owner
    }

    /// Returns the number of threads blocked in [`acquire`](Self::acquire).
    pub fn queued(&self) -> usize {
        self.state.lock().waiters.len()
    }

    fn record_acquired(&self) {
        if let Some(rank) = self.rank {
            lockorder::lock_acquired(rank, self.name, self.id());
        }
    }

    fn id(&self) -> usize {
        core::ptr::from_ref(self) as usize
    }
}

impl Default for RawMutex {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for RawMutex {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("RawMutex")
            .field("name", &self.name)
            .field("rank", &self.rank)
            .field("owner", &state.owner)
            .field("queued", &state.waiters.len())
            .finish()
    }
}

/// A blocking mutual exclusion lock owning the data it protects.
///
/// # Example
///
/// ```ignore
/// let counter = Arc::new(Mutex::new(0u64));
///
/// let handles: Vec<_> = (0..4)
///     .map(|_| {
///         let counter = counter.clone();
///         thread::spawn(move || *counter.lock() += 1)
///     })
///     .collect();
/// ```
pub struct Mutex<T> {
    raw: RawMutex,
    data: UnsafeCell<T>,
}

// SAFETY: The Mutex ensures exclusive access to `T` through its owner check.
// `T: Send` is required because the data may be accessed from different threads.
unsafe impl<T: Send> Send for Mutex<T> {}
unsafe impl<T: Send> Sync for Mutex<T> {}

impl<T> Mutex<T> {
    /// Creates a new unlocked `Mutex` wrapping `value`.
    pub fn new(value: T) -> Self {
        Self::from_raw(RawMutex::new(), value)
    }

    /// Creates a new unlocked `Mutex` with a name for diagnostics.
    pub fn named(name: &'static str, value: T) -> Self {
        Self::from_raw(RawMutex::named(name), value)
    }

    /// Creates a new unlocked `Mutex` that takes part in lock-order checking.
    pub fn ranked(name: &'static str, rank: LockRank, value: T) -> Self {
        Self::from_raw(RawMutex::ranked(name, rank), value)
    }

    fn from_raw(raw: RawMutex, value: T) -> Self {
        Self {
            raw,
            data: UnsafeCell::new(value),
        }
    }

    /// Acquires the lock, parking until it is available.
    ///
    /// # Panics
    ///
    /// Panics on reentrant use and, in [`OrderMode::Panic`], on lock-order
    /// violations.
    ///
    /// [`OrderMode::Panic`]: super::OrderMode::Panic
    #[track_caller]
    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.raw.acquire();
        MutexGuard::new(self)
    }

    /// Acquires the lock, reporting reentrancy and order violations as errors.
    ///
    /// # Errors
    ///
    /// See [`RawMutex::acquire_checked`].
    pub fn lock_checked(&self) -> Result<MutexGuard<'_, T>, SyncError> {
        self.raw.acquire_checked()?;
        Ok(MutexGuard::new(self))
    }

    /// Attempts to acquire the lock without blocking.
    ///
    /// # Errors
    ///
    /// See [`RawMutex::try_acquire`].
    pub fn try_lock(&self) -> Result<MutexGuard<'_, T>, SyncError> {
        self.raw.try_acquire()?;
        Ok(MutexGuard::new(self))
    }

    /// Returns `true` if some thread holds the lock.
    pub fn is_locked(&self) -> bool {
        self.raw.is_locked()
    }

    /// Returns the diagnostic name.
    pub fn name(&self) -> &'static str {
        self.raw.name()
    }

    /// Returns the underlying raw lock.
    pub fn raw(&self) -> &RawMutex {
        &self.raw
    }

    /// Returns a mutable reference to the data; `&mut self` proves exclusivity.
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    /// Consumes the mutex, returning the data.
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: Default> Default for Mutex<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> core::fmt::Debug for Mutex<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Mutex").field("raw", &self.raw).finish_non_exhaustive()
    }
}

/// RAII guard that releases the [`Mutex`] when dropped.
///
/// The guard is tied to the acquiring thread (`!Send`), so the release in
/// `Drop` always runs on the owner.
pub struct MutexGuard<'a, T> {
    mutex: &'a Mutex<T>,
    _not_send: PhantomData<*const ()>,
}

// SAFETY: Sharing `&MutexGuard` only hands out `&T`.
unsafe impl<T: Sync> Sync for MutexGuard<'_, T> {}

impl<'a, T> MutexGuard<'a, T> {
    fn new(mutex: &'a Mutex<T>) -> Self {
        Self {
            mutex,
            _not_send: PhantomData,
        }
    }

    /// Returns the raw lock this guard holds.
    ///
    /// Used by [`Condvar`](super::Condvar) to release and reacquire around
    /// a wait while the guard stays alive.
    pub(crate) fn raw(&self) -> &'a RawMutex {
        &self.mutex.raw
    }

    /// Releases the lock explicitly. Equivalent to dropping the guard.
    pub fn unlock(self) {
        drop(self);
    }
}

impl<T> Deref for MutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: The guard guarantees exclusive access while it exists.
        unsafe { &*self.mutex.data.get() }
    }
}

impl<T> DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: The guard guarantees exclusive access while it exists.
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<T> Drop for MutexGuard<'_, T> {
    fn drop(&mut self) {
        if let Err(err) = self.mutex.raw.release() {
            crate::error::misuse(err);
        }
    }
}
