//! Writer-preferring reader/writer lock.
//!
//! Built as a monitor: one [`Mutex`] guards three counters and two
//! condition variables, `readers_ok` and `writers_ok`, carry the waits.
//!
//! ## Policy
//!
//! A new reader waits while a writer is active *or queued*. Without the
//! queued-writer check a steady stream of overlapping readers keeps
//! `active_readers` above zero forever and a writer never gets in. With
//! it, a writer that arrives while readers are active acquires as soon as
//! those readers finish; readers arriving after it wait behind it.
//!
//! ## Wakeups
//!
//! Readers and writers both react to the same state changes but test
//! different predicates. Waking a single thread of the wrong class would
//! leave the eligible class asleep, so every change that can admit more
//! than one thread (last reader out, writer out) broadcasts.
//!
//! `release_write` broadcasts `readers_ok` and signals one writer; both
//! classes re-check, and the writer preference sorts out who proceeds.

use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};

use super::alert::{AlertToken, Alerted};
use super::condvar::Condvar;
use super::mutex::{Mutex, MutexGuard};
use crate::error::{SyncError, fatal};

/// Bookkeeping of a reader/writer lock.
///
/// Invariant: `writer_active` implies `active_readers == 0`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RwLockState {
    /// Readers currently holding the lock.
    pub active_readers: usize,
    /// Whether a writer currently holds the lock.
    pub writer_active: bool,
    /// Writers blocked in `acquire_write`.
    pub waiting_writers: usize,
}

impl RwLockState {
    fn readers_may_enter(&self) -> bool {
        !self.writer_active && self.waiting_writers == 0
    }

    fn writer_may_enter(&self) -> bool {
        !self.writer_active && self.active_readers == 0
    }
}

/// Reader/writer lock without attached data.
///
/// The acquire/release pairs must be balanced by the caller; [`RwLock`]
/// does that with guards.
pub struct RawRwLock {
    state: Mutex<RwLockState>,
    readers_ok: Condvar,
    writers_ok: Condvar,
}

impl RawRwLock {
    /// Creates a new unlocked reader/writer lock.
    pub fn new() -> Self {
        Self {
            state: Mutex::named("rwlock", RwLockState::default()),
            readers_ok: Condvar::new(),
            writers_ok: Condvar::new(),
        }
    }

    /// Acquires shared access, blocking while a writer is active or queued.
    pub fn acquire_read(&self) {
        let mut state = self.state.lock();
        while !state.readers_may_enter() {
            state = self.readers_ok.wait(state);
        }
        state.active_readers += 1;
        check(&state);
    }

    /// Releases shared access.
    ///
    /// # Panics
    ///
    /// Panics with [`SyncError::InvariantViolation`] if no reader holds the
    /// lock.
    pub fn release_read(&self) {
        let mut state = self.state.lock();
        if state.active_readers == 0 {
            drop(state);
            fatal(SyncError::InvariantViolation(
                "release_read without an active reader",
            ));
        }
        state.active_readers -= 1;
        check(&state);
        if state.active_readers == 0 {
            self.writers_ok.broadcast();
        }
    }

    /// Acquires exclusive access, blocking while a writer or any reader is
    /// active. Registers as a waiting writer first, which holds back new
    /// readers.
    pub fn acquire_write(&self) {
        let mut state = self.state.lock();
        state.waiting_writers += 1;
        while !state.writer_may_enter() {
            state = self.writers_ok.wait(state);
        }
        state.waiting_writers -= 1;
        state.writer_active = true;
        check(&state);
    }

    /// Releases exclusive access.
    ///
    /// # Panics
    ///
    /// Panics with [`SyncError::InvariantViolation`] if no writer holds
    /// the lock.
    pub fn release_write(&self) {
        let mut state = self.state.lock();
        if !state.writer_active {
            drop(state);
            fatal(SyncError::InvariantViolation(
                "release_write without an active writer",
            ));
        }
        state.writer_active = false;
        check(&state);
        self.readers_ok.broadcast();
        self.writers_ok.signal();
    }

    /// Acquires shared access if that is possible without waiting.
    ///
    /// # Errors
    ///
    /// [`SyncError::WouldBlock`] if a writer is active or queued.
    pub fn try_acquire_read(&self) -> Result<(), SyncError> {
        let mut state = self.state.lock();
        if !state.readers_may_enter() {
            return Err(SyncError::WouldBlock);
        }
        state.active_readers += 1;
        check(&state);
        Ok(())
    }

    /// Acquires exclusive access if that is possible without waiting.
    ///
    /// # Errors
    ///
    /// [`SyncError::WouldBlock`] if a writer or any reader is active.
    pub fn try_acquire_write(&self) -> Result<(), SyncError> {
        let mut state = self.state.lock();
        if !state.writer_may_enter() {
            return Err(SyncError::WouldBlock);
        }
        state.writer_active = true;
        check(&state);
        Ok(())
    }

    /// Like [`acquire_read`](Self::acquire_read), but stops waiting when
    /// `token` is set.
    ///
    /// # Errors
    ///
    /// [`Alerted`] if the token was set while the reader had to wait. No
    /// access is held in that case.
    pub fn acquire_read_or_alert(&self, token: &AlertToken) -> Result<(), Alerted> {
        let mut state = self.state.lock();
        while !state.readers_may_enter() {
            let outcome;
            (state, outcome) = self.readers_ok.wait_or_alert(state, token);
            if outcome.is_alerted() {
                return Err(Alerted);
            }
        }
        state.active_readers += 1;
        check(&state);
        Ok(())
    }

    /// Like [`acquire_write`](Self::acquire_write), but stops waiting when
    /// `token` is set.
    ///
    /// An alerted writer withdraws from the waiting count. If that leaves
    /// no writer queued, blocked readers are woken so they can re-check.
    ///
    /// # Errors
    ///
    /// [`Alerted`] if the token was set while the writer had to wait. No
    /// access is held in that case.
    pub fn acquire_write_or_alert(&self, token: &AlertToken) -> Result<(), Alerted> {
        let mut state = self.state.lock();
        state.waiting_writers += 1;
        while !state.writer_may_enter() {
            let outcome;
            (state, outcome) = self.writers_ok.wait_or_alert(state, token);
            if outcome.is_alerted() {
                self.withdraw_writer(&mut state);
                return Err(Alerted);
            }
        }
        state.waiting_writers -= 1;
        state.writer_active = true;
        check(&state);
        Ok(())
    }

    /// Returns a snapshot of the bookkeeping.
    pub fn state(&self) -> RwLockState {
        *self.state.lock()
    }

    fn withdraw_writer(&self, state: &mut MutexGuard<'_, RwLockState>) {
        state.waiting_writers -= 1;
        check(state);
        if state.readers_may_enter() {
            self.readers_ok.broadcast();
        }
    }
}

impl Default for RawRwLock {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for RawRwLock {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RawRwLock")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

fn check(state: &RwLockState) {
    if state.writer_active && state.active_readers > 0 {
        fatal(SyncError::InvariantViolation(
            "writer active while readers hold the lock",
        ));
    }
}

/// A reader/writer lock owning the data it protects.
pub struct RwLock<T> {
    raw: RawRwLock,
    data: UnsafeCell<T>,
}

// SAFETY: RawRwLock hands out either shared access to many threads or
// exclusive access to one.
unsafe impl<T: Send> Send for RwLock<T> {}
unsafe impl<T: Send + Sync> Sync for RwLock<T> {}

impl<T> RwLock<T> {
    /// Creates a new unlocked `RwLock` wrapping `value`.
    pub fn new(value: T) -> Self {
        Self {
            raw: RawRwLock::new(),
            data: UnsafeCell::new(value),
        }
    }

    /// Acquires shared read access.
    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.raw.acquire_read();
        RwLockReadGuard { lock: self }
    }

    /// Acquires exclusive write access.
    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.raw.acquire_write();
        RwLockWriteGuard { lock: self }
    }

    /// Attempts shared read access without blocking.
    ///
    /// # Errors
    ///
    /// See [`RawRwLock::try_acquire_read`].
    pub fn try_read(&self) -> Result<RwLockReadGuard<'_, T>, SyncError> {
        self.raw.try_acquire_read()?;
        Ok(RwLockReadGuard { lock: self })
    }

    /// Attempts exclusive write access without blocking.
    ///
    /// # Errors
    ///
    /// See [`RawRwLock::try_acquire_write`].
    pub fn try_write(&self) -> Result<RwLockWriteGuard<'_, T>, SyncError> {
        self.raw.try_acquire_write()?;
        Ok(RwLockWriteGuard { lock: self })
    }

    /// Acquires shared access unless `token` is set while waiting.
    ///
    /// # Errors
    ///
    /// See [`RawRwLock::acquire_read_or_alert`].
    pub fn read_or_alert(&self, token: &AlertToken) -> Result<RwLockReadGuard<'_, T>, Alerted> {
        self.raw.acquire_read_or_alert(token)?;
        Ok(RwLockReadGuard { lock: self })
    }

    /// Acquires exclusive access unless `token` is set while waiting.
    ///
    /// # Errors
    ///
    /// See [`RawRwLock::acquire_write_or_alert`].
    pub fn write_or_alert(
        &self,
        token: &AlertToken,
    ) -> Result<RwLockWriteGuard<'_, T>, Alerted> {
        self.raw.acquire_write_or_alert(token)?;
        Ok(RwLockWriteGuard { lock: self })
    }

    /// Returns a snapshot of the lock's bookkeeping.
    pub fn state(&self) -> RwLockState {
        self.raw.state()
    }

    /// Returns a mutable reference to the data; `&mut self` proves exclusivity.
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    /// Consumes the lock, returning the data.
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: Default> Default for RwLock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> core::fmt::Debug for RwLock<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RwLock")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// RAII guard for shared read access. Releases on drop.
pub struct RwLockReadGuard<'a, T> {
    lock: &'a RwLock<T>,
}

impl<T> Deref for RwLockReadGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: Shared access is held; writers are excluded.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> Drop for RwLockReadGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.raw.release_read();
    }
}

/// RAII guard for exclusive write access. Releases on drop.
pub struct RwLockWriteGuard<'a, T> {
    lock: &'a RwLock<T>,
}

impl<T> Deref for RwLockWriteGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: Exclusive access is held.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for RwLockWriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: Exclusive access is held.
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for RwLockWriteGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.raw.release_write();
    }
}
