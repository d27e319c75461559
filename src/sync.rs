//! Lock-protected containers.
//!
//! The payload of a [`GuardedValue`] or [`SharedGuardedValue`] can only be
//! reached through a guard, and the guard releases the lock when it goes out
//! of scope on every path, including early returns, `?` and unwinding.
//! Waiters are not served in any particular order, and re-acquiring a lock
//! the current thread already holds deadlocks.

use parking_lot::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A value behind an exclusive lock.
#[derive(Debug, Default)]
pub struct GuardedValue<T> {
    inner: Mutex<T>,
}

/// Exclusive access to the payload of a [`GuardedValue`].
pub type Guard<'a, T> = MutexGuard<'a, T>;

impl<T> GuardedValue<T> {
    pub fn new(value: T) -> GuardedValue<T> {
        GuardedValue {
            inner: Mutex::new(value),
        }
    }

    /// Blocks until the lock is free and returns a guard over the payload.
    pub fn lock(&self) -> Guard<'_, T> {
        self.inner.lock()
    }

    /// Borrows the payload directly; holding `&mut self` already excludes
    /// every other accessor.
    pub fn get_mut(&mut self) -> &mut T {
        self.inner.get_mut()
    }

    pub fn into_inner(self) -> T {
        self.inner.into_inner()
    }
}

impl<T> From<T> for GuardedValue<T> {
    fn from(value: T) -> GuardedValue<T> {
        GuardedValue::new(value)
    }
}

/// A value behind a reader/writer lock: many readers or one writer.
#[derive(Debug, Default)]
pub struct SharedGuardedValue<T> {
    inner: RwLock<T>,
}

/// Shared, read-only access to the payload of a [`SharedGuardedValue`].
pub type SharedGuard<'a, T> = RwLockReadGuard<'a, T>;

/// Exclusive access to the payload of a [`SharedGuardedValue`].
pub type UniqueGuard<'a, T> = RwLockWriteGuard<'a, T>;

impl<T> SharedGuardedValue<T> {
    pub fn new(value: T) -> SharedGuardedValue<T> {
        SharedGuardedValue {
            inner: RwLock::new(value),
        }
    }

    /// Blocks while a writer holds the lock.
    pub fn shared_lock(&self) -> SharedGuard<'_, T> {
        self.inner.read()
    }

    /// Blocks while any reader or writer holds the lock.
    pub fn unique_lock(&self) -> UniqueGuard<'_, T> {
        self.inner.write()
    }

    pub fn get_mut(&mut self) -> &mut T {
        self.inner.get_mut()
    }

    pub fn into_inner(self) -> T {
        self.inner.into_inner()
    }
}

impl<T> From<T> for SharedGuardedValue<T> {
    fn from(value: T) -> SharedGuardedValue<T> {
        SharedGuardedValue::new(value)
    }
}
