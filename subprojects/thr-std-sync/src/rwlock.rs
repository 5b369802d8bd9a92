//! # Read-Write Lock
//!
//! A writer-preferring read/write lock that allows multiple readers or a single writer.

use core::{
    cell::UnsafeCell,
    fmt,
    marker::PhantomData,
    mem::ManuallyDrop,
    ops::{Deref, DerefMut},
    ptr::NonNull,
};

use thr_sys::Kernel;
use thr_sys_sync::{self as sys, RwLockMode};

pub use crate::result::{TryLockError, TryLockResult};

/// A reader-writer lock
///
/// This type of lock allows a number of readers or at most one writer at any point in time.
///
/// The lock prefers writers: once a writer is waiting, new readers block until it has been
/// served, even while other readers still hold the lock. A writer can turn its exclusive access
/// into shared access with [`RwLockWriteGuard::downgrade`] without letting another writer in.
///
/// <details><summary>Deadlock example</summary>
///
/// ```text
/// // Thread 1              |  // Thread 2
/// let _rg1 = lock.read();  |
///                          |  // will block
///                          |  let _wg = lock.write();
/// // fatal: already held   |
/// let _rg2 = lock.read();  |
/// ```
///
/// </details>
pub struct RwLock<K: Kernel, T: ?Sized> {
    inner: sys::RwLock<K>,
    data: UnsafeCell<T>,
}

unsafe impl<K: Kernel, T: ?Sized + Send> Send for RwLock<K, T> {}
unsafe impl<K: Kernel, T: ?Sized + Send + Sync> Sync for RwLock<K, T> {}

/// RAII structure used to release the shared read access of a lock when dropped.
#[must_use = "if unused the RwLock will immediately unlock"]
#[clippy::has_significant_drop]
pub struct RwLockReadGuard<'a, K: Kernel, T: ?Sized + 'a> {
    // NB: a pointer instead of `&'a T` avoids `noalias` violations, because a
    // `RwLockReadGuard` argument doesn't hold immutability for its whole scope, only until it drops.
    data: NonNull<T>,
    inner_lock: &'a sys::RwLock<K>,
    _marker: PhantomData<*const ()>,
}

unsafe impl<K: Kernel, T: ?Sized + Sync> Sync for RwLockReadGuard<'_, K, T> {}

/// RAII structure used to release the exclusive write access of a lock when dropped.
#[must_use = "if unused the RwLock will immediately unlock"]
#[clippy::has_significant_drop]
pub struct RwLockWriteGuard<'a, K: Kernel, T: ?Sized + 'a> {
    lock: &'a RwLock<K, T>,
    _marker: PhantomData<*const ()>,
}

unsafe impl<K: Kernel, T: ?Sized + Sync> Sync for RwLockWriteGuard<'_, K, T> {}

impl<K: Kernel, T> RwLock<K, T> {
    /// Creates a new instance of an `RwLock<K, T>` which is unlocked.
    #[inline]
    pub const fn new(t: T) -> Self {
        Self {
            inner: sys::RwLock::new(),
            data: UnsafeCell::new(t),
        }
    }
}

impl<K: Kernel, T: ?Sized> RwLock<K, T> {
    /// Locks this `RwLock` with shared read access, blocking the current thread until it can be
    /// acquired.
    ///
    /// The calling thread blocks while a writer holds the lock or is waiting for it.
    #[inline]
    pub fn read(&self) -> RwLockReadGuard<'_, K, T> {
        self.inner.lock(RwLockMode::Read);
        // SAFETY: shared access was just granted to this thread
        unsafe { RwLockReadGuard::new(self) }
    }

    /// Attempts to acquire this `RwLock` with shared read access.
    ///
    /// This function does not block.
    ///
    /// # Errors
    ///
    /// Returns [`WouldBlock`] if a writer holds the lock or is waiting for it.
    ///
    /// [`WouldBlock`]: TryLockError::WouldBlock
    #[inline]
    pub fn try_read(&self) -> TryLockResult<RwLockReadGuard<'_, K, T>> {
        if self.inner.try_lock(RwLockMode::Read) {
            // SAFETY: shared access was just granted to this thread
            Ok(unsafe { RwLockReadGuard::new(self) })
        } else {
            Err(TryLockError::WouldBlock)
        }
    }

    /// Locks this `RwLock` with exclusive write access, blocking the current thread until it can
    /// be acquired.
    #[inline]
    pub fn write(&self) -> RwLockWriteGuard<'_, K, T> {
        self.inner.lock(RwLockMode::Write);
        // SAFETY: exclusive access was just granted to this thread
        unsafe { RwLockWriteGuard::new(self) }
    }

    /// Attempts to lock this `RwLock` with exclusive write access.
    ///
    /// This function does not block.
    ///
    /// # Errors
    ///
    /// Returns [`WouldBlock`] if any reader or writer holds the lock.
    ///
    /// [`WouldBlock`]: TryLockError::WouldBlock
    #[inline]
    pub fn try_write(&self) -> TryLockResult<RwLockWriteGuard<'_, K, T>> {
        if self.inner.try_lock(RwLockMode::Write) {
            // SAFETY: exclusive access was just granted to this thread
            Ok(unsafe { RwLockWriteGuard::new(self) })
        } else {
            Err(TryLockError::WouldBlock)
        }
    }

    /// Returns a snapshot of the number of writers waiting for access.
    pub fn waiting_writers(&self) -> u32 {
        self.inner.waiting_writers()
    }

    /// Consumes this `RwLock`, returning the underlying data.
    pub fn into_inner(self) -> T
    where
        T: Sized,
    {
        self.data.into_inner()
    }

    /// Returns a mutable reference to the underlying data.
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }
}

impl<K: Kernel, T: Default> Default for RwLock<K, T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<K: Kernel, T: ?Sized> fmt::Debug for RwLock<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RwLock").finish_non_exhaustive()
    }
}

impl<'rwlock, K: Kernel, T: ?Sized> RwLockReadGuard<'rwlock, K, T> {
    /// # Safety
    ///
    /// The calling thread must hold shared access to `lock.inner`, acquired through `lock`,
    /// `try_lock` or `downgrade`.
    unsafe fn new(lock: &'rwlock RwLock<K, T>) -> Self {
        Self {
            // SAFETY: `UnsafeCell::get` never returns null
            data: unsafe { NonNull::new_unchecked(lock.data.get()) },
            inner_lock: &lock.inner,
            _marker: PhantomData,
        }
    }
}

impl<'rwlock, K: Kernel, T: ?Sized> RwLockWriteGuard<'rwlock, K, T> {
    /// # Safety
    ///
    /// The calling thread must hold exclusive access to `lock.inner`.
    unsafe fn new(lock: &'rwlock RwLock<K, T>) -> Self {
        Self {
            lock,
            _marker: PhantomData,
        }
    }

    /// Downgrades a write-locked `RwLockWriteGuard` into a read-locked [`RwLockReadGuard`].
    ///
    /// The lock is never released in between, so no writer can sneak in; readers waiting for the
    /// lock are let in alongside the downgraded guard.
    pub fn downgrade(guard: Self) -> RwLockReadGuard<'rwlock, K, T> {
        let guard = ManuallyDrop::new(guard);
        let lock = guard.lock;
        lock.inner.downgrade();
        // SAFETY: the write access was just converted into shared access
        unsafe { RwLockReadGuard::new(lock) }
    }
}

impl<K: Kernel, T: ?Sized + fmt::Debug> fmt::Debug for RwLockReadGuard<'_, K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        (**self).fmt(f)
    }
}

impl<K: Kernel, T: ?Sized + fmt::Debug> fmt::Debug for RwLockWriteGuard<'_, K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        (**self).fmt(f)
    }
}

impl<K: Kernel, T: ?Sized> Deref for RwLockReadGuard<'_, K, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the conditions of `RwLockReadGuard::new` were satisfied when created.
        unsafe { self.data.as_ref() }
    }
}

impl<K: Kernel, T: ?Sized> Deref for RwLockWriteGuard<'_, K, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the conditions of `RwLockWriteGuard::new` were satisfied when created.
        unsafe { &*self.lock.data.get() }
    }
}

impl<K: Kernel, T: ?Sized> DerefMut for RwLockWriteGuard<'_, K, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the conditions of `RwLockWriteGuard::new` were satisfied when created.
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<K: Kernel, T: ?Sized> Drop for RwLockReadGuard<'_, K, T> {
    fn drop(&mut self) {
        self.inner_lock.unlock();
    }
}

impl<K: Kernel, T: ?Sized> Drop for RwLockWriteGuard<'_, K, T> {
    fn drop(&mut self) {
        self.lock.inner.unlock();
    }
}
