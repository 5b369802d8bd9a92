//! # Mutex

use core::{
    cell::UnsafeCell,
    fmt,
    marker::PhantomData,
    ops::{Deref, DerefMut},
};

use thr_sys::Kernel;
use thr_sys_sync as sys;

pub use crate::result::{TryLockError, TryLockResult};

/// A mutual exclusion primitive useful for protecting shared data
///
/// This mutex will block threads waiting for the lock to become available, and grants the lock
/// in the order threads asked for it. The data can only be accessed through the RAII guards
/// returned from [`lock`] and [`try_lock`], which guarantees that the data is only ever accessed
/// when the mutex is locked.
///
/// Locking a mutex from the thread which already holds it is a fatal error.
///
/// [`lock`]: Mutex::lock
/// [`try_lock`]: Mutex::try_lock
pub struct Mutex<K: Kernel, T: ?Sized> {
    inner: sys::Mutex<K>,
    data: UnsafeCell<T>,
}

unsafe impl<K: Kernel, T: ?Sized + Send> Send for Mutex<K, T> {}
unsafe impl<K: Kernel, T: ?Sized + Send> Sync for Mutex<K, T> {}

impl<K: Kernel, T> Mutex<K, T> {
    /// Creates a new mutex in an unlocked state ready for use.
    #[inline]
    pub const fn new(data: T) -> Self {
        Self {
            inner: sys::Mutex::new(),
            data: UnsafeCell::new(data),
        }
    }
}

impl<K: Kernel, T: ?Sized> Mutex<K, T> {
    /// Acquires the mutex, blocking the current thread until it is able to do so.
    ///
    /// Upon returning, the thread is the only thread with the lock held. When the returned guard
    /// goes out of scope, the mutex will be unlocked.
    pub fn lock(&self) -> MutexGuard<'_, K, T> {
        self.inner.lock();
        // SAFETY: the lock was just acquired by this thread
        unsafe { MutexGuard::new(self) }
    }

    /// Attempts to acquire this lock.
    ///
    /// This function does not block.
    ///
    /// # Errors
    ///
    /// If the mutex could not be acquired because it is already locked, then this call will
    /// return the [`WouldBlock`] error.
    ///
    /// [`WouldBlock`]: TryLockError::WouldBlock
    pub fn try_lock(&self) -> TryLockResult<MutexGuard<'_, K, T>> {
        if self.inner.try_lock() {
            // SAFETY: the lock was just acquired by this thread
            Ok(unsafe { MutexGuard::new(self) })
        } else {
            Err(TryLockError::WouldBlock)
        }
    }

    /// Returns `true` if the mutex is held by the calling thread.
    pub fn is_locked_by_current_thread(&self) -> bool {
        self.inner.is_locked_by_current_thread()
    }

    /// Consumes this mutex, returning the underlying data.
    pub fn into_inner(self) -> T
    where
        T: Sized,
    {
        self.data.into_inner()
    }

    /// Returns a mutable reference to the underlying data.
    ///
    /// Since this call borrows the `Mutex` mutably, no actual locking needs to take place.
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }
}

impl<K: Kernel, T: Default> Default for Mutex<K, T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<K: Kernel, T: ?Sized + fmt::Debug> fmt::Debug for Mutex<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("Mutex");
        match self.try_lock() {
            Ok(guard) => {
                d.field("data", &&*guard);
            }
            Err(TryLockError::WouldBlock) => {
                d.field("data", &format_args!("<locked>"));
            }
        }
        d.finish_non_exhaustive()
    }
}

/// An RAII implementation of a "scoped lock" of a mutex. When this structure is dropped, the
/// lock will be unlocked.
#[must_use = "if unused the Mutex will immediately unlock"]
#[clippy::has_significant_drop]
pub struct MutexGuard<'a, K: Kernel, T: ?Sized + 'a> {
    lock: &'a Mutex<K, T>,
    // Unlocking from another thread is fatal
    _marker: PhantomData<*const ()>,
}

unsafe impl<K: Kernel, T: ?Sized + Sync> Sync for MutexGuard<'_, K, T> {}

impl<'a, K: Kernel, T: ?Sized> MutexGuard<'a, K, T> {
    /// # Safety
    ///
    /// The calling thread must hold `lock.inner`.
    unsafe fn new(lock: &'a Mutex<K, T>) -> Self {
        Self {
            lock,
            _marker: PhantomData,
        }
    }
}

impl<K: Kernel, T: ?Sized> Deref for MutexGuard<'_, K, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the guard proves the lock is held
        unsafe { &*self.lock.data.get() }
    }
}

impl<K: Kernel, T: ?Sized> DerefMut for MutexGuard<'_, K, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the guard proves the lock is held
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<K: Kernel, T: ?Sized> Drop for MutexGuard<'_, K, T> {
    #[inline]
    fn drop(&mut self) {
        self.lock.inner.unlock();
    }
}

impl<K: Kernel, T: ?Sized + fmt::Debug> fmt::Debug for MutexGuard<'_, K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

pub(crate) fn guard_lock<'a, K: Kernel, T: ?Sized>(
    guard: &MutexGuard<'a, K, T>,
) -> &'a sys::Mutex<K> {
    &guard.lock.inner
}
