//! # Semaphore
//!
//! A semaphore maintains a count of available resources. Threads wait for and release
//! resources through it; waiters are served in arrival order.
//!
//! When a permit is acquired, it is represented by a [`SemaphorePermit`] that automatically
//! releases the permit back to the semaphore when dropped.

use thr_sys::Kernel;
use thr_sys_sync as sys;

/// A bounded counting semaphore.
///
/// The number of available permits never exceeds the semaphore's maximum: releasing a permit
/// into a full semaphore leaves it full.
pub struct Semaphore<K: Kernel> {
    inner: sys::Semaphore<K>,
}

impl<K: Kernel> Semaphore<K> {
    /// Creates a new semaphore with the initial number of permits, which is also its maximum.
    pub const fn new(permits: u32) -> Self {
        Self {
            inner: sys::Semaphore::new(permits),
        }
    }

    /// Creates a new semaphore with the initial number of permits, never holding more than
    /// `max_permits`.
    pub const fn with_max(permits: u32, max_permits: u32) -> Self {
        Self {
            inner: sys::Semaphore::with_max(permits, max_permits),
        }
    }

    /// Acquires a permit from the semaphore, blocking until one is available.
    pub fn acquire(&self) -> SemaphorePermit<'_, K> {
        self.inner.wait();
        SemaphorePermit { sem: self }
    }

    /// Tries to acquire a permit from the semaphore without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`TryAcquireError::NoPermits`] if no permits are currently available.
    pub fn try_acquire(&self) -> Result<SemaphorePermit<'_, K>, TryAcquireError> {
        if self.inner.try_wait() {
            Ok(SemaphorePermit { sem: self })
        } else {
            Err(TryAcquireError::NoPermits)
        }
    }

    /// Adds a permit to the semaphore without having acquired one first.
    pub fn add_permit(&self) {
        self.inner.signal();
    }

    /// Returns a snapshot of the number of available permits.
    pub fn available_permits(&self) -> u32 {
        self.inner.count()
    }
}

/// A permit from the semaphore.
///
/// When dropped, the permit is automatically released back to the semaphore.
#[must_use]
#[clippy::has_significant_drop]
pub struct SemaphorePermit<'a, K: Kernel> {
    sem: &'a Semaphore<K>,
}

impl<K: Kernel> SemaphorePermit<'_, K> {
    /// Releases the permit without returning it to the semaphore.
    pub fn forget(self) {
        core::mem::forget(self);
    }
}

impl<K: Kernel> Drop for SemaphorePermit<'_, K> {
    fn drop(&mut self) {
        self.sem.inner.signal();
    }
}

/// Error returned when trying to acquire a permit fails.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum TryAcquireError {
    /// The semaphore has no available permits at this time.
    #[error("no permits available")]
    NoPermits,
}
