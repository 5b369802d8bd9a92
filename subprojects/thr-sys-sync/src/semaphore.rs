//! # Semaphore
//!
//! A bounded counting semaphore, implemented as a monitor over a [`Mutex`] and a [`Condvar`].

use core::cell::UnsafeCell;

use thr_sys::Kernel;

use crate::{condvar::Condvar, mutex::Mutex};

/// A counting semaphore whose count stays within `0..=max`.
pub struct Semaphore<K: Kernel> {
    guard: Mutex<K>,
    cv: Condvar<K>,
    count: UnsafeCell<u32>,
    max: u32,
}

// SAFETY: `count` is only accessed while holding `guard`.
unsafe impl<K: Kernel> Send for Semaphore<K> {}
// SAFETY: `count` is only accessed while holding `guard`.
unsafe impl<K: Kernel> Sync for Semaphore<K> {}

impl<K: Kernel> Semaphore<K> {
    /// Creates a semaphore holding `count` permits, which is also its maximum.
    ///
    /// A semaphore created with `count == 0` can still be signaled up to one permit.
    pub const fn new(count: u32) -> Self {
        Self::with_max(count, count)
    }

    /// Creates a semaphore holding `count` permits that never holds more than `max`.
    ///
    /// # Panics
    ///
    /// Panics if `count > max`.
    pub const fn with_max(count: u32, max: u32) -> Self {
        assert!(count <= max, "semaphore count above its maximum");
        Self {
            guard: Mutex::new(),
            cv: Condvar::new(),
            count: UnsafeCell::new(count),
            max,
        }
    }

    /// Takes a permit, blocking until one is available.
    pub fn wait(&self) {
        self.guard.lock();

        // SAFETY: guard held (re-acquired by `Condvar::wait` before every check)
        while unsafe { *self.count.get() } == 0 {
            self.cv.wait(&self.guard);
        }
        // SAFETY: guard held
        unsafe { *self.count.get() -= 1 };

        self.guard.unlock();
    }

    /// Takes a permit if one is available, without blocking.
    pub fn try_wait(&self) -> bool {
        self.guard.lock();

        // SAFETY: guard held
        let count = unsafe { &mut *self.count.get() };
        let acquired = *count > 0;
        if acquired {
            *count -= 1;
        }

        self.guard.unlock();
        acquired
    }

    /// Returns a permit and wakes one waiter.
    ///
    /// Signaling a semaphore that already holds `max` permits leaves the count unchanged. An
    /// empty semaphore always gains a permit, even when its maximum is zero.
    pub fn signal(&self) {
        self.guard.lock();

        // SAFETY: guard held
        let count = unsafe { &mut *self.count.get() };
        if *count == 0 || *count < self.max {
            *count += 1;
            self.cv.signal();
        } else {
            log::warn!("semaphore {:p} signaled at its maximum of {}", self, self.max);
        }

        self.guard.unlock();
    }

    /// Returns a snapshot of the number of available permits.
    pub fn count(&self) -> u32 {
        self.guard.lock();
        // SAFETY: guard held
        let count = unsafe { *self.count.get() };
        self.guard.unlock();
        count
    }

    /// Returns the upper bound on the number of permits.
    pub fn max(&self) -> u32 {
        self.max
    }

    /// Destroys the semaphore. Any later use of it is fatal.
    ///
    /// # Panics
    ///
    /// Panics (fatal) if threads are still waiting for a permit.
    pub fn destroy(&self) {
        self.cv.destroy();
        self.guard.destroy();
    }
}
