//! # Condition Variable

use thr_sys::Kernel;
use thr_sys_sync as sys;

use crate::mutex::{MutexGuard, guard_lock};

/// A condition variable that works with [`MutexGuard`]s.
///
/// A condition variable serves a single mutex at a time: waiting on it with guards of two
/// different mutexes while either wait is pending is fatal. Waiters are woken in the order they
/// started waiting, and there are no spurious wakeups.
pub struct Condvar<K: Kernel> {
    inner: sys::Condvar<K>,
}

impl<K: Kernel> Condvar<K> {
    /// Creates a new condition variable.
    pub const fn new() -> Self {
        Self {
            inner: sys::Condvar::new(),
        }
    }

    /// Blocks the current thread until this condition variable receives a notification.
    ///
    /// The mutex behind `guard` is atomically released while waiting and re-acquired before
    /// this function returns.
    pub fn wait<'a, T: ?Sized>(&self, guard: MutexGuard<'a, K, T>) -> MutexGuard<'a, K, T> {
        self.inner.wait(guard_lock(&guard));
        guard
    }

    /// Blocks the current thread while `condition` returns `true`.
    pub fn wait_while<'a, T, F>(
        &self,
        mut guard: MutexGuard<'a, K, T>,
        mut condition: F,
    ) -> MutexGuard<'a, K, T>
    where
        T: ?Sized,
        F: FnMut(&mut T) -> bool,
    {
        while condition(&mut *guard) {
            guard = self.wait(guard);
        }
        guard
    }

    /// Wakes up the longest-waiting thread blocked on this condition variable.
    pub fn notify_one(&self) {
        self.inner.signal();
    }

    /// Wakes up all threads blocked on this condition variable.
    pub fn notify_all(&self) {
        self.inner.broadcast();
    }
}

impl<K: Kernel> Default for Condvar<K> {
    fn default() -> Self {
        Self::new()
    }
}
