//! # Condition Variable
//!
//! A condition variable bound to at most one [`Mutex`] at a time.
//!
//! The binding is established by the first `wait` and cleared whenever the wait queue drains
//! back to empty. Waiting with a different mutex while the binding is held is fatal.
//!
//! `wait` links the caller's stack-resident node into the queue and releases the user mutex while
//! holding the condition variable's own guard mutex. `signal` and `broadcast` take the same guard,
//! so a signal can never slip in between the release and the enqueue.

use core::{cell::UnsafeCell, ptr};

use thr_sys::{Kernel, debug::fatal};

use crate::{
    mutex::Mutex,
    wait_queue::{self, WaitNode, WaitQueue},
};

/// A FIFO condition variable.
pub struct Condvar<K: Kernel> {
    guard: Mutex<K>,
    queue: UnsafeCell<WaitQueue>,
    bound: UnsafeCell<*const Mutex<K>>,
}

// SAFETY: the queue and the binding are only accessed while holding `guard`.
unsafe impl<K: Kernel> Send for Condvar<K> {}
// SAFETY: the queue and the binding are only accessed while holding `guard`.
unsafe impl<K: Kernel> Sync for Condvar<K> {}

impl<K: Kernel> Condvar<K> {
    /// Creates a new, unbound condition variable.
    pub const fn new() -> Self {
        Self {
            guard: Mutex::new(),
            queue: UnsafeCell::new(WaitQueue::new()),
            bound: UnsafeCell::new(ptr::null()),
        }
    }

    /// Atomically releases `mutex` and blocks until signaled, then re-acquires `mutex`.
    ///
    /// # Panics
    ///
    /// Panics (fatal) if the calling thread does not own `mutex`, or if the condition variable
    /// is currently bound to a different mutex.
    pub fn wait(&self, mutex: &Mutex<K>) {
        let curr_thread = K::current_thread_id();
        if !mutex.is_locked_by_current_thread() {
            fatal(
                "CONDVAR_MUTEX_NOT_HELD",
                format_args!("condition variable waited on by {curr_thread} without its mutex"),
            );
        }

        let node = WaitNode::new(curr_thread);

        self.guard.lock();

        // SAFETY: guard held
        let bound = unsafe { &mut *self.bound.get() };
        let mutex_ptr: *const Mutex<K> = mutex;
        if bound.is_null() {
            *bound = mutex_ptr;
        } else if !ptr::eq(*bound, mutex_ptr) {
            self.guard.unlock();
            fatal(
                "CONDVAR_MUTEX_MISMATCH",
                format_args!("condition variable waited on with a second mutex"),
            );
        }

        // SAFETY: guard held; `node` stays in this frame until `wait_granted` returns, which
        // only happens after `signal`/`broadcast` unlinked and granted it.
        unsafe { (*self.queue.get()).push_back(&node) };

        mutex.unlock();
        self.guard.unlock();

        node.wait_granted::<K>();

        mutex.lock();
    }

    /// Wakes the longest-waiting thread, if any.
    pub fn signal(&self) {
        self.guard.lock();

        // SAFETY: guard held
        let queue = unsafe { &mut *self.queue.get() };
        if let Some(thread) = queue.grant_front() {
            wait_queue::wake::<K>(thread);
        }
        if queue.is_empty() {
            // SAFETY: guard held
            unsafe { *self.bound.get() = ptr::null() };
        }

        self.guard.unlock();
    }

    /// Wakes every waiting thread, in arrival order.
    pub fn broadcast(&self) {
        self.guard.lock();

        // SAFETY: guard held
        let queue = unsafe { &mut *self.queue.get() };
        while let Some(thread) = queue.grant_front() {
            wait_queue::wake::<K>(thread);
        }
        // SAFETY: guard held
        unsafe { *self.bound.get() = ptr::null() };

        self.guard.unlock();
    }

    /// Returns `true` if the condition variable is currently bound to a mutex.
    pub fn is_bound(&self) -> bool {
        self.guard.lock();
        // SAFETY: guard held
        let bound = unsafe { !(*self.bound.get()).is_null() };
        self.guard.unlock();
        bound
    }

    /// Destroys the condition variable. Any later use of it is fatal.
    ///
    /// # Panics
    ///
    /// Panics (fatal) if threads are still waiting.
    pub fn destroy(&self) {
        self.guard.lock();

        // SAFETY: guard held
        if unsafe { !(*self.queue.get()).is_empty() } {
            self.guard.unlock();
            fatal(
                "CONDVAR_DESTROY_WAITERS",
                format_args!("condition variable destroyed with waiters"),
            );
        }

        self.guard.unlock();
        self.guard.destroy();
    }
}

impl<K: Kernel> Default for Condvar<K> {
    fn default() -> Self {
        Self::new()
    }
}
