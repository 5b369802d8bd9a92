//! # Reader/Writer Lock
//!
//! A writer-preferring reader/writer lock built from a [`Mutex`] and two [`Condvar`]s.
//!
//! Readers are held back while any writer is active *or waiting*, so a steady stream of readers
//! cannot starve a writer. A writer may downgrade itself to a reader without releasing the lock;
//! while that downgrade is in effect, waiting readers are let in alongside it even if writers are
//! queued.
//!
//! Every holder is recorded with its role, so `unlock` needs no mode argument and unlocking a
//! lock the caller does not hold is detected.

use alloc::vec::Vec;
use core::cell::UnsafeCell;

use thr_sys::{Kernel, KernelId, debug::fatal};

use crate::{condvar::Condvar, mutex::Mutex};

/// Access mode requested from [`RwLock::lock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RwLockMode {
    /// Shared access.
    Read,
    /// Exclusive access.
    Write,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Reader,
    Writer,
    /// A writer that downgraded itself; counted as a reader.
    Downgraded,
}

#[derive(Debug)]
struct Holder {
    thread: KernelId,
    role: Role,
}

struct RwState {
    active_readers: u32,
    active_writers: u32,
    waiting_writers: u32,
    downgrade: Option<KernelId>,
    /// Current holders, in acquisition order.
    holders: Vec<Holder>,
}

/// A writer-preferring reader/writer lock.
pub struct RwLock<K: Kernel> {
    guard: Mutex<K>,
    read_cv: Condvar<K>,
    write_cv: Condvar<K>,
    state: UnsafeCell<RwState>,
}

// SAFETY: `state` is only accessed while holding `guard`.
unsafe impl<K: Kernel> Send for RwLock<K> {}
// SAFETY: `state` is only accessed while holding `guard`.
unsafe impl<K: Kernel> Sync for RwLock<K> {}

impl RwState {
    fn readers_may_enter(&self) -> bool {
        (self.waiting_writers == 0 && self.active_writers == 0) || self.downgrade.is_some()
    }

    fn writer_may_enter(&self) -> bool {
        self.active_writers == 0 && self.active_readers == 0
    }

    fn holder_position(&self, thread: KernelId) -> Option<usize> {
        self.holders.iter().position(|holder| holder.thread == thread)
    }

    fn check_invariants(&self) {
        debug_assert!(self.active_writers <= 1);
        debug_assert!(self.active_writers == 0 || self.active_readers == 0);
    }
}

impl<K: Kernel> RwLock<K> {
    /// Creates a new, unlocked [`RwLock`].
    pub const fn new() -> Self {
        Self {
            guard: Mutex::new(),
            read_cv: Condvar::new(),
            write_cv: Condvar::new(),
            state: UnsafeCell::new(RwState {
                active_readers: 0,
                active_writers: 0,
                waiting_writers: 0,
                downgrade: None,
                holders: Vec::new(),
            }),
        }
    }

    /// Locks the [`RwLock`] in `mode`, blocking until access is granted.
    ///
    /// # Panics
    ///
    /// Panics (fatal) if the calling thread already holds the lock.
    pub fn lock(&self, mode: RwLockMode) {
        let curr_thread = K::current_thread_id();
        self.guard.lock();
        self.check_not_holder(curr_thread);

        match mode {
            RwLockMode::Read => {
                while !self.state().readers_may_enter() {
                    self.read_cv.wait(&self.guard);
                }
                self.enter(curr_thread, Role::Reader);
            }
            RwLockMode::Write => {
                self.state().waiting_writers += 1;
                while !self.state().writer_may_enter() {
                    self.write_cv.wait(&self.guard);
                }
                self.state().waiting_writers -= 1;
                self.enter(curr_thread, Role::Writer);
            }
        }

        self.guard.unlock();
    }

    /// Attempts to lock the [`RwLock`] in `mode` without blocking.
    ///
    /// Read access is refused while a writer is waiting, as in [`RwLock::lock`].
    ///
    /// # Panics
    ///
    /// Panics (fatal) if the calling thread already holds the lock.
    pub fn try_lock(&self, mode: RwLockMode) -> bool {
        let curr_thread = K::current_thread_id();
        self.guard.lock();
        self.check_not_holder(curr_thread);

        let acquired = match mode {
            RwLockMode::Read => self.state().readers_may_enter(),
            RwLockMode::Write => self.state().writer_may_enter(),
        };
        if acquired {
            let role = match mode {
                RwLockMode::Read => Role::Reader,
                RwLockMode::Write => Role::Writer,
            };
            self.enter(curr_thread, role);
        }

        self.guard.unlock();
        acquired
    }

    /// Releases the calling thread's access, whichever mode it holds.
    ///
    /// A waiting writer is preferred: it is signaled once the lock is free. With no writer
    /// waiting, all waiting readers are released.
    ///
    /// # Panics
    ///
    /// Panics (fatal) if the calling thread does not hold the lock.
    pub fn unlock(&self) {
        let curr_thread = K::current_thread_id();
        self.guard.lock();

        let state = self.state();
        let Some(position) = state.holder_position(curr_thread) else {
            self.guard.unlock();
            fatal(
                "RWLOCK_UNLOCK_NOT_HOLDER",
                format_args!("rwlock unlocked by {curr_thread}, which does not hold it"),
            );
        };

        let holder = state.holders.remove(position);
        match holder.role {
            Role::Reader => state.active_readers -= 1,
            Role::Writer => state.active_writers -= 1,
            Role::Downgraded => {
                state.active_readers -= 1;
                state.downgrade = None;
            }
        }
        state.check_invariants();

        if state.waiting_writers > 0 {
            if state.writer_may_enter() {
                self.write_cv.signal();
            }
        } else {
            self.read_cv.broadcast();
        }

        self.guard.unlock();
    }

    /// Converts the calling thread's exclusive access into shared access without releasing the
    /// lock, and lets waiting readers in alongside it.
    ///
    /// # Panics
    ///
    /// Panics (fatal) if the calling thread is not the active writer, or if it already
    /// downgraded.
    pub fn downgrade(&self) {
        let curr_thread = K::current_thread_id();
        self.guard.lock();

        let state = self.state();
        let holder = state
            .holder_position(curr_thread)
            .map(|position| &mut state.holders[position]);
        match holder {
            Some(holder) if holder.role == Role::Writer => holder.role = Role::Downgraded,
            Some(holder) if holder.role == Role::Downgraded => {
                self.guard.unlock();
                fatal(
                    "RWLOCK_DOUBLE_DOWNGRADE",
                    format_args!("rwlock downgraded twice by {curr_thread}"),
                );
            }
            _ => {
                self.guard.unlock();
                fatal(
                    "RWLOCK_DOWNGRADE_NOT_WRITER",
                    format_args!("rwlock downgraded by {curr_thread}, which is not its writer"),
                );
            }
        }

        state.active_writers -= 1;
        state.active_readers += 1;
        state.downgrade = Some(curr_thread);
        state.check_invariants();

        self.read_cv.broadcast();
        self.guard.unlock();
    }

    /// Returns a snapshot of the number of writers waiting for access.
    pub fn waiting_writers(&self) -> u32 {
        self.guard.lock();
        let waiting = self.state().waiting_writers;
        self.guard.unlock();
        waiting
    }

    /// Destroys the lock. Any later use of it is fatal.
    ///
    /// # Panics
    ///
    /// Panics (fatal) if any thread holds the lock.
    pub fn destroy(&self) {
        self.guard.lock();

        if !self.state().holders.is_empty() {
            self.guard.unlock();
            fatal(
                "RWLOCK_DESTROY_HELD",
                format_args!("rwlock destroyed while held"),
            );
        }

        self.read_cv.destroy();
        self.write_cv.destroy();
        self.guard.unlock();
        self.guard.destroy();
    }

    /// Access to the shared state.
    ///
    /// Must only be called while holding `guard`, and the returned reference must not outlive
    /// the next wait on a condition variable.
    #[allow(clippy::mut_from_ref)]
    fn state(&self) -> &mut RwState {
        // SAFETY: callers hold `guard`
        unsafe { &mut *self.state.get() }
    }

    fn enter(&self, thread: KernelId, role: Role) {
        let state = self.state();
        match role {
            Role::Writer => state.active_writers += 1,
            Role::Reader | Role::Downgraded => state.active_readers += 1,
        }
        state.holders.push(Holder { thread, role });
        state.check_invariants();
    }

    fn check_not_holder(&self, thread: KernelId) {
        if self.state().holder_position(thread).is_some() {
            self.guard.unlock();
            fatal(
                "RWLOCK_RELOCK",
                format_args!("rwlock locked again by its holder {thread}"),
            );
        }
    }
}

impl<K: Kernel> Default for RwLock<K> {
    fn default() -> Self {
        Self::new()
    }
}
