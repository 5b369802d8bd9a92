//! # Mutex
//!
//! FIFO mutual exclusion built from a single compare-and-swap word and the block/wake primitives.
//!
//! The mutex's own fields (owner and wait queue) are protected by a spin guard: an atomic word
//! taken with compare-and-swap for the handful of instructions needed to inspect or update them.
//! Spinning on the guard yields to the current owner instead of burning the processor.
//!
//! A thread that finds the mutex owned appends a stack-resident wait node to the queue, releases
//! the guard and blocks on the node. `unlock` transfers ownership to the queue head *before* it
//! grants and wakes it, so a granted waiter always owns the mutex and acquisition order is queue
//! arrival order.

use core::{
    cell::UnsafeCell,
    marker::PhantomData,
    sync::atomic::{AtomicU32, Ordering},
};

use static_assertions::const_assert_eq;
use thr_sys::{Kernel, KernelId, debug::fatal};

use crate::wait_queue::{self, WaitNode, WaitQueue};

/// Guard word value: the internal fields are free to take.
const GUARD_FREE: u32 = 0;
/// Guard word value: a thread is inspecting the internal fields.
const GUARD_HELD: u32 = 1;
/// Guard word value: the mutex was destroyed; any further use is fatal.
const GUARD_DESTROYED: u32 = 2;

// The owner word stores a raw kernel thread id
const_assert_eq!(size_of::<KernelId>(), size_of::<u32>());

/// A FIFO-fair blocking mutual exclusion primitive.
///
/// The mutex does not own the data it protects; see `thr_std_sync::Mutex` for the RAII,
/// data-owning wrapper.
pub struct Mutex<K: Kernel> {
    guard: AtomicU32,
    owner: AtomicU32,
    /// Number of threads currently inside [`Mutex::unlock`].
    ///
    /// Lockers back off while it is non-zero so an unlocking thread never starves on the guard.
    unlocking: AtomicU32,
    queue: UnsafeCell<WaitQueue>,
    _kernel: PhantomData<fn() -> K>,
}

// SAFETY: the queue is only accessed while holding the guard word.
unsafe impl<K: Kernel> Send for Mutex<K> {}
// SAFETY: the queue is only accessed while holding the guard word.
unsafe impl<K: Kernel> Sync for Mutex<K> {}

impl<K: Kernel> Mutex<K> {
    /// Creates a new, unlocked [`Mutex`].
    pub const fn new() -> Self {
        Self {
            guard: AtomicU32::new(GUARD_FREE),
            owner: AtomicU32::new(KernelId::NONE_RAW),
            unlocking: AtomicU32::new(0),
            queue: UnsafeCell::new(WaitQueue::new()),
            _kernel: PhantomData,
        }
    }

    /// Locks the mutex, blocking the current thread until it owns it.
    ///
    /// Waiters are granted ownership in the order they called `lock`.
    ///
    /// # Panics
    ///
    /// Panics (fatal) if the calling thread already owns the mutex, or if the mutex was
    /// destroyed.
    pub fn lock(&self) {
        let curr_thread = K::current_thread_id();

        // Defer to any thread that is handing the mutex over
        while self.unlocking.load(Ordering::Acquire) != 0 {
            let _ = K::yield_to(None);
        }

        self.acquire_guard();

        let owner = self.owner.load(Ordering::Relaxed);
        if owner == KernelId::NONE_RAW {
            self.owner.store(curr_thread.to_raw(), Ordering::Relaxed);
            self.release_guard();
            return;
        }
        if owner == curr_thread.to_raw() {
            self.release_guard();
            fatal(
                "MUTEX_RELOCK",
                format_args!("mutex locked again by its owner {curr_thread}"),
            );
        }

        let node = WaitNode::new(curr_thread);
        // SAFETY: `node` lives in this frame until `wait_granted` returns, which only happens
        // after `unlock` has unlinked and granted it.
        unsafe { (*self.queue.get()).push_back(&node) };
        self.release_guard();

        log::trace!("{curr_thread} queued on contended mutex {:p}", self);
        node.wait_granted::<K>();

        debug_assert_eq!(self.owner.load(Ordering::Acquire), curr_thread.to_raw());
    }

    /// Attempts to lock the mutex without blocking.
    ///
    /// Returns `true` if the calling thread now owns the mutex. A failed attempt does not
    /// queue the caller.
    pub fn try_lock(&self) -> bool {
        let curr_thread = K::current_thread_id();

        self.acquire_guard();
        let acquired = self.owner.load(Ordering::Relaxed) == KernelId::NONE_RAW;
        if acquired {
            self.owner.store(curr_thread.to_raw(), Ordering::Relaxed);
        }
        self.release_guard();

        acquired
    }

    /// Unlocks the mutex.
    ///
    /// If threads are waiting, ownership passes directly to the longest-waiting one, which is
    /// then woken.
    ///
    /// # Panics
    ///
    /// Panics (fatal) if the calling thread does not own the mutex.
    pub fn unlock(&self) {
        let curr_thread = K::current_thread_id();

        self.unlocking.fetch_add(1, Ordering::AcqRel);
        self.acquire_guard();

        if self.owner.load(Ordering::Relaxed) != curr_thread.to_raw() {
            self.release_guard();
            self.unlocking.fetch_sub(1, Ordering::AcqRel);
            fatal(
                "MUTEX_UNLOCK_NOT_OWNER",
                format_args!("mutex unlocked by {curr_thread}, which does not own it"),
            );
        }

        // SAFETY: guard held
        let queue = unsafe { &mut *self.queue.get() };
        let next = queue.peek_front_thread();
        match next {
            Some(next) => {
                // Ownership moves before the grant: a granted waiter always owns the mutex
                self.owner.store(next.to_raw(), Ordering::Relaxed);
                let granted = queue.grant_front();
                debug_assert_eq!(granted, Some(next));
                wait_queue::wake::<K>(next);
            }
            None => self.owner.store(KernelId::NONE_RAW, Ordering::Relaxed),
        }

        self.unlocking.fetch_sub(1, Ordering::AcqRel);
        self.release_guard();
    }

    /// Returns `true` if the mutex is currently owned by the calling thread.
    pub fn is_locked_by_current_thread(&self) -> bool {
        self.owner.load(Ordering::Acquire) == K::current_thread_id().to_raw()
    }

    /// Returns the current owner, if any.
    ///
    /// The value is a snapshot and may be stale by the time it is observed.
    pub fn owner(&self) -> Option<KernelId> {
        KernelId::from_raw(self.owner.load(Ordering::Acquire))
    }

    /// Returns a snapshot of the number of threads queued for the mutex.
    pub fn waiter_count(&self) -> usize {
        self.acquire_guard();
        // SAFETY: guard held
        let count = unsafe { (*self.queue.get()).len() };
        self.release_guard();
        count
    }

    /// Destroys the mutex. Any later use of it is fatal.
    ///
    /// # Panics
    ///
    /// Panics (fatal) if the mutex is owned or has waiters: destroying a contended mutex is a
    /// programming error, not a recoverable condition.
    pub fn destroy(&self) {
        self.acquire_guard();

        // SAFETY: guard held
        let queue_empty = unsafe { (*self.queue.get()).is_empty() };
        if self.owner.load(Ordering::Relaxed) != KernelId::NONE_RAW || !queue_empty {
            self.release_guard();
            fatal(
                "MUTEX_DESTROY_CONTENDED",
                format_args!("mutex destroyed while locked"),
            );
        }

        self.guard.store(GUARD_DESTROYED, Ordering::Release);
    }

    fn acquire_guard(&self) {
        loop {
            match self.guard.compare_exchange_weak(
                GUARD_FREE,
                GUARD_HELD,
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(GUARD_DESTROYED) => fatal(
                    "MUTEX_USE_AFTER_DESTROY",
                    format_args!("mutex used after destroy"),
                ),
                Err(_) => self.relax(),
            }
        }
    }

    #[inline]
    fn release_guard(&self) {
        self.guard.store(GUARD_FREE, Ordering::Release);
    }

    /// Gives up the processor while the guard is held by someone else, preferably to the owner.
    fn relax(&self) {
        let owner = KernelId::from_raw(self.owner.load(Ordering::Relaxed))
            .filter(|&owner| owner != K::current_thread_id());
        if owner.is_none() || K::yield_to(owner).is_err() {
            let _ = K::yield_to(None);
        }
    }
}

impl<K: Kernel> Default for Mutex<K> {
    fn default() -> Self {
        Self::new()
    }
}
