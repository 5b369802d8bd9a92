//! # thr-sys-sync
//!
//! Blocking synchronization primitives built on the [`thr_sys::Kernel`] contract.
//!
//! | Primitive | Built from |
//! | --- | --- |
//! | [`Mutex`] | atomic guard word, stack-resident wait nodes, block/wake |
//! | [`Condvar`] | [`Mutex`], stack-resident wait nodes, block/wake |
//! | [`Semaphore`] | [`Mutex`] + [`Condvar`] |
//! | [`RwLock`] | [`Mutex`] + two [`Condvar`]s |
//!
//! Every primitive that queues waiters wakes them in arrival order. None of them supports
//! timeouts or cancellation: a blocked thread only resumes after an explicit unlock, signal or
//! broadcast from another thread.
//!
//! These are the raw, non-RAII primitives. Usage errors (unlocking a mutex owned by another
//! thread, destroying a contended lock, ...) are fatal and reported through
//! [`thr_sys::debug::fatal`].

#![no_std]

extern crate alloc;

mod condvar;
mod mutex;
mod rwlock;
mod semaphore;
mod wait_queue;

#[doc(inline)]
pub use self::{
    condvar::Condvar,
    mutex::Mutex,
    rwlock::{RwLock, RwLockMode},
    semaphore::Semaphore,
};
