//! # thr-std-sync
//!
//! Data-owning RAII wrappers over the raw primitives of `thr-sys-sync`.
#![no_std]

pub mod condvar;
pub mod mutex;
mod result;
pub mod rwlock;
pub mod semaphore;

#[doc(inline)]
pub use self::{
    condvar::Condvar,
    mutex::{Mutex, MutexGuard},
    result::{TryLockError, TryLockResult},
    rwlock::{RwLock, RwLockReadGuard, RwLockWriteGuard},
    semaphore::{Semaphore, SemaphorePermit, TryAcquireError},
};
