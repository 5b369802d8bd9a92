//! # thr-std
//!
//! One-stop facade over the threading runtime crates. The kernel contract is always available;
//! every other layer sits behind a cargo feature.
#![no_std]

pub mod kernel {
    pub use thr_sys::{Kernel, KernelId, ThreadEntry, debug::fatal};

    #[cfg(feature = "hosted")]
    pub use thr_sys::hosted::Hosted;
}

#[cfg(feature = "sync")]
pub mod sync {
    pub use thr_std_sync::*;
}
#[cfg(feature = "thread")]
pub mod thread {
    pub use thr_sys_thread::*;
}

#[cfg(any(feature = "sys", feature = "sys-mem", feature = "sys-sync"))]
pub mod sys {
    #[cfg(any(feature = "sys", feature = "sys-mem"))]
    pub use thr_sys_mem as mem;
    #[cfg(any(feature = "sys", feature = "sys-sync"))]
    pub use thr_sys_sync as sync;
}
