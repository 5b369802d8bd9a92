//! # thr-sys
//!
//! The kernel primitive contract consumed by the threading runtime.
//!
//! The runtime is built on a deliberately small kernel surface:
//!
//! | Primitive | Contract item |
//! | --- | --- |
//! | Atomic word | [`core::sync::atomic::AtomicU32::compare_exchange`] |
//! | Block the caller unless told not to | [`Kernel::block_self`] |
//! | Wake one thread by id | [`Kernel::wake`] |
//! | Voluntary yield | [`Kernel::yield_to`] |
//! | Thread spawning | [`Kernel::spawn`] |
//! | Page-grained memory | [`Kernel::map_pages`], [`Kernel::unmap_pages`] |
//! | Termination | [`Kernel::terminate_self`], [`Kernel::release_and_terminate`] |
//!
//! Every synchronization primitive and the thread runtime are generic over a zero-sized type
//! implementing [`Kernel`], so they stay `const`-constructible and carry no per-instance kernel
//! state.
//!
//! With the `hosted` feature enabled, [`hosted::Hosted`] implements the contract on top of `std`
//! threads. It is the kernel every test in the workspace runs against.

#![no_std]

#[cfg(feature = "hosted")]
extern crate std;

pub mod debug;
#[cfg(feature = "hosted")]
pub mod hosted;
pub mod kernel;
pub mod mem;
pub mod sync;
pub mod thread;

pub use kernel::Kernel;
pub use thread::{KernelId, ThreadEntry};
