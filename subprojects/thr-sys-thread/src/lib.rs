//! # thr-sys-thread
//!
//! The thread runtime: one kernel thread per runtime thread, a registry of thread control blocks
//! (TCBs), and the create/join/exit protocol.
//!
//! Every thread's TCB, stack and exception stack live in a single block obtained from the
//! [`PageAllocator`](thr_sys_mem::PageAllocator). A block is returned to the allocator by the
//! thread that joins its owner, which is why exiting is delicate: the exiting thread must publish
//! its exit value, wake its joiner, and release the TCB in a way that never touches its own stack
//! after the joiner may have reclaimed it. See [`Runtime::exit`].
//!
//! ## TCB lifecycle
//!
//! ```text
//! Created ──► Registered/Running ──► Exited-Unjoined ─────────┐
//!                      │                                      ▼
//!                      └────► Exited-Joined-Pending ──► Reclaimed
//! ```
//!
//! Threads are named by generation-checked [`ThreadId`] handles, so a handle to a reclaimed
//! thread can never alias a newer thread that reuses its registry slot.
#![no_std]

extern crate alloc;

mod registry;
mod runtime;
mod tcb;

pub use self::{
    registry::ThreadId,
    runtime::{
        CreateError, DEFAULT_STACK_SIZE, InitError, Runtime, RuntimeConfig, ThreadFunc,
        ThreadInfo, YieldError,
    },
};
