//! Thread control block
//!
//! The TCB sits at the base of its thread's block. Fields set at creation are immutable
//! afterwards; the exit state is guarded by the `handoff` spin word, which the exiting thread and
//! the joiner use to hand the exit value over.

use core::{
    cell::UnsafeCell,
    ffi::c_void,
    ptr::{self, NonNull},
    sync::atomic::{AtomicU32, Ordering},
};

use static_assertions::const_assert;
use thr_sys::{Kernel, KernelId, debug::fatal, mem::PAGE_SIZE, sync::FLAG_BLOCK};

use crate::runtime::ThreadFunc;

const HANDOFF_FREE: u32 = 0;
const HANDOFF_HELD: u32 = 1;

/// Join word value: the joiner must keep blocking.
const JOIN_WAITING: u32 = FLAG_BLOCK;
/// Join word value: the exit value is published; the joiner may proceed.
const JOIN_RELEASED: u32 = 1;

// The TCB is placed at the (page-aligned) base of its block
const_assert!(align_of::<Tcb>() <= PAGE_SIZE);
const_assert!(size_of::<Tcb>() <= PAGE_SIZE);

/// Exit hand-over state, guarded by [`Tcb::handoff`].
pub(crate) struct ExitState {
    pub(crate) done: bool,
    pub(crate) value: *mut c_void,
    pub(crate) waiter: Option<KernelId>,
}

/// A thread control block.
#[repr(C)]
pub(crate) struct Tcb {
    pub(crate) stack_top: NonNull<c_void>,
    pub(crate) exception_stack_top: NonNull<c_void>,
    pub(crate) creator: KernelId,
    /// Function and argument the thread runs; `None` for the thread that initialised the runtime.
    pub(crate) entry: Option<(ThreadFunc, *mut c_void)>,
    handoff: AtomicU32,
    exit: UnsafeCell<ExitState>,
    join: AtomicU32,
}

impl Tcb {
    pub(crate) fn new(
        stack_top: NonNull<c_void>,
        exception_stack_top: NonNull<c_void>,
        creator: KernelId,
        entry: Option<(ThreadFunc, *mut c_void)>,
    ) -> Self {
        Self {
            stack_top,
            exception_stack_top,
            creator,
            entry,
            handoff: AtomicU32::new(HANDOFF_FREE),
            exit: UnsafeCell::new(ExitState {
                done: false,
                value: ptr::null_mut(),
                waiter: None,
            }),
            join: AtomicU32::new(JOIN_WAITING),
        }
    }

    /// Takes the handoff word, yielding while a peer holds it.
    ///
    /// Only the exiting thread and the single joiner ever contend, each for a short, bounded
    /// section.
    pub(crate) fn acquire_handoff<K: Kernel>(&self) {
        while self
            .handoff
            .compare_exchange_weak(HANDOFF_FREE, HANDOFF_HELD, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            let _ = K::yield_to(None);
        }
    }

    pub(crate) fn release_handoff(&self) {
        self.handoff.store(HANDOFF_FREE, Ordering::Release);
    }

    /// The handoff word, for [`Kernel::release_and_terminate`].
    pub(crate) fn handoff_word(&self) -> *const AtomicU32 {
        &self.handoff
    }

    /// Exit state access.
    ///
    /// # Safety
    ///
    /// The caller must hold the handoff word.
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn exit_state(&self) -> &mut ExitState {
        unsafe { &mut *self.exit.get() }
    }

    /// Lets the recorded joiner past [`Tcb::wait_released`].
    pub(crate) fn release_joiner(&self) {
        self.join.store(JOIN_RELEASED, Ordering::Release);
    }

    /// Blocks the joiner until the exiting thread has published its exit value.
    pub(crate) fn wait_released<K: Kernel>(&self) {
        while self.join.load(Ordering::Acquire) != JOIN_RELEASED {
            if let Err(err) = K::block_self(&self.join) {
                fatal(
                    "JOIN_BLOCK",
                    format_args!("blocking on a join handoff failed: {err}"),
                );
            }
        }
    }
}
