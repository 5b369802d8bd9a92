//! Joining a thread

use core::ffi::c_void;

use thr_sys::{Kernel, debug::fatal};
use thr_sys_mem::Block;

use super::Runtime;
use crate::registry::{Claim, ThreadId};

impl<K: Kernel> Runtime<K> {
    /// Waits for `target` to exit and returns its exit value.
    ///
    /// The target is removed from the registry and its block returned to the allocator, so
    /// `target` is invalid once this returns. Joining an unknown thread, the calling thread
    /// itself, or a thread another thread is already joining is a fatal error.
    pub fn join(&self, target: ThreadId) -> *mut c_void {
        let me = K::current_thread_id();

        let claim = self.registry.lock().claim_join(target, me);
        let (tcb_ptr, kernel_id) = match claim {
            Claim::Claimed { tcb, kernel_id } => (tcb, kernel_id),
            Claim::Unknown => fatal(
                "JOIN_UNKNOWN_THREAD",
                format_args!("join of unknown thread {target}"),
            ),
            Claim::AlreadyClaimed(joiner) => fatal(
                "JOIN_ALREADY_WAITING",
                format_args!("{target} is already being joined by {joiner}"),
            ),
        };
        if kernel_id == me {
            fatal("JOIN_SELF", format_args!("{target} joined itself"));
        }

        // SAFETY: the block is only freed by its single joiner, which the claim made us
        let tcb = unsafe { tcb_ptr.as_ref() };

        tcb.acquire_handoff::<K>();
        // SAFETY: the handoff word is held
        let finished = unsafe { tcb.exit_state() }.done;
        if !finished {
            // SAFETY: the handoff word is held
            unsafe { tcb.exit_state() }.waiter = Some(me);
            tcb.release_handoff();

            log::trace!("Thread {me} waiting on {target}");
            tcb.wait_released::<K>();

            // The exiting thread keeps the handoff word until it can no longer touch its stack
            tcb.acquire_handoff::<K>();
        }
        // SAFETY: the handoff word is held
        let value = unsafe { tcb.exit_state() }.value;

        self.registry.lock().remove(target);
        // SAFETY: the thread has terminated and the registry no longer references its TCB
        if let Err(err) = unsafe { self.allocator.free(Block::from_base(tcb_ptr.cast())) } {
            log::warn!("Reclaiming the block of {target} failed: {err}");
        }

        log::trace!("Joined thread {target} ({kernel_id})");
        value
    }
}
