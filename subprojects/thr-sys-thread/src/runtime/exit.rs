//! Thread exit
//!
//! The exiting thread publishes its exit value under its TCB's handoff word, wakes the joiner if
//! one is waiting, and then releases the handoff word and terminates in a single kernel call. The
//! joiner reclaims the block (stack included) as soon as it takes the handoff word, so nothing
//! may run on this thread's stack after the release.

use core::ffi::c_void;

use thr_sys::{Kernel, KernelId, debug::fatal, sync::WakeError};

use super::Runtime;

/// Wake attempts made for a joiner that has not blocked yet.
const WAKE_RETRY_LIMIT: u32 = 64;

impl<K: Kernel> Runtime<K> {
    /// Terminates the calling thread with exit value `value`.
    ///
    /// Calling this from a thread the runtime does not manage is a fatal error.
    pub fn exit(&self, value: *mut c_void) -> ! {
        let me = K::current_thread_id();
        let found = self
            .registry
            .lock()
            .find_by_kernel(me)
            .map(|(id, entry)| (id, entry.tcb));
        let Some((id, tcb)) = found else {
            fatal(
                "EXIT_UNMANAGED_THREAD",
                format_args!("{me} is not managed by this runtime"),
            );
        };
        // SAFETY: the TCB cannot be reclaimed before we release its handoff word below
        let tcb = unsafe { tcb.as_ref() };

        tcb.acquire_handoff::<K>();
        // SAFETY: the handoff word is held
        let state = unsafe { tcb.exit_state() };
        state.value = value;
        state.done = true;
        if let Some(waiter) = state.waiter {
            tcb.release_joiner();
            wake_joiner::<K>(waiter);
        }

        log::trace!("Thread {id} exiting");
        // SAFETY: the handoff word lives in our TCB, which stays mapped until the joiner takes
        // the word after this release
        unsafe { K::release_and_terminate(tcb.handoff_word(), 0) }
    }
}

/// Wakes a joiner, retrying while it has not blocked yet.
///
/// Giving up is harmless: the joiner re-checks its join word before every block.
fn wake_joiner<K: Kernel>(waiter: KernelId) {
    for _ in 0..WAKE_RETRY_LIMIT {
        match K::wake(waiter) {
            Ok(()) => return,
            Err(WakeError::NotBlocked) => {
                if K::yield_to(Some(waiter)).is_err() {
                    let _ = K::yield_to(None);
                }
            }
            Err(err) => {
                log::warn!("Waking joiner {waiter} failed: {err}");
                return;
            }
        }
    }
    log::trace!("Joiner {waiter} never blocked, leaving it to its join word");
}
