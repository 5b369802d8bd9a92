//! The kernel contract

use core::{ffi::c_void, ptr::NonNull, sync::atomic::AtomicU32};

use crate::{
    mem::{MapError, UnmapError},
    sync::{BlockError, WakeError},
    thread::{KernelId, SpawnError, ThreadEntry, YieldError},
};

/// The kernel services the threading runtime is built on.
///
/// All functions are associated functions: implementors are zero-sized marker types and the
/// primitives carry them as a `PhantomData` type parameter.
pub trait Kernel: 'static {
    /// Returns the kernel id of the calling thread.
    fn current_thread_id() -> KernelId;

    /// Suspends the calling thread unless `*flag` is non-zero.
    ///
    /// The check of `flag` and the suspension are atomic with respect to [`Kernel::wake`]: a peer
    /// that stores a non-zero value into `flag` and then calls `wake` on this thread can never
    /// leave it suspended.
    ///
    /// The call may return without the flag being set (a late wake meant for an earlier wait);
    /// callers must re-check the flag in a loop.
    fn block_self(flag: &AtomicU32) -> Result<(), BlockError>;

    /// Marks a blocked thread runnable.
    ///
    /// Fails with [`WakeError::NotBlocked`] when the target is not currently blocked.
    fn wake(thread: KernelId) -> Result<(), WakeError>;

    /// Yields the processor, to `thread` if given or to any runnable thread otherwise.
    fn yield_to(thread: Option<KernelId>) -> Result<(), YieldError>;

    /// Spawns a new thread of execution sharing the caller's address space.
    ///
    /// The new thread starts executing `entry(arg)` with its stack pointer set to `stack_top`.
    ///
    /// # Safety
    ///
    /// `stack_top` must be the 16-byte aligned top of a mapped stack region that stays mapped
    /// and otherwise unused for as long as the new thread runs. `arg` must be valid for whatever
    /// `entry` does with it.
    unsafe fn spawn(
        entry: ThreadEntry,
        arg: *mut c_void,
        stack_top: NonNull<c_void>,
    ) -> Result<KernelId, SpawnError>;

    /// Maps `len` bytes of fresh, zero-filled memory at `base`.
    ///
    /// # Safety
    ///
    /// `base` must be page aligned and `len` a non-zero multiple of the page size. The range must
    /// belong to the region the caller manages.
    unsafe fn map_pages(base: NonNull<c_void>, len: usize) -> Result<(), MapError>;

    /// Unmaps the range previously mapped at `base`.
    ///
    /// # Safety
    ///
    /// No live reference may point into the range once this returns.
    unsafe fn unmap_pages(base: NonNull<c_void>) -> Result<(), UnmapError>;

    /// Terminates the calling thread with `status`.
    fn terminate_self(status: i32) -> !;

    /// Stores `0` into `*flag` and terminates the calling thread, as one step.
    ///
    /// No ordinary call touching the caller's stack happens after the store: a peer spinning on
    /// `flag` may reclaim the caller's stack the instant it observes the release.
    ///
    /// # Safety
    ///
    /// `flag` must point to a live `AtomicU32` that outlives the store.
    unsafe fn release_and_terminate(flag: *const AtomicU32, status: i32) -> !;
}
