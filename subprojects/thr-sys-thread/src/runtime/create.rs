//! Thread creation

use alloc::boxed::Box;
use core::{ffi::c_void, ptr::NonNull};

use thr_sys::Kernel;
use thr_sys_mem::alignment::STACK_ALIGN;

use super::{CreateError, Runtime, ThreadFunc};
use crate::{registry::ThreadId, tcb::Tcb};

/// Start-up arguments, written at the top of the new thread's stack.
struct EntryArgs<K: Kernel> {
    runtime: *const Runtime<K>,
    tcb: NonNull<Tcb>,
}

type BoxedBody = Box<dyn FnOnce() -> *mut c_void + Send + 'static>;

impl<K: Kernel> Runtime<K> {
    /// Starts a new thread running `func(arg)`.
    ///
    /// The thread's exit value is the return value of `func`, or the value passed to
    /// [`Runtime::exit`]. It must be joined with [`Runtime::join`] to reclaim its block.
    ///
    /// # Errors
    ///
    /// Fails with [`CreateError::Alloc`] if no block is available and with
    /// [`CreateError::Spawn`] if the kernel cannot start the thread. Nothing is leaked in either
    /// case.
    pub fn create(&'static self, func: ThreadFunc, arg: *mut c_void) -> Result<ThreadId, CreateError> {
        let me = K::current_thread_id();
        let layout = *self.allocator.layout();

        let block = self.allocator.allocate()?;
        let base = block.base();
        let stack_top = layout.stack_top(base);
        let tcb = base.cast::<Tcb>();
        // SAFETY: the block is freshly mapped, page aligned and at least `size_of::<Tcb>()` long
        unsafe {
            tcb.write(Tcb::new(
                stack_top,
                layout.exception_stack_top(base),
                me,
                Some((func, arg)),
            ));
        }

        // The entry arguments occupy the topmost bytes of the new stack
        let args_size = size_of::<EntryArgs<K>>().next_multiple_of(STACK_ALIGN);
        // SAFETY: the stack region is far larger than the entry arguments
        let args = unsafe { stack_top.byte_sub(args_size) }.cast::<EntryArgs<K>>();
        // SAFETY: `args` lies inside the mapped stack and is suitably aligned
        unsafe {
            args.write(EntryArgs {
                runtime: self,
                tcb,
            });
        }

        // SAFETY: the new stack belongs to the block, which stays mapped until the thread is joined
        let spawned = unsafe { K::spawn(entry_trampoline::<K>, args.as_ptr().cast(), args.cast()) };
        let kernel_id = match spawned {
            Ok(kernel_id) => kernel_id,
            Err(err) => {
                // SAFETY: no thread ever started on this block
                if let Err(free_err) = unsafe { self.allocator.free(block) } {
                    log::warn!("Releasing the block of an unstarted thread failed: {free_err}");
                }
                return Err(err.into());
            }
        };
        // The child spins in `entry_trampoline` until this entry appears
        let id = self.registry.lock().insert(tcb, kernel_id);

        log::trace!("Created thread {id} ({kernel_id}) at {block:p}");
        Ok(id)
    }

    /// Starts a new thread running the closure `body`.
    ///
    /// # Errors
    ///
    /// Same as [`Runtime::create`]. On failure `body` is dropped without running.
    pub fn spawn<F>(&'static self, body: F) -> Result<ThreadId, CreateError>
    where
        F: FnOnce() -> *mut c_void + Send + 'static,
    {
        let body: Box<BoxedBody> = Box::new(Box::new(body));
        let arg = Box::into_raw(body).cast::<c_void>();

        self.create(run_boxed, arg).inspect_err(|_| {
            // SAFETY: `arg` came from `Box::into_raw` above and no thread took ownership of it
            drop(unsafe { Box::from_raw(arg.cast::<BoxedBody>()) });
        })
    }
}

fn run_boxed(arg: *mut c_void) -> *mut c_void {
    // SAFETY: `spawn` passes a pointer produced by `Box::into_raw` and hands ownership to us
    let body = unsafe { Box::from_raw(arg.cast::<BoxedBody>()) };
    body()
}

/// First frame of every runtime-created thread.
///
/// Waits until the creator has registered the thread, runs its body and exits with the result.
unsafe extern "C-unwind" fn entry_trampoline<K: Kernel>(arg: *mut c_void) {
    // SAFETY: `create` wrote the entry arguments at `arg` before spawning us
    let EntryArgs { runtime, tcb } = unsafe { arg.cast::<EntryArgs<K>>().read() };
    // SAFETY: `create` takes `&'static self`
    let runtime = unsafe { &*runtime };
    // SAFETY: the TCB stays mapped until this thread has exited and been joined
    let tcb = unsafe { tcb.as_ref() };

    let me = K::current_thread_id();
    while runtime.registry.lock().find_by_kernel(me).is_none() {
        if K::yield_to(Some(tcb.creator)).is_err() {
            let _ = K::yield_to(None);
        }
    }

    let value = match tcb.entry {
        Some((func, arg)) => func(arg),
        None => core::ptr::null_mut(),
    };
    runtime.exit(value)
}
