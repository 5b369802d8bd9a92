//! The thread runtime
//!
//! A [`Runtime`] owns the block allocator and the thread registry. The thread that calls
//! [`Runtime::init`] becomes the first registered thread; every other thread is started with
//! [`Runtime::create`] (or [`Runtime::spawn`]) and must eventually be joined to reclaim its block.
//!
//! Threads started by the runtime hold a reference to it for their whole life, so the creating
//! operations take `&'static self`. A runtime is usually stored in a `static` or leaked.

use core::{ffi::c_void, ptr::NonNull};

use thr_std_sync::Mutex;
use thr_sys::{Kernel, KernelId, debug::fatal};
use thr_sys_mem::{
    AllocError, AllocatorConfig, BlockLayout, LayoutError, PageAllocator, ReclaimPolicy,
};

use crate::{
    registry::{Registry, ThreadId},
    tcb::Tcb,
};

mod create;
mod exit;
mod join;

/// A thread body: receives the argument given to [`Runtime::create`] and returns the exit value
/// handed to the joiner.
pub type ThreadFunc = fn(arg: *mut c_void) -> *mut c_void;

/// Stack size used when [`RuntimeConfig::with_stack_size`] is not called.
pub const DEFAULT_STACK_SIZE: usize = 0x4000;

/// Runtime configuration
#[derive(Debug, Clone, Copy)]
pub struct RuntimeConfig {
    stack_size: usize,
    region_top: NonNull<c_void>,
    region_len: usize,
    reclaim: ReclaimPolicy,
}

impl RuntimeConfig {
    /// Configures a runtime whose thread blocks are carved downward from `region_top`, using at
    /// most `region_len` bytes.
    pub const fn new(region_top: NonNull<c_void>, region_len: usize) -> Self {
        Self {
            stack_size: DEFAULT_STACK_SIZE,
            region_top,
            region_len,
            reclaim: ReclaimPolicy::Unmap,
        }
    }

    /// Sets the size of every thread stack. Must be a non-zero multiple of the machine word.
    pub const fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = stack_size;
        self
    }

    /// Sets what happens to the block of a joined thread.
    pub const fn with_reclaim(mut self, reclaim: ReclaimPolicy) -> Self {
        self.reclaim = reclaim;
        self
    }

    pub const fn stack_size(&self) -> usize {
        self.stack_size
    }
}

/// A snapshot of one registered thread, as passed to [`Runtime::for_each`].
#[derive(Debug, Clone, Copy)]
pub struct ThreadInfo {
    pub id: ThreadId,
    pub kernel_id: KernelId,
    /// Kernel id of the thread that created this one (its own id for the initial thread).
    pub creator: KernelId,
    pub stack_top: NonNull<c_void>,
    pub exception_stack_top: NonNull<c_void>,
}

/// A user-space thread runtime on top of the kernel `K`.
pub struct Runtime<K: Kernel> {
    allocator: PageAllocator<K>,
    registry: Mutex<K, Registry>,
}

impl<K: Kernel> Runtime<K> {
    /// Initialises the runtime and registers the calling thread as its first thread.
    ///
    /// # Errors
    ///
    /// Fails with [`InitError::InvalidStackSize`] unless the configured stack size is a non-zero
    /// multiple of the machine word, and with [`InitError::Alloc`] if the first block cannot be
    /// mapped.
    pub fn init(config: RuntimeConfig) -> Result<Self, InitError> {
        let layout = BlockLayout::new(size_of::<Tcb>(), config.stack_size).map_err(|err| {
            match err {
                LayoutError::InvalidStackSize(size) => InitError::InvalidStackSize(size),
                err => InitError::Layout(err),
            }
        })?;
        let allocator = PageAllocator::new(AllocatorConfig {
            layout,
            region_top: config.region_top,
            region_len: config.region_len,
            reclaim: config.reclaim,
        })?;

        let me = K::current_thread_id();
        let block = allocator.allocate()?;
        let base = block.base();
        let tcb = base.cast::<Tcb>();
        // SAFETY: the block is freshly mapped, page aligned and at least `size_of::<Tcb>()` long
        unsafe {
            tcb.write(Tcb::new(
                layout.stack_top(base),
                layout.exception_stack_top(base),
                me,
                None,
            ));
        }

        let mut registry = Registry::new();
        let id = registry.insert(tcb, me);

        log::debug!(
            "Thread runtime initialised: {id} on {me}, block {:#x} bytes at {block:p}",
            layout.block_size()
        );

        Ok(Self {
            allocator,
            registry: Mutex::new(registry),
        })
    }

    /// Returns the identifier of the calling thread.
    ///
    /// Calling this from a thread the runtime does not manage is a fatal error.
    pub fn get_self_id(&self) -> ThreadId {
        let me = K::current_thread_id();
        match self.registry.lock().find_by_kernel(me) {
            Some((id, _)) => id,
            None => fatal(
                "SELF_UNMANAGED_THREAD",
                format_args!("{me} is not managed by this runtime"),
            ),
        }
    }

    /// Yields the processor to `target`, or to any runnable thread if `None`.
    ///
    /// # Errors
    ///
    /// Fails with [`YieldError::UnknownThread`] if `target` is not registered, and with
    /// [`YieldError::Kernel`] if the kernel refuses the yield.
    pub fn yield_to(&self, target: Option<ThreadId>) -> Result<(), YieldError> {
        let kernel_id = match target {
            Some(id) => Some(self.kernel_id_of(id).ok_or(YieldError::UnknownThread(id))?),
            None => None,
        };
        K::yield_to(kernel_id)?;
        Ok(())
    }

    /// Translates a thread identifier to the kernel id of the thread.
    pub fn kernel_id_of(&self, id: ThreadId) -> Option<KernelId> {
        self.registry.lock().get(id).map(|entry| entry.kernel_id)
    }

    /// Number of registered threads, including exited threads not yet joined.
    pub fn thread_count(&self) -> usize {
        self.registry.lock().len()
    }

    /// Calls `f` for every registered thread, in registry order.
    ///
    /// The registry is locked for the whole walk: `f` must not call back into the runtime.
    pub fn for_each(&self, mut f: impl FnMut(&ThreadInfo)) {
        let registry = self.registry.lock();
        for (id, entry) in registry.iter() {
            // SAFETY: registered TCBs stay mapped until removed, which needs the registry lock;
            // the fields read here never change after creation.
            let tcb = unsafe { entry.tcb.as_ref() };
            f(&ThreadInfo {
                id,
                kernel_id: entry.kernel_id,
                creator: tcb.creator,
                stack_top: tcb.stack_top,
                exception_stack_top: tcb.exception_stack_top,
            });
        }
    }

    /// Returns the geometry of the thread blocks.
    pub fn layout(&self) -> &BlockLayout {
        self.allocator.layout()
    }
}

/// Error type for [`Runtime::init`]
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    /// The stack size is zero or not a multiple of the machine word.
    #[error("Invalid thread stack size: {0:#x}")]
    InvalidStackSize(usize),
    /// The block geometry cannot be computed.
    #[error(transparent)]
    Layout(LayoutError),
    /// The allocator rejected the region or could not map the first block.
    #[error("Allocating the initial thread block failed: {0}")]
    Alloc(#[from] AllocError),
}

/// Error type for [`Runtime::create`]
#[derive(Debug, thiserror::Error)]
pub enum CreateError {
    /// No block could be allocated for the new thread.
    #[error("Allocating a thread block failed: {0}")]
    Alloc(#[from] AllocError),
    /// The kernel could not start the new thread.
    #[error("Spawning the kernel thread failed: {0}")]
    Spawn(#[from] thr_sys::thread::SpawnError),
}

/// Error type for [`Runtime::yield_to`]
#[derive(Debug, thiserror::Error)]
pub enum YieldError {
    /// The target is not a registered thread.
    #[error("Unknown thread {0}")]
    UnknownThread(ThreadId),
    /// The kernel refused the yield.
    #[error(transparent)]
    Kernel(#[from] thr_sys::thread::YieldError),
}
