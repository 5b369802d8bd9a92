//! Hosted reference kernel
//!
//! [`Hosted`] implements the [`Kernel`] contract with `std` threads so the runtime can be
//! exercised on a development machine:
//!
//! - Every thread that touches the kernel gets a kernel id and a parker (a `std` mutex and
//!   condition variable) the first time it asks for its id. Threads created through
//!   [`Kernel::spawn`] get theirs before they start running. The parker is dropped from the
//!   kernel's table when the thread exits.
//! - [`Kernel::block_self`] checks the handoff word under the parker lock, so a waker that stores
//!   the word before calling [`Kernel::wake`] can never be missed.
//! - Memory is backed by address space reserved through [`Hosted::reserve`]. Mapping zero-fills
//!   the range, unmapping poisons it.
//! - Termination unwinds the calling thread with a private payload that is caught at the root of
//!   every spawned thread. A spawned thread that panics for any other reason aborts the process,
//!   the same way a fatal usage error does on the target.
//!
//! Spawned threads run on their own `std` stacks; the stack top passed to `spawn` only has to be
//! non-null. Calling [`Kernel::terminate_self`] from a thread that was not spawned by this kernel
//! unwinds into the caller's own panic machinery.

use core::{
    ffi::c_void,
    ptr::{self, NonNull},
    sync::atomic::{AtomicU32, Ordering},
};
use std::{
    alloc::{Layout, alloc},
    boxed::Box,
    cell::OnceCell,
    collections::BTreeMap,
    format,
    panic::{self, AssertUnwindSafe},
    process,
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
    thread,
    vec::Vec,
};

use crate::{
    kernel::Kernel,
    mem::{MapError, PAGE_SIZE, UnmapError},
    sync::{BlockError, FLAG_BLOCK, WakeError},
    thread::{KernelId, SpawnError, ThreadEntry, YieldError},
};

/// Byte pattern written over unmapped pages.
const POISON: u8 = 0xA5;

/// The std-backed kernel.
#[derive(Debug, Clone, Copy, Default)]
pub struct Hosted;

/// Next kernel id to hand out. Zero is reserved.
static NEXT_ID: AtomicU32 = AtomicU32::new(1);

static PARKERS: Mutex<BTreeMap<u32, Arc<Parker>>> = Mutex::new(BTreeMap::new());

static ADDRESS_SPACE: Mutex<AddressSpace> = Mutex::new(AddressSpace {
    reservations: Vec::new(),
    mappings: BTreeMap::new(),
});

std::thread_local! {
    static CURRENT: OnceCell<Registration> = const { OnceCell::new() };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParkState {
    Running,
    Blocked,
    Exited,
}

#[derive(Debug)]
struct Parker {
    state: Mutex<ParkState>,
    cv: Condvar,
}

/// The calling thread's kernel identity, retired when the thread-local is destroyed.
struct Registration {
    id: KernelId,
    parker: Arc<Parker>,
}

impl Drop for Registration {
    fn drop(&mut self) {
        retire(self.id, &self.parker);
    }
}

/// Reserved `(base, len)` ranges and the `base -> len` mappings inside them.
struct AddressSpace {
    reservations: Vec<(usize, usize)>,
    mappings: BTreeMap<usize, usize>,
}

/// Payload carried by the unwind that terminates a hosted thread.
struct HostedExit(#[allow(dead_code)] i32);

struct SendPtr(*mut c_void);

// SAFETY: the pointer is handed to the spawned thread's entry function, whose caller vouched for it.
unsafe impl Send for SendPtr {}

impl SendPtr {
    fn into_inner(self) -> *mut c_void {
        self.0
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn register() -> (KernelId, Arc<Parker>) {
    let raw = loop {
        let raw = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        if raw != KernelId::NONE_RAW {
            break raw;
        }
    };
    let id = KernelId::from_raw_unchecked(raw);
    let parker = Arc::new(Parker {
        state: Mutex::new(ParkState::Running),
        cv: Condvar::new(),
    });
    lock(&PARKERS).insert(raw, parker.clone());
    (id, parker)
}

/// Marks `id` exited and forgets its parker. Later wakes and yields see an invalid thread.
fn retire(id: KernelId, parker: &Parker) {
    *lock(&parker.state) = ParkState::Exited;
    lock(&PARKERS).remove(&id.to_raw());
}

fn current() -> (KernelId, Arc<Parker>) {
    CURRENT.with(|cell| {
        let registration = cell.get_or_init(|| {
            let (id, parker) = register();
            Registration { id, parker }
        });
        (registration.id, registration.parker.clone())
    })
}

fn parker_of(thread: KernelId) -> Option<Arc<Parker>> {
    lock(&PARKERS).get(&thread.to_raw()).cloned()
}

impl Hosted {
    /// Reserves `len` bytes (rounded up to whole pages) of address space for
    /// [`Kernel::map_pages`], returning the top of the reservation.
    ///
    /// Every reservation is preceded by an unreserved guard page, so a region growing down past
    /// its reservation fails to map instead of running into a neighbour. Reservations are never
    /// released.
    pub fn reserve(len: usize) -> Option<NonNull<c_void>> {
        let len = len.checked_next_multiple_of(PAGE_SIZE)?;
        if len == 0 {
            return None;
        }

        let layout = Layout::from_size_align(len.checked_add(PAGE_SIZE)?, PAGE_SIZE).ok()?;
        let guard = NonNull::new(unsafe { alloc(layout) })?;
        // SAFETY: both offsets stay inside (or one past the end of) the allocation
        let (base, top) = unsafe { (guard.add(PAGE_SIZE), guard.add(PAGE_SIZE + len)) };
        lock(&ADDRESS_SPACE)
            .reservations
            .push((base.as_ptr() as usize, len));

        Some(top.cast())
    }

    /// Returns whether `thread` has a kernel id and has not exited yet.
    pub fn is_live(thread: KernelId) -> bool {
        parker_of(thread).is_some()
    }

    /// Returns whether `addr` currently lies inside a mapped range.
    pub fn is_mapped(addr: *const c_void) -> bool {
        let addr = addr as usize;
        lock(&ADDRESS_SPACE)
            .mappings
            .range(..=addr)
            .next_back()
            .is_some_and(|(&base, &len)| addr < base + len)
    }
}

impl Kernel for Hosted {
    fn current_thread_id() -> KernelId {
        current().0
    }

    fn block_self(flag: &AtomicU32) -> Result<(), BlockError> {
        let (_, parker) = current();
        let mut state = lock(&parker.state);
        if flag.load(Ordering::Acquire) != FLAG_BLOCK {
            return Ok(());
        }

        *state = ParkState::Blocked;
        while *state == ParkState::Blocked {
            state = parker
                .cv
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        Ok(())
    }

    fn wake(thread: KernelId) -> Result<(), WakeError> {
        let parker = parker_of(thread).ok_or(WakeError::InvalidThread)?;
        let mut state = lock(&parker.state);
        match *state {
            ParkState::Blocked => {
                *state = ParkState::Running;
                parker.cv.notify_one();
                Ok(())
            }
            ParkState::Running => Err(WakeError::NotBlocked),
            ParkState::Exited => Err(WakeError::InvalidThread),
        }
    }

    fn yield_to(thread: Option<KernelId>) -> Result<(), YieldError> {
        if let Some(thread) = thread {
            let parker = parker_of(thread).ok_or(YieldError::InvalidThread)?;
            match *lock(&parker.state) {
                ParkState::Running => {}
                ParkState::Blocked => return Err(YieldError::NotRunnable),
                ParkState::Exited => return Err(YieldError::InvalidThread),
            }
        }
        thread::yield_now();
        Ok(())
    }

    unsafe fn spawn(
        entry: ThreadEntry,
        arg: *mut c_void,
        _stack_top: NonNull<c_void>,
    ) -> Result<KernelId, SpawnError> {
        let (id, parker) = register();
        let arg = SendPtr(arg);

        let spawned = thread::Builder::new()
            .name(format!("hosted-{}", id.to_raw()))
            .spawn(move || {
                let arg = arg.into_inner();
                CURRENT.with(|cell| {
                    let _ = cell.set(Registration {
                        id,
                        parker: parker.clone(),
                    });
                });

                // SAFETY: the spawner vouched for `entry` and `arg`
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| unsafe { entry(arg) }));
                retire(id, &parker);

                if let Err(payload) = outcome {
                    if !payload.is::<HostedExit>() {
                        log::error!("hosted thread {id} panicked, aborting");
                        process::abort();
                    }
                }
            });

        match spawned {
            Ok(_) => Ok(id),
            Err(_) => {
                lock(&PARKERS).remove(&id.to_raw());
                Err(SpawnError::OutOfResources)
            }
        }
    }

    unsafe fn map_pages(base: NonNull<c_void>, len: usize) -> Result<(), MapError> {
        let addr = base.as_ptr() as usize;
        if addr % PAGE_SIZE != 0 || len == 0 || len % PAGE_SIZE != 0 {
            return Err(MapError::InvalidRange);
        }
        let end = addr.checked_add(len).ok_or(MapError::InvalidRange)?;

        let mut space = lock(&ADDRESS_SPACE);
        if !space
            .reservations
            .iter()
            .any(|&(res_base, res_len)| addr >= res_base && end <= res_base + res_len)
        {
            return Err(MapError::OutOfMemory);
        }
        if space
            .mappings
            .range(..end)
            .next_back()
            .is_some_and(|(&map_base, &map_len)| map_base + map_len > addr)
        {
            return Err(MapError::AlreadyMapped);
        }

        space.mappings.insert(addr, len);
        // SAFETY: the range lies inside a reservation and was not mapped by anyone
        unsafe { ptr::write_bytes(base.as_ptr().cast::<u8>(), 0, len) };
        Ok(())
    }

    unsafe fn unmap_pages(base: NonNull<c_void>) -> Result<(), UnmapError> {
        let len = lock(&ADDRESS_SPACE)
            .mappings
            .remove(&(base.as_ptr() as usize))
            .ok_or(UnmapError::NotMapped)?;

        // SAFETY: the caller guarantees nothing references the range any more
        unsafe { ptr::write_bytes(base.as_ptr().cast::<u8>(), POISON, len) };
        Ok(())
    }

    fn terminate_self(status: i32) -> ! {
        panic::resume_unwind(Box::new(HostedExit(status)))
    }

    unsafe fn release_and_terminate(flag: *const AtomicU32, status: i32) -> ! {
        // SAFETY: the caller guarantees `flag` is live; this thread runs on a std stack, so the
        // unwind below never touches memory a peer may reclaim.
        unsafe { (*flag).store(0, Ordering::Release) };
        Self::terminate_self(status)
    }
}
