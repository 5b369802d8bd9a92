//! LIFO page allocator for thread blocks
//!
//! The allocator manages a region of address space that grows *downward* from a fixed top
//! address, one block at a time. Freed blocks are pushed onto a LIFO free list and handed out
//! again before the region is extended, so a block freed and immediately re-allocated comes back
//! at the same address.
//!
//! Depending on the [`ReclaimPolicy`], a freed block is either unmapped (any stale access faults)
//! or zeroed in place. An unmapped block is mapped again when it is reused.
//!
//! All state lives behind the allocator's own mutex. Besides the thread runtime, the
//! exception/fault collaborator uses [`PageAllocator::allocate`] and [`PageAllocator::free`]
//! directly when it grows a stack or tears down a faulted thread.

use alloc::{collections::TryReserveError, vec::Vec};
use core::{ffi::c_void, fmt, ptr, ptr::NonNull};

use thr_std_sync::Mutex;
use thr_sys::{
    Kernel,
    mem::{MapError, UnmapError},
};

use crate::{
    alignment::{is_page_aligned, pages_needed},
    layout::BlockLayout,
};

/// Initial free-list capacity: one page worth of block addresses.
const INITIAL_FREE_SLOTS: usize = 0x1000 / size_of::<Block>();

/// What happens to the pages of a freed block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReclaimPolicy {
    /// Unmap the pages; they are mapped again on reuse.
    #[default]
    Unmap,
    /// Keep the pages mapped and zero them.
    Zero,
}

/// Allocator configuration
#[derive(Debug, Clone, Copy)]
pub struct AllocatorConfig {
    /// Geometry of every block.
    pub layout: BlockLayout,
    /// Page-aligned top of the managed region. The region grows down from here.
    pub region_top: NonNull<c_void>,
    /// Maximum number of bytes the region may grow to.
    pub region_len: usize,
    /// Policy applied to freed blocks.
    pub reclaim: ReclaimPolicy,
}

/// The base address of a thread block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct Block(NonNull<c_void>);

// SAFETY: a block address is plain data; access to the memory behind it is arbitrated by its
// single owner (the allocator while free, the thread runtime while allocated).
unsafe impl Send for Block {}

impl Block {
    /// Wraps a block base address, e.g. one recovered from a control block pointer.
    pub const fn from_base(base: NonNull<c_void>) -> Self {
        Self(base)
    }

    /// Returns the page-aligned base address of the block.
    pub const fn base(self) -> NonNull<c_void> {
        self.0
    }
}

impl fmt::Pointer for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Pointer::fmt(&self.0, f)
    }
}

/// A snapshot of the allocator's bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocStats {
    /// Blocks currently handed out.
    pub live_blocks: usize,
    /// Blocks waiting on the free list.
    pub free_blocks: usize,
    /// Pages carved out of the region so far.
    pub region_pages: usize,
}

struct AllocState {
    /// Bytes carved out of the region below `region_top`.
    extended: usize,
    live: usize,
    free: Vec<Block>,
}

/// Page-grained allocator of fixed-size thread blocks.
pub struct PageAllocator<K: Kernel> {
    layout: BlockLayout,
    region_top: NonNull<c_void>,
    region_len: usize,
    reclaim: ReclaimPolicy,
    state: Mutex<K, AllocState>,
}

// SAFETY: `region_top` is only used for address arithmetic; mutable state is behind `state`.
unsafe impl<K: Kernel> Send for PageAllocator<K> {}
// SAFETY: `region_top` is only used for address arithmetic; mutable state is behind `state`.
unsafe impl<K: Kernel> Sync for PageAllocator<K> {}

impl<K: Kernel> PageAllocator<K> {
    /// Creates an allocator managing the region described by `config`. No memory is mapped
    /// until the first [`PageAllocator::allocate`].
    ///
    /// # Errors
    ///
    /// Fails with [`AllocError::MisalignedRegion`] if the region top is not page aligned.
    pub fn new(config: AllocatorConfig) -> Result<Self, AllocError> {
        if !is_page_aligned(config.region_top.as_ptr() as usize) {
            return Err(AllocError::MisalignedRegion);
        }

        Ok(Self {
            layout: config.layout,
            region_top: config.region_top,
            region_len: config.region_len,
            reclaim: config.reclaim,
            state: Mutex::new(AllocState {
                extended: 0,
                live: 0,
                free: Vec::new(),
            }),
        })
    }

    /// Returns the geometry of the blocks this allocator hands out.
    pub fn layout(&self) -> &BlockLayout {
        &self.layout
    }

    /// Allocates one mapped, zero-filled block.
    ///
    /// The most recently freed block is reused first; otherwise the region is extended downward
    /// by one block.
    ///
    /// # Errors
    ///
    /// A failed mapping leaves the allocator exactly as it was and is reported as
    /// [`AllocError::Map`]. [`AllocError::RegionExhausted`] is returned once the region cannot
    /// grow any further.
    pub fn allocate(&self) -> Result<Block, AllocError> {
        let block_size = self.layout.block_size();
        let mut state = self.state.lock();

        if let Some(block) = state.free.pop() {
            if self.reclaim == ReclaimPolicy::Unmap {
                // SAFETY: the block lies inside the managed region and is not mapped
                if let Err(err) = unsafe { K::map_pages(block.base(), block_size) } {
                    state.free.push(block);
                    return Err(AllocError::Map(err));
                }
            }
            state.live += 1;
            log::trace!("reusing thread block {block:p}");
            return Ok(block);
        }

        let extended = state
            .extended
            .checked_add(block_size)
            .filter(|&extended| extended <= self.region_len)
            .ok_or(AllocError::RegionExhausted)?;
        let base = NonNull::new(self.region_top.as_ptr().wrapping_byte_sub(extended))
            .ok_or(AllocError::RegionExhausted)?;

        // SAFETY: the range lies inside the managed region, below every block handed out so far
        unsafe { K::map_pages(base, block_size) }?;

        state.extended = extended;
        state.live += 1;
        log::debug!("extended thread block region to {extended:#x} bytes");
        Ok(Block(base))
    }

    /// Returns a block to the allocator.
    ///
    /// # Errors
    ///
    /// Blocks this allocator never handed out, or that are already free, are rejected with
    /// [`FreeError::Foreign`] and [`FreeError::DoubleFree`]. If the free list cannot grow, the
    /// block stays mapped and [`FreeError::FreeListGrowth`] is returned.
    ///
    /// # Safety
    ///
    /// Nothing may access the block's memory once this is called.
    pub unsafe fn free(&self, block: Block) -> Result<(), FreeError> {
        let block_size = self.layout.block_size();
        let mut state = self.state.lock();

        if !self.owns(&state, block) {
            return Err(FreeError::Foreign);
        }
        if state.free.contains(&block) {
            return Err(FreeError::DoubleFree);
        }

        // Grow the free list before giving up the pages, so a failure leaves the block intact
        if state.free.len() == state.free.capacity() {
            let additional = state.free.capacity().max(INITIAL_FREE_SLOTS);
            state.free.try_reserve_exact(additional)?;
            log::debug!("free block list grown to {} slots", state.free.capacity());
        }

        match self.reclaim {
            // SAFETY: the caller guarantees the block is no longer accessed
            ReclaimPolicy::Unmap => unsafe { K::unmap_pages(block.base()) }?,
            // SAFETY: the caller guarantees the block is no longer accessed; it stays mapped
            ReclaimPolicy::Zero => unsafe {
                ptr::write_bytes(block.base().as_ptr().cast::<u8>(), 0, block_size)
            },
        }

        state.free.push(block);
        state.live -= 1;
        log::trace!("freed thread block {block:p}");
        Ok(())
    }

    /// Returns whether `addr` lies inside the part of the region carved out so far.
    pub fn contains(&self, addr: *const c_void) -> bool {
        let state = self.state.lock();
        let top = self.region_top.as_ptr() as usize;
        let addr = addr as usize;
        addr < top && top - addr <= state.extended
    }

    /// Returns a snapshot of the allocator's bookkeeping.
    pub fn stats(&self) -> AllocStats {
        let state = self.state.lock();
        AllocStats {
            live_blocks: state.live,
            free_blocks: state.free.len(),
            region_pages: pages_needed(state.extended),
        }
    }

    fn owns(&self, state: &AllocState, block: Block) -> bool {
        let top = self.region_top.as_ptr() as usize;
        let base = block.base().as_ptr() as usize;
        base < top
            && top - base <= state.extended
            && (top - base) % self.layout.block_size() == 0
    }
}

/// Error type for [`PageAllocator::new`] and [`PageAllocator::allocate`]
#[derive(Debug, thiserror::Error)]
pub enum AllocError {
    /// The kernel refused to map the block's pages.
    #[error("Mapping block pages failed: {0}")]
    Map(#[from] MapError),
    /// The managed region cannot grow by another block.
    #[error("Thread block region exhausted")]
    RegionExhausted,
    /// The region top is not page aligned.
    #[error("Region top is not page aligned")]
    MisalignedRegion,
}

/// Error type for [`PageAllocator::free`]
#[derive(Debug, thiserror::Error)]
pub enum FreeError {
    /// The kernel refused to unmap the block's pages.
    #[error("Unmapping block pages failed: {0}")]
    Unmap(#[from] UnmapError),
    /// The free list could not grow to hold the block.
    #[error("Free block list growth failed: {0}")]
    FreeListGrowth(#[from] TryReserveError),
    /// The block was not handed out by this allocator.
    #[error("Block does not belong to this allocator")]
    Foreign,
    /// The block is already on the free list.
    #[error("Block freed twice")]
    DoubleFree,
}
