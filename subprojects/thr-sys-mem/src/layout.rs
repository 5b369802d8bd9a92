//! Thread block geometry
//!
//! A block is laid out upward from its page-aligned base:
//!
//! ```text
//! base                                                         base + block_size
//! | header (TCB) | guard buffer | thread stack -> | exception stack -> | padding |
//!                               ^ grows down      ^ stack_top          ^ exception_stack_top
//! ```
//!
//! The guard buffer sits between the control block and the stack, so a small stack overflow
//! scribbles on the guard before it reaches the control block. The whole block is rounded up
//! to whole pages.

use core::{ffi::c_void, ptr::NonNull};

use static_assertions::const_assert;

use crate::alignment::{STACK_ALIGN, is_word_multiple, round_up_to_page};

/// Size of the buffer between the control block and the thread stack.
pub const GUARD_SIZE: usize = 0x100;

/// Size of the stack the exception/fault handler runs on.
pub const EXCEPTION_STACK_SIZE: usize = 0x200;

const_assert!(GUARD_SIZE % STACK_ALIGN == 0);
const_assert!(EXCEPTION_STACK_SIZE % STACK_ALIGN == 0);

/// Offsets of the regions of a thread block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockLayout {
    header_size: usize,
    stack_size: usize,
    stack_top: usize,
    exception_stack_top: usize,
    block_size: usize,
}

impl BlockLayout {
    /// Computes the layout of a block holding a `header_size`-byte control block and a
    /// `stack_size`-byte thread stack.
    ///
    /// # Errors
    ///
    /// Fails with [`LayoutError::InvalidStackSize`] unless `stack_size` is a non-zero multiple of
    /// the machine word, and with [`LayoutError::TooLarge`] if the block would not fit the
    /// address space.
    pub fn new(header_size: usize, stack_size: usize) -> Result<Self, LayoutError> {
        if !is_word_multiple(stack_size) {
            return Err(LayoutError::InvalidStackSize(stack_size));
        }

        let header_size = header_size
            .checked_next_multiple_of(STACK_ALIGN)
            .ok_or(LayoutError::TooLarge)?;
        let stack_top = header_size
            .checked_add(GUARD_SIZE)
            .and_then(|offset| offset.checked_add(stack_size))
            .and_then(|offset| offset.checked_next_multiple_of(STACK_ALIGN))
            .ok_or(LayoutError::TooLarge)?;
        let exception_stack_top = stack_top
            .checked_add(EXCEPTION_STACK_SIZE)
            .ok_or(LayoutError::TooLarge)?;
        let block_size = round_up_to_page(exception_stack_top).ok_or(LayoutError::TooLarge)?;

        Ok(Self {
            header_size,
            stack_size,
            stack_top,
            exception_stack_top,
            block_size,
        })
    }

    /// Total size of a block, a whole number of pages.
    pub const fn block_size(&self) -> usize {
        self.block_size
    }

    /// Requested thread stack size.
    pub const fn stack_size(&self) -> usize {
        self.stack_size
    }

    /// Space reserved for the control block at the base of the block.
    pub const fn header_size(&self) -> usize {
        self.header_size
    }

    /// Initial stack pointer of the thread living in the block at `base`.
    pub fn stack_top(&self, base: NonNull<c_void>) -> NonNull<c_void> {
        // SAFETY: the offset stays inside the block
        unsafe { base.byte_add(self.stack_top) }
    }

    /// Initial stack pointer of the exception handler of the thread living in the block at
    /// `base`.
    pub fn exception_stack_top(&self, base: NonNull<c_void>) -> NonNull<c_void> {
        // SAFETY: the offset stays inside the block
        unsafe { base.byte_add(self.exception_stack_top) }
    }
}

/// Error type for [`BlockLayout::new`]
#[derive(Debug, thiserror::Error)]
pub enum LayoutError {
    /// The stack size is zero or not a multiple of the machine word.
    #[error("Invalid stack size {0:#x}: must be a non-zero multiple of the word size")]
    InvalidStackSize(usize),
    /// The block does not fit the address space.
    #[error("Block too large")]
    TooLarge,
}
