//! Memory alignment utilities for page- and word-grained sizes.

pub use thr_sys::mem::PAGE_SIZE;

/// Page mask for alignment operations.
const PAGE_MASK: usize = PAGE_SIZE - 1;

/// Alignment of every stack pointer handed to the kernel.
pub const STACK_ALIGN: usize = 16;

/// Checks if a size (or address) is page-aligned.
#[inline]
pub const fn is_page_aligned(size: usize) -> bool {
    size & PAGE_MASK == 0
}

/// Rounds up a size to the next page boundary, or `None` on overflow.
///
/// If the size is already page-aligned, it returns the same value.
#[inline]
pub const fn round_up_to_page(size: usize) -> Option<usize> {
    match size.checked_add(PAGE_MASK) {
        Some(padded) => Some(padded & !PAGE_MASK),
        None => None,
    }
}

/// Calculates the number of pages needed for a given size.
#[inline]
pub const fn pages_needed(size: usize) -> usize {
    size.div_ceil(PAGE_SIZE)
}

/// Checks if a size is a non-zero multiple of the machine word.
#[inline]
pub const fn is_word_multiple(size: usize) -> bool {
    size != 0 && size % size_of::<usize>() == 0
}
