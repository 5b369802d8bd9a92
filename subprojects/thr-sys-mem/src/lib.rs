//! # thr-sys-mem
//!
//! Page-grained memory for thread blocks.
//!
//! Every runtime thread lives in one fixed-size block holding its control block, a guard buffer,
//! its stack and an exception stack ([`layout`]). Blocks are carved downward out of a managed
//! address region and recycled through a LIFO free list ([`allocator`]).
#![no_std]

// The `alloc` crate backs the free list.
extern crate alloc;

pub mod alignment;
pub mod allocator;
pub mod layout;

pub use self::{
    allocator::{AllocError, AllocStats, AllocatorConfig, Block, FreeError, PageAllocator, ReclaimPolicy},
    layout::{BlockLayout, LayoutError},
};
