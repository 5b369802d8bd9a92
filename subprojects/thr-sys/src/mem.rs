//! Page-grained memory primitives
//!
//! Error types and constants for the map/unmap half of the [`Kernel`] contract. Ranges are always
//! page aligned, a whole number of pages long, and identified by their base address once mapped.
//!
//! [`Kernel`]: crate::Kernel

/// Page size constant (4 KiB).
pub const PAGE_SIZE: usize = 0x1000;

/// Error type for [`Kernel::map_pages`]
///
/// [`Kernel::map_pages`]: crate::Kernel::map_pages
#[derive(Debug, thiserror::Error)]
pub enum MapError {
    /// The base address or the length is not page aligned, or the length is zero.
    #[error("Invalid address or size")]
    InvalidRange,
    /// Part of the range is already mapped.
    #[error("Range overlaps an existing mapping")]
    AlreadyMapped,
    /// The range lies outside of the memory the kernel can back.
    #[error("Out of memory")]
    OutOfMemory,
}

/// Error type for [`Kernel::unmap_pages`]
///
/// [`Kernel::unmap_pages`]: crate::Kernel::unmap_pages
#[derive(Debug, thiserror::Error)]
pub enum UnmapError {
    /// No mapping starts at the given base address.
    #[error("No mapping at the given address")]
    NotMapped,
}
