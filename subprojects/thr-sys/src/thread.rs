//! Thread primitives
//!
//! Identifiers and error types for the spawn/yield/terminate half of the [`Kernel`] contract.
//!
//! [`Kernel`]: crate::Kernel

use core::{ffi::c_void, fmt};

/// Entry point of a kernel thread spawned through [`Kernel::spawn`].
///
/// The `C-unwind` ABI allows the hosted kernel to tear a thread down by unwinding through the
/// entry frame.
///
/// [`Kernel::spawn`]: crate::Kernel::spawn
pub type ThreadEntry = unsafe extern "C-unwind" fn(arg: *mut c_void);

/// A kernel-level thread identifier.
///
/// The raw value `0` is reserved and never names a thread; it is used as the "no thread" marker
/// in the atomic owner words of the synchronization primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct KernelId(u32);

impl KernelId {
    /// Raw value reserved for "no thread".
    pub const NONE_RAW: u32 = 0;

    /// Wraps a raw kernel thread id, returning `None` for the reserved value.
    #[inline]
    pub const fn from_raw(raw: u32) -> Option<Self> {
        if raw == Self::NONE_RAW {
            None
        } else {
            Some(Self(raw))
        }
    }

    /// Wraps a raw kernel thread id the caller knows to be non-zero.
    #[cfg(feature = "hosted")]
    #[inline]
    pub(crate) const fn from_raw_unchecked(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw kernel thread id.
    #[inline]
    pub const fn to_raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for KernelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ktid:{}", self.0)
    }
}

/// Error type for [`Kernel::spawn`]
///
/// [`Kernel::spawn`]: crate::Kernel::spawn
#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    /// The kernel could not allocate another thread.
    #[error("Out of kernel thread resources")]
    OutOfResources,
    /// The supplied stack pointer is not usable.
    #[error("Invalid stack pointer")]
    InvalidStack,
}

/// Error type for [`Kernel::yield_to`]
///
/// [`Kernel::yield_to`]: crate::Kernel::yield_to
#[derive(Debug, thiserror::Error)]
pub enum YieldError {
    /// The target thread does not exist.
    #[error("Invalid thread")]
    InvalidThread,
    /// The target thread exists but is not runnable.
    #[error("Target thread is not runnable")]
    NotRunnable,
}
