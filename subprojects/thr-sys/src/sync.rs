//! Block/wake primitives
//!
//! Error types for the block/wake half of the [`Kernel`] contract.
//!
//! The two calls are only weakly coupled: a wake may arrive before its target has actually
//! blocked (the wake then fails with [`WakeError::NotBlocked`]), and a blocked thread may return
//! from [`Kernel::block_self`] because of a wake that was meant for an earlier wait. Callers
//! always re-check their own handoff word after `block_self` returns.
//!
//! [`Kernel`]: crate::Kernel
//! [`Kernel::block_self`]: crate::Kernel::block_self

/// Handoff word value meaning "keep blocking".
pub const FLAG_BLOCK: u32 = 0;

/// Error type for [`Kernel::block_self`]
///
/// [`Kernel::block_self`]: crate::Kernel::block_self
#[derive(Debug, thiserror::Error)]
pub enum BlockError {
    /// The handoff word address is not accessible.
    #[error("Invalid handoff word")]
    InvalidFlag,
}

/// Error type for [`Kernel::wake`]
///
/// [`Kernel::wake`]: crate::Kernel::wake
#[derive(Debug, thiserror::Error)]
pub enum WakeError {
    /// The target thread is not blocked (yet).
    ///
    /// This is an expected interleaving: the target will observe its handoff word before
    /// blocking.
    #[error("Target thread is not blocked")]
    NotBlocked,
    /// The target thread does not exist.
    #[error("Invalid thread")]
    InvalidThread,
}
