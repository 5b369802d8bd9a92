/// An enumeration of possible errors associated with a [`TryLockResult`] which can occur while
/// trying to acquire a lock, from the [`try_lock`] method on a [`Mutex`] or the [`try_read`] and
/// [`try_write`] methods on an [`RwLock`].
///
/// [`try_lock`]: crate::Mutex::try_lock
/// [`try_read`]: crate::RwLock::try_read
/// [`try_write`]: crate::RwLock::try_write
/// [`Mutex`]: crate::Mutex
/// [`RwLock`]: crate::RwLock
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum TryLockError {
    /// The lock could not be acquired at this time because the operation would otherwise block.
    #[error("try_lock failed because the operation would block")]
    WouldBlock,
}

/// A type alias for the result of a nonblocking locking method.
pub type TryLockResult<Guard> = Result<Guard, TryLockError>;
