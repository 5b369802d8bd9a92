//! Intrusive FIFO of stack-resident waiters
//!
//! A waiter builds a [`WaitNode`] in its own stack frame, links it into a queue while holding the
//! owning primitive's guard, and blocks until a peer grants it. Nodes are never heap allocated,
//! so a granted waiter can leave (and reuse its stack) without racing a peer that frees it.
//!
//! The node's state word doubles as the handoff word passed to [`Kernel::block_self`]: a granted
//! node is non-zero, so a grant that lands before the waiter blocks is never lost.

use core::sync::atomic::{AtomicU32, Ordering};

use intrusive_collections::{LinkedList, LinkedListLink, UnsafeRef, intrusive_adapter};
use static_assertions::const_assert_ne;
use thr_sys::{
    Kernel, KernelId,
    debug::fatal,
    sync::{FLAG_BLOCK, WakeError},
};

/// The waiter is linked in a queue.
const QUEUED: u32 = FLAG_BLOCK;
/// The waiter was unlinked by a peer and may proceed.
const GRANTED: u32 = 1;

const_assert_ne!(QUEUED, GRANTED);

/// A single waiter, owned by the waiting thread's stack frame.
pub(crate) struct WaitNode {
    link: LinkedListLink,
    thread: KernelId,
    state: AtomicU32,
}

intrusive_adapter!(WaitNodeAdapter = UnsafeRef<WaitNode>: WaitNode { link: LinkedListLink });

impl WaitNode {
    pub(crate) fn new(thread: KernelId) -> Self {
        Self {
            link: LinkedListLink::new(),
            thread,
            state: AtomicU32::new(QUEUED),
        }
    }

    /// Blocks the calling thread until a peer grants this node.
    ///
    /// Returns only on the `Queued -> Granted` transition; wakes that arrive for any other
    /// reason send the thread back to sleep.
    pub(crate) fn wait_granted<K: Kernel>(&self) {
        while self.state.load(Ordering::Acquire) != GRANTED {
            if let Err(err) = K::block_self(&self.state) {
                fatal(
                    "WAIT_NODE_BLOCK",
                    format_args!("blocking on a wait node failed: {err}"),
                );
            }
        }
    }
}

/// FIFO of [`WaitNode`]s, always accessed under the owning primitive's guard.
pub(crate) struct WaitQueue {
    // `LinkedList::new` is not `const`, so the list is created on first use
    list: Option<LinkedList<WaitNodeAdapter>>,
}

impl WaitQueue {
    pub(crate) const fn new() -> Self {
        Self { list: None }
    }

    /// Appends `node` to the back of the queue.
    ///
    /// # Safety
    ///
    /// `node` must stay at its address, and must not be dropped, until it has been granted
    /// through [`WaitQueue::grant_front`].
    pub(crate) unsafe fn push_back(&mut self, node: &WaitNode) {
        let list = self
            .list
            .get_or_insert_with(|| LinkedList::new(WaitNodeAdapter::new()));
        list.push_back(unsafe { UnsafeRef::from_raw(node) });
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.list.as_ref().is_none_or(LinkedList::is_empty)
    }

    pub(crate) fn len(&self) -> usize {
        self.list.as_ref().map_or(0, |list| list.iter().count())
    }

    /// Returns the thread of the head waiter without unlinking it.
    pub(crate) fn peek_front_thread(&self) -> Option<KernelId> {
        self.list.as_ref()?.front().get().map(|node| node.thread)
    }

    /// Unlinks the head waiter and grants it, returning the thread to wake.
    ///
    /// The waiter may return and pop its frame as soon as the grant is visible, so the node is
    /// not touched after the store.
    pub(crate) fn grant_front(&mut self) -> Option<KernelId> {
        let node = self.list.as_mut()?.pop_front()?;
        let thread = node.thread;
        node.state.store(GRANTED, Ordering::Release);
        Some(thread)
    }
}

/// Wakes a thread whose wait node was just granted.
///
/// A target that has not blocked yet will observe its grant before blocking, so
/// [`WakeError::NotBlocked`] needs no retry.
pub(crate) fn wake<K: Kernel>(thread: KernelId) {
    match K::wake(thread) {
        Ok(()) | Err(WakeError::NotBlocked) => {}
        Err(err) => log::warn!("wake of granted waiter {thread} failed: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: u32) -> KernelId {
        KernelId::from_raw(raw).unwrap()
    }

    #[test]
    fn test_grant_front_follows_arrival_order() {
        let first = WaitNode::new(id(7));
        let second = WaitNode::new(id(3));
        let third = WaitNode::new(id(5));
        let mut queue = WaitQueue::new();

        unsafe {
            queue.push_back(&first);
            queue.push_back(&second);
            queue.push_back(&third);
        }

        assert_eq!(queue.grant_front(), Some(id(7)));
        assert_eq!(queue.grant_front(), Some(id(3)));
        assert_eq!(queue.grant_front(), Some(id(5)));
        assert_eq!(queue.grant_front(), None);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_grant_marks_only_the_head() {
        let first = WaitNode::new(id(1));
        let second = WaitNode::new(id(2));
        let mut queue = WaitQueue::new();

        unsafe {
            queue.push_back(&first);
            queue.push_back(&second);
        }
        queue.grant_front();

        assert_eq!(first.state.load(Ordering::Relaxed), GRANTED);
        assert_eq!(second.state.load(Ordering::Relaxed), QUEUED);
        assert!(!queue.is_empty());

        // Unlink the remaining node before it goes out of scope
        queue.grant_front();
    }

    #[test]
    fn test_new_queue_is_empty() {
        let mut queue = WaitQueue::new();

        assert!(queue.is_empty());
        assert_eq!(queue.grant_front(), None);
    }
}
