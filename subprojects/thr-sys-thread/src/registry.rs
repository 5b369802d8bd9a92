//! Thread registry
//!
//! This module tracks every thread managed by a [`Runtime`](crate::Runtime).
//!
//! ## Storage
//!
//! Entries live in an arena of slots. A [`ThreadId`] is a slot index paired with the slot's
//! generation; removing an entry bumps the generation, so a stale handle never resolves to the
//! thread that later reuses the slot. Vacated slot indices are recycled through a free list.
//!
//! The registry itself is plain data. The runtime keeps it behind its own mutex, which also
//! serialises joiner claims (see [`Registry::claim_join`]).

use alloc::vec::Vec;
use core::{fmt, ptr::NonNull};

use thr_sys::KernelId;

use crate::tcb::Tcb;

/// Identifier of a runtime-managed thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThreadId {
    index: u32,
    generation: u32,
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tid:{}.{}", self.index, self.generation)
    }
}

/// A registered thread.
pub(crate) struct Entry {
    pub(crate) tcb: NonNull<Tcb>,
    pub(crate) kernel_id: KernelId,
    /// Kernel id of the thread that claimed the right to join this one.
    pub(crate) joiner: Option<KernelId>,
}

struct Slot {
    generation: u32,
    entry: Option<Entry>,
}

/// Result of [`Registry::claim_join`].
pub(crate) enum Claim {
    Claimed { tcb: NonNull<Tcb>, kernel_id: KernelId },
    Unknown,
    AlreadyClaimed(KernelId),
}

pub(crate) struct Registry {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

// SAFETY: the TCB pointers are only dereferenced by the runtime, which arbitrates access to them
// through the registry mutex and each TCB's handoff word.
unsafe impl Send for Registry {}

impl Registry {
    pub(crate) const fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
        }
    }

    /// Registers a thread and returns its new identifier.
    pub(crate) fn insert(&mut self, tcb: NonNull<Tcb>, kernel_id: KernelId) -> ThreadId {
        let entry = Entry {
            tcb,
            kernel_id,
            joiner: None,
        };
        self.live += 1;

        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.entry = Some(entry);
            return ThreadId {
                index,
                generation: slot.generation,
            };
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            entry: Some(entry),
        });
        ThreadId {
            index,
            generation: 0,
        }
    }

    pub(crate) fn get(&self, id: ThreadId) -> Option<&Entry> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.entry.as_ref())
    }

    /// Records `joiner` as the one thread allowed to join `id`.
    pub(crate) fn claim_join(&mut self, id: ThreadId, joiner: KernelId) -> Claim {
        let Some(entry) = self
            .slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.entry.as_mut())
        else {
            return Claim::Unknown;
        };

        if let Some(existing) = entry.joiner {
            return Claim::AlreadyClaimed(existing);
        }
        entry.joiner = Some(joiner);
        Claim::Claimed {
            tcb: entry.tcb,
            kernel_id: entry.kernel_id,
        }
    }

    /// Removes a thread, invalidating every copy of its identifier.
    pub(crate) fn remove(&mut self, id: ThreadId) -> Option<Entry> {
        let slot = self
            .slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)?;
        let entry = slot.entry.take()?;

        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.live -= 1;
        Some(entry)
    }

    /// Looks a thread up by its kernel id.
    pub(crate) fn find_by_kernel(&self, kernel_id: KernelId) -> Option<(ThreadId, &Entry)> {
        self.iter().find(|(_, entry)| entry.kernel_id == kernel_id)
    }

    pub(crate) fn len(&self) -> usize {
        self.live
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (ThreadId, &Entry)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.entry.as_ref().map(|entry| {
                let id = ThreadId {
                    index: index as u32,
                    generation: slot.generation,
                };
                (id, entry)
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kid(raw: u32) -> KernelId {
        KernelId::from_raw(raw).expect("non-zero kernel id")
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut registry = Registry::new();

        let a = registry.insert(NonNull::dangling(), kid(10));
        let b = registry.insert(NonNull::dangling(), kid(11));

        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get(a).map(|e| e.kernel_id), Some(kid(10)));
        assert_eq!(registry.find_by_kernel(kid(11)).map(|(id, _)| id), Some(b));
        assert!(registry.find_by_kernel(kid(12)).is_none());
    }

    #[test]
    fn test_stale_id_does_not_resolve_after_slot_reuse() {
        let mut registry = Registry::new();

        let old = registry.insert(NonNull::dangling(), kid(10));
        assert!(registry.remove(old).is_some());
        let new = registry.insert(NonNull::dangling(), kid(20));

        assert_eq!(old.index, new.index, "slot must be recycled");
        assert_ne!(old, new);
        assert!(registry.get(old).is_none());
        assert!(registry.remove(old).is_none());
        assert_eq!(registry.get(new).map(|e| e.kernel_id), Some(kid(20)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_claim_join_once() {
        let mut registry = Registry::new();
        let id = registry.insert(NonNull::dangling(), kid(10));

        assert!(matches!(
            registry.claim_join(id, kid(1)),
            Claim::Claimed { kernel_id, .. } if kernel_id == kid(10)
        ));
        assert!(matches!(
            registry.claim_join(id, kid(2)),
            Claim::AlreadyClaimed(joiner) if joiner == kid(1)
        ));

        registry.remove(id);
        assert!(matches!(registry.claim_join(id, kid(2)), Claim::Unknown));
    }

    #[test]
    fn test_iter_skips_vacant_slots() {
        let mut registry = Registry::new();
        let a = registry.insert(NonNull::dangling(), kid(1));
        let b = registry.insert(NonNull::dangling(), kid(2));
        let c = registry.insert(NonNull::dangling(), kid(3));

        registry.remove(b);

        let ids: Vec<ThreadId> = registry.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, [a, c]);
    }
}
