//! Mutual exclusion, FIFO hand-off and usage errors of the raw mutex.

use core::{
    cell::UnsafeCell,
    sync::atomic::{AtomicU32, Ordering},
};
use std::{sync::Arc, thread, vec::Vec};

use thr_sys::hosted::Hosted;
use thr_sys_sync::Mutex;

struct Counter {
    lock: Mutex<Hosted>,
    value: UnsafeCell<u64>,
    inside: AtomicU32,
}

unsafe impl Sync for Counter {}

impl Counter {
    fn new() -> Self {
        Self {
            lock: Mutex::new(),
            value: UnsafeCell::new(0),
            inside: AtomicU32::new(0),
        }
    }

    fn increment(&self) {
        self.lock.lock();
        assert_eq!(self.inside.fetch_add(1, Ordering::SeqCst), 0);
        unsafe { *self.value.get() += 1 };
        self.inside.fetch_sub(1, Ordering::SeqCst);
        self.lock.unlock();
    }
}

#[test]
fn test_eight_threads_count_to_eighty_thousand() {
    let counter = Arc::new(Counter::new());

    let handles = (0..8)
        .map(|_| {
            let counter = counter.clone();
            thread::spawn(move || {
                for _ in 0..10_000 {
                    counter.increment();
                }
            })
        })
        .collect::<Vec<_>>();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(unsafe { *counter.value.get() }, 80_000);
}

#[test]
fn test_waiters_acquire_in_arrival_order() {
    const WAITERS: usize = 6;
    let lock = Arc::new(Mutex::<Hosted>::new());
    let order = Arc::new(std::sync::Mutex::new(Vec::new()));

    lock.lock();
    let handles = (0..WAITERS)
        .map(|index| {
            let handle = {
                let lock = lock.clone();
                let order = order.clone();
                thread::spawn(move || {
                    lock.lock();
                    order.lock().unwrap().push(index);
                    lock.unlock();
                })
            };
            while lock.waiter_count() != index + 1 {
                thread::yield_now();
            }
            handle
        })
        .collect::<Vec<_>>();
    lock.unlock();

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(*order.lock().unwrap(), (0..WAITERS).collect::<Vec<_>>());
}

#[test]
fn test_try_lock_fails_while_held_elsewhere() {
    let lock = Arc::new(Mutex::<Hosted>::new());
    lock.lock();

    let contender = {
        let lock = lock.clone();
        thread::spawn(move || lock.try_lock())
    };

    assert!(!contender.join().unwrap());
    assert!(lock.is_locked_by_current_thread());
    lock.unlock();
    assert!(lock.try_lock());
    lock.unlock();
    assert_eq!(lock.owner(), None);
}

#[test]
fn test_destroy_uncontended_mutex() {
    let lock = Mutex::<Hosted>::new();
    lock.lock();
    lock.unlock();

    lock.destroy();
}

#[test]
#[should_panic(expected = "MUTEX_RELOCK")]
fn test_relock_by_owner_is_fatal() {
    let lock = Mutex::<Hosted>::new();
    lock.lock();
    lock.lock();
}

#[test]
#[should_panic(expected = "MUTEX_UNLOCK_NOT_OWNER")]
fn test_unlock_by_non_owner_is_fatal() {
    let lock = Mutex::<Hosted>::new();
    lock.unlock();
}

#[test]
#[should_panic(expected = "MUTEX_DESTROY_CONTENDED")]
fn test_destroy_while_locked_is_fatal() {
    let lock = Mutex::<Hosted>::new();
    lock.lock();
    lock.destroy();
}

#[test]
#[should_panic(expected = "MUTEX_USE_AFTER_DESTROY")]
fn test_lock_after_destroy_is_fatal() {
    let lock = Mutex::<Hosted>::new();
    lock.destroy();
    lock.lock();
}
