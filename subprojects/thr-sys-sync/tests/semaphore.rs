//! Count bounds and blocking behaviour of the raw semaphore.

use core::{
    cell::UnsafeCell,
    sync::atomic::{AtomicU32, Ordering},
};
use std::{sync::Arc, thread, vec::Vec};

use thr_sys::hosted::Hosted;
use thr_sys_sync::Semaphore;

#[test]
fn test_signal_saturates_at_max() {
    let sem = Semaphore::<Hosted>::with_max(2, 3);

    sem.signal();
    sem.signal();
    sem.signal();

    assert_eq!(sem.count(), 3);
    assert!(sem.try_wait());
    assert!(sem.try_wait());
    assert!(sem.try_wait());
    assert!(!sem.try_wait());
    assert_eq!(sem.count(), 0);
}

#[test]
fn test_new_caps_count_at_initial_value() {
    let sem = Semaphore::<Hosted>::new(1);

    sem.signal();

    assert_eq!(sem.max(), 1);
    assert_eq!(sem.count(), 1);
    assert!(sem.try_wait());
    assert!(!sem.try_wait());
}

#[test]
fn test_zero_initialised_semaphore_gains_one_permit() {
    let sem = Semaphore::<Hosted>::new(0);

    sem.signal();
    sem.signal();

    assert_eq!(sem.count(), 1);
    assert!(sem.try_wait());
    assert!(!sem.try_wait());
}

#[test]
fn test_unpaired_signal_keeps_unit_semaphore_exclusive() {
    let sem = Arc::new(Semaphore::<Hosted>::new(1));
    let inside = Arc::new(AtomicU32::new(0));
    let max_inside = Arc::new(AtomicU32::new(0));

    sem.signal();

    let handles = (0..4)
        .map(|_| {
            let sem = sem.clone();
            let inside = inside.clone();
            let max_inside = max_inside.clone();
            thread::spawn(move || {
                for _ in 0..2_000 {
                    sem.wait();
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_inside.fetch_max(now, Ordering::SeqCst);
                    inside.fetch_sub(1, Ordering::SeqCst);
                    sem.signal();
                }
            })
        })
        .collect::<Vec<_>>();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    assert_eq!(sem.count(), 1);
}

#[test]
fn test_wait_blocks_until_signaled() {
    let sem = Arc::new(Semaphore::<Hosted>::new(0));
    let passed = Arc::new(AtomicU32::new(0));

    let waiter = {
        let sem = sem.clone();
        let passed = passed.clone();
        thread::spawn(move || {
            sem.wait();
            passed.store(1, Ordering::SeqCst);
        })
    };

    assert_eq!(passed.load(Ordering::SeqCst), 0);
    sem.signal();
    waiter.join().unwrap();

    assert_eq!(passed.load(Ordering::SeqCst), 1);
    assert_eq!(sem.count(), 0);
}

#[test]
fn test_binary_semaphore_provides_mutual_exclusion() {
    struct Shared {
        sem: Semaphore<Hosted>,
        value: UnsafeCell<u64>,
        inside: AtomicU32,
    }
    unsafe impl Sync for Shared {}

    let shared = Arc::new(Shared {
        sem: Semaphore::with_max(1, 1),
        value: UnsafeCell::new(0),
        inside: AtomicU32::new(0),
    });

    let handles = (0..8)
        .map(|_| {
            let shared = shared.clone();
            thread::spawn(move || {
                for _ in 0..10_000 {
                    shared.sem.wait();
                    assert_eq!(shared.inside.fetch_add(1, Ordering::SeqCst), 0);
                    unsafe { *shared.value.get() += 1 };
                    shared.inside.fetch_sub(1, Ordering::SeqCst);
                    shared.sem.signal();
                }
            })
        })
        .collect::<Vec<_>>();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(unsafe { *shared.value.get() }, 80_000);
    assert_eq!(shared.sem.count(), 1);
}

#[test]
fn test_count_stays_within_bounds_under_contention() {
    const MAX: u32 = 3;
    let sem = Arc::new(Semaphore::<Hosted>::with_max(MAX, MAX));
    let holders = Arc::new(AtomicU32::new(0));

    let handles = (0..6)
        .map(|_| {
            let sem = sem.clone();
            let holders = holders.clone();
            thread::spawn(move || {
                for _ in 0..2_000 {
                    sem.wait();
                    assert!(holders.fetch_add(1, Ordering::SeqCst) < MAX);
                    assert!(sem.count() <= MAX);
                    holders.fetch_sub(1, Ordering::SeqCst);
                    sem.signal();
                }
            })
        })
        .collect::<Vec<_>>();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(sem.count(), MAX);
}

#[test]
fn test_destroy_idle_semaphore() {
    let sem = Semaphore::<Hosted>::new(1);
    sem.wait();
    sem.signal();

    sem.destroy();
}
