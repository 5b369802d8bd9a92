//! Exclusion, writer preference, downgrade and usage errors of the raw reader/writer lock.

use core::sync::atomic::{AtomicU32, Ordering};
use std::{sync::Arc, thread, vec::Vec};

use thr_sys::hosted::Hosted;
use thr_sys_sync::{RwLock, RwLockMode};

/// Attempts the lock from a fresh thread, releasing it again on success.
fn try_lock_elsewhere(lock: &Arc<RwLock<Hosted>>, mode: RwLockMode) -> bool {
    let lock = lock.clone();
    thread::spawn(move || {
        let acquired = lock.try_lock(mode);
        if acquired {
            lock.unlock();
        }
        acquired
    })
    .join()
    .unwrap()
}

#[test]
fn test_writers_exclude_readers_and_each_other() {
    let lock = Arc::new(RwLock::<Hosted>::new());
    let readers = Arc::new(AtomicU32::new(0));
    let writers = Arc::new(AtomicU32::new(0));

    let spawn = |mode: RwLockMode| {
        let lock = lock.clone();
        let readers = readers.clone();
        let writers = writers.clone();
        thread::spawn(move || {
            for _ in 0..1_000 {
                lock.lock(mode);
                match mode {
                    RwLockMode::Read => {
                        readers.fetch_add(1, Ordering::SeqCst);
                        assert_eq!(writers.load(Ordering::SeqCst), 0);
                        readers.fetch_sub(1, Ordering::SeqCst);
                    }
                    RwLockMode::Write => {
                        assert_eq!(writers.fetch_add(1, Ordering::SeqCst), 0);
                        assert_eq!(readers.load(Ordering::SeqCst), 0);
                        writers.fetch_sub(1, Ordering::SeqCst);
                    }
                }
                lock.unlock();
            }
        })
    };

    let handles = [
        RwLockMode::Read,
        RwLockMode::Write,
        RwLockMode::Read,
        RwLockMode::Write,
        RwLockMode::Read,
        RwLockMode::Read,
    ]
    .into_iter()
    .map(spawn)
    .collect::<Vec<_>>();
    for handle in handles {
        handle.join().unwrap();
    }

    lock.destroy();
}

#[test]
fn test_waiting_writer_holds_back_new_readers() {
    let lock = Arc::new(RwLock::<Hosted>::new());
    lock.lock(RwLockMode::Read);

    let writer = {
        let lock = lock.clone();
        thread::spawn(move || {
            lock.lock(RwLockMode::Write);
            lock.unlock();
        })
    };
    while lock.waiting_writers() != 1 {
        thread::yield_now();
    }

    assert!(!try_lock_elsewhere(&lock, RwLockMode::Read));

    lock.unlock();
    writer.join().unwrap();

    assert_eq!(lock.waiting_writers(), 0);
    assert!(lock.try_lock(RwLockMode::Read));
    lock.unlock();
}

#[test]
fn test_downgraded_writer_shares_with_readers() {
    let lock = Arc::new(RwLock::<Hosted>::new());
    lock.lock(RwLockMode::Write);
    lock.downgrade();

    let reader = {
        let lock = lock.clone();
        thread::spawn(move || {
            lock.lock(RwLockMode::Read);
            lock.unlock();
        })
    };
    reader.join().unwrap();

    assert!(!try_lock_elsewhere(&lock, RwLockMode::Write));
    lock.unlock();
    assert!(try_lock_elsewhere(&lock, RwLockMode::Write));
}

#[test]
fn test_readers_blocked_by_a_writer_resume_after_it_unlocks() {
    let lock = Arc::new(RwLock::<Hosted>::new());
    let done = Arc::new(AtomicU32::new(0));
    lock.lock(RwLockMode::Write);

    let readers = (0..4)
        .map(|_| {
            let lock = lock.clone();
            let done = done.clone();
            thread::spawn(move || {
                lock.lock(RwLockMode::Read);
                done.fetch_add(1, Ordering::SeqCst);
                lock.unlock();
            })
        })
        .collect::<Vec<_>>();

    assert_eq!(done.load(Ordering::SeqCst), 0);
    lock.unlock();
    for reader in readers {
        reader.join().unwrap();
    }

    assert_eq!(done.load(Ordering::SeqCst), 4);
}

#[test]
#[should_panic(expected = "RWLOCK_DOWNGRADE_NOT_WRITER")]
fn test_downgrade_by_reader_is_fatal() {
    let lock = RwLock::<Hosted>::new();
    lock.lock(RwLockMode::Read);
    lock.downgrade();
}

#[test]
#[should_panic(expected = "RWLOCK_DOUBLE_DOWNGRADE")]
fn test_double_downgrade_is_fatal() {
    let lock = RwLock::<Hosted>::new();
    lock.lock(RwLockMode::Write);
    lock.downgrade();
    lock.downgrade();
}

#[test]
#[should_panic(expected = "RWLOCK_UNLOCK_NOT_HOLDER")]
fn test_unlock_by_non_holder_is_fatal() {
    let lock = RwLock::<Hosted>::new();
    lock.unlock();
}

#[test]
#[should_panic(expected = "RWLOCK_DESTROY_HELD")]
fn test_destroy_while_held_is_fatal() {
    let lock = RwLock::<Hosted>::new();
    lock.lock(RwLockMode::Read);
    lock.destroy();
}

#[test]
#[should_panic(expected = "RWLOCK_RELOCK")]
fn test_relock_by_holder_is_fatal() {
    let lock = RwLock::<Hosted>::new();
    lock.lock(RwLockMode::Read);
    lock.lock(RwLockMode::Read);
}
