//! RAII guard behaviour of the data-owning wrappers.

use std::{sync::Arc, thread, vec::Vec};

use thr_std_sync::{
    Condvar, Mutex, RwLock, RwLockWriteGuard, Semaphore, TryAcquireError, TryLockError,
};
use thr_sys::hosted::Hosted;

#[test]
fn test_mutex_guard_protects_counter() {
    let counter = Arc::new(Mutex::<Hosted, u64>::new(0));

    let handles = (0..8)
        .map(|_| {
            let counter = counter.clone();
            thread::spawn(move || {
                for _ in 0..10_000 {
                    *counter.lock() += 1;
                }
            })
        })
        .collect::<Vec<_>>();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(*counter.lock(), 80_000);
}

#[test]
fn test_mutex_try_lock_reports_would_block() {
    let value = Arc::new(Mutex::<Hosted, i32>::new(1));
    let guard = value.lock();

    let attempt = {
        let value = value.clone();
        thread::spawn(move || value.try_lock().map(|guard| *guard).err())
    };

    assert_eq!(attempt.join().unwrap(), Some(TryLockError::WouldBlock));
    drop(guard);
    assert_eq!(value.try_lock().map(|guard| *guard), Ok(1));
}

#[test]
fn test_condvar_wait_while_observes_the_update() {
    let pair = Arc::new((Mutex::<Hosted, bool>::new(false), Condvar::<Hosted>::new()));

    let notifier = {
        let pair = pair.clone();
        thread::spawn(move || {
            let (lock, cv) = &*pair;
            *lock.lock() = true;
            cv.notify_all();
        })
    };

    let (lock, cv) = &*pair;
    let ready = cv.wait_while(lock.lock(), |ready| !*ready);
    assert!(*ready);
    drop(ready);
    notifier.join().unwrap();
}

#[test]
fn test_rwlock_write_guard_downgrades_in_place() {
    let lock = Arc::new(RwLock::<Hosted, Vec<u32>>::new(Vec::new()));

    let mut writer = lock.write();
    writer.push(7);
    let reader = RwLockWriteGuard::downgrade(writer);

    let concurrent = {
        let lock = lock.clone();
        thread::spawn(move || lock.read().clone())
    };
    assert_eq!(concurrent.join().unwrap(), [7]);
    assert!(lock_is_write_blocked(&lock));

    drop(reader);
    assert!(!lock_is_write_blocked(&lock));
}

fn lock_is_write_blocked(lock: &Arc<RwLock<Hosted, Vec<u32>>>) -> bool {
    let lock = lock.clone();
    thread::spawn(move || lock.try_write().is_err())
        .join()
        .unwrap()
}

#[test]
fn test_semaphore_permit_returns_on_drop() {
    let sem = Semaphore::<Hosted>::with_max(1, 1);

    let permit = sem.acquire();
    assert_eq!(sem.try_acquire().err(), Some(TryAcquireError::NoPermits));
    drop(permit);

    assert_eq!(sem.available_permits(), 1);
    let permit = sem.try_acquire().unwrap();
    permit.forget();
    assert_eq!(sem.available_permits(), 0);
}
