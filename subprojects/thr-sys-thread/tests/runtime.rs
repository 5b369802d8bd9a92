//! Create/join/exit behaviour of the thread runtime on the hosted kernel.

use core::{
    ffi::c_void,
    ptr,
    sync::atomic::{AtomicBool, AtomicU32, Ordering},
};
use std::{
    sync::{Arc, mpsc},
    thread,
    time::Duration,
};

use thr_std_sync::Mutex;
use thr_sys::{Kernel, hosted::Hosted, mem::PAGE_SIZE};
use thr_sys_mem::AllocError;
use thr_sys_thread::{CreateError, InitError, Runtime, RuntimeConfig, ThreadId, YieldError};

const STACK_SIZE: usize = 0x800;

/// A leaked runtime whose region holds `blocks` one-page blocks, with the calling thread
/// registered as its first thread.
fn runtime(blocks: usize) -> &'static Runtime<Hosted> {
    let region_top = Hosted::reserve(blocks * PAGE_SIZE).unwrap();
    let config = RuntimeConfig::new(region_top, blocks * PAGE_SIZE).with_stack_size(STACK_SIZE);
    let runtime = Box::leak(Box::new(Runtime::init(config).unwrap()));
    assert_eq!(runtime.layout().block_size(), PAGE_SIZE);
    runtime
}

fn value(raw: usize) -> *mut c_void {
    ptr::without_provenance_mut(raw)
}

fn double(arg: *mut c_void) -> *mut c_void {
    value(arg.addr() * 2)
}

#[test]
fn test_create_runs_function_and_join_returns_its_value() {
    let rt = runtime(4);

    let id = rt.create(double, value(21)).unwrap();

    assert_eq!(rt.join(id).addr(), 42);
}

#[test]
fn test_exit_before_join_delivers_the_exit_value() {
    let rt = runtime(4);
    let finished = Arc::new(AtomicBool::new(false));

    let id = {
        let finished = finished.clone();
        rt.spawn(move || {
            finished.store(true, Ordering::Release);
            value(7)
        })
        .unwrap()
    };
    while !finished.load(Ordering::Acquire) {
        thread::yield_now();
    }
    thread::sleep(Duration::from_millis(20));

    assert_eq!(rt.join(id).addr(), 7);
    assert_eq!(rt.thread_count(), 1);
}

#[test]
fn test_join_before_exit_delivers_the_exit_value() {
    let rt = runtime(4);
    let release = Arc::new(AtomicBool::new(false));

    let id = {
        let release = release.clone();
        rt.spawn(move || {
            while !release.load(Ordering::Acquire) {
                thread::sleep(Duration::from_millis(1));
            }
            value(99)
        })
        .unwrap()
    };
    let releaser = {
        let release = release.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            release.store(true, Ordering::Release);
        })
    };

    assert_eq!(rt.join(id).addr(), 99);
    releaser.join().unwrap();
}

#[test]
fn test_explicit_exit_skips_the_rest_of_the_body() {
    let rt = runtime(4);
    let after_exit = Arc::new(AtomicBool::new(false));

    let id = {
        let after_exit = after_exit.clone();
        rt.spawn(move || {
            if !after_exit.load(Ordering::Relaxed) {
                rt.exit(value(5));
            }
            after_exit.store(true, Ordering::Relaxed);
            value(0)
        })
        .unwrap()
    };

    assert_eq!(rt.join(id).addr(), 5);
    assert!(!after_exit.load(Ordering::Relaxed));
}

#[test]
fn test_join_and_exit_race_many_times() {
    let rt = runtime(4);

    for round in 0..500 {
        let id = rt.spawn(move || value(round + 1)).unwrap();
        if round % 2 == 0 {
            thread::yield_now();
        }
        assert_eq!(rt.join(id).addr(), round + 1);
    }
    assert_eq!(rt.thread_count(), 1);
}

#[test]
fn test_mutex_counter_across_eight_threads() {
    const THREADS: usize = 8;
    const ITERATIONS: usize = 10_000;

    let rt = runtime(THREADS + 2);
    let counter: &'static Mutex<Hosted, usize> = Box::leak(Box::new(Mutex::new(0)));

    let ids: Vec<ThreadId> = (0..THREADS)
        .map(|_| {
            rt.spawn(move || {
                for _ in 0..ITERATIONS {
                    *counter.lock() += 1;
                }
                value(0)
            })
            .unwrap()
        })
        .collect();
    for id in ids {
        rt.join(id);
    }

    assert_eq!(*counter.lock(), THREADS * ITERATIONS);
}

#[test]
fn test_block_of_joined_thread_is_reused() {
    let rt = runtime(4);
    let stack_of = |target: ThreadId| {
        let mut found = None;
        rt.for_each(|info| {
            if info.id == target {
                found = Some(info.stack_top);
            }
        });
        found.unwrap()
    };

    let first = rt.create(double, value(1)).unwrap();
    let first_stack = stack_of(first);
    rt.join(first);
    let second = rt.create(double, value(2)).unwrap();

    assert_ne!(first, second);
    assert_eq!(stack_of(second), first_stack);
    rt.join(second);
}

#[test]
fn test_get_self_id_matches_the_created_id() {
    let rt = runtime(4);
    let (tx, rx) = mpsc::channel();

    let id = rt
        .spawn(move || {
            tx.send(rt.get_self_id()).unwrap();
            value(0)
        })
        .unwrap();
    let reported = rx.recv().unwrap();
    rt.join(id);

    assert_eq!(reported, id);
    assert_ne!(rt.get_self_id(), id);
}

#[test]
fn test_registry_queries_track_live_threads() {
    let rt = runtime(4);
    let main = rt.get_self_id();
    let release = Arc::new(AtomicBool::new(false));

    assert_eq!(rt.thread_count(), 1);
    assert_eq!(rt.kernel_id_of(main), Some(Hosted::current_thread_id()));

    let id = {
        let release = release.clone();
        rt.spawn(move || {
            while !release.load(Ordering::Acquire) {
                thread::yield_now();
            }
            value(0)
        })
        .unwrap()
    };
    let mut seen = Vec::new();
    rt.for_each(|info| seen.push((info.id, info.creator)));

    assert_eq!(rt.thread_count(), 2);
    assert!(rt.kernel_id_of(id).is_some());
    assert!(seen.contains(&(id, Hosted::current_thread_id())));
    assert!(seen.iter().any(|&(seen_id, _)| seen_id == main));

    release.store(true, Ordering::Release);
    rt.join(id);

    assert_eq!(rt.thread_count(), 1);
    assert_eq!(rt.kernel_id_of(id), None);
}

#[test]
fn test_yield_to_resolves_threads_through_the_registry() {
    let rt = runtime(4);
    let id = rt.create(double, value(0)).unwrap();
    rt.join(id);

    assert!(rt.yield_to(None).is_ok());
    assert!(rt.yield_to(Some(rt.get_self_id())).is_ok());
    assert!(matches!(
        rt.yield_to(Some(id)),
        Err(YieldError::UnknownThread(stale)) if stale == id
    ));
}

#[test]
fn test_init_rejects_invalid_stack_sizes() {
    let region_top = Hosted::reserve(PAGE_SIZE).unwrap();

    for stack_size in [0, 7, STACK_SIZE + 1] {
        let config = RuntimeConfig::new(region_top, PAGE_SIZE).with_stack_size(stack_size);
        let result = Runtime::<Hosted>::init(config);
        assert!(
            matches!(result, Err(InitError::InvalidStackSize(size)) if size == stack_size),
            "stack size {stack_size:#x} accepted"
        );
    }
}

#[test]
fn test_create_fails_cleanly_when_region_is_exhausted() {
    let rt = runtime(1);
    let body_owner = Arc::new(AtomicU32::new(0));

    let result = {
        let body_owner = body_owner.clone();
        rt.spawn(move || {
            body_owner.store(1, Ordering::Relaxed);
            value(0)
        })
    };

    assert!(matches!(
        result,
        Err(CreateError::Alloc(AllocError::RegionExhausted))
    ));
    assert_eq!(Arc::strong_count(&body_owner), 1, "closure was not dropped");
    assert_eq!(body_owner.load(Ordering::Relaxed), 0);
    assert_eq!(rt.thread_count(), 1);
}

#[test]
#[should_panic(expected = "JOIN_UNKNOWN_THREAD")]
fn test_join_of_reclaimed_thread_is_fatal() {
    let rt = runtime(4);
    let id = rt.create(double, value(0)).unwrap();
    rt.join(id);

    rt.join(id);
}

#[test]
#[should_panic(expected = "JOIN_SELF")]
fn test_join_self_is_fatal() {
    let rt = runtime(4);

    rt.join(rt.get_self_id());
}

#[test]
#[should_panic(expected = "SELF_UNMANAGED_THREAD")]
fn test_get_self_id_from_unmanaged_thread_is_fatal() {
    let rt = thread::spawn(|| runtime(4)).join().unwrap();

    rt.get_self_id();
}
