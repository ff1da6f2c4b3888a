// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Integration tests for inter-process mutex functionality: acquisition
// bookkeeping, guards, and cross-handle exclusion.

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use svsync::{Error, KernelKey, Mutex};

static COUNTER: AtomicI32 = AtomicI32::new(0);

fn unique_key() -> KernelKey {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed) + 1;
    let pid = std::process::id() as i32;
    KernelKey::new(((pid & 0x7fff) << 15) | n)
}

#[test]
fn acquire_release() {
    let m = Mutex::new(unique_key()).expect("create");

    m.acquire().expect("acquire");
    m.release().expect("release");

    m.delete().expect("delete");
}

#[test]
fn double_acquire_is_a_logic_error() {
    let m = Mutex::new(unique_key()).expect("create");

    m.acquire().expect("acquire");
    let err = m.acquire().unwrap_err();
    assert!(matches!(err, Error::Logic(_)));

    m.release().expect("release");
    m.delete().expect("delete");
}

#[test]
fn release_without_acquire_is_a_logic_error() {
    let m = Mutex::new(unique_key()).expect("create");

    let err = m.release().unwrap_err();
    assert!(matches!(err, Error::Logic(_)));

    m.delete().expect("delete");
}

#[test]
fn guard_releases_on_drop() {
    let m = Mutex::new(unique_key()).expect("create");

    {
        let _guard = m.lock().expect("lock");
        assert_eq!(m.acquisitions().len(), 1);
    }
    assert!(m.acquisitions().is_empty());

    // Released for real: a fresh acquire succeeds immediately.
    m.acquire().expect("reacquire");
    m.release().expect("release");
    m.delete().expect("delete");
}

#[test]
fn guard_unlock_surfaces_result() {
    let m = Mutex::new(unique_key()).expect("create");

    let guard = m.lock().expect("lock");
    guard.unlock().expect("unlock");

    m.acquire().expect("reacquire");
    m.release().expect("release");
    m.delete().expect("delete");
}

#[test]
fn with_runs_closure_under_lock() {
    let m = Mutex::new(unique_key()).expect("create");

    let out = m
        .with(|| {
            assert_eq!(m.acquisitions().len(), 1);
            Ok(21 * 2)
        })
        .expect("with");
    assert_eq!(out, 42);
    assert!(m.acquisitions().is_empty());

    m.delete().expect("delete");
}

#[test]
fn with_releases_after_closure_error() {
    let m = Mutex::new(unique_key()).expect("create");

    let err = m.with::<()>(|| Err(Error::Logic("boom"))).unwrap_err();
    assert!(matches!(err, Error::Logic("boom")));

    m.acquire().expect("lock is free again");
    m.release().expect("release");
    m.delete().expect("delete");
}

#[test]
fn acquisitions_record_hold_times() {
    let m = Mutex::new(unique_key()).expect("create");
    assert!(m.acquisitions().is_empty());

    let before = Instant::now();
    m.acquire().expect("acquire");
    let held = m.acquisitions();
    assert_eq!(held.len(), 1);
    assert!(held[0] >= before);

    m.release().expect("release");
    assert!(m.acquisitions().is_empty());
    m.delete().expect("delete");
}

#[test]
fn second_handle_does_not_reset_lock_state() {
    let key = unique_key();
    let m1 = Mutex::new(key).expect("create");
    m1.acquire().expect("acquire");

    let start = Instant::now();
    let waiter = thread::spawn(move || {
        // Constructing against a held mutex must adopt its state, not
        // re-initialize it to unlocked.
        let m2 = Mutex::new(key).expect("open second handle");
        m2.acquire().expect("acquire in thread");
        let waited = start.elapsed();
        m2.release().expect("release in thread");
        waited
    });

    thread::sleep(Duration::from_millis(60));
    m1.release().expect("release");

    let waited = waiter.join().unwrap();
    assert!(
        waited >= Duration::from_millis(40),
        "second handle acquired after {waited:?}"
    );

    m1.delete().expect("delete");
}

#[test]
fn excludes_concurrent_critical_sections() {
    let key = unique_key();
    let m = Mutex::new(key).expect("create");
    let in_section = Arc::new(AtomicBool::new(false));
    let entries = Arc::new(AtomicI32::new(0));

    let threads: Vec<_> = (0..4)
        .map(|_| {
            let in_section = Arc::clone(&in_section);
            let entries = Arc::clone(&entries);
            thread::spawn(move || {
                let m = Mutex::new(key).expect("open");
                for _ in 0..25 {
                    m.acquire().expect("acquire");
                    assert!(
                        !in_section.swap(true, Ordering::SeqCst),
                        "two holders at once"
                    );
                    entries.fetch_add(1, Ordering::Relaxed);
                    thread::yield_now();
                    in_section.store(false, Ordering::SeqCst);
                    m.release().expect("release");
                }
            })
        })
        .collect();

    for t in threads {
        t.join().unwrap();
    }

    assert_eq!(entries.load(Ordering::Relaxed), 100);
    m.delete().expect("delete");
}

#[test]
fn deleted_mutex_is_terminal() {
    let key = unique_key();
    let m = Mutex::new(key).expect("create");
    let stale = Mutex::new(key).expect("second handle");

    m.delete().expect("delete");

    let err = stale.acquire().unwrap_err();
    assert!(matches!(err, Error::Sync { .. } | Error::ResourceGone { .. }));
}
