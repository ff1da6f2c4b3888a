// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Integration tests for the counting semaphore: initialization rules,
// blocking behavior, and the concurrency bound.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use svsync::{
    CountingSemaphore, Error, KernelKey, MessageChannel, Mutex, Result, SharedMemoryStore,
};

static COUNTER: AtomicI32 = AtomicI32::new(0);

fn unique_key() -> KernelKey {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed) + 1;
    let pid = std::process::id() as i32;
    KernelKey::new(((pid & 0x7fff) << 15) | n)
}

fn unique_keys() -> (KernelKey, KernelKey, KernelKey) {
    (unique_key(), unique_key(), unique_key())
}

fn try_semaphore(
    keys: (KernelKey, KernelKey, KernelKey),
    max: Option<u32>,
) -> Result<CountingSemaphore> {
    let mutex = Mutex::new(keys.0)?;
    let counter = SharedMemoryStore::new(keys.1, 512)?;
    let channel = MessageChannel::new(keys.2)?;
    CountingSemaphore::new(mutex, counter, channel, max)
}

fn new_semaphore(keys: (KernelKey, KernelKey, KernelKey), max: Option<u32>) -> CountingSemaphore {
    try_semaphore(keys, max).unwrap_or_else(|e| panic!("semaphore: {e}"))
}

#[test]
fn counts_down_to_zero_then_blocks() {
    let keys = unique_keys();
    let sem = new_semaphore(keys, Some(3));

    sem.down().expect("1st down");
    sem.down().expect("2nd down");
    sem.down().expect("3rd down");
    assert_eq!(sem.read().expect("read"), 0);

    let start = Instant::now();
    let blocked = thread::spawn(move || {
        let sem = new_semaphore(keys, None);
        sem.down().expect("4th down");
        start.elapsed()
    });

    thread::sleep(Duration::from_millis(60));
    sem.up().expect("free one slot");

    let waited = blocked.join().unwrap();
    assert!(
        waited >= Duration::from_millis(40),
        "4th down returned after {waited:?}"
    );

    // The thread took the freed slot and kept it.
    assert_eq!(sem.read().expect("read"), 0);

    for _ in 0..3 {
        sem.up().expect("restore");
    }
    assert_eq!(sem.read().expect("read"), 3);

    sem.delete().expect("delete");
}

#[test]
fn later_handles_adopt_the_stored_max() {
    let keys = unique_keys();
    let first = new_semaphore(keys, Some(3));

    let second = new_semaphore(keys, None);
    assert_eq!(second.max_count(), 3);

    let third = new_semaphore(keys, Some(3));
    assert_eq!(third.max_count(), 3);

    first.delete().expect("delete");
}

#[test]
fn mismatched_max_is_refused() {
    let keys = unique_keys();
    let sem = new_semaphore(keys, Some(3));

    let Err(err) = try_semaphore(keys, Some(5)) else {
        panic!("mismatched max accepted")
    };
    assert!(matches!(err, Error::Logic(_)));

    sem.delete().expect("delete");
}

#[test]
fn first_initialization_requires_a_max() {
    let keys = unique_keys();

    let Err(err) = try_semaphore(keys, None) else {
        panic!("uninitialized semaphore accepted")
    };
    assert!(matches!(err, Error::Logic(_)));

    // The components were created by the failed attempt; initialize
    // properly so delete can tear them down.
    let sem = new_semaphore(keys, Some(2));
    sem.delete().expect("delete");
}

#[test]
fn release_above_max_is_a_logic_error() {
    let keys = unique_keys();
    let sem = new_semaphore(keys, Some(2));

    let err = sem.up().unwrap_err();
    assert!(matches!(err, Error::Logic(_)));
    assert_eq!(sem.read().expect("read"), 2);

    sem.delete().expect("delete");
}

#[test]
fn bounds_concurrency_to_max_count() {
    let keys = unique_keys();
    let sem = new_semaphore(keys, Some(2));
    let inside = Arc::new(AtomicI32::new(0));
    let peak = Arc::new(AtomicI32::new(0));

    let workers: Vec<_> = (0..6)
        .map(|_| {
            let inside = Arc::clone(&inside);
            let peak = Arc::clone(&peak);
            thread::spawn(move || {
                let sem = new_semaphore(keys, None);
                for _ in 0..5 {
                    sem.down().expect("down");
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(2));
                    inside.fetch_sub(1, Ordering::SeqCst);
                    sem.up().expect("up");
                }
            })
        })
        .collect();

    for w in workers {
        w.join().unwrap();
    }

    let seen = peak.load(Ordering::SeqCst);
    assert!(seen <= 2, "concurrency bound exceeded: {seen}");
    assert_eq!(sem.read().expect("read"), 2);

    sem.delete().expect("delete");
}

#[test]
fn slot_guard_returns_its_slot() {
    let keys = unique_keys();
    let sem = new_semaphore(keys, Some(1));

    {
        let _slot = sem.slot().expect("take slot");
        assert_eq!(sem.read().expect("read"), 0);
    }
    assert_eq!(sem.read().expect("read"), 1);

    let slot = sem.slot().expect("take slot again");
    slot.release().expect("explicit release");
    assert_eq!(sem.read().expect("read"), 1);

    sem.delete().expect("delete");
}

#[test]
fn keys_expose_all_components() {
    let keys = unique_keys();
    let sem = new_semaphore(keys, Some(1));

    let reported = sem.keys();
    assert_eq!(reported.mutex, keys.0);
    assert_eq!(reported.counter, keys.1);
    assert_eq!(reported.channel, keys.2);

    sem.delete().expect("delete");
}

#[test]
fn delete_removes_all_components() {
    let keys = unique_keys();
    let sem = new_semaphore(keys, Some(1));
    sem.delete().expect("delete");

    // All three kernel objects are gone, so the same keys start blank:
    // a new max is accepted instead of conflicting with the old one.
    let sem = new_semaphore(keys, Some(4));
    assert_eq!(sem.max_count(), 4);
    assert_eq!(sem.read().expect("read"), 4);
    sem.delete().expect("delete");
}
