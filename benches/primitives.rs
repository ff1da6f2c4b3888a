// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Syscall-path benchmarks for the IPC primitives.
//
// Run with:
//   cargo bench --bench primitives
//
// Groups:
//   mutex             — semop acquire/release cycle, bare and scoped
//   store_roundtrip   — serialize + whole-blob write, then read back
//   channel_roundtrip — msgsnd + msgrcv of one tagged message
//   semaphore         — down/up on the composed counting semaphore
//
// Every group talks to live kernel objects, so numbers here are
// dominated by syscall cost, not by anything this crate computes.

use std::sync::atomic::{AtomicI32, Ordering};

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use svsync::{
    CountingSemaphore, KernelKey, MessageChannel, Mutex, SharedMemoryStore, WaitMode,
};

static COUNTER: AtomicI32 = AtomicI32::new(0);

fn unique_key() -> KernelKey {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed) + 1;
    let pid = std::process::id() as i32;
    KernelKey::new(((pid & 0x7fff) << 15) | n)
}

// ---------------------------------------------------------------------------
// Mutex
// ---------------------------------------------------------------------------

fn bench_mutex(c: &mut Criterion) {
    let mutex = Mutex::new(unique_key()).expect("create mutex");
    let mut group = c.benchmark_group("mutex");

    group.bench_function("acquire_release", |b| {
        b.iter(|| {
            mutex.acquire().expect("acquire");
            mutex.release().expect("release");
        });
    });

    group.bench_function("with_closure", |b| {
        b.iter(|| mutex.with(|| Ok(black_box(1u32))).expect("with"));
    });

    group.finish();
    mutex.delete().expect("delete mutex");
}

// ---------------------------------------------------------------------------
// Shared memory store
// ---------------------------------------------------------------------------

const STORE_SIZES: &[(&str, usize)] = &[
    ("small_16", 16),
    ("medium_256", 256),
    ("large_4096", 4096),
];

fn bench_store(c: &mut Criterion) {
    let store = SharedMemoryStore::new(unique_key(), 64 * 1024).expect("create store");
    let mut group = c.benchmark_group("store_roundtrip");

    for &(label, size) in STORE_SIZES {
        let payload = vec![0xABu8; size];
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(label), &payload, |b, payload| {
            b.iter(|| {
                store.set("payload", payload).expect("set");
                let back: Vec<u8> = store.get("payload").expect("get");
                black_box(back);
            });
        });
    }

    group.finish();
    store.delete().expect("delete store");
}

// ---------------------------------------------------------------------------
// Message channel
// ---------------------------------------------------------------------------

const CHANNEL_SIZES: &[(&str, usize)] = &[
    ("small_64", 64),
    ("medium_1024", 1024),
    ("large_8192", 8192),
];

fn bench_channel(c: &mut Criterion) {
    let chan = MessageChannel::new(unique_key()).expect("create channel");
    let mut group = c.benchmark_group("channel_roundtrip");

    for &(label, size) in CHANNEL_SIZES {
        let payload = vec![0xCDu8; size];
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(label), &payload, |b, payload| {
            b.iter(|| {
                chan.send(payload, 1, WaitMode::NonBlocking).expect("send");
                // Explicit bound skips the per-call capacity stat.
                let back = chan
                    .receive(1, WaitMode::NonBlocking, Some(payload.len()))
                    .expect("receive");
                black_box(back);
            });
        });
    }

    group.finish();
    chan.delete().expect("delete channel");
}

// ---------------------------------------------------------------------------
// Counting semaphore
// ---------------------------------------------------------------------------

fn bench_semaphore(c: &mut Criterion) {
    let mutex = Mutex::new(unique_key()).expect("create mutex");
    let counter = SharedMemoryStore::new(unique_key(), 512).expect("create counter");
    let channel = MessageChannel::new(unique_key()).expect("create channel");
    let sem = CountingSemaphore::new(mutex, counter, channel, Some(4)).expect("create semaphore");

    let mut group = c.benchmark_group("semaphore");
    group.bench_function("down_up", |b| {
        b.iter(|| {
            sem.down().expect("down");
            sem.up().expect("up");
        });
    });

    group.finish();
    sem.delete().expect("delete semaphore");
}

// ---------------------------------------------------------------------------
// Criterion entry points
// ---------------------------------------------------------------------------

criterion_group!(benches, bench_mutex, bench_store, bench_channel, bench_semaphore);
criterion_main!(benches);
