// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Bounded-buffer producers and consumers across real processes.
//
// Usage:
//   demo_producer_consumer               (spawns producers and consumers)
//   demo_producer_consumer produce <n>   (internal child role)
//   demo_producer_consumer consume <n>   (internal child role)
//
// Jobs travel through a message channel; a counting semaphore caps the
// jobs in flight, so producers stall once the buffer is full until a
// consumer frees a slot. Totals accumulate in a shared memory store
// guarded by a mutex, and the coordinator prints them at the end.

use std::process::{Child, Command};
use std::thread;
use std::time::Duration;

use rand::Rng;
use tracing_subscriber::EnvFilter;

use svsync::{Mutex, ResourceFactory, SharedMemoryStore, WaitMode};

const SLOTS: u32 = 8;
const PRODUCERS: usize = 2;
const CONSUMERS: usize = 2;
const JOBS_PER_PRODUCER: usize = 20;

const JOB: i64 = 1;
const SHUTDOWN: i64 = 9;

const SEMAPHORE_ID: &str = "buffer_slots";
const CHANNEL_ID: &str = "buffer_jobs";
const STATS_MUTEX_ID: &str = "stats_lck";
const STATS_STORE_ID: &str = "stats_shm";

fn bump(stats: &Mutex, store: &SharedMemoryStore, field: &str, add: u64) {
    stats
        .with(|| {
            let n: u64 = store.get(field)?;
            store.set(field, &(n + add))
        })
        .expect("update stats");
}

fn run_coordinator() {
    let exe = std::env::current_exe().expect("current exe");
    let factory = ResourceFactory::with_well_known_keyring().expect("open keyring");

    let slots = factory
        .new_semaphore(SEMAPHORE_ID, Some(SLOTS))
        .expect("create slots semaphore");
    let jobs = factory.new_message_queue(CHANNEL_ID).expect("create job channel");
    let stats = factory.new_mutex(STATS_MUTEX_ID).expect("create stats mutex");
    let totals = factory
        .new_shared_memory(STATS_STORE_ID, 512)
        .expect("create stats store");

    stats
        .with(|| {
            totals.set("produced", &0u64)?;
            totals.set("consumed", &0u64)?;
            totals.set("bytes", &0u64)
        })
        .expect("reset stats");

    println!(
        "coordinator: {PRODUCERS} producers x {JOBS_PER_PRODUCER} jobs, \
         {CONSUMERS} consumers, {SLOTS} slots"
    );

    let spawn = |role: &str, n: usize| -> Child {
        Command::new(&exe)
            .arg(role)
            .arg(n.to_string())
            .spawn()
            .expect("spawn worker")
    };
    let producers: Vec<Child> = (0..PRODUCERS).map(|n| spawn("produce", n)).collect();
    let consumers: Vec<Child> = (0..CONSUMERS).map(|n| spawn("consume", n)).collect();

    for mut child in producers {
        child.wait().expect("wait for producer");
    }
    // All jobs are queued or consumed; tell each consumer to stop.
    // Shutdown messages bypass the slot accounting on both ends.
    for _ in 0..CONSUMERS {
        jobs.send(&[], SHUTDOWN, WaitMode::Blocking).expect("send shutdown");
    }
    for mut child in consumers {
        child.wait().expect("wait for consumer");
    }

    let (produced, consumed, bytes) = stats
        .with(|| {
            Ok((
                totals.get::<u64>("produced")?,
                totals.get::<u64>("consumed")?,
                totals.get::<u64>("bytes")?,
            ))
        })
        .expect("read stats");
    println!("coordinator: produced {produced}, consumed {consumed}, {bytes} payload bytes");

    slots.delete().expect("delete slots semaphore");
    jobs.delete().expect("delete job channel");
    totals.delete().expect("delete stats store");
    stats.delete().expect("delete stats mutex");
    for id in [
        "buffer_slots_lck",
        "buffer_slots_shm",
        "buffer_slots_msg",
        CHANNEL_ID,
        STATS_MUTEX_ID,
        STATS_STORE_ID,
    ] {
        factory.keyring().remove_identifier(id).expect("unregister identifier");
    }
    println!("coordinator: cleaned up");
}

fn run_producer(n: usize) {
    let factory = ResourceFactory::with_well_known_keyring().expect("open keyring");
    let slots = factory.new_semaphore(SEMAPHORE_ID, None).expect("open slots semaphore");
    let jobs = factory.new_message_queue(CHANNEL_ID).expect("open job channel");
    let stats = factory.new_mutex(STATS_MUTEX_ID).expect("open stats mutex");
    let totals = factory
        .new_shared_memory(STATS_STORE_ID, 512)
        .expect("open stats store");

    let mut rng = rand::thread_rng();
    for i in 1..=JOBS_PER_PRODUCER {
        thread::sleep(Duration::from_millis(rng.gen_range(1..10)));
        // Hold a slot for the job's whole life in the buffer; the
        // consumer that drains it gives the slot back.
        slots.acquire().expect("acquire slot");
        let payload = format!("producer {n} job {i}");
        jobs.send(payload.as_bytes(), JOB, WaitMode::Blocking).expect("send job");
        bump(&stats, &totals, "produced", 1);
    }
    println!("producer {n}: sent {JOBS_PER_PRODUCER} jobs");
}

fn run_consumer(n: usize) {
    let factory = ResourceFactory::with_well_known_keyring().expect("open keyring");
    let slots = factory.new_semaphore(SEMAPHORE_ID, None).expect("open slots semaphore");
    let jobs = factory.new_message_queue(CHANNEL_ID).expect("open job channel");
    let stats = factory.new_mutex(STATS_MUTEX_ID).expect("open stats mutex");
    let totals = factory
        .new_shared_memory(STATS_STORE_ID, 512)
        .expect("open stats store");

    let mut rng = rand::thread_rng();
    let mut drained = 0usize;
    loop {
        let payload = jobs.receive(0, WaitMode::Blocking, None).expect("receive job");
        if jobs.last_tag() == Some(SHUTDOWN) {
            break;
        }
        thread::sleep(Duration::from_millis(rng.gen_range(1..10)));
        bump(&stats, &totals, "consumed", 1);
        bump(&stats, &totals, "bytes", payload.len() as u64);
        slots.release().expect("release slot");
        drained += 1;
    }
    println!("consumer {n}: drained {drained} jobs");
}

fn main() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .try_init();

    let args: Vec<String> = std::env::args().collect();
    let worker = |f: fn(usize)| {
        let Some(n) = args.get(2).and_then(|s| s.parse().ok()) else {
            eprintln!("usage: demo_producer_consumer [produce|consume <n>]");
            std::process::exit(1);
        };
        f(n);
    };
    match args.get(1).map(String::as_str) {
        None => run_coordinator(),
        Some("produce") => worker(run_producer),
        Some("consume") => worker(run_consumer),
        Some(other) => {
            eprintln!("unknown role: {other}  (run with no arguments)");
            std::process::exit(1);
        }
    }
}
