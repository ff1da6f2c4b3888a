// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Dining philosophers across real processes.
//
// Usage:
//   demo_philosophers                      (spawns the table)
//   demo_philosophers philosopher <seat>   (internal child role)
//
// Five child processes share five fork mutexes resolved by name
// through the well-known keyring. Each philosopher grabs the
// lower-numbered fork first; with every process agreeing on that
// order the circular wait of the naive solution cannot form.

use std::process::{Child, Command};
use std::thread;
use std::time::Duration;

use rand::Rng;
use tracing_subscriber::EnvFilter;

use svsync::ResourceFactory;

const PHILOSOPHERS: usize = 5;
const ROUNDS: usize = 3;

fn fork_name(n: usize) -> String {
    format!("fork_{n}")
}

fn run_table() {
    let exe = std::env::current_exe().expect("current exe");
    let factory = ResourceFactory::with_well_known_keyring().expect("open keyring");

    // Mint the fork keys up front so the children only resolve them.
    let forks: Vec<svsync::Mutex> = (0..PHILOSOPHERS)
        .map(|n| factory.new_mutex(&fork_name(n)).expect("create fork"))
        .collect();

    println!("table: seating {PHILOSOPHERS} philosophers for {ROUNDS} rounds each");

    let children: Vec<Child> = (0..PHILOSOPHERS)
        .map(|n| {
            Command::new(&exe)
                .arg("philosopher")
                .arg(n.to_string())
                .spawn()
                .expect("spawn philosopher")
        })
        .collect();

    for mut child in children {
        let status = child.wait().expect("wait for philosopher");
        if !status.success() {
            eprintln!("table: a philosopher exited with {status}");
        }
    }

    for (n, fork) in forks.into_iter().enumerate() {
        fork.delete().expect("delete fork");
        factory
            .keyring()
            .remove_identifier(&fork_name(n))
            .expect("unregister fork");
    }
    println!("table: cleaned up");
}

fn run_philosopher(seat: usize) {
    let factory = ResourceFactory::with_well_known_keyring().expect("open keyring");

    let left = seat;
    let right = (seat + 1) % PHILOSOPHERS;
    let (first, second) = if left < right {
        (left, right)
    } else {
        (right, left)
    };
    let first = factory.new_mutex(&fork_name(first)).expect("first fork");
    let second = factory.new_mutex(&fork_name(second)).expect("second fork");

    let mut rng = rand::thread_rng();
    for round in 1..=ROUNDS {
        thread::sleep(Duration::from_millis(rng.gen_range(10..60)));

        let _first = first.lock().expect("lock first fork");
        let _second = second.lock().expect("lock second fork");
        println!("philosopher {seat}: eating (round {round})");
        thread::sleep(Duration::from_millis(rng.gen_range(10..40)));
    }
    println!("philosopher {seat}: done");
}

fn main() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .try_init();

    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(String::as_str) {
        None => run_table(),
        Some("philosopher") => {
            let Some(seat) = args.get(2).and_then(|s| s.parse().ok()) else {
                eprintln!("usage: demo_philosophers philosopher <seat>");
                std::process::exit(1);
            };
            run_philosopher(seat);
        }
        Some(other) => {
            eprintln!("unknown role: {other}  (run with no arguments)");
            std::process::exit(1);
        }
    }
}
