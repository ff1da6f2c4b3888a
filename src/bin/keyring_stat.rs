// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Usage:
//   keyring_stat
//
// Prints every binding of the machine-wide keyring with its minting
// provenance. Handy when stale System V objects pile up and nobody
// remembers which program made them.

use std::time::{SystemTime, UNIX_EPOCH};

use tracing_subscriber::EnvFilter;

use svsync::Keyring;

fn main() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .try_init();

    let keyring = Keyring::well_known().expect("open keyring");
    let entries = keyring.stat().expect("read keyring");
    if entries.is_empty() {
        println!("keyring is empty");
        return;
    }

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    println!(
        "{:<28} {:>10} {:>7} {:>8}  minted by",
        "identifier", "key", "pid", "age"
    );
    for entry in &entries {
        let age = now.saturating_sub(entry.record.created_at);
        println!(
            "{:<28} {:>10} {:>7} {:>7}s  {}:{} ({})",
            entry.identifier,
            entry.key.to_string(),
            entry.record.owner_pid,
            age,
            entry.record.source_file,
            entry.record.source_line,
            entry.record.caller,
        );
    }
    println!("{} identifiers", entries.len());
}
