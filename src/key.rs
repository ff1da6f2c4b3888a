// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Kernel IPC keys: the integers naming System V semaphore sets, shared
// memory segments, and message queues. Provides random generation for the
// keyring and a deterministic path-based derivation for bootstrap keys.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// A System V IPC key: a positive integer naming one kernel object
/// (semaphore set, shared memory segment, or message queue).
///
/// Keys are process-wide rendezvous points: any process passing the same
/// key to the same constructor reaches the same kernel object. Displayed
/// in hex, which is how `ipcs(1)` prints them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KernelKey(i32);

impl KernelKey {
    /// Wrap a raw `key_t` value.
    pub const fn new(raw: i32) -> Self {
        Self(raw)
    }

    /// The raw `key_t` value passed to `semget`/`shmget`/`msgget`.
    pub const fn as_raw(self) -> i32 {
        self.0
    }

    /// Generate a fresh random key, uniform over the positive `i32` range.
    ///
    /// Uniqueness is not guaranteed here; the keyring retries on collision
    /// against its recorded live keys.
    pub fn generate() -> Self {
        Self(rand::thread_rng().gen_range(1..=i32::MAX))
    }
}

impl fmt::Display for KernelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

impl From<i32> for KernelKey {
    fn from(raw: i32) -> Self {
        Self(raw)
    }
}

// ---------------------------------------------------------------------------
// Deterministic derivation for well-known keys
// ---------------------------------------------------------------------------

/// FNV-1a 64-bit hash.
fn fnv1a_64(data: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for &b in data {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

/// Derive a well-known key from a fixed path string and a small project id.
///
/// Same shape as `ftok(3)` (path plus one distinguishing byte) but hashed,
/// so the path does not have to exist on disk. Every process using the same
/// `(path, proj)` pair lands on the same key; this is how unrelated processes
/// bootstrap onto the shared keyring before any keys have been exchanged.
pub fn well_known_key(path: &str, proj: u8) -> KernelKey {
    let mut buf = Vec::with_capacity(path.len() + 1);
    buf.extend_from_slice(path.as_bytes());
    buf.push(proj);
    let h = fnv1a_64(&buf);
    // Fold to a positive i32; key 0 is IPC_PRIVATE and must never come out.
    let folded = ((h ^ (h >> 32)) as u32) & 0x7fff_ffff;
    KernelKey(if folded == 0 { 1 } else { folded as i32 })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fnv1a_known_value() {
        // FNV-1a of empty string
        assert_eq!(fnv1a_64(b""), 0xcbf29ce484222325);
    }

    #[test]
    fn well_known_is_deterministic() {
        let a = well_known_key("svsync/keyring", 1);
        let b = well_known_key("svsync/keyring", 1);
        assert_eq!(a, b);
    }

    #[test]
    fn well_known_distinguishes_proj() {
        let a = well_known_key("svsync/keyring", 1);
        let b = well_known_key("svsync/keyring", 2);
        assert_ne!(a, b);
    }

    #[test]
    fn well_known_is_positive() {
        for proj in 0..=255u8 {
            assert!(well_known_key("some/path", proj).as_raw() > 0);
        }
    }

    #[test]
    fn generated_keys_are_positive() {
        for _ in 0..1000 {
            assert!(KernelKey::generate().as_raw() > 0);
        }
    }

    #[test]
    fn display_is_hex() {
        assert_eq!(KernelKey::new(0xdead).to_string(), "0xdead");
    }
}
