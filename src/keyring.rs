// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Registry of kernel keys indexed by human-readable identifiers, itself
// stored in a shared segment so every process resolving "buffer_lck"
// lands on the same key. Each minted key carries provenance (pid,
// timestamp, call site) for the post-mortem question every System V
// shop eventually asks: who left this segment behind?

use std::collections::BTreeMap;
use std::panic::Location;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::key::{well_known_key, KernelKey};
use crate::mutex::Mutex;
use crate::store::SharedMemoryStore;

const REGISTRY_FIELD: &str = "registry";

// Bootstrap coordinates of the shared default keyring. These are the
// only keys derived from a path instead of minted at random; every
// process computes the same pair without prior agreement.
const BOOTSTRAP_PATH: &str = "svsync/keyring";
const BOOTSTRAP_BYTES: usize = 8 * 1024;

/// Where, when, and by whom a key was minted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRecord {
    pub owner_pid: u32,
    pub created_at: u64,
    pub source_file: String,
    pub source_line: u32,
    pub caller: String,
}

/// One row of [`Keyring::stat`]: an identifier, its key, and the
/// provenance of the minting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEntry {
    pub identifier: String,
    pub key: KernelKey,
    pub record: KeyRecord,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Registry {
    identifiers: BTreeMap<String, KernelKey>,
    keys: BTreeMap<KernelKey, KeyRecord>,
}

/// A shared map from identifiers to kernel keys.
///
/// Processes that agree on an identifier string get the same key back
/// from [`get_key`](Self::get_key), whichever of them asked first. The
/// map lives in a [`SharedMemoryStore`] and every mutation runs under a
/// [`Mutex`], so concurrent minters cannot hand out conflicting keys.
pub struct Keyring {
    mutex: Mutex,
    store: SharedMemoryStore,
}

impl Keyring {
    /// Wrap a mutex and store as a keyring, writing an empty registry
    /// if the store does not hold one yet.
    pub fn new(mutex: Mutex, store: SharedMemoryStore) -> Result<Self> {
        mutex.with(|| {
            if !store.contains(REGISTRY_FIELD)? {
                store.set(REGISTRY_FIELD, &Registry::default())?;
            }
            Ok(())
        })?;

        Ok(Self { mutex, store })
    }

    /// Open the machine-wide default keyring, creating it on first use.
    pub fn well_known() -> Result<Self> {
        let mutex = Mutex::new(well_known_key(BOOTSTRAP_PATH, 1))?;
        let store = SharedMemoryStore::new(well_known_key(BOOTSTRAP_PATH, 2), BOOTSTRAP_BYTES)?;
        Self::new(mutex, store)
    }

    /// Resolve an identifier to a key, minting one if the identifier is
    /// new.
    ///
    /// With `regenerate` the identifier is rebound to a fresh key even
    /// if it already had one; the tombstoned key's record is dropped.
    /// That is the escape hatch for a key that collided with some other
    /// program's System V objects.
    #[track_caller]
    pub fn get_key(&self, identifier: &str, regenerate: bool) -> Result<KernelKey> {
        self.get_key_at(identifier, regenerate, Location::caller())
    }

    pub(crate) fn get_key_at(
        &self,
        identifier: &str,
        regenerate: bool,
        location: &Location<'_>,
    ) -> Result<KernelKey> {
        if !regenerate {
            // Common case: the identifier is already bound. A plain read
            // suffices; bindings are never mutated in place, only
            // replaced under the mutex.
            if let Some(key) = self.registry()?.identifiers.get(identifier) {
                return Ok(*key);
            }
        }

        let record = record_for(location);
        self.with_registry(|registry| {
            if let Some(&existing) = registry.identifiers.get(identifier) {
                if !regenerate {
                    // Someone minted it between our unlocked read and
                    // taking the mutex. Theirs wins.
                    return Ok((existing, false));
                }
                registry.keys.remove(&existing);
            }
            let key = mint_key(registry);
            registry.identifiers.insert(identifier.to_owned(), key);
            registry.keys.insert(key, record);
            tracing::debug!(identifier, key = %key, "minted keyring entry");
            Ok((key, true))
        })
    }

    /// Mint a key for an identifier that must not already be bound.
    ///
    /// Refuses with [`Error::Conflict`] if the identifier exists, unless
    /// `overwrite` is set, in which case the old binding is replaced.
    #[track_caller]
    pub fn add_key(&self, identifier: &str, overwrite: bool) -> Result<KernelKey> {
        let record = record_for(Location::caller());
        self.with_registry(|registry| {
            if let Some(&existing) = registry.identifiers.get(identifier) {
                if !overwrite {
                    return Err(Error::Conflict {
                        identifier: identifier.to_owned(),
                    });
                }
                registry.keys.remove(&existing);
            }
            let key = mint_key(registry);
            registry.identifiers.insert(identifier.to_owned(), key);
            registry.keys.insert(key, record);
            tracing::debug!(identifier, key = %key, "minted keyring entry");
            Ok((key, true))
        })
    }

    /// Drop an identifier's binding. A no-op if the identifier is
    /// unknown.
    pub fn remove_identifier(&self, identifier: &str) -> Result<()> {
        self.with_registry(|registry| {
            let Some(key) = registry.identifiers.remove(identifier) else {
                return Ok(((), false));
            };
            registry.keys.remove(&key);
            Ok(((), true))
        })
    }

    /// Drop a key and every identifier bound to it. A no-op if the key
    /// is unknown.
    pub fn remove_key(&self, key: KernelKey) -> Result<()> {
        self.with_registry(|registry| {
            if registry.keys.remove(&key).is_none() {
                return Ok(((), false));
            }
            registry.identifiers.retain(|_, bound| *bound != key);
            Ok(((), true))
        })
    }

    /// Number of bound identifiers.
    pub fn count(&self) -> Result<usize> {
        Ok(self.registry()?.identifiers.len())
    }

    /// Snapshot of every binding with its provenance, sorted by
    /// identifier.
    pub fn stat(&self) -> Result<Vec<KeyEntry>> {
        let registry = self.registry()?;
        let mut entries = Vec::with_capacity(registry.identifiers.len());
        for (identifier, key) in &registry.identifiers {
            if let Some(record) = registry.keys.get(key) {
                entries.push(KeyEntry {
                    identifier: identifier.clone(),
                    key: *key,
                    record: record.clone(),
                });
            }
        }
        Ok(entries)
    }

    /// Tear down the keyring's own kernel objects.
    ///
    /// Registered keys are not touched: the resources behind them may
    /// still be live, and their removal belongs to whoever owns them.
    /// A failure to remove the backing segment is logged and skipped so
    /// the mutex still comes down; mutex errors are surfaced.
    pub fn delete(self) -> Result<()> {
        let Keyring { mutex, store } = self;

        mutex.acquire()?;
        if let Err(e) = store.delete() {
            tracing::warn!(error = %e, "keyring store removal failed");
        }
        mutex.release()?;
        mutex.delete()
    }

    // Reads may go without the mutex: writers replace the registry blob
    // in one `set`, so a reader sees either the old or the new value.
    fn registry(&self) -> Result<Registry> {
        self.store.get(REGISTRY_FIELD)
    }

    // Read-modify-write of the registry under the mutex. The closure
    // reports whether it changed anything; untouched registries are not
    // written back.
    fn with_registry<T>(&self, f: impl FnOnce(&mut Registry) -> Result<(T, bool)>) -> Result<T> {
        self.mutex.with(|| {
            let mut registry: Registry = self.store.get(REGISTRY_FIELD)?;
            let (value, dirty) = f(&mut registry)?;
            if dirty {
                self.store.set(REGISTRY_FIELD, &registry)?;
            }
            Ok(value)
        })
    }
}

// Draw random keys until one is free in this registry. Randomness makes
// collisions with keys minted elsewhere unlikely; collisions within the
// registry are ruled out here.
fn mint_key(registry: &Registry) -> KernelKey {
    loop {
        let key = KernelKey::generate();
        if !registry.keys.contains_key(&key) && !registry.identifiers.values().any(|k| *k == key) {
            return key;
        }
    }
}

fn record_for(location: &Location<'_>) -> KeyRecord {
    let created_at = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    KeyRecord {
        owner_pid: std::process::id(),
        created_at,
        source_file: location.file().to_owned(),
        source_line: location.line(),
        caller: process_name(),
    }
}

fn process_name() -> String {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| String::from("unknown"))
}
