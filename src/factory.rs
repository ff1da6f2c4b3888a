// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Identifier-based construction of IPC primitives. Keys resolve through
// a keyring; a failed construction can regenerate the key and retry.

use std::panic::Location;

use crate::channel::MessageChannel;
use crate::error::{Error, Result};
use crate::key::KernelKey;
use crate::keyring::Keyring;
use crate::lightswitch::Lightswitch;
use crate::mutex::Mutex;
use crate::semaphore::CountingSemaphore;
use crate::store::SharedMemoryStore;

// Counter stores of composed primitives hold two small integers; 512
// bytes leaves generous headroom for the map framing.
const COMPONENT_STORE_BYTES: usize = 512;

/// Builds IPC primitives by identifier, resolving keys through a
/// [`Keyring`].
///
/// Composite primitives get their component keys from the identifier
/// plus a fixed suffix per component, so two processes constructing
/// `"buffer"` end up on the same kernel objects without exchanging keys.
///
/// A factory starts with a retry limit of one: construction failures
/// surface immediately. With a higher limit, a failed construction
/// regenerates the identifier's key and tries again, which recovers
/// from a minted key colliding with some unrelated program's System V
/// objects.
pub struct ResourceFactory {
    keyring: Keyring,
    retry_limit: u32,
}

impl ResourceFactory {
    /// Build primitives against the given keyring.
    pub fn new(keyring: Keyring) -> Self {
        Self {
            keyring,
            retry_limit: 1,
        }
    }

    /// Build primitives against the machine-wide default keyring,
    /// creating it on first use.
    pub fn with_well_known_keyring() -> Result<Self> {
        Ok(Self::new(Keyring::well_known()?))
    }

    /// Cap construction attempts per component. Values below one behave
    /// as one.
    pub fn set_retry_limit(&mut self, limit: u32) {
        self.retry_limit = limit;
    }

    /// The keyring this factory resolves identifiers through.
    pub fn keyring(&self) -> &Keyring {
        &self.keyring
    }

    /// Give the keyring back, e.g. to delete it.
    pub fn into_keyring(self) -> Keyring {
        self.keyring
    }

    /// A mutex on the identifier's key.
    #[track_caller]
    pub fn new_mutex(&self, identifier: &str) -> Result<Mutex> {
        self.allocate(identifier, Location::caller(), Mutex::new)
    }

    /// A shared memory store of `bytes` capacity on the identifier's
    /// key.
    #[track_caller]
    pub fn new_shared_memory(&self, identifier: &str, bytes: usize) -> Result<SharedMemoryStore> {
        self.allocate(identifier, Location::caller(), |key| {
            SharedMemoryStore::new(key, bytes)
        })
    }

    /// A message channel on the identifier's key.
    #[track_caller]
    pub fn new_message_queue(&self, identifier: &str) -> Result<MessageChannel> {
        self.allocate(identifier, Location::caller(), MessageChannel::new)
    }

    /// A counting semaphore over three derived identifiers:
    /// `{identifier}_lck`, `{identifier}_shm`, and `{identifier}_msg`.
    ///
    /// `max_count` follows the [`CountingSemaphore::new`] contract:
    /// required the first time, optional for later processes.
    #[track_caller]
    pub fn new_semaphore(
        &self,
        identifier: &str,
        max_count: Option<u32>,
    ) -> Result<CountingSemaphore> {
        self.semaphore_at(identifier, max_count, Location::caller())
    }

    /// A lightswitch over `{identifier}_lck`, `{identifier}_shm`, and a
    /// single-slot semaphore on `{identifier}_sem`.
    #[track_caller]
    pub fn new_lightswitch(&self, identifier: &str) -> Result<Lightswitch> {
        let location = Location::caller();
        let mutex = self.allocate(&format!("{identifier}_lck"), location, Mutex::new)?;
        let counter = self.allocate(&format!("{identifier}_shm"), location, |key| {
            SharedMemoryStore::new(key, COMPONENT_STORE_BYTES)
        })?;
        let semaphore = self.semaphore_at(&format!("{identifier}_sem"), Some(1), location)?;
        Lightswitch::new(mutex, counter, semaphore)
    }

    fn semaphore_at(
        &self,
        identifier: &str,
        max_count: Option<u32>,
        location: &Location<'_>,
    ) -> Result<CountingSemaphore> {
        let mutex = self.allocate(&format!("{identifier}_lck"), location, Mutex::new)?;
        let counter = self.allocate(&format!("{identifier}_shm"), location, |key| {
            SharedMemoryStore::new(key, COMPONENT_STORE_BYTES)
        })?;
        let channel = self.allocate(&format!("{identifier}_msg"), location, MessageChannel::new)?;
        CountingSemaphore::new(mutex, counter, channel, max_count)
    }

    // Resolve the identifier's key and run the constructor, minting a
    // fresh key before each retry. The caller's location is threaded
    // through so keyring provenance points at user code, not here.
    fn allocate<T>(
        &self,
        identifier: &str,
        location: &Location<'_>,
        build: impl Fn(KernelKey) -> Result<T>,
    ) -> Result<T> {
        let attempts = self.retry_limit.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = self
                .keyring
                .get_key_at(identifier, attempt > 1, location)
                .and_then(&build);
            match result {
                Ok(value) => return Ok(value),
                Err(e) if attempt < attempts => {
                    tracing::warn!(
                        identifier,
                        attempt,
                        error = %e,
                        "resource construction failed, regenerating key"
                    );
                }
                Err(e) => {
                    return Err(Error::AllocationFailed {
                        attempts: attempt,
                        source: Box::new(e),
                    })
                }
            }
        }
    }
}
