// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Keyed value storage over one System V shared memory segment. The whole
// value set lives in the segment as a single length-prefixed blob, so a
// write replaces the entire map at once, never one field in place. The
// store does no locking of its own: callers composing read-modify-write
// sequences hold an external mutex (the counting semaphore and the keyring
// are both built this way).

use std::collections::BTreeMap;
use std::io;
use std::mem;
use std::ptr;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::key::KernelKey;
use crate::sys;

// Blob framing: a native-endian u64 payload length, then the encoded map.
// A freshly created segment is zero-filled, which reads back as length 0,
// meaning an empty map. No versioning: segments never outlive the host.
const HEADER: usize = mem::size_of::<u64>();

// Destroy mark set in `shm_perm.mode` by IPC_RMID while attachments
// remain (linux/ipc.h). libc does not export it for this target.
#[cfg(target_os = "linux")]
const SHM_DEST: libc::c_int = 0o1000;

pub struct SharedMemoryStore {
    key: KernelKey,
    id: i32,
    addr: *mut u8,
}

// Safety: the mapping is valid process-wide, not tied to the creating
// thread. Not Sync — get/set are unsynchronized read-modify-write.
unsafe impl Send for SharedMemoryStore {}

impl SharedMemoryStore {
    /// Create the segment at `bytes` capacity, or open it if some other
    /// process already created it under this key. Opening an existing
    /// segment with a larger `bytes` than it was created with fails.
    pub fn new(key: KernelKey, bytes: usize) -> Result<Self> {
        let id = sys::shm::get(key.as_raw(), bytes, libc::IPC_CREAT | sys::PERMS)
            .map_err(|e| Error::Store { key, op: "shmget", source: e })?;
        Self::from_id(key, id)
    }

    /// Open an existing segment; fails if nothing lives under this key.
    pub fn attach(key: KernelKey) -> Result<Self> {
        let id = sys::shm::get(key.as_raw(), 0, sys::PERMS)
            .map_err(|e| Error::Store { key, op: "shmget", source: e })?;
        Self::from_id(key, id)
    }

    fn from_id(key: KernelKey, id: i32) -> Result<Self> {
        let addr = sys::shm::attach(id)
            .map_err(|e| Error::Store { key, op: "shmat", source: e })?;
        Ok(Self { key, id, addr })
    }

    /// The kernel key naming this segment.
    pub fn key(&self) -> KernelKey {
        self.key
    }

    /// Byte capacity of the segment as the kernel reports it.
    pub fn capacity(&self) -> Result<usize> {
        Ok(self.stat_live()?.shm_segsz as usize)
    }

    // -----------------------------------------------------------------------
    // Typed map interface
    // -----------------------------------------------------------------------

    /// Read the value stored under `field`.
    pub fn get<V: DeserializeOwned>(&self, field: &str) -> Result<V> {
        let map = self.read_map()?;
        let bytes = map
            .get(field)
            .ok_or_else(|| Error::KeyNotFound { field: field.to_string() })?;
        Ok(bincode::deserialize(bytes)?)
    }

    /// Whether `field` currently holds a value.
    pub fn contains(&self, field: &str) -> Result<bool> {
        Ok(self.read_map()?.contains_key(field))
    }

    /// Names of all stored fields, sorted.
    pub fn fields(&self) -> Result<Vec<String>> {
        Ok(self.read_map()?.into_keys().collect())
    }

    /// Store `value` under `field`, replacing any previous value. If the
    /// rewritten blob would not fit the segment, the store is left exactly
    /// as it was and the call fails with [`Error::CapacityExceeded`].
    pub fn set<V: Serialize + ?Sized>(&self, field: &str, value: &V) -> Result<()> {
        let encoded = bincode::serialize(value)?;
        let mut map = self.read_map()?;
        map.insert(field.to_string(), encoded);
        self.write_map(&map)
    }

    /// Drop `field` from the store. Absent fields are a no-op.
    pub fn unset(&self, field: &str) -> Result<()> {
        let mut map = self.read_map()?;
        if map.remove(field).is_none() {
            return Ok(());
        }
        self.write_map(&map)
    }

    /// Release the kernel segment. Handles still attached in other
    /// processes keep their mapping until they drop, but every operation
    /// through them fails with [`Error::ResourceGone`] from here on.
    pub fn delete(mut self) -> Result<()> {
        let id = self.id;
        let key = self.key;
        self.detach_now();
        sys::shm::remove(id).map_err(|e| match e.raw_os_error() {
            Some(libc::EINVAL) | Some(libc::EIDRM) => Error::ResourceGone { key },
            _ => Error::Store { key, op: "shmctl", source: e },
        })
    }

    // -----------------------------------------------------------------------
    // Blob plumbing
    // -----------------------------------------------------------------------

    /// Stat the segment, folding a removed-id errno into `ResourceGone`.
    /// Running this before every read and write is what makes deletion by
    /// another process observable instead of silently writing to orphaned
    /// pages that stay mapped here.
    fn stat_live(&self) -> Result<libc::shmid_ds> {
        let ds = sys::shm::stat(self.id).map_err(|e| match e.raw_os_error() {
            Some(libc::EINVAL) | Some(libc::EIDRM) => Error::ResourceGone { key: self.key },
            _ => Error::Store { key: self.key, op: "shmctl", source: e },
        })?;
        // While other processes stay attached, removal only marks the
        // segment; the stat itself still succeeds. Refuse to touch a
        // segment on death row, or the pages mapped here would keep
        // serving reads as if nothing happened.
        #[cfg(target_os = "linux")]
        if ds.shm_perm.mode as libc::c_int & SHM_DEST != 0 {
            return Err(Error::ResourceGone { key: self.key });
        }
        Ok(ds)
    }

    fn read_map(&self) -> Result<BTreeMap<String, Vec<u8>>> {
        let seg = self.stat_live()?.shm_segsz as usize;
        if seg < HEADER {
            return Ok(BTreeMap::new());
        }

        let mut len_bytes = [0u8; HEADER];
        unsafe { ptr::copy_nonoverlapping(self.addr, len_bytes.as_mut_ptr(), HEADER) };
        let len = u64::from_ne_bytes(len_bytes) as usize;

        if len == 0 {
            return Ok(BTreeMap::new());
        }
        if len > seg - HEADER {
            return Err(Error::Store {
                key: self.key,
                op: "read",
                source: io::Error::new(
                    io::ErrorKind::InvalidData,
                    "stored blob length exceeds segment capacity",
                ),
            });
        }

        let blob = unsafe { std::slice::from_raw_parts(self.addr.add(HEADER), len) };
        Ok(bincode::deserialize(blob)?)
    }

    fn write_map(&self, map: &BTreeMap<String, Vec<u8>>) -> Result<()> {
        let encoded = bincode::serialize(map)?;
        let seg = self.stat_live()?.shm_segsz as usize;

        let needed = HEADER + encoded.len();
        if needed > seg {
            return Err(Error::CapacityExceeded { needed, capacity: seg });
        }

        unsafe {
            ptr::copy_nonoverlapping(
                (encoded.len() as u64).to_ne_bytes().as_ptr(),
                self.addr,
                HEADER,
            );
            ptr::copy_nonoverlapping(encoded.as_ptr(), self.addr.add(HEADER), encoded.len());
        }
        Ok(())
    }

    fn detach_now(&mut self) {
        if self.addr.is_null() {
            return;
        }
        if let Err(e) = sys::shm::detach(self.addr) {
            tracing::warn!(key = %self.key, error = %e, "shared memory detach failed");
        }
        self.addr = ptr::null_mut();
    }
}

impl Drop for SharedMemoryStore {
    fn drop(&mut self) {
        self.detach_now();
    }
}
