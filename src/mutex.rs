// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Binary inter-process mutex over a System V semaphore set. The set
// carries three members: the lock value, a usage counter, and an
// initialization lock. The first process through the handshake sets the
// value to 1; everyone registers usage with SEM_UNDO so the kernel backs
// out held locks and usage counts when a process dies.

use std::cell::RefCell;
use std::io;
use std::time::Instant;

use crate::error::{Error, Result};
use crate::key::KernelKey;
use crate::sys;
use crate::sys::sem::{INIT_LOCK, USAGE, VALUE};

const UNDO: i16 = libc::SEM_UNDO as i16;

/// Non-recursive mutual exclusion across processes.
///
/// Acquisition is tracked per handle, not in the kernel: a handle that
/// already holds the lock refuses to acquire again, and a handle that
/// does not hold it refuses to release. Two handles on the same key in
/// one process are independent as far as that bookkeeping goes; the
/// kernel semaphore is what actually serializes them.
pub struct Mutex {
    key: KernelKey,
    semid: i32,
    // Timestamps of unreleased acquisitions through this handle. The
    // RefCell keeps the handle single-threaded by construction (!Sync);
    // cross-thread use means one handle per thread, like any other
    // process in the group.
    acquisitions: RefCell<Vec<Instant>>,
}

impl Mutex {
    /// Create or open the mutex under `key`.
    ///
    /// Initialization handshake: grab the init lock with an atomic
    /// wait-for-zero + increment, check the usage counter, and only when
    /// it reads zero set the lock value to 1. Every handle then registers
    /// itself on the usage counter with SEM_UNDO, so the "first user"
    /// check keeps working after processes exit in any order.
    pub fn new(key: KernelKey) -> Result<Self> {
        let semid = sys::sem::get(key.as_raw()).map_err(|e| err(key, "semget", e))?;

        let mut grab = [
            sys::sem::buf(INIT_LOCK, 0, 0),
            sys::sem::buf(INIT_LOCK, 1, UNDO),
        ];
        sys::sem::op(semid, &mut grab).map_err(|e| err(key, "semop", e))?;

        let users = sys::sem::getval(semid, USAGE).map_err(|e| err(key, "semctl", e))?;
        if users == 0 {
            sys::sem::setval(semid, VALUE, 1).map_err(|e| err(key, "semctl", e))?;
        }

        let mut register = [sys::sem::buf(USAGE, 1, UNDO)];
        sys::sem::op(semid, &mut register).map_err(|e| err(key, "semop", e))?;

        let mut release_init = [sys::sem::buf(INIT_LOCK, -1, UNDO)];
        sys::sem::op(semid, &mut release_init).map_err(|e| err(key, "semop", e))?;

        Ok(Self {
            key,
            semid,
            acquisitions: RefCell::new(Vec::new()),
        })
    }

    /// The kernel key naming this mutex.
    pub fn key(&self) -> KernelKey {
        self.key
    }

    /// Block until this handle holds the lock.
    ///
    /// Fails with [`Error::Logic`] if the handle already holds it, and
    /// with [`Error::Sync`] if the kernel wait fails, including when the
    /// semaphore set has been removed or the wait is interrupted by a
    /// signal.
    pub fn acquire(&self) -> Result<()> {
        if !self.acquisitions.borrow().is_empty() {
            return Err(Error::Logic("cannot acquire a mutex without releasing it first"));
        }

        let mut down = [sys::sem::buf(VALUE, -1, UNDO)];
        sys::sem::op(self.semid, &mut down).map_err(|e| err(self.key, "semop", e))?;

        self.acquisitions.borrow_mut().push(Instant::now());
        Ok(())
    }

    /// Give the lock back.
    ///
    /// Fails with [`Error::Logic`] if this handle does not hold it.
    pub fn release(&self) -> Result<()> {
        if self.acquisitions.borrow().is_empty() {
            return Err(Error::Logic("cannot release a mutex without acquiring it first"));
        }

        let mut up = [sys::sem::buf(VALUE, 1, UNDO)];
        sys::sem::op(self.semid, &mut up).map_err(|e| err(self.key, "semop", e))?;

        self.acquisitions.borrow_mut().pop();
        Ok(())
    }

    /// Acquire and return a guard that releases on drop.
    pub fn lock(&self) -> Result<MutexGuard<'_>> {
        self.acquire()?;
        Ok(MutexGuard {
            mutex: self,
            armed: true,
        })
    }

    /// Run `f` while holding the lock.
    ///
    /// The release error, if any, surfaces unless `f` already failed, in
    /// which case `f`'s error wins.
    pub fn with<T>(&self, f: impl FnOnce() -> Result<T>) -> Result<T> {
        self.acquire()?;
        let result = f();
        match self.release() {
            Ok(()) => result,
            Err(e) => result.and(Err(e)),
        }
    }

    /// Timestamps of unreleased acquisitions through this handle.
    pub fn acquisitions(&self) -> Vec<Instant> {
        self.acquisitions.borrow().clone()
    }

    /// Remove the semaphore set from the kernel. Waiters blocked on it
    /// fail with [`Error::ResourceGone`]; any handle that touches it
    /// afterwards fails with [`Error::Sync`].
    pub fn delete(self) -> Result<()> {
        sys::sem::remove(self.semid).map_err(|e| err(self.key, "semctl", e))
    }
}

// EIDRM is what a blocked semop gets when the set is removed out from
// under it.
fn err(key: KernelKey, op: &'static str, source: io::Error) -> Error {
    match source.raw_os_error() {
        Some(libc::EIDRM) => Error::ResourceGone { key },
        _ => Error::Sync { key, op, source },
    }
}

/// Holds a [`Mutex`] for a lexical scope; releases on drop.
pub struct MutexGuard<'a> {
    mutex: &'a Mutex,
    armed: bool,
}

impl MutexGuard<'_> {
    /// Release now and surface the error a silent drop would swallow.
    pub fn unlock(mut self) -> Result<()> {
        self.armed = false;
        self.mutex.release()
    }
}

impl Drop for MutexGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Err(e) = self.mutex.release() {
            tracing::warn!(key = %self.mutex.key, error = %e, "mutex release on guard drop failed");
        }
    }
}
