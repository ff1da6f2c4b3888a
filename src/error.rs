// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Error taxonomy for every fallible operation in the crate. Kernel
// failures keep their errno as the source so callers can still reach
// `raw_os_error()` when they need to.

use std::io;

use thiserror::Error;

use crate::key::KernelKey;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A semaphore-set syscall failed: the mutex (or the counting
    /// semaphore built on it) could not be created, acquired, released,
    /// inspected, or removed.
    #[error("semaphore {key}: {op} failed")]
    Sync {
        key: KernelKey,
        op: &'static str,
        #[source]
        source: io::Error,
    },

    /// A message-queue syscall failed outside the would-block and
    /// permission cases, which have their own variants.
    #[error("message queue {key}: {op} failed")]
    Channel {
        key: KernelKey,
        op: &'static str,
        #[source]
        source: io::Error,
    },

    /// A shared-memory syscall failed for a reason other than the
    /// segment having been removed.
    #[error("shared memory {key}: {op} failed")]
    Store {
        key: KernelKey,
        op: &'static str,
        #[source]
        source: io::Error,
    },

    /// The kernel object behind a live handle has been removed, usually
    /// by another process deleting it. Terminal: every further operation
    /// through the handle fails the same way.
    #[error("kernel object {key} no longer exists")]
    ResourceGone { key: KernelKey },

    /// A store read found no value under the requested field, or a
    /// keyring lookup found no record for the requested identifier.
    #[error("no value stored under {field:?}")]
    KeyNotFound { field: String },

    /// A store write would not fit the segment even after evicting
    /// nothing: the serialized map exceeds the fixed capacity.
    #[error("store write needs {needed} bytes but capacity is {capacity}")]
    CapacityExceeded { needed: usize, capacity: usize },

    /// A channel send was refused before reaching the kernel because the
    /// message alone exceeds the queue's byte capacity and could never
    /// be accepted.
    #[error("payload of {size} bytes exceeds queue capacity of {capacity}")]
    PayloadTooLarge { size: usize, capacity: usize },

    /// A keyring insert found the identifier (or the freshly minted key)
    /// already registered.
    #[error("identifier {identifier:?} already registered")]
    Conflict { identifier: String },

    /// The calling process lacks the privilege for a queue
    /// reconfiguration (resize or permission change).
    #[error("not permitted to reconfigure queue {key}")]
    PermissionDenied { key: KernelKey },

    /// A non-blocking receive found no message of the requested tag, or
    /// a non-blocking send found the queue full. Retry later.
    #[error("operation would block")]
    WouldBlock,

    /// API misuse detected locally, before any syscall: re-acquiring a
    /// non-reentrant mutex, releasing without holding, stepping a
    /// lightswitch below zero.
    #[error("logic error: {0}")]
    Logic(&'static str),

    /// The factory exhausted its retry budget without finding a key
    /// acceptable to both the keyring and the kernel.
    #[error("resource allocation failed after {attempts} attempts")]
    AllocationFailed {
        attempts: u32,
        #[source]
        source: Box<Error>,
    },

    /// A stored blob failed to serialize or deserialize.
    #[error("value encoding failed")]
    InvalidValue(#[from] bincode::Error),
}

impl Error {
    /// errno carried by the underlying kernel failure, if any.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Error::Sync { source, .. }
            | Error::Channel { source, .. }
            | Error::Store { source, .. } => source.raw_os_error(),
            Error::AllocationFailed { source, .. } => source.raw_os_error(),
            _ => None,
        }
    }
}
