// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Thin wrappers over the System V IPC syscalls. Everything here returns
// `io::Result` with the raw errno; mapping onto the crate error taxonomy
// happens in the public modules, which know what the failure means.

pub(crate) mod msg;
pub(crate) mod sem;
pub(crate) mod shm;

/// Mode bits passed to `semget`/`shmget`/`msgget`. World read/write, the
/// same default the kernel objects get from most IPC tooling; callers that
/// need tighter queues reconfigure them afterwards.
pub(crate) const PERMS: libc::c_int = 0o666;
