// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// System V semaphore set syscalls. Every set created here has three
// members: the value itself, a usage counter, and an initialization lock.
// The counter and the lock implement the classic first-user-initializes
// handshake (see mutex.rs); keeping the layout in one place means every
// handle on the same key agrees on the member indices.

use std::io;

use crate::sys::PERMS;

// Member indices within the set.
pub(crate) const VALUE: u16 = 0;
pub(crate) const USAGE: u16 = 1;
pub(crate) const INIT_LOCK: u16 = 2;

const NSEMS: libc::c_int = 3;

/// Create or open the three-member semaphore set for `key`.
pub(crate) fn get(key: i32) -> io::Result<i32> {
    let id = unsafe { libc::semget(key, NSEMS, libc::IPC_CREAT | PERMS) };
    if id == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(id)
}

/// Build one `sembuf` entry for `semop`.
pub(crate) fn buf(num: u16, op: i16, flags: i16) -> libc::sembuf {
    libc::sembuf {
        sem_num: num,
        sem_op: op,
        sem_flg: flags,
    }
}

/// Apply a batch of operations atomically. Blocks if any operation
/// cannot proceed and `IPC_NOWAIT` is not set on it.
pub(crate) fn op(id: i32, ops: &mut [libc::sembuf]) -> io::Result<()> {
    let rc = unsafe { libc::semop(id, ops.as_mut_ptr(), ops.len()) };
    if rc == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Current value of one member.
pub(crate) fn getval(id: i32, num: u16) -> io::Result<i32> {
    let val = unsafe { libc::semctl(id, num as libc::c_int, libc::GETVAL) };
    if val == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(val)
}

/// Set one member to `val` outright, bypassing the undo machinery.
pub(crate) fn setval(id: i32, num: u16, val: i32) -> io::Result<()> {
    let rc = unsafe { libc::semctl(id, num as libc::c_int, libc::SETVAL, val) };
    if rc == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Remove the whole set. Waiters blocked in `semop` fail with `EIDRM`.
pub(crate) fn remove(id: i32) -> io::Result<()> {
    let rc = unsafe { libc::semctl(id, 0, libc::IPC_RMID) };
    if rc == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
