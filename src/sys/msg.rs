// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// System V message queue syscalls. The kernel ABI wants a struct of
// `{ long mtype; char mtext[]; }`; the helpers here splice the tag in and
// out of a byte buffer so callers only ever see `(tag, payload)` pairs.

use std::io;
use std::mem;

use crate::sys::PERMS;

const TAG_LEN: usize = mem::size_of::<libc::c_long>();

/// Create or open the queue for `key`.
pub(crate) fn get(key: i32) -> io::Result<i32> {
    let id = unsafe { libc::msgget(key, libc::IPC_CREAT | PERMS) };
    if id == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(id)
}

/// Enqueue one message. `flags` may carry `IPC_NOWAIT`, in which case a
/// full queue fails with `EAGAIN` instead of blocking.
pub(crate) fn send(id: i32, tag: i64, payload: &[u8], flags: i32) -> io::Result<()> {
    let mut buf = Vec::with_capacity(TAG_LEN + payload.len());
    buf.extend_from_slice(&(tag as libc::c_long).to_ne_bytes());
    buf.extend_from_slice(payload);

    let rc = unsafe { libc::msgsnd(id, buf.as_ptr() as *const libc::c_void, payload.len(), flags) };
    if rc == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Dequeue the oldest message matching `desired` (0 accepts any tag).
/// Returns the actual tag and the payload. With `IPC_NOWAIT` in `flags`
/// an empty match fails with `ENOMSG`.
pub(crate) fn recv(id: i32, desired: i64, max_size: usize, flags: i32) -> io::Result<(i64, Vec<u8>)> {
    let mut buf = vec![0u8; TAG_LEN + max_size];

    let n = unsafe {
        libc::msgrcv(
            id,
            buf.as_mut_ptr() as *mut libc::c_void,
            max_size,
            desired as libc::c_long,
            flags,
        )
    };
    if n == -1 {
        return Err(io::Error::last_os_error());
    }

    let mut tag_bytes = [0u8; TAG_LEN];
    tag_bytes.copy_from_slice(&buf[..TAG_LEN]);
    let tag = libc::c_long::from_ne_bytes(tag_bytes) as i64;

    buf.truncate(TAG_LEN + n as usize);
    Ok((tag, buf.split_off(TAG_LEN)))
}

/// `IPC_STAT` the queue.
pub(crate) fn stat(id: i32) -> io::Result<libc::msqid_ds> {
    let mut ds: libc::msqid_ds = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::msgctl(id, libc::IPC_STAT, &mut ds) };
    if rc == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(ds)
}

/// `IPC_SET` the queue from a descriptor previously filled by [`stat`].
/// Only `msg_perm.uid`, `msg_perm.gid`, `msg_perm.mode` and `msg_qbytes`
/// are honored by the kernel.
pub(crate) fn set(id: i32, ds: &mut libc::msqid_ds) -> io::Result<()> {
    let rc = unsafe { libc::msgctl(id, libc::IPC_SET, ds) };
    if rc == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Remove the queue. Blocked senders and receivers fail with `EIDRM`.
pub(crate) fn remove(id: i32) -> io::Result<()> {
    let rc = unsafe { libc::msgctl(id, libc::IPC_RMID, std::ptr::null_mut()) };
    if rc == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
