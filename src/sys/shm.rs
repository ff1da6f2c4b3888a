// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// System V shared memory syscalls.

use std::io;
use std::ptr;

/// Create or open the segment for `key`. With `IPC_CREAT` in `flags` a
/// missing segment is created at `size` bytes; an existing one is opened
/// as long as `size` does not exceed what it was created with.
pub(crate) fn get(key: i32, size: usize, flags: i32) -> io::Result<i32> {
    let id = unsafe { libc::shmget(key, size, flags) };
    if id == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(id)
}

/// Map the segment into this process at a kernel-chosen address.
pub(crate) fn attach(id: i32) -> io::Result<*mut u8> {
    let addr = unsafe { libc::shmat(id, ptr::null(), 0) };
    if addr as isize == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(addr as *mut u8)
}

/// Unmap a previously attached segment.
pub(crate) fn detach(addr: *mut u8) -> io::Result<()> {
    let rc = unsafe { libc::shmdt(addr as *const libc::c_void) };
    if rc == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// `IPC_STAT` the segment. Fails with `EINVAL`/`EIDRM` once the segment
/// has been removed, which is how liveness is detected.
pub(crate) fn stat(id: i32) -> io::Result<libc::shmid_ds> {
    let mut ds: libc::shmid_ds = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::shmctl(id, libc::IPC_STAT, &mut ds) };
    if rc == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(ds)
}

/// Mark the segment for destruction. Existing attachments stay mapped
/// until they detach; new operations on the id fail.
pub(crate) fn remove(id: i32) -> io::Result<()> {
    let rc = unsafe { libc::shmctl(id, libc::IPC_RMID, ptr::null_mut()) };
    if rc == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
