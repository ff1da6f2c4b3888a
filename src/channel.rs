// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Typed message channel over one System V message queue. Messages carry a
// positive integer tag; receivers select by tag (0 matches any) in FIFO
// order among matching messages. Blocking receive is the one place the
// whole crate parks a process without burning CPU, which is why the
// counting semaphore routes its wake-ups through here.

use std::cell::RefCell;
use std::io;

use crate::error::{Error, Result};
use crate::key::KernelKey;
use crate::sys;

/// Whether an operation may park the calling process or must return
/// immediately. Non-blocking misses surface as [`Error::WouldBlock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitMode {
    Blocking,
    NonBlocking,
}

impl WaitMode {
    fn flags(self) -> i32 {
        match self {
            WaitMode::Blocking => 0,
            WaitMode::NonBlocking => libc::IPC_NOWAIT,
        }
    }
}

/// Point-in-time queue status from `IPC_STAT`.
#[derive(Debug, Clone, Copy)]
pub struct ChannelStatus {
    /// Messages currently queued.
    pub depth: u64,
    /// Byte capacity of the queue.
    pub capacity: usize,
    pub owner_uid: u32,
    pub owner_gid: u32,
    /// Permission bits, `ipcs(1)` style.
    pub mode: u32,
    pub last_sender_pid: i32,
    pub last_receiver_pid: i32,
}

pub struct MessageChannel {
    key: KernelKey,
    msqid: i32,
    last: RefCell<Option<(i64, Vec<u8>)>>,
}

impl MessageChannel {
    /// Create or open the queue under `key`.
    pub fn new(key: KernelKey) -> Result<Self> {
        let msqid = sys::msg::get(key.as_raw()).map_err(|e| Error::Channel {
            key,
            op: "msgget",
            source: e,
        })?;
        Ok(Self {
            key,
            msqid,
            last: RefCell::new(None),
        })
    }

    /// The kernel key naming this queue.
    pub fn key(&self) -> KernelKey {
        self.key
    }

    // -----------------------------------------------------------------------
    // Send / receive
    // -----------------------------------------------------------------------

    /// Enqueue `payload` under `tag` (must be positive). A payload larger
    /// than the queue's byte capacity is refused outright, before any
    /// kernel call, since no receiver could ever drain enough space for
    /// it. A full queue blocks in [`WaitMode::Blocking`] and fails with
    /// [`Error::WouldBlock`] otherwise.
    pub fn send(&self, payload: &[u8], tag: i64, mode: WaitMode) -> Result<()> {
        let capacity = self.status()?.capacity;
        if payload.len() > capacity {
            return Err(Error::PayloadTooLarge {
                size: payload.len(),
                capacity,
            });
        }

        sys::msg::send(self.msqid, tag, payload, mode.flags()).map_err(|e| {
            match e.raw_os_error() {
                Some(libc::EAGAIN) => Error::WouldBlock,
                _ => self.err("msgsnd", e),
            }
        })
    }

    /// Dequeue the oldest message whose tag matches `desired_tag`
    /// (0 matches any tag). In [`WaitMode::Blocking`] the calling process
    /// is suspended until a match arrives or the queue is destroyed, which
    /// fails the call; in [`WaitMode::NonBlocking`] an empty match fails
    /// with [`Error::WouldBlock`] without consuming anything.
    ///
    /// `max_size` bounds the accepted payload; it defaults to the queue's
    /// byte capacity, which no single message can exceed. The received
    /// tag and payload are retained for [`last_tag`](Self::last_tag) /
    /// [`last_payload`](Self::last_payload).
    pub fn receive(
        &self,
        desired_tag: i64,
        mode: WaitMode,
        max_size: Option<usize>,
    ) -> Result<Vec<u8>> {
        let max = match max_size {
            Some(n) => n,
            None => self.status()?.capacity,
        };

        let (tag, payload) = sys::msg::recv(self.msqid, desired_tag, max, mode.flags())
            .map_err(|e| match e.raw_os_error() {
                Some(libc::ENOMSG) | Some(libc::EAGAIN) => Error::WouldBlock,
                _ => self.err("msgrcv", e),
            })?;

        *self.last.borrow_mut() = Some((tag, payload.clone()));
        Ok(payload)
    }

    /// Tag of the most recently received message, if any.
    pub fn last_tag(&self) -> Option<i64> {
        self.last.borrow().as_ref().map(|(tag, _)| *tag)
    }

    /// Payload of the most recently received message, if any.
    pub fn last_payload(&self) -> Option<Vec<u8>> {
        self.last.borrow().as_ref().map(|(_, payload)| payload.clone())
    }

    // -----------------------------------------------------------------------
    // Inspection and configuration
    // -----------------------------------------------------------------------

    /// Messages currently queued.
    pub fn count(&self) -> Result<u64> {
        Ok(self.status()?.depth)
    }

    /// Byte capacity of the queue.
    pub fn capacity(&self) -> Result<usize> {
        Ok(self.status()?.capacity)
    }

    pub fn status(&self) -> Result<ChannelStatus> {
        let ds = sys::msg::stat(self.msqid).map_err(|e| self.err("msgctl", e))?;
        Ok(ChannelStatus {
            depth: ds.msg_qnum as u64,
            capacity: ds.msg_qbytes as usize,
            owner_uid: ds.msg_perm.uid as u32,
            owner_gid: ds.msg_perm.gid as u32,
            mode: ds.msg_perm.mode as u32,
            last_sender_pid: ds.msg_lspid as i32,
            last_receiver_pid: ds.msg_lrpid as i32,
        })
    }

    /// Whether the calling process may reconfigure the queue: root, the
    /// owning user, the owning group, or anyone when the mode grants
    /// write access.
    pub fn is_configurable(&self) -> Result<bool> {
        let st = self.status()?;
        let euid = unsafe { libc::geteuid() };
        let egid = unsafe { libc::getegid() };
        Ok(euid == 0 || st.owner_uid == euid || st.owner_gid == egid || st.mode & 0o222 != 0)
    }

    /// Change the queue's byte capacity. Raising it above the system
    /// limit requires privilege.
    pub fn resize(&self, bytes: usize) -> Result<()> {
        if !self.is_configurable()? {
            return Err(Error::PermissionDenied { key: self.key });
        }
        let mut ds = sys::msg::stat(self.msqid).map_err(|e| self.err("msgctl", e))?;
        ds.msg_qbytes = bytes as _;
        sys::msg::set(self.msqid, &mut ds).map_err(|e| self.err("msgctl", e))
    }

    /// Change the queue's owner, group, and permission bits.
    pub fn set_permissions(&self, uid: u32, gid: u32, mode: u32) -> Result<()> {
        if !self.is_configurable()? {
            return Err(Error::PermissionDenied { key: self.key });
        }
        let mut ds = sys::msg::stat(self.msqid).map_err(|e| self.err("msgctl", e))?;
        ds.msg_perm.uid = uid as _;
        ds.msg_perm.gid = gid as _;
        ds.msg_perm.mode = mode as _;
        sys::msg::set(self.msqid, &mut ds).map_err(|e| self.err("msgctl", e))
    }

    /// Remove the queue. Processes blocked on it fail with
    /// [`Error::ResourceGone`], and every later operation through any
    /// handle fails too.
    pub fn delete(self) -> Result<()> {
        sys::msg::remove(self.msqid).map_err(|e| self.err("msgctl", e))
    }

    // EIDRM is what a blocked call gets when the queue is removed out
    // from under it.
    fn err(&self, op: &'static str, source: io::Error) -> Error {
        match source.raw_os_error() {
            Some(libc::EPERM) => Error::PermissionDenied { key: self.key },
            Some(libc::EIDRM) => Error::ResourceGone { key: self.key },
            _ => Error::Channel {
                key: self.key,
                op,
                source,
            },
        }
    }
}
