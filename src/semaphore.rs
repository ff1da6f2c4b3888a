// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Counting semaphore composed from a mutex, a shared counter, and a
// signaling channel. The kernel's semaphore sets could count on their
// own, but their value is not readable atomically with an update under
// the same lock, so the counter lives in shared memory guarded by the
// mutex, and waiters park on the channel instead of polling.

use crate::channel::{MessageChannel, WaitMode};
use crate::error::{Error, Result};
use crate::key::KernelKey;
use crate::mutex::Mutex;
use crate::store::SharedMemoryStore;

// Tag of the wake-up message. The payload is empty: the message means
// "a slot was freed", nothing more.
const SLOT_FREED: i64 = 2;

const MAX_COUNT_FIELD: &str = "max_count";
const VALUE_FIELD: &str = "value";

/// The kernel keys behind one semaphore, one per component.
#[derive(Debug, Clone, Copy)]
pub struct SemaphoreKeys {
    pub mutex: KernelKey,
    pub counter: KernelKey,
    pub channel: KernelKey,
}

/// A blocking counting semaphore shared between processes.
///
/// The value starts at `max_count` and stays within `[0, max_count]`.
/// [`acquire`](Self::acquire) takes a slot, blocking without busy-waiting
/// while the value is zero; [`release`](Self::release) frees one and
/// wakes a waiter when the value leaves zero.
pub struct CountingSemaphore {
    mutex: Mutex,
    counter: SharedMemoryStore,
    channel: MessageChannel,
    max_count: u32,
}

impl CountingSemaphore {
    /// Assemble a semaphore from its three components.
    ///
    /// The first constructor to run against these kernel objects
    /// initializes the counter: it must pass `Some(max_count)`, and the
    /// value starts at that maximum. Later constructors may pass `None`
    /// to adopt the stored maximum, or `Some` of the same value; a
    /// different value is refused rather than silently ignored.
    pub fn new(
        mutex: Mutex,
        counter: SharedMemoryStore,
        channel: MessageChannel,
        max_count: Option<u32>,
    ) -> Result<Self> {
        let max_count = mutex.with(|| {
            if counter.contains(MAX_COUNT_FIELD)? {
                let stored: u32 = counter.get(MAX_COUNT_FIELD)?;
                if let Some(requested) = max_count {
                    if requested != stored {
                        return Err(Error::Logic(
                            "semaphore is already initialized with a different max count",
                        ));
                    }
                }
                Ok(stored)
            } else {
                let requested = max_count
                    .ok_or(Error::Logic("max count is required to initialize a new semaphore"))?;
                counter.set(MAX_COUNT_FIELD, &requested)?;
                counter.set(VALUE_FIELD, &requested)?;
                Ok(requested)
            }
        })?;

        Ok(Self {
            mutex,
            counter,
            channel,
            max_count,
        })
    }

    /// The maximum (and starting) value.
    pub fn max_count(&self) -> u32 {
        self.max_count
    }

    /// The kernel keys of the three underlying components.
    pub fn keys(&self) -> SemaphoreKeys {
        SemaphoreKeys {
            mutex: self.mutex.key(),
            counter: self.counter.key(),
            channel: self.channel.key(),
        }
    }

    /// Take one slot, blocking while none is free.
    ///
    /// Each pass holds the mutex only long enough to test and decrement
    /// the counter. When the value is zero the mutex is released before
    /// parking on the channel, so releasers can get in; any wake-up just
    /// sends the waiter around the loop for a fresh look at the counter.
    /// More wake-ups than free slots are harmless, since the loop
    /// re-checks, but a missed wake-up would strand a waiter, which is
    /// why release signals every time the value leaves zero.
    pub fn acquire(&self) -> Result<()> {
        loop {
            let took = self.mutex.with(|| {
                let value: u32 = self.counter.get(VALUE_FIELD)?;
                if value == 0 {
                    return Ok(false);
                }
                self.counter.set(VALUE_FIELD, &(value - 1))?;
                Ok(true)
            })?;

            if took {
                return Ok(());
            }

            self.channel.receive(SLOT_FREED, WaitMode::Blocking, None)?;
        }
    }

    /// Alias for [`acquire`](Self::acquire).
    pub fn down(&self) -> Result<()> {
        self.acquire()
    }

    /// Free one slot.
    ///
    /// When the value was zero, exactly one wake-up is sent before the
    /// mutex is released. The send never blocks; failure to enqueue it
    /// is surfaced as fatal, since swallowing it could strand a waiter.
    pub fn release(&self) -> Result<()> {
        self.mutex.with(|| {
            let value: u32 = self.counter.get(VALUE_FIELD)?;
            if value >= self.max_count {
                return Err(Error::Logic("semaphore released more times than acquired"));
            }
            self.counter.set(VALUE_FIELD, &(value + 1))?;
            if value == 0 {
                self.channel.send(&[], SLOT_FREED, WaitMode::NonBlocking)?;
            }
            Ok(())
        })
    }

    /// Alias for [`release`](Self::release).
    pub fn up(&self) -> Result<()> {
        self.release()
    }

    /// Current value, read under the mutex. A snapshot only: other
    /// processes may move it the moment the mutex is released.
    pub fn read(&self) -> Result<u32> {
        self.mutex.with(|| self.counter.get(VALUE_FIELD))
    }

    /// Take a slot and hold it for a lexical scope; the guard releases
    /// on drop.
    pub fn slot(&self) -> Result<SemaphoreGuard<'_>> {
        self.acquire()?;
        Ok(SemaphoreGuard {
            semaphore: self,
            armed: true,
        })
    }

    /// Tear down all three kernel objects. Every removal is attempted;
    /// the first failure is reported after the others have run.
    pub fn delete(self) -> Result<()> {
        let CountingSemaphore {
            mutex,
            counter,
            channel,
            ..
        } = self;

        let mut first_err = None;
        if let Err(e) = mutex.delete() {
            tracing::warn!(error = %e, "semaphore mutex removal failed");
            first_err.get_or_insert(e);
        }
        if let Err(e) = counter.delete() {
            tracing::warn!(error = %e, "semaphore counter removal failed");
            first_err.get_or_insert(e);
        }
        if let Err(e) = channel.delete() {
            tracing::warn!(error = %e, "semaphore channel removal failed");
            first_err.get_or_insert(e);
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Holds one semaphore slot for a lexical scope; releases on drop.
pub struct SemaphoreGuard<'a> {
    semaphore: &'a CountingSemaphore,
    armed: bool,
}

impl SemaphoreGuard<'_> {
    /// Release now and surface the error a silent drop would swallow.
    pub fn release(mut self) -> Result<()> {
        self.armed = false;
        self.semaphore.release()
    }
}

impl Drop for SemaphoreGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Err(e) = self.semaphore.release() {
            tracing::warn!(error = %e, "semaphore release on guard drop failed");
        }
    }
}
