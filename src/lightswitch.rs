// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Occupancy lock over one slot of a counting semaphore: the first
// process in takes the slot, the last one out returns it.

use crate::error::{Error, Result};
use crate::key::KernelKey;
use crate::mutex::Mutex;
use crate::semaphore::{CountingSemaphore, SemaphoreKeys};
use crate::store::SharedMemoryStore;

const OCCUPANCY_FIELD: &str = "value";

/// The kernel keys behind one lightswitch.
#[derive(Debug, Clone, Copy)]
pub struct LightswitchKeys {
    pub mutex: KernelKey,
    pub counter: KernelKey,
    pub semaphore: SemaphoreKeys,
}

/// First-in locks, last-out unlocks.
///
/// A group of processes shares one slot of the inner semaphore: the
/// first to [`lock`](Self::lock) acquires it, later lockers only bump an
/// occupancy count, and the last to [`unlock`](Self::unlock) releases
/// it. Named after the room-occupancy convention of flipping the light
/// on when entering an empty room and off when leaving it empty. The
/// usual arrangement is a readers group holding the switch against a
/// writers semaphore.
pub struct Lightswitch {
    mutex: Mutex,
    counter: SharedMemoryStore,
    semaphore: CountingSemaphore,
}

impl Lightswitch {
    /// Assemble a lightswitch over its mutex, occupancy counter, and
    /// inner semaphore. The first constructor to run zeroes the counter.
    pub fn new(
        mutex: Mutex,
        counter: SharedMemoryStore,
        semaphore: CountingSemaphore,
    ) -> Result<Self> {
        mutex.with(|| {
            if !counter.contains(OCCUPANCY_FIELD)? {
                counter.set(OCCUPANCY_FIELD, &0u32)?;
            }
            Ok(())
        })?;

        Ok(Self {
            mutex,
            counter,
            semaphore,
        })
    }

    /// Join the group, acquiring the inner semaphore if the group was
    /// empty.
    ///
    /// The semaphore is acquired while the mutex is still held, so a
    /// first locker that has to wait for the semaphore blocks every
    /// later locker behind the mutex. That ordering is deliberate:
    /// nobody may slip in and raise the occupancy count before the
    /// group actually holds its slot.
    pub fn lock(&self) -> Result<()> {
        self.mutex.with(|| {
            let occupancy: u32 = self.counter.get(OCCUPANCY_FIELD)?;
            self.counter.set(OCCUPANCY_FIELD, &(occupancy + 1))?;
            if occupancy == 0 {
                self.semaphore.acquire()?;
            }
            Ok(())
        })
    }

    /// Leave the group, releasing the inner semaphore if this was the
    /// last member out.
    pub fn unlock(&self) -> Result<()> {
        self.mutex.with(|| {
            let occupancy: u32 = self.counter.get(OCCUPANCY_FIELD)?;
            if occupancy == 0 {
                return Err(Error::Logic("lightswitch unlocked without a matching lock"));
            }
            self.counter.set(OCCUPANCY_FIELD, &(occupancy - 1))?;
            if occupancy == 1 {
                self.semaphore.release()?;
            }
            Ok(())
        })
    }

    /// Current group size, read under the mutex.
    pub fn occupancy(&self) -> Result<u32> {
        self.mutex.with(|| self.counter.get(OCCUPANCY_FIELD))
    }

    /// The kernel keys of the underlying components.
    pub fn keys(&self) -> LightswitchKeys {
        LightswitchKeys {
            mutex: self.mutex.key(),
            counter: self.counter.key(),
            semaphore: self.semaphore.keys(),
        }
    }

    /// Lock for a lexical scope; the guard unlocks on drop.
    pub fn enter(&self) -> Result<LightswitchGuard<'_>> {
        self.lock()?;
        Ok(LightswitchGuard {
            switch: self,
            armed: true,
        })
    }

    /// Tear down the mutex, the counter, and the inner semaphore's
    /// objects. Every removal is attempted; the first failure is
    /// reported after the others have run.
    pub fn delete(self) -> Result<()> {
        let Lightswitch {
            mutex,
            counter,
            semaphore,
        } = self;

        let mut first_err = None;
        if let Err(e) = mutex.delete() {
            tracing::warn!(error = %e, "lightswitch mutex removal failed");
            first_err.get_or_insert(e);
        }
        if let Err(e) = counter.delete() {
            tracing::warn!(error = %e, "lightswitch counter removal failed");
            first_err.get_or_insert(e);
        }
        if let Err(e) = semaphore.delete() {
            tracing::warn!(error = %e, "lightswitch semaphore removal failed");
            first_err.get_or_insert(e);
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Holds lightswitch membership for a lexical scope; unlocks on drop.
pub struct LightswitchGuard<'a> {
    switch: &'a Lightswitch,
    armed: bool,
}

impl LightswitchGuard<'_> {
    /// Unlock now and surface the error a silent drop would swallow.
    pub fn leave(mut self) -> Result<()> {
        self.armed = false;
        self.switch.unlock()
    }
}

impl Drop for LightswitchGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Err(e) = self.switch.unlock() {
            tracing::warn!(error = %e, "lightswitch unlock on guard drop failed");
        }
    }
}
