// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Cross-process synchronization on System V IPC: shared memory stores,
// message channels, and locks composed from them. Every primitive is
// addressed by a kernel key, so unrelated processes coordinate through
// the kernel objects alone, with no shared daemon and no common parent.

#[cfg(not(unix))]
compile_error!("this crate drives System V IPC and only builds on Unix targets");

mod sys;

mod error;
pub use error::{Error, Result};

mod key;
pub use key::{well_known_key, KernelKey};

mod store;
pub use store::SharedMemoryStore;

mod channel;
pub use channel::{ChannelStatus, MessageChannel, WaitMode};

mod mutex;
pub use mutex::{Mutex, MutexGuard};

mod semaphore;
pub use semaphore::{CountingSemaphore, SemaphoreGuard, SemaphoreKeys};

mod lightswitch;
pub use lightswitch::{Lightswitch, LightswitchGuard, LightswitchKeys};

mod keyring;
pub use keyring::{KeyEntry, KeyRecord, Keyring};

mod factory;
pub use factory::ResourceFactory;
