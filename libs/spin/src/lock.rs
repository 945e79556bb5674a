// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};

use crate::Backoff;

/// A mutual exclusion primitive for critical sections that are a handful of instructions long.
///
/// Use [`SpinLock::lock`] to obtain a RAII guard, the lock is released when the guard is dropped.
pub type SpinLock<T> = lock_api::Mutex<RawSpinLock, T>;
pub type SpinLockGuard<'a, T> = lock_api::MutexGuard<'a, RawSpinLock, T>;

/// Whether a [`RawSpinLock`] is currently held.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LockStatus {
    Unlocked,
    Locked,
}

/// The raw test-and-test-and-set lock backing [`SpinLock`].
pub struct RawSpinLock {
    lock: AtomicBool,
}

// Safety: `lock` and `try_lock` only succeed after winning the `false -> true` CAS with acquire
// ordering, `unlock` publishes the critical section with a release store.
unsafe impl lock_api::RawMutex for RawSpinLock {
    type GuardMarker = lock_api::GuardSend;

    const INIT: Self = Self {
        lock: AtomicBool::new(false),
    };

    fn lock(&self) {
        let mut boff = Backoff::new();
        while !self.try_lock() {
            // only spin on a plain load while contended, so waiters don't keep
            // pulling the cache line into exclusive state
            while self.is_locked() {
                boff.snooze();
            }
        }
    }

    fn try_lock(&self) -> bool {
        self.lock
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    unsafe fn unlock(&self) {
        self.lock.store(false, Ordering::Release);
    }

    fn is_locked(&self) -> bool {
        self.lock.load(Ordering::Relaxed)
    }
}

impl RawSpinLock {
    /// Returns the current [`LockStatus`].
    ///
    /// The answer is stale the moment it is returned, use it for diagnostics only.
    pub fn status(&self) -> LockStatus {
        if self.lock.load(Ordering::Relaxed) {
            LockStatus::Locked
        } else {
            LockStatus::Unlocked
        }
    }
}

impl fmt::Debug for RawSpinLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawSpinLock")
            .field("status", &self.status())
            .finish()
    }
}
