// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use core::hint;
#[cfg(all(feature = "std", not(loom)))]
use core::time::Duration;

/// Number of [`Backoff::snooze`] steps that only spin.
const SPIN_LIMIT: u8 = 6;
/// Number of [`Backoff::snooze`] steps after which yielding turns into sleeping.
const YIELD_LIMIT: u8 = 10;
/// Upper bound on the number of doublings of the sleep duration.
#[cfg(all(feature = "std", not(loom)))]
const SLEEP_MAX_SHIFT: u8 = 6;
/// Sleep duration of the first sleeping step, doubled each step up to `SLEEP_MAX_SHIFT` times.
#[cfg(all(feature = "std", not(loom)))]
const SLEEP_BASE: Duration = Duration::from_micros(16);

/// An [exponential backoff] for spin loops.
///
/// [`Backoff::spin`] always busy-waits, issuing an exponentially increasing number of spin loop
/// hints. [`Backoff::snooze`] escalates in three tiers instead: it spins for the first few steps,
/// then yields the thread back to the OS scheduler, and finally puts the thread to sleep for a
/// duration that grows with every step (capped at ~1ms). Use `spin` when the thing being waited on
/// is known to be a few instructions away (e.g. a peer holding a spin lock) and `snooze` when the
/// wait may be long (e.g. blocking on a future).
///
/// Without the `std` feature there is no scheduler to yield to, and `snooze` degrades to `spin`.
///
/// [exponential backoff]: https://en.wikipedia.org/wiki/Exponential_backoff
#[derive(Debug, Copy, Clone)]
pub struct Backoff {
    exp: u8,
    max: u8,
    step: u8,
}

// === impl Backoff ===

impl Backoff {
    /// The default maximum exponent (2^8).
    ///
    /// This is the maximum exponent returned by [`Backoff::new()`] and
    /// [`Backoff::default()`]. To override the maximum exponent, use
    /// [`Backoff::with_max_exponent()`].
    pub const DEFAULT_MAX_EXPONENT: u8 = 8;

    /// Returns a new exponential backoff with the maximum exponent set to
    /// [`Self::DEFAULT_MAX_EXPONENT`].
    #[must_use]
    pub const fn new() -> Self {
        Self {
            exp: 0,
            max: Self::DEFAULT_MAX_EXPONENT,
            step: 0,
        }
    }

    /// Returns a new exponential backoff with the provided max exponent.
    ///
    /// # Panics
    ///
    /// Panics if the `max` exponent is larger than [`Self::DEFAULT_MAX_EXPONENT`].
    #[must_use]
    pub fn with_max_exponent(max: u8) -> Self {
        assert!(max <= Self::DEFAULT_MAX_EXPONENT);
        Self {
            exp: 0,
            max,
            step: 0,
        }
    }

    /// Backs off in a spin loop.
    ///
    /// This should be used when an operation needs to be retried because
    /// another thread or core made progress. Depending on the target
    /// architecture, this will generally issue a sequence of `pause`
    /// instructions.
    ///
    /// Each time this function is called, it will issue `2^exp` [spin loop
    /// hints], where `exp` is the current exponent value (starting at 0). If
    /// `exp` is less than the configured maximum exponent, the exponent is
    /// incremented once the spin is complete.
    ///
    /// [spin loop hints]: hint::spin_loop
    #[inline(always)]
    pub fn spin(&mut self) {
        Self::spin_n(1_u32 << self.exp);

        if self.exp < self.max {
            self.exp += 1;
        }
        self.step = self.step.saturating_add(1);
    }

    /// Backs off in a blocking loop, escalating from spinning to yielding to sleeping.
    ///
    /// This should be used when the current thread is waiting on a condition that may take
    /// arbitrarily long to become true, where burning a core on spin hints would be wasteful.
    #[inline]
    pub fn snooze(&mut self) {
        if self.step <= SPIN_LIMIT {
            Self::spin_n(1_u32 << self.step.min(self.max));
        } else {
            self.park_step();
        }

        if self.exp < self.max {
            self.exp += 1;
        }
        self.step = self.step.saturating_add(1);
    }

    /// Returns `true` once backing off has left the spinning tier.
    ///
    /// Callers that can fall back to a real blocking primitive (parking the thread etc.) should
    /// do so once this returns `true`.
    #[inline]
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.step > SPIN_LIMIT
    }

    #[inline(always)]
    pub fn reset(&mut self) {
        self.exp = 0;
        self.step = 0;
    }

    #[inline(always)]
    fn spin_n(spins: u32) {
        for _ in 0..spins {
            // In tests, especially in loom tests, we need to yield the thread back to the runtime
            // so it can make progress. See https://github.com/tokio-rs/loom/issues/162#issuecomment-665128979
            #[cfg(any(test, loom))]
            crate::loom::thread::yield_now();

            hint::spin_loop();
        }
    }

    #[cfg(all(feature = "std", not(loom)))]
    fn park_step(&self) {
        if self.step <= YIELD_LIMIT {
            crate::loom::thread::yield_now();
        } else {
            let shift = (self.step - YIELD_LIMIT - 1).min(SLEEP_MAX_SHIFT);
            crate::loom::thread::sleep(SLEEP_BASE * (1_u32 << shift));
        }
    }

    // loom can't model the passage of time, so the sleeping tier yields as well
    #[cfg(loom)]
    fn park_step(&self) {
        crate::loom::thread::yield_now();
    }

    #[cfg(not(any(feature = "std", loom)))]
    fn park_step(&self) {
        Self::spin_n(1_u32 << self.max);
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}
