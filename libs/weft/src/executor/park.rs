// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, Thread};

use weft_spin::SpinLock;

/// Idle worker threads waiting for work.
#[derive(Debug)]
pub(crate) struct ParkingLot {
    /// Number of parked threads
    num_parked: AtomicUsize,
    /// One entry per thread currently in `park`, never more than the capacity.
    unpark_tokens: SpinLock<Vec<Thread>>,
}

impl ParkingLot {
    /// Creates a parking lot for at most `capacity` threads.
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            num_parked: AtomicUsize::new(0),
            unpark_tokens: SpinLock::new(Vec::with_capacity(capacity)),
        }
    }

    pub(crate) fn num_parked(&self) -> usize {
        self.num_parked.load(Ordering::Acquire)
    }

    /// Parks the calling thread until it is unparked through `Self::unpark_one` or
    /// `Self::unpark_all`.
    ///
    /// `should_park` is checked *after* the thread registered itself, so a wakeup sent between a
    /// caller observing "no work" and parking is never lost. May return spuriously.
    pub(crate) fn park(&self, should_park: impl FnOnce() -> bool) {
        let me = thread::current();

        self.transition_to_parked();
        self.unpark_tokens.lock().push(me.clone());

        if should_park() {
            thread::park();
        }

        // an unpark pops the token, but spurious wakeups and the early return above don't
        self.unpark_tokens
            .lock()
            .retain(|token| token.id() != me.id());
        self.transition_from_parked();
    }

    /// Unparks one parked thread, returns `false` if there was none.
    pub(crate) fn unpark_one(&self) -> bool {
        let token = self.unpark_tokens.lock().pop();
        if let Some(token) = token {
            token.unpark();
            true
        } else {
            false
        }
    }

    /// Unparks every parked thread, returning how many were unparked.
    pub(crate) fn unpark_all(&self) -> usize {
        let mut tokens = self.unpark_tokens.lock();
        let mut unparked = 0;

        while let Some(token) = tokens.pop() {
            token.unpark();
            unparked += 1;
        }

        unparked
    }

    fn transition_to_parked(&self) {
        let prev = self.num_parked.fetch_add(1, Ordering::Release);
        debug_assert_ne!(prev, usize::MAX);
    }

    fn transition_from_parked(&self) {
        let prev = self.num_parked.fetch_sub(1, Ordering::Release);
        debug_assert_ne!(prev, 0);
    }
}
