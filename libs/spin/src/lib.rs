// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Spin locks and exponential backoff for short, bounded critical sections.
//!
//! Everything in here is meant for critical sections that are a handful of instructions long
//! (swapping a pointer, bumping a counter, moving a value in or out). Never call user-supplied or
//! allocating code while holding a [`SpinLock`].

#![cfg_attr(not(any(test, feature = "std")), no_std)]

mod backoff;
mod lock;
mod loom;

pub use backoff::Backoff;
pub use lock::{LockStatus, RawSpinLock, SpinLock, SpinLockGuard};
