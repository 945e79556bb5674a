// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use core::fmt;

/// Returned when the value of a [`Future`](crate::Future) could not be extracted.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FutureError {
    /// The producer hasn't finished yet, try again later.
    Pending,
    /// The operation was canceled, no value will ever be produced.
    Canceled,
    /// The completed value was already moved out by an earlier [`take`](crate::Future::take).
    Taken,
}

impl fmt::Display for FutureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FutureError::Pending => f.write_str("future is still pending"),
            FutureError::Canceled => f.write_str("future was canceled"),
            FutureError::Taken => f.write_str("future value was already taken"),
        }
    }
}

impl core::error::Error for FutureError {}

/// The memory allocator returned an error.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct AllocError;

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("memory allocation failed")
    }
}

impl core::error::Error for AllocError {}

/// The execution context was shut down and no longer accepts tasks.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct Closed(());

impl Closed {
    #[must_use]
    pub const fn new() -> Self {
        Self(())
    }
}

impl fmt::Display for Closed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("execution context closed")
    }
}

impl core::error::Error for Closed {}
