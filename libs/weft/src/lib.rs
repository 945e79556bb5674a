// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Cancelable, suspendable futures and lock-free multi-producer streams for thread pools.
//!
//! The crate is built from three layers:
//!
//! - [`future`]: a [`Future`]/[`Promise`] pair sharing one atomically updated state. The consumer
//!   owns the state (the `Future` is the only strong handle), the producer only observes it weakly,
//!   so a consumer that gives up early never leaves the producer with a dangling state.
//! - [`stream`]: an append-only chain of reference-counted chunks that any number of
//!   [`Generator`](stream::Generator)s append to and any number of [`Stream`](stream::Stream)
//!   handles read from by index, without taking a lock.
//! - [`task`] and [`executor`]: glue packaging a closure together with a `Promise` so it can be
//!   handed to an [`ExecutionContext`](task::ExecutionContext) such as the
//!   [`ThreadPool`](executor::ThreadPool).
//!
//! Nothing in here is `async`/`.await` based: waiting is done by polling the shared state, either
//! directly or through [`block_on`] which backs off from spinning to sleeping.

#![cfg_attr(not(any(test, feature = "std")), no_std)]

extern crate alloc;

pub mod error;
#[cfg(feature = "std")]
pub mod executor;
pub mod future;
mod loom;
pub mod stream;
pub mod task;

pub use error::{AllocError, Closed, FutureError};
pub use future::{Future, Promise, block_on};
