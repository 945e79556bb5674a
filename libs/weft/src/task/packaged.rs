// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use alloc::boxed::Box;
use core::fmt;

use super::Task;
use crate::future::{CancelationProxy, ExecutorToken, Promise};

/// A task bundled with the promise it resolves, ready to be run by an executor.
///
/// Executors only deal with this type-erased form. Running it resolves the matching
/// [`Future`](crate::Future), dropping it without running resolves the future to canceled.
pub struct PackagedTask {
    runnable: Option<Box<dyn Runnable>>,
    token: ExecutorToken,
    span: tracing::Span,
}

trait Runnable: Send {
    fn run(self: Box<Self>);
    fn cancel(self: Box<Self>);
}

struct Packaged<T> {
    func: Box<dyn FnOnce(&CancelationProxy) -> T + Send>,
    promise: Promise<T>,
}

impl<T: Send + 'static> Runnable for Packaged<T> {
    fn run(self: Box<Self>) {
        let Packaged { func, promise } = *self;

        if promise.try_acknowledge_cancel() {
            tracing::debug!("task canceled before it started");
            promise.finish_canceled();
            return;
        }

        promise.notify_executing();
        let proxy = promise.cancelation_proxy();

        #[cfg(feature = "std")]
        let result = std::panic::catch_unwind(core::panic::AssertUnwindSafe(|| func(&proxy)));
        #[cfg(not(feature = "std"))]
        let result: Result<T, ()> = Ok(func(&proxy));

        match result {
            Ok(value) => promise.finish(value),
            Err(_) => {
                tracing::error!("task panicked");
                promise.finish_canceled();
            }
        }
    }

    fn cancel(self: Box<Self>) {
        self.promise.finish_canceled();
    }
}

impl PackagedTask {
    pub fn new<T: Send + 'static>(task: Task<T>, promise: Promise<T>) -> Self {
        Self {
            token: promise.executor_token(),
            runnable: Some(Box::new(Packaged {
                func: task.func,
                promise,
            })),
            span: task.span,
        }
    }

    /// Returns a handle to force cancel, suspend or resume requests onto this task's future.
    ///
    /// The handle stays usable while the task runs on another thread. A task that was
    /// force-canceled before it started is skipped like any other canceled task.
    #[must_use]
    pub fn executor_token(&self) -> ExecutorToken {
        self.token.clone()
    }

    /// Runs the task on the current thread.
    ///
    /// If cancelation was requested before this call (or the future was dropped) the task body is
    /// skipped and the future resolves to canceled. A panicking task body also resolves the future
    /// to canceled.
    pub fn run(mut self) {
        let _entered = self.span.enter();
        if let Some(runnable) = self.runnable.take() {
            runnable.run();
        }
    }

    #[must_use]
    pub fn span(&self) -> &tracing::Span {
        &self.span
    }
}

impl Drop for PackagedTask {
    fn drop(&mut self) {
        if let Some(runnable) = self.runnable.take() {
            let _entered = self.span.enter();
            tracing::debug!("task dropped before it ran");
            runnable.cancel();
        }
    }
}

impl fmt::Debug for PackagedTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PackagedTask")
            .field("span", &self.span)
            .field("ran", &self.runnable.is_none())
            .finish()
    }
}
