// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use alloc::boxed::Box;
use core::any::type_name;
use core::panic::Location;

use super::{ExecutionContext, Task, schedule};
use crate::error::Closed;
use crate::future::{CancelationProxy, Future};

/// Configures how tasks show up in traces.
#[derive(Debug, Clone)]
pub struct TaskBuilder<'a> {
    location: Option<Location<'a>>,
    name: Option<&'a str>,
    kind: &'a str,
}

impl<'a> TaskBuilder<'a> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            location: None,
            name: None,
            kind: "task",
        }
    }

    /// Override the name of tasks built by this builder.
    ///
    /// By default, tasks are unnamed.
    #[must_use]
    pub fn name(mut self, name: &'a str) -> Self {
        self.name = Some(name);
        self
    }

    /// Override the kind string of tasks built by this builder, this will only show up
    /// in debug messages and spans.
    ///
    /// By default, tasks are of kind `"task"`.
    #[must_use]
    pub fn kind(mut self, kind: &'a str) -> Self {
        self.kind = kind;
        self
    }

    /// Override the source code location that will be associated with tasks built by this builder.
    ///
    /// By default, tasks inherit the source code location of where they have been built.
    #[must_use]
    pub fn location(mut self, location: Location<'a>) -> Self {
        self.location = Some(location);
        self
    }

    #[inline]
    #[track_caller]
    pub fn build<T, F>(&self, func: F) -> Task<T>
    where
        F: FnOnce(&CancelationProxy) -> T + Send + 'static,
    {
        let loc = self.location.as_ref().unwrap_or(Location::caller());
        let span = tracing::trace_span!(
            "task",
            task.name = ?self.name,
            task.kind = self.kind,
            task.output = %type_name::<T>(),
            loc.file = loc.file(),
            loc.line = loc.line(),
            loc.col = loc.column(),
        );

        Task {
            func: Box::new(func),
            span,
        }
    }

    /// Builds a task from `func` and schedules it on `ctx`.
    ///
    /// # Errors
    ///
    /// Returns [`Closed`] if `ctx` no longer accepts tasks.
    #[inline]
    #[track_caller]
    pub fn schedule<T, F, C>(&self, ctx: &C, func: F) -> Result<Future<T>, Closed>
    where
        T: Send + 'static,
        F: FnOnce(&CancelationProxy) -> T + Send + 'static,
        C: ExecutionContext + ?Sized,
    {
        schedule(ctx, self.build(func))
    }
}

impl Default for TaskBuilder<'_> {
    fn default() -> Self {
        Self::new()
    }
}
