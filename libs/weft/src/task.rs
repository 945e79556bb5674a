// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Units of work and the contract between schedulers and executors.
//!
//! A [`Task`] is a closure producing a `T`. [`schedule`] pairs it with a fresh
//! [`Future`]/[`Promise`](crate::Promise), wraps both into a type-erased [`PackagedTask`] and
//! hands that to an [`ExecutionContext`]. The executor only ever calls [`PackagedTask::run`], the
//! packaged task takes care of honoring early cancelation and resolving the future.
//!
//! ```
//! use weft::task::{InlineContext, TaskBuilder};
//!
//! let mut future = TaskBuilder::new()
//!     .name("answer")
//!     .schedule(&InlineContext, |_cancel| 6 * 7)
//!     .unwrap();
//!
//! assert_eq!(future.wait(), Ok(42));
//! ```

mod builder;
mod packaged;

use alloc::boxed::Box;
use alloc::sync::Arc;
use core::fmt;

pub use builder::TaskBuilder;
pub use packaged::PackagedTask;

use crate::error::Closed;
use crate::future::{CancelationProxy, Future};

/// A closure that produces a `T`, together with its tracing span.
///
/// The closure receives a [`CancelationProxy`] so long-running work can check for and
/// acknowledge cancelation requests.
pub struct Task<T> {
    func: Box<dyn FnOnce(&CancelationProxy) -> T + Send>,
    span: tracing::Span,
}

impl<T> Task<T> {
    /// Creates an unnamed task, use [`TaskBuilder`] to configure it.
    #[track_caller]
    pub fn new<F>(func: F) -> Self
    where
        F: FnOnce(&CancelationProxy) -> T + Send + 'static,
    {
        TaskBuilder::new().build(func)
    }

    #[must_use]
    pub fn span(&self) -> &tracing::Span {
        &self.span
    }
}

impl<T> fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("span", &self.span)
            .finish_non_exhaustive()
    }
}

/// Something that runs [`PackagedTask`]s.
pub trait ExecutionContext {
    /// Accepts `task` for execution.
    ///
    /// Tasks submitted from one thread must be started in submission order. Implementations that
    /// reject a task simply drop it, which resolves its future to canceled.
    ///
    /// # Errors
    ///
    /// Returns [`Closed`] if the context was shut down.
    fn submit(&self, task: PackagedTask) -> Result<(), Closed>;
}

impl<C: ExecutionContext + ?Sized> ExecutionContext for &C {
    fn submit(&self, task: PackagedTask) -> Result<(), Closed> {
        (**self).submit(task)
    }
}

impl<C: ExecutionContext + ?Sized> ExecutionContext for Arc<C> {
    fn submit(&self, task: PackagedTask) -> Result<(), Closed> {
        (**self).submit(task)
    }
}

/// An [`ExecutionContext`] that runs every task immediately on the submitting thread.
#[derive(Debug, Default, Copy, Clone)]
pub struct InlineContext;

impl ExecutionContext for InlineContext {
    fn submit(&self, task: PackagedTask) -> Result<(), Closed> {
        task.run();
        Ok(())
    }
}

/// Schedules `task` on `ctx` and returns the future it will resolve.
///
/// # Errors
///
/// Returns [`Closed`] if `ctx` no longer accepts tasks.
pub fn schedule<T, C>(ctx: &C, task: Task<T>) -> Result<Future<T>, Closed>
where
    T: Send + 'static,
    C: ExecutionContext + ?Sized,
{
    let (future, promise) = Future::create();
    promise.notify_scheduled();
    // the executor may start running the task right away, so report submission first
    promise.notify_submitted();
    ctx.submit(PackagedTask::new(task, promise))?;
    Ok(future)
}

#[cfg(test)]
mod tests {
    use alloc::string::String;
    use alloc::sync::Arc;

    use super::*;
    use crate::FutureError;
    use crate::future::{CancelationStatus, CompletionStatus, ExecutionStatus, RequestSource};
    use crate::loom;
    use crate::loom::sync::atomic::{AtomicUsize, Ordering};

    loom::lazy_static! {
        static ref INLINE_RUNS: AtomicUsize = AtomicUsize::new(0);
    }

    /// Holds tasks until the test decides to run or drop them.
    #[derive(Default)]
    struct Deferred {
        queue: parking_lot::Mutex<Vec<PackagedTask>>,
    }

    impl Deferred {
        fn force_cancel_all(&self) {
            for task in self.queue.lock().iter() {
                task.executor_token().force_cancel();
            }
        }

        fn run_all(&self) {
            let tasks: Vec<_> = self.queue.lock().drain(..).collect();
            for task in tasks {
                task.run();
            }
        }
    }

    impl ExecutionContext for Deferred {
        fn submit(&self, task: PackagedTask) -> Result<(), Closed> {
            self.queue.lock().push(task);
            Ok(())
        }
    }

    struct Rejecting;

    impl ExecutionContext for Rejecting {
        fn submit(&self, _task: PackagedTask) -> Result<(), Closed> {
            Err(Closed::new())
        }
    }

    #[test]
    fn inline_runs_immediately() {
        loom::model(|| {
            let before = INLINE_RUNS.load(Ordering::Relaxed);
            let mut future = schedule(
                &InlineContext,
                Task::new(|_| {
                    INLINE_RUNS.fetch_add(1, Ordering::Relaxed);
                    String::from("done")
                }),
            )
            .unwrap();

            assert!(INLINE_RUNS.load(Ordering::Relaxed) > before);
            assert_eq!(future.execution_status(), ExecutionStatus::Executing);
            assert_eq!(future.take().as_deref(), Ok("done"));
        });
    }

    #[test]
    fn cancel_before_run_skips_body() {
        loom::model(|| {
            let calls = Arc::new(AtomicUsize::new(0));
            let ctx = Deferred::default();

            let future = TaskBuilder::new()
                .name("never")
                .schedule(&ctx, {
                    let calls = calls.clone();
                    move |_: &CancelationProxy| {
                        calls.fetch_add(1, Ordering::Relaxed);
                        1_i32
                    }
                })
                .unwrap();
            assert_eq!(future.execution_status(), ExecutionStatus::Submitted);

            future.request_cancel();
            ctx.run_all();

            assert_eq!(calls.load(Ordering::Relaxed), 0);
            assert_eq!(future.status(), CompletionStatus::Canceled);
            assert_eq!(future.copy(), Err(FutureError::Canceled));
        });
    }

    #[cfg(not(loom))]
    #[test]
    fn cancel_before_run_across_threads() {
        let calls = Arc::new(AtomicUsize::new(0));
        let ctx = Arc::new(Deferred::default());
        let barrier = Arc::new(std::sync::Barrier::new(2));

        let future = schedule(&ctx, {
            let calls = calls.clone();
            Task::new(move |_| {
                calls.fetch_add(1, Ordering::Relaxed);
                7_i32
            })
        })
        .unwrap();

        let executor = std::thread::spawn({
            let ctx = ctx.clone();
            let barrier = barrier.clone();
            move || {
                barrier.wait();
                ctx.run_all();
            }
        });

        future.request_cancel();
        barrier.wait();
        executor.join().unwrap();

        assert_eq!(calls.load(Ordering::Relaxed), 0);
        assert_eq!(future.copy(), Err(FutureError::Canceled));
    }

    #[cfg(not(loom))]
    #[test]
    fn body_acknowledging_cancel_resolves_canceled() {
        let ctx = Arc::new(Deferred::default());
        let future = schedule(
            &ctx,
            Task::new(|cancel: &CancelationProxy| {
                // the request arrives while running
                while !cancel.is_cancel_requested() {
                    std::thread::yield_now();
                }
                assert!(cancel.try_acknowledge_cancel());
                String::from("partial")
            }),
        )
        .unwrap();

        let executor = std::thread::spawn({
            let ctx = ctx.clone();
            move || ctx.run_all()
        });

        while future.execution_status() != ExecutionStatus::Executing {
            std::thread::yield_now();
        }
        future.request_cancel();
        executor.join().unwrap();

        assert_eq!(future.status(), CompletionStatus::Canceled);
        assert_eq!(future.copy(), Err(FutureError::Canceled));
    }

    #[test]
    fn force_canceled_task_is_skipped() {
        loom::model(|| {
            let calls = Arc::new(AtomicUsize::new(0));
            let ctx = Deferred::default();
            let future = schedule(&ctx, {
                let calls = calls.clone();
                Task::new(move |cancel: &CancelationProxy| {
                    calls.fetch_add(1, Ordering::Relaxed);
                    cancel.cancel_request()
                })
            })
            .unwrap();

            ctx.force_cancel_all();
            ctx.run_all();

            assert_eq!(calls.load(Ordering::Relaxed), 0);
            assert_eq!(future.status(), CompletionStatus::Canceled);
            assert_eq!(future.cancelation_status(), CancelationStatus::Canceling);
        });
    }

    #[cfg(not(loom))]
    #[test]
    fn running_body_sees_executor_as_cancel_source() {
        let ctx = Arc::new(Deferred::default());
        let requested = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let future = schedule(&ctx, {
            let requested = requested.clone();
            Task::new(move |cancel: &CancelationProxy| {
                while !requested.load(Ordering::Acquire) {
                    std::thread::yield_now();
                }
                cancel.cancel_request()
            })
        })
        .unwrap();
        let token = ctx.queue.lock()[0].executor_token();

        let executor = std::thread::spawn({
            let ctx = ctx.clone();
            move || ctx.run_all()
        });

        while future.execution_status() != ExecutionStatus::Executing {
            std::thread::yield_now();
        }
        // the consumer asks first, the executor's request still takes precedence
        future.request_cancel();
        assert!(token.force_cancel());
        requested.store(true, Ordering::Release);
        executor.join().unwrap();

        assert_eq!(future.copy(), Ok(Some(RequestSource::Executor)));
    }

    #[test]
    fn unacknowledged_cancel_still_completes() {
        loom::model(|| {
            let ctx = Deferred::default();
            let future = schedule(&ctx, Task::new(|_| 3_u8)).unwrap();
            ctx.run_all();
            future.request_cancel();
            assert_eq!(future.copy(), Ok(3));
        });
    }

    #[test]
    fn dropped_task_resolves_canceled() {
        loom::model(|| {
            let ctx = Deferred::default();
            let future = schedule(&ctx, Task::new(|_| 3_u8)).unwrap();
            drop(ctx);
            assert_eq!(future.status(), CompletionStatus::Canceled);
        });
    }

    #[test]
    fn rejected_task_reports_closed() {
        loom::model(|| {
            let res = schedule(&Rejecting, Task::new(|_| ()));
            assert_eq!(res.unwrap_err(), Closed::new());
        });
    }

    #[test]
    fn discarded_future_skips_body() {
        loom::model(|| {
            let calls = Arc::new(AtomicUsize::new(0));
            let ctx = Deferred::default();
            let future = schedule(&ctx, {
                let calls = calls.clone();
                Task::new(move |_| calls.fetch_add(1, Ordering::Relaxed))
            })
            .unwrap();
            drop(future);
            ctx.run_all();
            assert_eq!(calls.load(Ordering::Relaxed), 0);
        });
    }

    #[cfg(not(loom))]
    #[test]
    fn panicking_body_resolves_canceled() {
        let future = schedule(
            &InlineContext,
            Task::new(|_| -> u8 { panic!("task body failed") }),
        )
        .unwrap();
        assert_eq!(future.status(), CompletionStatus::Canceled);
    }
}
