// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! One-shot results of asynchronous operations.
//!
//! [`Future::create`] allocates a state shared by a [`Future`] (held by whoever wants the result)
//! and a [`Promise`] (held by whoever computes it). The future is the *only* strong reference to
//! the state: the promise and all proxies derived from it hold weak references, so when the
//! consumer loses interest and drops its future every producer-side operation silently turns into
//! a no-op and cancelation checks report `true`.
//!
//! Cancelation and suspension are cooperative. The consumer *requests* them, the producer
//! *acknowledges* them at points where it is safe to stop or pause:
//!
//! ```
//! use weft::future::{CompletionStatus, Future};
//! use weft::FutureError;
//!
//! let (future, promise) = Future::<u32>::create();
//!
//! future.request_cancel();
//! // ... later, on the producing thread
//! if promise.try_acknowledge_cancel() {
//!     promise.finish_canceled();
//! }
//!
//! assert_eq!(future.status(), CompletionStatus::Canceled);
//! assert_eq!(future.copy(), Err(FutureError::Canceled));
//! ```
//!
//! The scheduler running the operation can also *force* requests through the promise (or an
//! [`ExecutorToken`] handed out by it). Forced requests override the consumer's and report
//! [`RequestSource::Executor`] as their source.

mod proxy;
mod state;
mod status;

use alloc::sync::{Arc, Weak};
use core::fmt;
use core::marker::PhantomData;

pub use proxy::{CancelationProxy, ExecutorToken, FutureAny, SuspendProxy, Token};
use state::{FutureState, Resolved};
pub use status::{
    CancelationStatus, CompletionStatus, ExecutionStatus, RequestSource, SuspendRequest,
    SuspendStatus, SuspendTarget,
};
use weft_spin::Backoff;

use crate::error::FutureError;

/// The consumer side of an asynchronous operation producing a `T`.
///
/// Dropping the future releases the shared state, see the [module docs](self).
pub struct Future<T> {
    state: Arc<FutureState<T>>,
    // `copy` hands out clones created from a shared `&T`, so the future must only be `Sync` if
    // `T` is.
    _marker: PhantomData<T>,
}

/// The producer side of an asynchronous operation producing a `T`.
///
/// Every operation is a no-op once the matching [`Future`] is gone.
pub struct Promise<T> {
    state: Weak<FutureState<T>>,
}

// === impl Future ===

impl<T> Future<T> {
    /// Creates a new pending future together with the promise that resolves it.
    #[must_use]
    pub fn create() -> (Future<T>, Promise<T>) {
        let state = Arc::new(FutureState::new());
        let promise = Promise {
            state: Arc::downgrade(&state),
        };
        let future = Future {
            state,
            _marker: PhantomData,
        };
        (future, promise)
    }

    #[must_use]
    pub fn status(&self) -> CompletionStatus {
        self.state.core().completion_status()
    }

    /// Returns `true` once the future is `Completed` or `Canceled`.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.status().is_done()
    }

    #[must_use]
    pub fn cancelation_status(&self) -> CancelationStatus {
        self.state.core().cancelation_status()
    }

    #[must_use]
    pub fn suspend_status(&self) -> SuspendStatus {
        self.state.core().suspend_status()
    }

    #[must_use]
    pub fn execution_status(&self) -> ExecutionStatus {
        self.state.core().execution_status()
    }

    /// Asks the producer to stop.
    ///
    /// The request is advisory: the future only resolves to [`CompletionStatus::Canceled`] if the
    /// producer acknowledges it before finishing. Returns `true` if this call made the request.
    pub fn request_cancel(&self) -> bool {
        self.state.core().request_cancel()
    }

    /// Asks the producer to pause, or withdraws a pending resume request.
    pub fn request_suspend(&self) -> bool {
        self.state.core().request_suspend()
    }

    /// Asks a paused producer to continue, or withdraws a pending suspend request.
    pub fn request_resume(&self) -> bool {
        self.state.core().request_resume()
    }

    /// Returns a clone of the result.
    ///
    /// Never blocks, use [`block_on`] to wait for the future first.
    ///
    /// # Errors
    ///
    /// Returns [`FutureError::Pending`] if the future isn't resolved yet,
    /// [`FutureError::Canceled`] if it was canceled and [`FutureError::Taken`] if the value was
    /// already moved out with [`Future::take`].
    pub fn copy(&self) -> Result<T, FutureError>
    where
        T: Clone,
    {
        self.state.copy()
    }

    /// Moves the result out of the future.
    ///
    /// Never blocks, use [`block_on`] to wait for the future first. The value can be taken only
    /// once, taking it again is a bug caught by a debug assertion.
    ///
    /// # Errors
    ///
    /// Returns [`FutureError::Pending`] if the future isn't resolved yet and
    /// [`FutureError::Canceled`] if it was canceled. In release builds taking the value twice
    /// returns [`FutureError::Taken`].
    pub fn take(&mut self) -> Result<T, FutureError> {
        // Safety: `&mut self` makes us the only reader, `Future` is not `Clone`
        let res = unsafe { self.state.take() };
        debug_assert_ne!(
            res.as_ref().err(),
            Some(&FutureError::Taken),
            "future value taken twice"
        );
        res
    }

    /// Waits for the future to resolve and moves the result out.
    ///
    /// # Errors
    ///
    /// Returns [`FutureError::Canceled`] if the future was canceled.
    pub fn wait(&mut self) -> Result<T, FutureError> {
        block_on(self);
        self.take()
    }
}

impl<T: Send + 'static> Future<T> {
    /// Returns a [`Token`] that can send requests without keeping the state alive.
    #[must_use]
    pub fn token(&self) -> Token {
        let state: Weak<FutureState<T>> = Arc::downgrade(&self.state);
        Token { state }
    }

    /// Erases the output type, the result can no longer be extracted.
    #[must_use]
    pub fn erase(self) -> FutureAny {
        FutureAny { state: self.state }
    }
}

impl<T: Send + 'static> From<&Future<T>> for FutureAny {
    fn from(future: &Future<T>) -> Self {
        FutureAny {
            state: future.state.clone(),
        }
    }
}

impl<T> fmt::Debug for Future<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Future")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

// === impl Promise ===

impl<T> Promise<T> {
    /// Resolves the future with `value`.
    ///
    /// If the producer acknowledged a cancelation request before calling this, `value` is dropped
    /// and the future resolves to [`CompletionStatus::Canceled`] instead.
    pub fn finish(mut self, value: T) {
        let state = core::mem::take(&mut self.state);
        if let Some(state) = state.upgrade() {
            let resolved = state.complete(value);
            debug_assert_ne!(resolved, Resolved::Lost, "future resolved twice");
        } else {
            tracing::trace!("future discarded, dropping result");
        }
    }

    /// Resolves the future to [`CompletionStatus::Canceled`].
    pub fn finish_canceled(mut self) {
        let state = core::mem::take(&mut self.state);
        if let Some(state) = state.upgrade() {
            let resolved = state.cancel();
            debug_assert_ne!(resolved, Resolved::Lost, "future resolved twice");
        }
    }

    /// Returns `true` if the consumer requested cancelation or dropped the future.
    #[must_use]
    pub fn is_cancel_requested(&self) -> bool {
        self.state
            .upgrade()
            .is_none_or(|state| state.core().cancelation_status() != CancelationStatus::Uncanceled)
    }

    /// Acknowledges a cancelation request.
    ///
    /// Returns `true` if the producer should stop: cancelation was acknowledged (now or earlier)
    /// or the future was discarded. Once acknowledged, [`Promise::finish`] resolves the future to
    /// canceled.
    #[must_use]
    pub fn try_acknowledge_cancel(&self) -> bool {
        self.state
            .upgrade()
            .is_none_or(|state| state.core().try_acknowledge_cancel())
    }

    /// Acknowledges a suspend request, returns `false` if there was none or the future is gone.
    #[must_use]
    pub fn try_acknowledge_suspend(&self) -> bool {
        self.state
            .upgrade()
            .is_some_and(|state| state.core().try_acknowledge_suspend())
    }

    /// Acknowledges a resume request, returns `false` if there was none or the future is gone.
    #[must_use]
    pub fn try_acknowledge_resume(&self) -> bool {
        self.state
            .upgrade()
            .is_some_and(|state| state.core().try_acknowledge_resume())
    }

    /// Returns the suspend status, or `None` if the future is gone.
    #[must_use]
    pub fn suspend_status(&self) -> Option<SuspendStatus> {
        Some(self.state.upgrade()?.core().suspend_status())
    }

    /// Returns who requested cancelation, a discarded future counts as the consumer.
    #[must_use]
    pub fn cancel_request(&self) -> Option<RequestSource> {
        match self.state.upgrade() {
            Some(state) => state.core().cancel_request(),
            None => Some(RequestSource::User),
        }
    }

    /// Returns the suspend or resume request waiting to be acknowledged.
    #[must_use]
    pub fn suspend_request(&self) -> Option<SuspendRequest> {
        self.state.upgrade()?.core().suspend_request()
    }

    /// Requests cancelation on behalf of the executor, see [`ExecutorToken::force_cancel`].
    pub fn force_cancel(&self) -> bool {
        self.state
            .upgrade()
            .is_some_and(|state| state.core().force_cancel())
    }

    /// Forces the operation to suspend until the executor resumes it.
    pub fn force_suspend(&self) {
        if let Some(state) = self.state.upgrade() {
            state.core().force_suspend();
        }
    }

    pub fn force_resume(&self) {
        if let Some(state) = self.state.upgrade() {
            state.core().force_resume();
        }
    }

    /// Withdraws a forced suspend or resume, the consumer's requests apply again.
    pub fn clear_forced_suspend(&self) {
        if let Some(state) = self.state.upgrade() {
            state.core().clear_forced_suspend();
        }
    }

    pub fn notify_scheduled(&self) {
        self.advance(ExecutionStatus::Scheduled);
    }

    pub fn notify_submitted(&self) {
        self.advance(ExecutionStatus::Submitted);
    }

    pub fn notify_executing(&self) {
        self.advance(ExecutionStatus::Executing);
    }

    /// Returns `true` if the consumer dropped the future.
    #[must_use]
    pub fn is_discarded(&self) -> bool {
        self.state.strong_count() == 0
    }

    fn advance(&self, status: ExecutionStatus) {
        if let Some(state) = self.state.upgrade() {
            state.core().advance_execution(status);
        }
    }
}

impl<T: Send + 'static> Promise<T> {
    #[must_use]
    pub fn cancelation_proxy(&self) -> CancelationProxy {
        let state: Weak<FutureState<T>> = self.state.clone();
        CancelationProxy { state }
    }

    #[must_use]
    pub fn suspend_proxy(&self) -> SuspendProxy {
        let state: Weak<FutureState<T>> = self.state.clone();
        SuspendProxy { state }
    }

    /// Returns a handle the scheduler keeps to force requests after the promise moved on.
    #[must_use]
    pub fn executor_token(&self) -> ExecutorToken {
        let state: Weak<FutureState<T>> = self.state.clone();
        ExecutorToken { state }
    }
}

impl<T> Drop for Promise<T> {
    fn drop(&mut self) {
        if let Some(state) = self.state.upgrade()
            && !state.core().completion_status().is_done()
        {
            tracing::warn!("promise dropped without finishing, future will stay pending");
        }
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("state", &self.state.upgrade())
            .finish()
    }
}

// === blocking ===

/// Blocks the current thread until `future` is resolved and returns its final status.
///
/// Busy-polls the status with a [`Backoff`] that escalates from spinning to yielding to sleeping.
/// There is no timeout: if the producer never finishes, this never returns.
pub fn block_on<T>(future: &Future<T>) -> CompletionStatus {
    let mut boff = Backoff::new();
    loop {
        let status = future.status();
        if status.is_done() {
            return status;
        }
        boff.snooze();
    }
}

/// Blocks the current thread until every future in `futures` is resolved.
pub fn block_on_all(futures: &[FutureAny]) {
    for future in futures {
        let mut boff = Backoff::new();
        while !future.is_done() {
            boff.snooze();
        }
    }
}

/// Blocks the current thread until one of `futures` is resolved and returns its index.
///
/// Returns `None` if `futures` is empty.
#[must_use]
pub fn block_on_any(futures: &[FutureAny]) -> Option<usize> {
    if futures.is_empty() {
        return None;
    }
    let mut boff = Backoff::new();
    loop {
        if let Some(idx) = futures.iter().position(FutureAny::is_done) {
            return Some(idx);
        }
        boff.snooze();
    }
}

#[cfg(test)]
mod tests {
    use alloc::string::String;

    use tracing_subscriber::util::SubscriberInitExt;

    use super::*;
    use crate::loom;
    use crate::loom::thread;

    fn init_tracing() -> tracing::dispatcher::DefaultGuard {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .set_default()
    }

    static_assertions::assert_impl_all!(Future<String>: Send, Sync);
    static_assertions::assert_not_impl_any!(Future<core::cell::Cell<u8>>: Sync);
    static_assertions::assert_impl_all!(Promise<core::cell::Cell<u8>>: Send);
    static_assertions::assert_impl_all!(CancelationProxy: Send, Sync, Clone);
    static_assertions::assert_impl_all!(Token: Send, Sync, Clone);
    static_assertions::assert_impl_all!(ExecutorToken: Send, Sync, Clone);
    static_assertions::assert_not_impl_any!(Future<u8>: Clone);

    #[test]
    fn finish_then_copy() {
        loom::model(|| {
            let _trace = init_tracing();
            let (future, promise) = Future::create();
            assert_eq!(future.copy(), Err(FutureError::Pending));
            promise.finish(42_i32);
            assert_eq!(future.status(), CompletionStatus::Completed);
            assert_eq!(future.copy(), Ok(42));
            assert_eq!(future.copy(), Ok(42));
        });
    }

    #[test]
    fn unit_future() {
        loom::model(|| {
            let (mut future, promise) = Future::<()>::create();
            promise.finish(());
            assert!(future.is_done());
            assert_eq!(future.take(), Ok(()));
        });
    }

    #[test]
    fn take_hello_from_another_thread() {
        loom::model(|| {
            let (mut future, promise) = Future::<String>::create();

            let producer = thread::spawn(move || promise.finish(String::from("hello")));

            let value = loop {
                match future.take() {
                    Ok(value) => break value,
                    Err(FutureError::Pending) => thread::yield_now(),
                    Err(err) => panic!("unexpected {err}"),
                }
            };
            assert_eq!(value, "hello");
            producer.join().unwrap();
        });
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic = "future value taken twice"]
    fn second_take_asserts() {
        loom::model(|| {
            let (mut future, promise) = Future::create();
            promise.finish(String::from("hello"));
            assert_eq!(future.take().as_deref(), Ok("hello"));
            let _ = future.take();
        });
    }

    #[test]
    #[cfg(not(debug_assertions))]
    fn second_take_reports_taken() {
        loom::model(|| {
            let (mut future, promise) = Future::create();
            promise.finish(String::from("hello"));
            assert_eq!(future.take().as_deref(), Ok("hello"));
            assert_eq!(future.take(), Err(FutureError::Taken));
            assert_eq!(future.copy(), Err(FutureError::Taken));
            assert_eq!(future.status(), CompletionStatus::Completed);
        });
    }

    #[test]
    fn producer_ops_after_discard_are_noops() {
        loom::model(|| {
            let _trace = init_tracing();
            let (future, promise) = Future::<String>::create();
            let cancel = promise.cancelation_proxy();
            let suspend = promise.suspend_proxy();
            let token = future.token();
            drop(future);

            assert!(promise.is_discarded());
            assert!(promise.is_cancel_requested());
            assert!(promise.try_acknowledge_cancel());
            assert!(!promise.try_acknowledge_suspend());
            assert!(!promise.try_acknowledge_resume());
            assert_eq!(promise.suspend_status(), None);
            promise.notify_executing();

            assert!(cancel.is_cancel_requested());
            assert!(cancel.try_acknowledge_cancel());
            assert_eq!(cancel.cancelation_status(), None);
            assert!(!suspend.try_acknowledge_suspend());
            assert!(!suspend.is_suspend_requested());

            assert!(!token.request_cancel());
            assert!(!token.request_suspend());
            assert_eq!(token.status(), None);

            promise.finish(String::from("nobody is listening"));
        });
    }

    #[test]
    fn acknowledged_cancel_discards_value() {
        loom::model(|| {
            let (future, promise) = Future::create();
            assert!(!promise.is_cancel_requested());
            assert!(future.request_cancel());
            assert!(promise.is_cancel_requested());
            assert!(promise.try_acknowledge_cancel());
            assert_eq!(future.cancelation_status(), CancelationStatus::Canceling);
            promise.finish(1_u8);
            assert_eq!(future.status(), CompletionStatus::Canceled);
            assert_eq!(future.copy(), Err(FutureError::Canceled));
        });
    }

    #[test]
    fn finish_canceled_without_request() {
        loom::model(|| {
            let (future, promise) = Future::<u8>::create();
            promise.finish_canceled();
            assert_eq!(future.status(), CompletionStatus::Canceled);
            assert_eq!(future.cancelation_status(), CancelationStatus::Uncanceled);
        });
    }

    #[test]
    fn dropped_promise_leaves_future_pending() {
        loom::model(|| {
            let _trace = init_tracing();
            let (future, promise) = Future::<u8>::create();
            drop(promise);
            assert_eq!(future.status(), CompletionStatus::Pending);
            assert_eq!(future.copy(), Err(FutureError::Pending));
        });
    }

    #[test]
    fn token_does_not_keep_state_alive() {
        loom::model(|| {
            let (future, promise) = Future::<u8>::create();
            let token = future.token();
            assert_eq!(token.status(), Some(CompletionStatus::Pending));
            assert!(token.request_cancel());
            assert_eq!(future.cancelation_status(), CancelationStatus::CancelRequested);
            drop(future);
            assert!(promise.is_discarded());
            assert_eq!(token.status(), None);
        });
    }

    #[test]
    fn suspend_through_proxy() {
        loom::model(|| {
            let (future, promise) = Future::<()>::create();
            let proxy = promise.suspend_proxy();

            assert!(!proxy.is_suspend_requested());
            future.request_suspend();
            assert!(proxy.is_suspend_requested());
            assert!(proxy.try_acknowledge_suspend());
            assert_eq!(future.suspend_status(), SuspendStatus::Suspended);

            future.request_resume();
            assert!(proxy.is_resume_requested());
            assert!(proxy.try_acknowledge_resume());
            assert_eq!(future.suspend_status(), SuspendStatus::Resumed);
            promise.finish(());
        });
    }

    #[test]
    fn forced_requests_win_over_user_requests() {
        loom::model(|| {
            let (future, promise) = Future::<u32>::create();
            let cancel = promise.cancelation_proxy();
            let suspend = promise.suspend_proxy();
            let executor = promise.executor_token();

            future.request_suspend();
            assert_eq!(
                suspend.suspend_request().map(|request| request.source),
                Some(RequestSource::User)
            );

            // the executor wants the operation running, the consumer's suspend is ignored
            executor.force_resume();
            assert!(!suspend.is_suspend_requested());
            assert!(suspend.is_resume_requested());
            assert!(!suspend.try_acknowledge_suspend());
            assert!(suspend.try_acknowledge_resume());
            assert_eq!(future.suspend_status(), SuspendStatus::Resumed);
            executor.clear_forced_suspend();

            future.request_cancel();
            assert_eq!(cancel.cancel_request(), Some(RequestSource::User));
            assert!(promise.force_cancel());
            assert_eq!(cancel.cancel_request(), Some(RequestSource::Executor));
            assert_eq!(promise.cancel_request(), Some(RequestSource::Executor));

            assert!(cancel.try_acknowledge_cancel());
            promise.finish(1);
            assert_eq!(future.copy(), Err(FutureError::Canceled));
            assert_eq!(executor.status(), Some(CompletionStatus::Canceled));
        });
    }

    #[test]
    fn force_suspend_through_promise() {
        loom::model(|| {
            let (future, promise) = Future::<()>::create();
            let suspend = promise.suspend_proxy();

            promise.force_suspend();
            assert_eq!(
                promise.suspend_request(),
                Some(SuspendRequest {
                    source: RequestSource::Executor,
                    target: SuspendTarget::Suspended,
                })
            );
            assert!(suspend.try_acknowledge_suspend());
            assert_eq!(future.suspend_status(), SuspendStatus::Suspended);

            // the consumer can't resume an operation the executor suspended
            future.request_resume();
            assert!(!suspend.is_resume_requested());
            assert!(!suspend.try_acknowledge_resume());

            promise.force_resume();
            assert!(suspend.try_acknowledge_resume());
            promise.clear_forced_suspend();
            assert_eq!(promise.suspend_request(), None);
            promise.finish(());
        });
    }

    #[test]
    fn executor_token_after_discard() {
        loom::model(|| {
            let (future, promise) = Future::<u8>::create();
            let executor = promise.executor_token();
            drop(future);

            assert!(!executor.force_cancel());
            executor.force_suspend();
            executor.clear_forced_suspend();
            assert_eq!(executor.status(), None);
            assert_eq!(executor.suspend_status(), None);
            assert_eq!(promise.cancel_request(), Some(RequestSource::User));
            assert_eq!(promise.suspend_request(), None);
        });
    }

    #[test]
    fn execution_status_reports_progress() {
        loom::model(|| {
            let (future, promise) = Future::<()>::create();
            assert_eq!(future.execution_status(), ExecutionStatus::Unscheduled);
            promise.notify_scheduled();
            promise.notify_submitted();
            assert_eq!(future.execution_status(), ExecutionStatus::Submitted);
            promise.notify_executing();
            promise.notify_scheduled();
            assert_eq!(future.execution_status(), ExecutionStatus::Executing);
            promise.finish(());
        });
    }

    #[test]
    fn erased_futures() {
        loom::model(|| {
            let (a, pa) = Future::<u8>::create();
            let (b, pb) = Future::<String>::create();
            let any = [FutureAny::from(&a), b.erase()];

            assert!(!any[0].is_done());
            any[1].request_cancel();
            assert!(pb.try_acknowledge_cancel());
            pb.finish_canceled();
            assert_eq!(block_on_any(&any), Some(1));
            assert_eq!(any[1].status(), CompletionStatus::Canceled);

            pa.finish(3);
            block_on_all(&any);
            assert_eq!(a.copy(), Ok(3));
            assert_eq!(block_on_any(&[]), None);
        });
    }

    #[cfg(not(loom))]
    #[test]
    fn block_on_waits_for_other_thread() {
        let _trace = init_tracing();
        let futures: Vec<_> = (0..4_u64)
            .map(|i| {
                let (future, promise) = Future::create();
                std::thread::spawn(move || {
                    std::thread::sleep(core::time::Duration::from_millis(i * 5));
                    promise.finish(i * 10);
                });
                future
            })
            .collect();

        for (i, mut future) in (0..).zip(futures) {
            assert_eq!(block_on(&future), CompletionStatus::Completed);
            assert_eq!(future.wait(), Ok(i * 10));
        }
    }
}
