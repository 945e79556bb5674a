// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use alloc::sync::{Arc, Weak};
use core::fmt;

use super::state::Shared;
use super::status::{
    CancelationStatus, CompletionStatus, RequestSource, SuspendRequest, SuspendStatus,
    SuspendTarget,
};

/// Lets an executing task check for and acknowledge cancelation requests.
///
/// The proxy only weakly references the future state, if the consumer dropped its
/// [`Future`](super::Future) the proxy reports the operation as canceled.
#[derive(Clone)]
pub struct CancelationProxy {
    pub(super) state: Weak<dyn Shared>,
}

impl CancelationProxy {
    /// Returns `true` if cancelation was requested (or acknowledged), or the future is gone.
    #[must_use]
    pub fn is_cancel_requested(&self) -> bool {
        self.state
            .upgrade()
            .is_none_or(|state| state.core().cancelation_status() != CancelationStatus::Uncanceled)
    }

    /// Acknowledges a pending cancelation request.
    ///
    /// Returns `true` if the operation should stop: the request was acknowledged now or earlier,
    /// or the future was discarded. A task that acknowledged cancelation still has to return,
    /// its result will be discarded.
    #[must_use]
    pub fn try_acknowledge_cancel(&self) -> bool {
        self.state
            .upgrade()
            .is_none_or(|state| state.core().try_acknowledge_cancel())
    }

    /// Returns who requested cancelation, or `None` if nobody did.
    ///
    /// A discarded future counts as a request by the consumer.
    #[must_use]
    pub fn cancel_request(&self) -> Option<RequestSource> {
        match self.state.upgrade() {
            Some(state) => state.core().cancel_request(),
            None => Some(RequestSource::User),
        }
    }

    /// Returns the cancelation status, or `None` if the future is gone.
    #[must_use]
    pub fn cancelation_status(&self) -> Option<CancelationStatus> {
        Some(self.state.upgrade()?.core().cancelation_status())
    }
}

impl fmt::Debug for CancelationProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelationProxy")
            .field("status", &self.cancelation_status())
            .finish()
    }
}

/// Lets an executing task observe and acknowledge suspend and resume requests.
#[derive(Clone)]
pub struct SuspendProxy {
    pub(super) state: Weak<dyn Shared>,
}

impl SuspendProxy {
    /// Returns `true` if the consumer or the executor asked the operation to pause.
    #[must_use]
    pub fn is_suspend_requested(&self) -> bool {
        self.suspend_request()
            .is_some_and(|request| request.target == SuspendTarget::Suspended)
    }

    /// Returns `true` if the consumer or the executor asked the suspended operation to continue.
    #[must_use]
    pub fn is_resume_requested(&self) -> bool {
        self.suspend_request()
            .is_some_and(|request| request.target == SuspendTarget::Resumed)
    }

    /// Returns the request waiting to be acknowledged, or `None` if there is none or the future
    /// is gone.
    ///
    /// While the executor forces a suspend status the consumer's requests are hidden.
    #[must_use]
    pub fn suspend_request(&self) -> Option<SuspendRequest> {
        self.state.upgrade()?.core().suspend_request()
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
}

impl fmt::Debug for SuspendProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SuspendProxy")
            .field("status", &self.suspend_status())
            .finish()
    }
}

/// A consumer-side handle that can send requests to a future without keeping it alive.
///
/// Once the [`Future`](super::Future) is dropped every request is a no-op.
#[derive(Clone)]
pub struct Token {
    pub(super) state: Weak<dyn Shared>,
}

impl Token {
    /// Requests cancelation, returns `true` if this call made the request.
    pub fn request_cancel(&self) -> bool {
        self.state
            .upgrade()
            .is_some_and(|state| state.core().request_cancel())
    }

    pub fn request_suspend(&self) -> bool {
        self.state
            .upgrade()
            .is_some_and(|state| state.core().request_suspend())
    }

    pub fn request_resume(&self) -> bool {
        self.state
            .upgrade()
            .is_some_and(|state| state.core().request_resume())
    }

    /// Returns the completion status, or `None` if the future is gone.
    #[must_use]
    pub fn status(&self) -> Option<CompletionStatus> {
        Some(self.state.upgrade()?.core().completion_status())
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("status", &self.status())
            .finish()
    }
}

/// A scheduler-side handle that forces requests onto a future without keeping it alive.
///
/// Forced requests take precedence over the consumer's: a forced cancel is reported with
/// [`RequestSource::Executor`], and while a forced suspend or resume is set the consumer's suspend
/// requests can't be acknowledged. The executor that forced a suspend is the one responsible for
/// resuming the operation and clearing the request again.
#[derive(Clone)]
pub struct ExecutorToken {
    pub(super) state: Weak<dyn Shared>,
}

impl ExecutorToken {
    /// Forces cancelation, returns `true` if this is the first forced cancel.
    pub fn force_cancel(&self) -> bool {
        self.state
            .upgrade()
            .is_some_and(|state| state.core().force_cancel())
    }

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

    /// Returns the suspend status, or `None` if the future is gone.
    #[must_use]
    pub fn suspend_status(&self) -> Option<SuspendStatus> {
        Some(self.state.upgrade()?.core().suspend_status())
    }

    /// Returns the completion status, or `None` if the future is gone.
    #[must_use]
    pub fn status(&self) -> Option<CompletionStatus> {
        Some(self.state.upgrade()?.core().completion_status())
    }
}

impl fmt::Debug for ExecutorToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutorToken")
            .field("status", &self.status())
            .finish()
    }
}

/// A type-erased, strong handle to a future.
///
/// Useful to wait on or cancel a set of futures with different output types together, see
/// [`block_on_all`](super::block_on_all) and [`block_on_any`](super::block_on_any). The value
/// can only be extracted through the typed [`Future`](super::Future).
#[derive(Clone)]
pub struct FutureAny {
    pub(super) state: Arc<dyn Shared>,
}

impl FutureAny {
    #[must_use]
    pub fn status(&self) -> CompletionStatus {
        self.state.core().completion_status()
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        self.status().is_done()
    }

    pub fn request_cancel(&self) -> bool {
        self.state.core().request_cancel()
    }

    pub fn request_suspend(&self) -> bool {
        self.state.core().request_suspend()
    }

    pub fn request_resume(&self) -> bool {
        self.state.core().request_resume()
    }

    #[must_use]
    pub fn token(&self) -> Token {
        Token {
            state: Arc::downgrade(&self.state),
        }
    }
}

impl fmt::Debug for FutureAny {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FutureAny")
            .field("state", self.state.core())
            .finish()
    }
}
