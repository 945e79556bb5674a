// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The state shared between a [`Future`](super::Future) and its [`Promise`](super::Promise).
//!
//! # Completion
//!
//! The completion word has more states than the public [`CompletionStatus`]:
//!
//! ```text
//!            claim                 publish
//! PENDING ----------> COMPLETING ----------> COMPLETED --(take)--> TAKEN
//!                          |
//!                          +---------------> CANCELED
//! ```
//!
//! Whoever wins the `PENDING -> COMPLETING` CAS is the only thread that may touch the result
//! storage before publishing, every other completion attempt fails at the claim. `COMPLETING`
//! reads as `Pending` and `TAKEN` reads as `Completed` from the outside.
//!
//! The value is written *before* the release store of `COMPLETED`, readers acquire-load the word
//! before touching the storage. The storage is initialized exactly while the word is `COMPLETED`,
//! which is what `Drop` uses to decide whether there is a value left to destroy.
//!
//! # Requests
//!
//! Cancel and suspend requests come from two sources. The consumer's requests drive the
//! cancelation and suspend status words directly. The executor's requests are kept in separate
//! words and override the consumer's while they are set: a forced cancel can't be withdrawn, a
//! forced suspend or resume stays in effect until the executor clears it.

use core::fmt;
use core::mem::MaybeUninit;

use weft_util::CacheLineAligned;

use super::status::{
    AtomicStatus, CancelationStatus, CompletionStatus, ExecutionStatus, RequestSource,
    SuspendRequest, SuspendStatus, SuspendTarget,
};
use crate::error::FutureError;
use crate::loom::cell::UnsafeCell;
use crate::loom::sync::atomic::{AtomicBool, AtomicU8, Ordering};

const PENDING: u8 = 0;
const COMPLETING: u8 = 1;
const COMPLETED: u8 = 2;
const TAKEN: u8 = 3;
const CANCELED: u8 = 4;

/// Outcome of an attempt to resolve a [`FutureState`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Resolved {
    /// The value was stored and published.
    Completed,
    /// The state was resolved to canceled, any value was dropped.
    Canceled,
    /// Somebody else resolved the state first.
    Lost,
}

/// The type-independent part of the shared state.
pub(crate) struct FutureCore {
    completion: CacheLineAligned<AtomicU8>,
    cancelation: AtomicStatus<CancelationStatus>,
    suspend: AtomicStatus<SuspendStatus>,
    execution: AtomicStatus<ExecutionStatus>,
    forced_cancel: AtomicBool,
    forced_suspend: AtomicStatus<Option<SuspendTarget>>,
}

impl FutureCore {
    fn new() -> Self {
        Self {
            completion: CacheLineAligned::new(AtomicU8::new(PENDING)),
            cancelation: AtomicStatus::new(CancelationStatus::Uncanceled),
            suspend: AtomicStatus::new(SuspendStatus::Resumed),
            execution: AtomicStatus::new(ExecutionStatus::Unscheduled),
            forced_cancel: AtomicBool::new(false),
            forced_suspend: AtomicStatus::new(None),
        }
    }

    pub(crate) fn completion_status(&self) -> CompletionStatus {
        match self.completion.load(Ordering::Acquire) {
            PENDING | COMPLETING => CompletionStatus::Pending,
            COMPLETED | TAKEN => CompletionStatus::Completed,
            CANCELED => CompletionStatus::Canceled,
            bits => unreachable!("invalid completion status {bits}"),
        }
    }

    pub(crate) fn cancelation_status(&self) -> CancelationStatus {
        self.cancelation.load(Ordering::Relaxed)
    }

    pub(crate) fn suspend_status(&self) -> SuspendStatus {
        self.suspend.load(Ordering::Relaxed)
    }

    pub(crate) fn execution_status(&self) -> ExecutionStatus {
        self.execution.load(Ordering::Relaxed)
    }

    /// Returns `true` if this call moved the state out of `Uncanceled`.
    pub(crate) fn request_cancel(&self) -> bool {
        let requested = self
            .cancelation
            .transition(
                CancelationStatus::Uncanceled,
                CancelationStatus::CancelRequested,
                Ordering::Relaxed,
            )
            .is_ok();
        if requested {
            tracing::trace!("cancel requested");
        }
        requested
    }

    /// Returns `true` if the state is now `Canceling`, either because of this call or an earlier
    /// acknowledgement.
    pub(crate) fn try_acknowledge_cancel(&self) -> bool {
        match self.cancelation.transition(
            CancelationStatus::CancelRequested,
            CancelationStatus::Canceling,
            Ordering::Relaxed,
        ) {
            Ok(()) => {
                tracing::trace!("cancel acknowledged");
                true
            }
            Err(observed) => observed == CancelationStatus::Canceling,
        }
    }

    pub(crate) fn request_suspend(&self) -> bool {
        self.suspend_step(&[
            (SuspendStatus::Resumed, SuspendStatus::SuspendRequested),
            (SuspendStatus::ResumeRequested, SuspendStatus::Suspended),
        ])
    }

    pub(crate) fn request_resume(&self) -> bool {
        self.suspend_step(&[
            (SuspendStatus::Suspended, SuspendStatus::ResumeRequested),
            (SuspendStatus::SuspendRequested, SuspendStatus::Resumed),
        ])
    }

    pub(crate) fn try_acknowledge_suspend(&self) -> bool {
        match self.forced_suspend.load(Ordering::Relaxed) {
            Some(SuspendTarget::Suspended) => self.settle(SuspendStatus::Suspended),
            Some(SuspendTarget::Resumed) => false,
            None => {
                self.suspend_step(&[(SuspendStatus::SuspendRequested, SuspendStatus::Suspended)])
            }
        }
    }

    pub(crate) fn try_acknowledge_resume(&self) -> bool {
        match self.forced_suspend.load(Ordering::Relaxed) {
            Some(SuspendTarget::Resumed) => self.settle(SuspendStatus::Resumed),
            Some(SuspendTarget::Suspended) => false,
            None => self.suspend_step(&[(SuspendStatus::ResumeRequested, SuspendStatus::Resumed)]),
        }
    }

    /// Requests cancelation on behalf of the executor.
    ///
    /// Returns `true` if this is the first forced cancel. The request also shows up as a regular
    /// cancel request, so producers acknowledge it the same way.
    pub(crate) fn force_cancel(&self) -> bool {
        let first = !self.forced_cancel.swap(true, Ordering::Relaxed);
        let _ = self.cancelation.transition(
            CancelationStatus::Uncanceled,
            CancelationStatus::CancelRequested,
            Ordering::Relaxed,
        );
        if first {
            tracing::trace!("cancel forced by executor");
        }
        first
    }

    pub(crate) fn force_suspend(&self) {
        self.forced_suspend
            .store(Some(SuspendTarget::Suspended), Ordering::Relaxed);
        tracing::trace!("suspend forced by executor");
    }

    pub(crate) fn force_resume(&self) {
        self.forced_suspend
            .store(Some(SuspendTarget::Resumed), Ordering::Relaxed);
        tracing::trace!("resume forced by executor");
    }

    /// Hands control over the suspend status back to the consumer.
    pub(crate) fn clear_forced_suspend(&self) {
        self.forced_suspend.store(None, Ordering::Relaxed);
    }

    /// Returns who requested cancelation, or `None` if nobody did.
    pub(crate) fn cancel_request(&self) -> Option<RequestSource> {
        if self.forced_cancel.load(Ordering::Relaxed) {
            return Some(RequestSource::Executor);
        }
        (self.cancelation_status() != CancelationStatus::Uncanceled).then_some(RequestSource::User)
    }

    /// Returns the suspend or resume request the producer still has to acknowledge.
    ///
    /// A forced request hides the consumer's for as long as it is set.
    pub(crate) fn suspend_request(&self) -> Option<SuspendRequest> {
        let status = self.suspend_status();
        if let Some(target) = self.forced_suspend.load(Ordering::Relaxed) {
            return (status != target.settled()).then_some(SuspendRequest {
                source: RequestSource::Executor,
                target,
            });
        }

        let target = match status {
            SuspendStatus::SuspendRequested => SuspendTarget::Suspended,
            SuspendStatus::ResumeRequested => SuspendTarget::Resumed,
            SuspendStatus::Resumed | SuspendStatus::Suspended => return None,
        };
        Some(SuspendRequest {
            source: RequestSource::User,
            target,
        })
    }

    /// Moves the suspend status to `settled` from wherever it is.
    fn settle(&self, settled: SuspendStatus) -> bool {
        let mut current = self.suspend.load(Ordering::Relaxed);
        while current != settled {
            match self.suspend.transition(current, settled, Ordering::Relaxed) {
                Ok(()) => {
                    tracing::trace!(from = ?current, to = ?settled, "forced suspend status change");
                    return true;
                }
                Err(observed) => current = observed,
            }
        }
        false
    }

    /// Applies the first transition whose source matches the current suspend status.
    fn suspend_step(&self, transitions: &[(SuspendStatus, SuspendStatus)]) -> bool {
        let mut current = self.suspend.load(Ordering::Relaxed);
        loop {
            let Some(&(_, next)) = transitions.iter().find(|(from, _)| *from == current) else {
                return false;
            };
            match self.suspend.transition(current, next, Ordering::Relaxed) {
                Ok(()) => {
                    tracing::trace!(from = ?current, to = ?next, "suspend status changed");
                    return true;
                }
                Err(observed) => current = observed,
            }
        }
    }

    pub(crate) fn advance_execution(&self, status: ExecutionStatus) {
        self.execution.advance(status);
    }

    fn try_claim(&self) -> bool {
        self.completion
            .compare_exchange(PENDING, COMPLETING, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    fn publish(&self, bits: u8) {
        debug_assert_eq!(self.completion.load(Ordering::Relaxed), COMPLETING);
        self.completion.store(bits, Ordering::Release);
    }
}

impl fmt::Debug for FutureCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FutureCore")
            .field("completion", &self.completion_status())
            .field("cancelation", &self.cancelation)
            .field("suspend", &self.suspend)
            .field("execution", &self.execution)
            .field("forced_cancel", &self.forced_cancel.load(Ordering::Relaxed))
            .field("forced_suspend", &self.forced_suspend)
            .finish()
    }
}

/// The shared state of one asynchronous operation producing a `T`.
pub(crate) struct FutureState<T> {
    core: FutureCore,
    value: UnsafeCell<MaybeUninit<T>>,
}

// Safety: the value is only written by the thread that won the completion claim and only read
// after acquiring the published `COMPLETED` status, so sharing the state only ever moves `T`
// between threads. Concurrent shared reads of `T` are prevented by `Future` not being `Sync`
// unless `T` is.
unsafe impl<T: Send> Send for FutureState<T> {}
// Safety: see above
unsafe impl<T: Send> Sync for FutureState<T> {}

impl<T> FutureState<T> {
    pub(crate) fn new() -> Self {
        Self {
            core: FutureCore::new(),
            value: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }

    pub(crate) fn core(&self) -> &FutureCore {
        &self.core
    }

    /// Resolves the state with `value`, or to canceled if cancelation was acknowledged.
    pub(crate) fn complete(&self, value: T) -> Resolved {
        if !self.core.try_claim() {
            return Resolved::Lost;
        }

        if self.core.cancelation_status() == CancelationStatus::Canceling {
            drop(value);
            self.core.publish(CANCELED);
            tracing::trace!("future resolved canceled");
            return Resolved::Canceled;
        }

        self.value.with_mut(|slot| {
            // Safety: winning the claim gives us exclusive access to the storage until we publish
            unsafe { (*slot).write(value) };
        });
        self.core.publish(COMPLETED);
        tracing::trace!("future completed");
        Resolved::Completed
    }

    /// Resolves the state to canceled, regardless of whether cancelation was requested.
    pub(crate) fn cancel(&self) -> Resolved {
        if !self.core.try_claim() {
            return Resolved::Lost;
        }
        self.core.publish(CANCELED);
        tracing::trace!("future resolved canceled");
        Resolved::Canceled
    }

    pub(crate) fn copy(&self) -> Result<T, FutureError>
    where
        T: Clone,
    {
        match self.core.completion.load(Ordering::Acquire) {
            COMPLETED => Ok(self.value.with(|slot| {
                // Safety: `COMPLETED` was published after the value was written and is only left
                // through `take`, which requires exclusive access to the consumer.
                unsafe { (*slot).assume_init_ref().clone() }
            })),
            other => Err(Self::error_for(other)),
        }
    }

    /// Moves the value out of the storage.
    ///
    /// # Safety
    ///
    /// The caller must guarantee no other `copy` or `take` runs concurrently.
    pub(crate) unsafe fn take(&self) -> Result<T, FutureError> {
        match self.core.completion.load(Ordering::Acquire) {
            COMPLETED => {
                // Safety: the value is initialized (see `copy`) and the caller guarantees we are
                // the only reader, flipping to `TAKEN` below keeps `Drop` and later readers away.
                let value = self.value.with(|slot| unsafe { (*slot).assume_init_read() });
                self.core.completion.store(TAKEN, Ordering::Relaxed);
                Ok(value)
            }
            other => Err(Self::error_for(other)),
        }
    }

    fn error_for(bits: u8) -> FutureError {
        match bits {
            PENDING | COMPLETING => FutureError::Pending,
            CANCELED => FutureError::Canceled,
            TAKEN => FutureError::Taken,
            _ => unreachable!("invalid completion status {bits}"),
        }
    }
}

impl<T> Drop for FutureState<T> {
    fn drop(&mut self) {
        if self.core.completion.load(Ordering::Acquire) == COMPLETED {
            self.value.with_mut(|slot| {
                // Safety: `COMPLETED` means the value is initialized and was never taken
                unsafe { (*slot).assume_init_drop() };
            });
        }
    }
}

impl<T> fmt::Debug for FutureState<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.core, f)
    }
}

/// Type-erased access to the status words of a [`FutureState`].
pub(crate) trait Shared: Send + Sync {
    fn core(&self) -> &FutureCore;
}

impl<T: Send> Shared for FutureState<T> {
    fn core(&self) -> &FutureCore {
        &self.core
    }
}
