// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use core::fmt;
use core::marker::PhantomData;

use weft_util::CacheLineAligned;

use crate::loom::sync::atomic::{AtomicU8, Ordering};

/// Whether a future has produced its result.
///
/// `Completed` and `Canceled` are terminal.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum CompletionStatus {
    Pending,
    Completed,
    Canceled,
}

impl CompletionStatus {
    /// Returns `true` if the status is terminal.
    #[must_use]
    pub const fn is_done(self) -> bool {
        !matches!(self, CompletionStatus::Pending)
    }
}

/// Progress of a cooperative cancelation.
///
/// Moves forward only: `Uncanceled -> CancelRequested -> Canceling`, after which the producer
/// resolves the future to [`CompletionStatus::Canceled`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum CancelationStatus {
    Uncanceled,
    CancelRequested,
    Canceling,
}

/// Progress of a cooperative suspension.
///
/// Unlike cancelation this cycles: a suspended operation can be resumed and suspended again.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum SuspendStatus {
    Resumed,
    SuspendRequested,
    Suspended,
    ResumeRequested,
}

/// How far the scheduler and executor got with the operation backing a future.
///
/// Purely informational, the value never influences how the future resolves.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ExecutionStatus {
    Unscheduled,
    Scheduled,
    Submitted,
    Executing,
}

/// Who asked for a cancelation or a suspend status change.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum RequestSource {
    /// The consumer, through its [`Future`](super::Future) or a [`Token`](super::Token).
    User,
    /// The scheduler or executor running the operation. Its requests take precedence over the
    /// consumer's.
    Executor,
}

/// The suspend status a request asks the operation to settle in.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum SuspendTarget {
    Suspended,
    Resumed,
}

/// A suspend or resume request the producer has not acknowledged yet.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct SuspendRequest {
    pub source: RequestSource,
    pub target: SuspendTarget,
}

impl SuspendTarget {
    /// The [`SuspendStatus`] an acknowledged request of this kind leaves behind.
    pub(crate) const fn settled(self) -> SuspendStatus {
        match self {
            SuspendTarget::Suspended => SuspendStatus::Suspended,
            SuspendTarget::Resumed => SuspendStatus::Resumed,
        }
    }
}

pub(crate) trait Status: Copy + fmt::Debug {
    fn into_bits(self) -> u8;
    fn from_bits(bits: u8) -> Self;
}

impl Status for CancelationStatus {
    fn into_bits(self) -> u8 {
        match self {
            CancelationStatus::Uncanceled => 0,
            CancelationStatus::CancelRequested => 1,
            CancelationStatus::Canceling => 2,
        }
    }

    fn from_bits(bits: u8) -> Self {
        match bits {
            0 => CancelationStatus::Uncanceled,
            1 => CancelationStatus::CancelRequested,
            2 => CancelationStatus::Canceling,
            _ => unreachable!("invalid cancelation status {bits}"),
        }
    }
}

impl Status for SuspendStatus {
    fn into_bits(self) -> u8 {
        match self {
            SuspendStatus::Resumed => 0,
            SuspendStatus::SuspendRequested => 1,
            SuspendStatus::Suspended => 2,
            SuspendStatus::ResumeRequested => 3,
        }
    }

    fn from_bits(bits: u8) -> Self {
        match bits {
            0 => SuspendStatus::Resumed,
            1 => SuspendStatus::SuspendRequested,
            2 => SuspendStatus::Suspended,
            3 => SuspendStatus::ResumeRequested,
            _ => unreachable!("invalid suspend status {bits}"),
        }
    }
}

// executor-forced suspend target, `None` while the executor doesn't care
impl Status for Option<SuspendTarget> {
    fn into_bits(self) -> u8 {
        match self {
            None => 0,
            Some(SuspendTarget::Suspended) => 1,
            Some(SuspendTarget::Resumed) => 2,
        }
    }

    fn from_bits(bits: u8) -> Self {
        match bits {
            0 => None,
            1 => Some(SuspendTarget::Suspended),
            2 => Some(SuspendTarget::Resumed),
            _ => unreachable!("invalid forced suspend target {bits}"),
        }
    }
}

// the encoding must be monotonic with the `Ord` impl, `AtomicStatus::advance` relies on it
impl Status for ExecutionStatus {
    fn into_bits(self) -> u8 {
        match self {
            ExecutionStatus::Unscheduled => 0,
            ExecutionStatus::Scheduled => 1,
            ExecutionStatus::Submitted => 2,
            ExecutionStatus::Executing => 3,
        }
    }

    fn from_bits(bits: u8) -> Self {
        match bits {
            0 => ExecutionStatus::Unscheduled,
            1 => ExecutionStatus::Scheduled,
            2 => ExecutionStatus::Submitted,
            3 => ExecutionStatus::Executing,
            _ => unreachable!("invalid execution status {bits}"),
        }
    }
}

/// A status enum stored in its own cache line.
pub(crate) struct AtomicStatus<S> {
    bits: CacheLineAligned<AtomicU8>,
    _status: PhantomData<S>,
}

impl<S: Status> AtomicStatus<S> {
    pub(crate) fn new(initial: S) -> Self {
        Self {
            bits: CacheLineAligned::new(AtomicU8::new(initial.into_bits())),
            _status: PhantomData,
        }
    }

    #[inline]
    pub(crate) fn load(&self, order: Ordering) -> S {
        S::from_bits(self.bits.load(order))
    }

    #[inline]
    pub(crate) fn store(&self, status: S, order: Ordering) {
        self.bits.store(status.into_bits(), order);
    }

    /// Attempts the `current -> new` transition, returning the observed status on failure.
    #[inline]
    pub(crate) fn transition(&self, current: S, new: S, order: Ordering) -> Result<(), S> {
        self.bits
            .compare_exchange(current.into_bits(), new.into_bits(), order, Ordering::Relaxed)
            .map(|_| ())
            .map_err(S::from_bits)
    }
}

impl AtomicStatus<ExecutionStatus> {
    /// Moves the status forward to `status`, never backwards.
    #[inline]
    pub(crate) fn advance(&self, status: ExecutionStatus) {
        self.bits.fetch_max(status.into_bits(), Ordering::Relaxed);
    }
}

impl<S: Status> fmt::Debug for AtomicStatus<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.load(Ordering::Relaxed), f)
    }
}
