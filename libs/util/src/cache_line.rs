// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use core::fmt;
use core::ops::{Deref, DerefMut};

cfg_if::cfg_if! {
    // Starting with Sandy Bridge the spatial prefetcher pulls pairs of 64-byte
    // cache lines at a time, and big.LITTLE ARM cores as well as POWER use 128-byte
    // lines outright.
    if #[cfg(any(
        target_arch = "x86_64",
        target_arch = "aarch64",
        target_arch = "powerpc64",
        target_arch = "arm64ec",
    ))] {
        /// The smallest distance (in bytes) two independently written values must be apart
        /// to not share a cache line on the current target.
        pub const DESTRUCTIVE_INTERFERENCE_SIZE: usize = 128;
    } else {
        /// The smallest distance (in bytes) two independently written values must be apart
        /// to not share a cache line on the current target.
        ///
        /// This target does not advertise its line size, so this is the conservative fallback.
        pub const DESTRUCTIVE_INTERFERENCE_SIZE: usize = 64;
    }
}

/// Pads and aligns a value to [`DESTRUCTIVE_INTERFERENCE_SIZE`].
///
/// Two atomics that are written by different cores but live on the same cache line keep stealing
/// that line from each other ("false sharing"), even though they are logically unrelated. Wrapping
/// each independently contended field in a `CacheLineAligned` places it on its own line.
///
/// This is purely a layout device, it derefs to the wrapped value and has no behaviour of its own.
///
/// ```
/// use core::sync::atomic::{AtomicUsize, Ordering};
/// use weft_util::CacheLineAligned;
///
/// struct Counters {
///     head: CacheLineAligned<AtomicUsize>,
///     tail: CacheLineAligned<AtomicUsize>,
/// }
///
/// let counters = Counters {
///     head: CacheLineAligned(AtomicUsize::new(0)),
///     tail: CacheLineAligned(AtomicUsize::new(0)),
/// };
/// counters.head.fetch_add(1, Ordering::Relaxed);
/// assert_eq!(counters.tail.load(Ordering::Relaxed), 0);
/// ```
// keep in sync with `DESTRUCTIVE_INTERFERENCE_SIZE` above
#[cfg_attr(
    any(
        target_arch = "x86_64",
        target_arch = "aarch64",
        target_arch = "powerpc64",
        target_arch = "arm64ec",
    ),
    repr(align(128))
)]
#[cfg_attr(
    not(any(
        target_arch = "x86_64",
        target_arch = "aarch64",
        target_arch = "powerpc64",
        target_arch = "arm64ec",
    )),
    repr(align(64))
)]
#[derive(Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheLineAligned<T>(pub T);

// === impl CacheLineAligned ===

impl<T> CacheLineAligned<T> {
    #[inline]
    pub const fn new(value: T) -> Self {
        Self(value)
    }

    #[inline]
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> Deref for CacheLineAligned<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> DerefMut for CacheLineAligned<T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        &mut self.0
    }
}

impl<T> From<T> for CacheLineAligned<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

impl<T: fmt::Debug> fmt::Debug for CacheLineAligned<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CacheLineAligned").field(&self.0).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::mem::{align_of, size_of};
    use core::sync::atomic::{AtomicU8, AtomicUsize};
    use static_assertions::const_assert_eq;

    const_assert_eq!(
        align_of::<CacheLineAligned<AtomicU8>>(),
        DESTRUCTIVE_INTERFERENCE_SIZE
    );

    #[test]
    fn small_values_fill_a_whole_line() {
        assert_eq!(
            size_of::<CacheLineAligned<AtomicU8>>(),
            DESTRUCTIVE_INTERFERENCE_SIZE
        );
        assert_eq!(
            size_of::<CacheLineAligned<AtomicUsize>>(),
            DESTRUCTIVE_INTERFERENCE_SIZE
        );
    }

    #[test]
    fn neighbours_never_share_a_line() {
        struct Pair {
            a: CacheLineAligned<AtomicU8>,
            b: CacheLineAligned<AtomicU8>,
        }

        let pair = Pair {
            a: CacheLineAligned::new(AtomicU8::new(0)),
            b: CacheLineAligned::new(AtomicU8::new(0)),
        };

        let a = core::ptr::from_ref(&*pair.a).addr();
        let b = core::ptr::from_ref(&*pair.b).addr();
        assert!(a.abs_diff(b) >= DESTRUCTIVE_INTERFERENCE_SIZE);
        assert_eq!(a % DESTRUCTIVE_INTERFERENCE_SIZE, 0);
    }

    #[test]
    fn large_values_round_up() {
        let padded = CacheLineAligned::new([0_u8; 130]);
        assert_eq!(size_of_val(&padded) % DESTRUCTIVE_INTERFERENCE_SIZE, 0);
        assert_eq!(padded.into_inner().len(), 130);
    }
}
