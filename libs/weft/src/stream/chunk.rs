// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use alloc::alloc::{Layout, alloc};
use alloc::boxed::Box;
use core::fmt;
use core::ops::{Deref, DerefMut};
use core::ptr::{self, NonNull};

use weft_spin::{SpinLock, SpinLockGuard};

use crate::error::AllocError;
use crate::loom::sync::atomic::{self, AtomicPtr, AtomicUsize, Ordering};

/// Reference counts above this are treated as a leak, the same limit `Arc` uses.
const MAX_REFCOUNT: usize = usize::MAX >> 1;

/// One heap-allocated link of a stream's chain.
pub(crate) struct Node<T> {
    refs: AtomicUsize,
    /// Null until the next node is linked, never changes afterwards.
    pub(crate) next: AtomicPtr<Node<T>>,
    value: SpinLock<T>,
}

impl<T> Node<T> {
    fn new(value: T) -> Self {
        Self {
            refs: AtomicUsize::new(1),
            next: AtomicPtr::new(ptr::null_mut()),
            value: SpinLock::new(value),
        }
    }

    /// Takes an additional reference to the node behind `ptr`.
    ///
    /// # Safety
    ///
    /// `ptr` must point to a live node the caller can prove is kept alive by some other reference
    /// for the duration of this call.
    unsafe fn clone_ref(ptr: NonNull<Self>) {
        // Safety: ensured by caller
        let old = unsafe { ptr.as_ref() }.refs.fetch_add(1, Ordering::Relaxed);
        assert!(old <= MAX_REFCOUNT, "chunk reference count overflow");
    }

    /// Releases one reference to the node behind `ptr`, freeing it if it was the last one.
    ///
    /// # Safety
    ///
    /// The caller must own one reference to the node and must not use `ptr` afterwards.
    pub(crate) unsafe fn drop_ref(ptr: NonNull<Self>) {
        // Safety: the caller's reference keeps the node alive until the decrement
        if unsafe { ptr.as_ref() }.refs.fetch_sub(1, Ordering::Release) != 1 {
            return;
        }
        // synchronize with the decrements of every other reference before destroying
        atomic::fence(Ordering::Acquire);
        // Safety: that was the last reference, nodes are always allocated as `Box<Node<T>>` or
        // with the identical layout (see `Chunk::try_new`)
        drop(unsafe { Box::from_raw(ptr.as_ptr()) });
    }
}

/// A freshly created chunk that hasn't been yielded to a stream yet.
///
/// The chunk is exclusively owned, so its value can be accessed without locking through `Deref`
/// and `DerefMut`. [`Generator::yield_chunk`](super::Generator::yield_chunk) consumes it and hands
/// the reference to the stream, after which it is only reachable through [`ChunkRef`]s.
pub struct Chunk<T> {
    node: NonNull<Node<T>>,
}

// Safety: a `Chunk` is a unique owner of its node, like a `Box`
unsafe impl<T: Send> Send for Chunk<T> {}
// Safety: see above
unsafe impl<T: Sync> Sync for Chunk<T> {}

impl<T> Chunk<T> {
    pub fn new(value: T) -> Self {
        let node = Box::new(Node::new(value));
        Self {
            node: NonNull::from(Box::leak(node)),
        }
    }

    /// Creates a new chunk, reporting allocation failure instead of aborting.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError`] if the global allocator could not allocate the chunk.
    pub fn try_new(value: T) -> Result<Self, AllocError> {
        let layout = Layout::new::<Node<T>>();
        // Safety: `Node` contains atomics, so the layout is never zero-sized
        let ptr = unsafe { alloc(layout) }.cast::<Node<T>>();
        let node = NonNull::new(ptr).ok_or(AllocError)?;
        // Safety: freshly allocated with the layout of `Node<T>`
        unsafe { node.as_ptr().write(Node::new(value)) };
        Ok(Self { node })
    }

    #[must_use]
    pub fn into_inner(self) -> T {
        let node = self.into_raw();
        // Safety: we owned the only reference, so the node is ours to unbox
        let node = unsafe { Box::from_raw(node.as_ptr()) };
        node.value.into_inner()
    }

    /// Turns the chunk into its raw node pointer, transferring the reference to the caller.
    pub(crate) fn into_raw(self) -> NonNull<Node<T>> {
        let node = self.node;
        core::mem::forget(self);
        node
    }

    fn node(&self) -> &Node<T> {
        // Safety: we own a reference to the node
        unsafe { self.node.as_ref() }
    }
}

impl<T> Deref for Chunk<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Safety: the chunk was never shared, nobody else can hold the lock
        unsafe { &*self.node().value.data_ptr() }
    }
}

impl<T> DerefMut for Chunk<T> {
    fn deref_mut(&mut self) -> &mut T {
        // Safety: we uniquely own the node
        unsafe { self.node.as_mut() }.value.get_mut()
    }
}

impl<T> Drop for Chunk<T> {
    fn drop(&mut self) {
        // Safety: we own the only reference
        unsafe { Node::drop_ref(self.node) }
    }
}

impl<T: fmt::Debug> fmt::Debug for Chunk<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Chunk").field(&**self).finish()
    }
}

/// A shared, reference-counted handle to a chunk that was yielded to a stream.
///
/// The value sits behind a spin lock: use [`ChunkRef::lock`] for short in-place updates and
/// [`ChunkRef::with`] to read it. Don't hold the guard across anything that blocks or allocates,
/// every other handle to the chunk spins while it is held.
pub struct ChunkRef<T> {
    node: NonNull<Node<T>>,
}

// Safety: the value is only reachable through the spin lock, which makes `T: Send` enough for
// sharing, and the reference count is atomic
unsafe impl<T: Send> Send for ChunkRef<T> {}
// Safety: see above
unsafe impl<T: Send> Sync for ChunkRef<T> {}

impl<T> ChunkRef<T> {
    /// Takes an additional reference to a node that is kept alive by a stream.
    ///
    /// # Safety
    ///
    /// `node` must be linked into a stream whose state outlives this call.
    pub(crate) unsafe fn clone_from_raw(node: NonNull<Node<T>>) -> Self {
        // Safety: ensured by caller
        unsafe { Node::clone_ref(node) };
        Self { node }
    }

    fn node(&self) -> &Node<T> {
        // Safety: we own a reference to the node
        unsafe { self.node.as_ref() }
    }

    /// Locks the value for in-place mutation.
    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        self.node().value.lock()
    }

    pub fn try_lock(&self) -> Option<SpinLockGuard<'_, T>> {
        self.node().value.try_lock()
    }

    /// Calls `f` with a reference to the value while holding the chunk's lock.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.lock())
    }

    /// Returns the number of references to this chunk, including the one held by its stream.
    ///
    /// The count may change concurrently, use it for diagnostics only.
    #[must_use]
    pub fn ref_count(&self) -> usize {
        self.node().refs.load(Ordering::Relaxed)
    }

    /// Returns `true` if both handles refer to the same chunk.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.node == other.node
    }
}

impl<T> Clone for ChunkRef<T> {
    fn clone(&self) -> Self {
        // Safety: our own reference keeps the node alive
        unsafe { Node::clone_ref(self.node) };
        Self { node: self.node }
    }
}

impl<T> Drop for ChunkRef<T> {
    fn drop(&mut self) {
        // Safety: we own one reference and never touch the node again
        unsafe { Node::drop_ref(self.node) }
    }
}

impl<T: fmt::Debug> fmt::Debug for ChunkRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkRef")
            .field("addr", &self.node)
            .field("refs", &self.ref_count())
            .field("value", &self.node().value)
            .finish()
    }
}
