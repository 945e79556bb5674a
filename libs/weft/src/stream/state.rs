// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The chain of chunks shared by all generators and streams of one channel.
//!
//! There are two chains. Appends go to the *live* chain until the stream is closed, every append
//! after that lands in the *residual* chain. Which one an append targets is decided by the
//! `yield_router`: a close swaps it to `Residual` and appends its own chunk to whatever the swap
//! returned, so the chunk that closed the stream is the last one of the live chain and late or
//! racing closers are redirected to the residual chain instead of being lost.
//!
//! Nodes are linked by CAS-ing a null `next` pointer, so appending never blocks, and nodes are
//! never unlinked or freed before the state itself is dropped. That's what makes it sound to
//! dereference any node reachable from a head while holding `&StreamState`.

use alloc::vec::Vec;
use core::fmt;
use core::ptr::{self, NonNull};

use weft_util::CacheLineAligned;

use super::chunk::{Chunk, ChunkRef, Node};
use crate::loom::sync::atomic::{AtomicPtr, AtomicU8, Ordering};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum Route {
    Live = 0,
    Residual = 1,
}

impl Route {
    fn from_bits(bits: u8) -> Self {
        if bits == Route::Live as u8 {
            Route::Live
        } else {
            Route::Residual
        }
    }
}

/// One singly linked chain of nodes.
struct Chain<T> {
    head: CacheLineAligned<AtomicPtr<Node<T>>>,
    /// Some node of the chain close to its end, appends start chasing the tail from here.
    tail_hint: CacheLineAligned<AtomicPtr<Node<T>>>,
}

impl<T> Chain<T> {
    fn new() -> Self {
        Self {
            head: CacheLineAligned::new(AtomicPtr::new(ptr::null_mut())),
            tail_hint: CacheLineAligned::new(AtomicPtr::new(ptr::null_mut())),
        }
    }

    /// Links `node` after the current tail of the chain.
    ///
    /// # Safety
    ///
    /// `node` must be a node that is not linked into any chain yet, the chain takes over the
    /// caller's reference.
    unsafe fn append(&self, node: NonNull<Node<T>>) {
        let hint = self.tail_hint.load(Ordering::Acquire);
        let mut link: &AtomicPtr<Node<T>> = if hint.is_null() {
            &self.head
        } else {
            // Safety: the hint only ever points at nodes linked into this chain
            unsafe { &(*hint).next }
        };

        loop {
            match link.compare_exchange(
                ptr::null_mut(),
                node.as_ptr(),
                Ordering::Release,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                // somebody else linked a node here first, chase it
                // Safety: linked nodes stay alive as long as the chain does
                Err(next) => link = unsafe { &(*next).next },
            }
        }

        self.tail_hint.store(node.as_ptr(), Ordering::Release);
    }

    /// Iterates over the raw nodes linked into the chain right now.
    fn nodes(&self) -> impl Iterator<Item = NonNull<Node<T>>> + '_ {
        let first = NonNull::new(self.head.load(Ordering::Acquire));
        core::iter::successors(first, |node| {
            // Safety: linked nodes stay alive as long as the chain does
            NonNull::new(unsafe { node.as_ref() }.next.load(Ordering::Acquire))
        })
    }

    /// Releases the chain's reference to each node, tail first.
    fn release(&mut self) {
        let nodes: Vec<_> = self.nodes().collect();
        for node in nodes.into_iter().rev() {
            // Safety: the chain owns exactly one reference to every linked node and we have
            // exclusive access, nobody can walk the chain anymore
            unsafe { Node::drop_ref(node) };
        }
        self.head.store(ptr::null_mut(), Ordering::Relaxed);
        self.tail_hint.store(ptr::null_mut(), Ordering::Relaxed);
    }
}

/// A chunk found by [`StreamState::poll`] together with the chain it was found in.
pub(crate) struct Found<T> {
    pub(crate) chunk: ChunkRef<T>,
    pub(crate) route: Route,
}

pub(crate) struct StreamState<T> {
    yield_slot: Chain<T>,
    residual_slot: Chain<T>,
    yield_router: CacheLineAligned<AtomicU8>,
}

// Safety: nodes hand out access to their values only through their spin lock, the chains
// themselves are only modified through atomics
unsafe impl<T: Send> Send for StreamState<T> {}
// Safety: see above
unsafe impl<T: Send> Sync for StreamState<T> {}

impl<T> StreamState<T> {
    pub(crate) fn new() -> Self {
        Self {
            yield_slot: Chain::new(),
            residual_slot: Chain::new(),
            yield_router: CacheLineAligned::new(AtomicU8::new(Route::Live as u8)),
        }
    }

    /// Appends `chunk`, closing the stream if `close` is set.
    ///
    /// Returns `true` if this call closed the stream.
    pub(crate) fn push(&self, chunk: Chunk<T>, close: bool) -> bool {
        let route = if close {
            Route::from_bits(
                self.yield_router
                    .swap(Route::Residual as u8, Ordering::Relaxed),
            )
        } else {
            Route::from_bits(self.yield_router.load(Ordering::Relaxed))
        };

        self.append_to(route, chunk);

        let closed = close && route == Route::Live;
        if closed {
            tracing::debug!("stream closed");
        } else if route == Route::Residual {
            tracing::trace!("chunk appended after close");
        }
        closed
    }

    fn append_to(&self, route: Route, chunk: Chunk<T>) {
        // Safety: a `Chunk` is never linked, yielding consumes it
        unsafe { self.chain(route).append(chunk.into_raw()) };
    }

    /// Returns the chunk at `index`, continuing into the residual chain past the live one.
    ///
    /// Past the end of the live chain this is a snapshot: a producer that loaded the live route
    /// before a close may still link its chunk after the closing one, shifting every residual
    /// index by one. Positions that must stay stable are tracked per chain, see
    /// [`StreamState::poll_live`] and [`StreamState::poll_residual`].
    pub(crate) fn poll(&self, index: usize) -> Option<Found<T>> {
        let live = self.yield_slot.nodes().map(|node| (node, Route::Live));
        let residual = self
            .residual_slot
            .nodes()
            .map(|node| (node, Route::Residual));

        let (node, route) = live.chain(residual).nth(index)?;
        Some(Found {
            // Safety: `node` is linked, and `&self` keeps the state and with it the node alive
            chunk: unsafe { ChunkRef::clone_from_raw(node) },
            route,
        })
    }

    /// Returns the chunk at `index` of the live chain.
    pub(crate) fn poll_live(&self, index: usize) -> Option<ChunkRef<T>> {
        let node = self.yield_slot.nodes().nth(index)?;
        // Safety: see `poll`
        Some(unsafe { ChunkRef::clone_from_raw(node) })
    }

    /// Returns the chunk at `index` of the residual chain.
    pub(crate) fn poll_residual(&self, index: usize) -> Option<ChunkRef<T>> {
        let node = self.residual_slot.nodes().nth(index)?;
        // Safety: see `poll`
        Some(unsafe { ChunkRef::clone_from_raw(node) })
    }

    pub(crate) fn len(&self) -> usize {
        self.yield_slot.nodes().count() + self.residual_slot.nodes().count()
    }

    pub(crate) fn is_closed(&self) -> bool {
        Route::from_bits(self.yield_router.load(Ordering::Relaxed)) == Route::Residual
    }

    fn chain(&self, route: Route) -> &Chain<T> {
        match route {
            Route::Live => &self.yield_slot,
            Route::Residual => &self.residual_slot,
        }
    }
}

impl<T> Drop for StreamState<T> {
    fn drop(&mut self) {
        self.residual_slot.release();
        self.yield_slot.release();
    }
}

impl<T> fmt::Debug for StreamState<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamState")
            .field("live", &self.yield_slot.nodes().count())
            .field("residual", &self.residual_slot.nodes().count())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use alloc::sync::Arc;

    use super::*;
    use crate::loom;
    use crate::stream::Stream;

    fn value(chunk: Option<ChunkRef<i32>>) -> Option<i32> {
        chunk.map(|chunk| *chunk.lock())
    }

    /// Yields 10, 20, 30 (closing) and a late 40, then links 99 into the live chain the way a
    /// producer does that loaded the live route right before the close.
    fn closed_with_late_live_append() -> Arc<StreamState<i32>> {
        let state = Arc::new(StreamState::new());
        state.push(Chunk::new(10), false);
        state.push(Chunk::new(20), false);
        assert!(state.push(Chunk::new(30), true));
        assert!(!state.push(Chunk::new(40), false));
        state.append_to(Route::Live, Chunk::new(99));
        state
    }

    #[test]
    fn late_live_append_keeps_per_chain_positions() {
        loom::model(|| {
            let state = closed_with_late_live_append();

            assert_eq!(value(state.poll_live(2)), Some(30));
            assert_eq!(value(state.poll_live(3)), Some(99));
            assert_eq!(value(state.poll_residual(0)), Some(40));
            assert!(state.poll_residual(1).is_none());
            assert_eq!(state.len(), 5);

            // the combined index is only a snapshot, 99 now sits in front of 40
            let found = state.poll(3).unwrap();
            assert_eq!(found.route, Route::Live);
            assert_eq!(*found.chunk.lock(), 99);
        });
    }

    #[test]
    fn cursor_sees_late_live_append_once() {
        loom::model(|| {
            let state = Arc::new(StreamState::new());
            state.push(Chunk::new(10), false);
            state.push(Chunk::new(20), false);
            assert!(state.push(Chunk::new(30), true));
            state.push(Chunk::new(40), false);

            let mut cursor = Stream {
                state: state.clone(),
            }
            .iter();
            let read: Vec<i32> = cursor.by_ref().map(|chunk| *chunk.lock()).collect();
            assert_eq!(read, [10, 20, 30, 40]);

            // a producer that raced the close links its chunk behind the closing one
            state.append_to(Route::Live, Chunk::new(99));

            assert_eq!(value(cursor.next_chunk()), Some(99));
            assert!(cursor.next_chunk().is_none());
            assert_eq!(cursor.position(), 5);

            state.push(Chunk::new(50), false);
            assert_eq!(value(cursor.next_chunk()), Some(50));
        });
    }

    #[test]
    fn release_counts_both_chains() {
        loom::model(|| {
            let state = closed_with_late_live_append();
            let held = state.poll_residual(0).unwrap();
            assert_eq!(held.ref_count(), 2);
            drop(state);
            assert_eq!(held.ref_count(), 1);
        });
    }
}
