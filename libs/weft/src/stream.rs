// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Append-only, multi-producer, multi-consumer streams of chunks.
//!
//! [`channel`] creates a [`Generator`] and a [`Stream`] sharing one chain of chunks. Both handles
//! can be cloned freely: every generator appends to the same chain and every stream reads from
//! it. Appending and reading never take a lock, readers address chunks by index and get a
//! reference-counted [`ChunkRef`] back, so a chunk stays alive for as long as somebody uses it.
//!
//! A stream is closed by yielding a chunk with `close = true`. Closing never discards anything:
//! producers that keep yielding afterwards (or that raced the close) append to a separate
//! *residual* chain which [`Stream::poll`] continues into after the live chain ends.
//!
//! ```
//! use weft::stream;
//!
//! let (generator, stream) = stream::channel();
//! generator.yield_value(10, false);
//! generator.yield_value(20, false);
//! assert!(generator.yield_value(30, true));
//!
//! let values: Vec<i32> = stream.iter().map(|chunk| *chunk.lock()).collect();
//! assert_eq!(values, [10, 20, 30]);
//! assert!(stream.is_closed());
//! ```

mod chunk;
mod state;

use alloc::sync::Arc;
use core::fmt;

pub use chunk::{Chunk, ChunkRef};
use state::{Route, StreamState};

use crate::error::AllocError;

/// Creates a new, empty stream returning its producer and consumer handles.
#[must_use]
pub fn channel<T>() -> (Generator<T>, Stream<T>) {
    let state = Arc::new(StreamState::new());
    (
        Generator {
            state: state.clone(),
        },
        Stream { state },
    )
}

/// The producer side of a stream.
pub struct Generator<T> {
    state: Arc<StreamState<T>>,
}

/// The consumer side of a stream.
pub struct Stream<T> {
    state: Arc<StreamState<T>>,
}

/// A chunk returned by [`Stream::poll_entry`].
pub struct Polled<T> {
    chunk: ChunkRef<T>,
    residual: bool,
}

/// A reader that remembers its position in a [`Stream`].
///
/// Each cursor tracks its own position, so several consumers can read the same stream at their
/// own pace. Reaching the end is not final: once more chunks are yielded,
/// [`StreamCursor::next_chunk`] returns them.
///
/// The position is kept separately for the live and the residual chain. A producer that raced
/// the close can still link its chunk into the live chain after the cursor moved on to residual
/// chunks, the cursor picks it up on its next call instead of reading a residual chunk twice.
pub struct StreamCursor<T> {
    stream: Stream<T>,
    live: usize,
    residual: usize,
}

// === impl Generator ===

impl<T> Generator<T> {
    /// Appends `chunk` to the stream.
    ///
    /// If `close` is set the stream is closed. Returns `true` if this call closed it, a chunk
    /// yielded with `close` to an already closed stream is still appended but returns `false`.
    pub fn yield_chunk(&self, chunk: Chunk<T>, close: bool) -> bool {
        self.state.push(chunk, close)
    }

    /// Wraps `value` in a new [`Chunk`] and appends it to the stream.
    pub fn yield_value(&self, value: T, close: bool) -> bool {
        self.yield_chunk(Chunk::new(value), close)
    }

    /// Like [`Generator::yield_value`] but reports allocation failure instead of aborting.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError`] if the chunk could not be allocated, nothing is appended in that
    /// case.
    pub fn try_yield_value(&self, value: T, close: bool) -> Result<bool, AllocError> {
        Ok(self.yield_chunk(Chunk::try_new(value)?, close))
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.is_closed()
    }

    /// Returns a [`Stream`] reading from this generator's chain.
    #[must_use]
    pub fn subscribe(&self) -> Stream<T> {
        Stream {
            state: self.state.clone(),
        }
    }
}

impl<T> Clone for Generator<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<T> fmt::Debug for Generator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Generator")
            .field("state", &self.state)
            .finish()
    }
}

// === impl Stream ===

impl<T> Stream<T> {
    /// Returns the chunk at `index`, or `None` if fewer chunks have been yielded so far.
    ///
    /// Indices count the live chain first and continue into the chunks yielded after the stream
    /// was closed. Never blocks.
    ///
    /// Past the end of the live chain the index is a snapshot: a producer that raced the close may
    /// still link a chunk at the end of the live chain, moving every later chunk up by one. Use
    /// [`Stream::iter`] to read every chunk exactly once.
    #[must_use]
    pub fn poll(&self, index: usize) -> Option<ChunkRef<T>> {
        self.state.poll(index).map(|found| found.chunk)
    }

    /// Like [`Stream::poll`] but also reports whether the chunk was yielded after close.
    #[must_use]
    pub fn poll_entry(&self, index: usize) -> Option<Polled<T>> {
        self.state.poll(index).map(|found| Polled {
            chunk: found.chunk,
            residual: found.route == Route::Residual,
        })
    }

    /// Returns the chunk at `index` of the live chain, ignoring chunks yielded after close.
    #[must_use]
    pub fn poll_live(&self, index: usize) -> Option<ChunkRef<T>> {
        self.state.poll_live(index)
    }

    /// Returns the chunk at `index` of the chunks yielded after close.
    #[must_use]
    pub fn poll_residual(&self, index: usize) -> Option<ChunkRef<T>> {
        self.state.poll_residual(index)
    }

    /// Returns the number of chunks yielded so far.
    ///
    /// Walks the whole chain.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.poll(0).is_none()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.is_closed()
    }

    /// Returns a cursor starting at the first chunk.
    #[must_use]
    pub fn iter(&self) -> StreamCursor<T> {
        StreamCursor {
            stream: self.clone(),
            live: 0,
            residual: 0,
        }
    }
}

impl<T> Clone for Stream<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<T> fmt::Debug for Stream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("state", &self.state)
            .finish()
    }
}

// === impl Polled ===

impl<T> Polled<T> {
    #[must_use]
    pub fn chunk(&self) -> &ChunkRef<T> {
        &self.chunk
    }

    #[must_use]
    pub fn into_chunk(self) -> ChunkRef<T> {
        self.chunk
    }

    /// Returns `true` if the chunk was yielded after the stream was closed.
    #[must_use]
    pub fn is_residual(&self) -> bool {
        self.residual
    }
}

impl<T: fmt::Debug> fmt::Debug for Polled<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Polled")
            .field("chunk", &self.chunk)
            .field("residual", &self.residual)
            .finish()
    }
}

// === impl StreamCursor ===

impl<T> StreamCursor<T> {
    /// Returns the next unread chunk and advances the cursor, or `None` if there is none yet.
    pub fn next_chunk(&mut self) -> Option<ChunkRef<T>> {
        if let Some(chunk) = self.stream.poll_live(self.live) {
            self.live += 1;
            return Some(chunk);
        }

        let chunk = self.stream.poll_residual(self.residual)?;
        self.residual += 1;
        Some(chunk)
    }

    /// Returns the number of chunks this cursor has read so far.
    #[must_use]
    pub fn position(&self) -> usize {
        self.live + self.residual
    }
}

impl<T> Iterator for StreamCursor<T> {
    type Item = ChunkRef<T>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_chunk()
    }
}

impl<T> fmt::Debug for StreamCursor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamCursor")
            .field("stream", &self.stream)
            .field("live", &self.live)
            .field("residual", &self.residual)
            .finish()
    }
}
