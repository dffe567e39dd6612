//! Capability contracts for streamable content.
//!
//! Two capabilities exist:
//!
//! - [`ChunkSource`]: a single named item read as an ordered sequence of
//!   bounded chunks.
//! - [`CollectionSource`]: a flat, ordered sequence of `ChunkSource`s.
//!
//! Both hand out *lending cursors* rather than `Iterator`s. A chunk borrows
//! the source's single read buffer and a member borrows the collection's
//! cursor, so the next call to `next_chunk`/`next_member` cannot happen while
//! the previous item is still in use. Two live iterations over the same
//! source cannot be expressed at all: `chunks()`/`members()` take `&mut self`.

use std::path::Path;

use crate::error::SourceError;

/// Default size of the per-source read buffer.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Order in which a collection yields its members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntryOrder {
    /// Whatever the backing listing returns. Constant memory.
    #[default]
    Listing,
    /// Byte-lexicographic by entry name. Holds every entry name (never a
    /// handle) in memory once iteration starts.
    Sorted,
}

/// Construction-time options shared by all sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceOptions {
    /// Upper bound on the length of every chunk.
    pub chunk_size: usize,
    pub order: EntryOrder,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            order: EntryOrder::default(),
        }
    }
}

impl SourceOptions {
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            chunk_size,
            ..Self::default()
        }
    }

    pub fn sorted(mut self) -> Self {
        self.order = EntryOrder::Sorted;
        self
    }
}

/// Construction from a path.
///
/// Construction always succeeds at the type level and takes ownership of the
/// underlying resource immediately. A failure is recorded on the instance and
/// reported by its `error()` observation.
pub trait Open: Sized {
    fn open(path: &Path, options: &SourceOptions) -> Self;
}

/// Forward-only cursor over the chunks of one [`ChunkSource`].
pub trait ChunkCursor {
    /// Produce the next chunk, or `None` once the source is exhausted or
    /// errored. The returned slice is only valid until the next call.
    fn next_chunk(&mut self) -> Option<&[u8]>;
}

/// A single named item that can be read chunk by chunk.
pub trait ChunkSource: Open {
    type Chunks<'a>: ChunkCursor
    where
        Self: 'a;

    /// Stable identifier, used for HTTP metadata and range filtering.
    fn name(&self) -> &str;

    /// First error observed on this source. Sticky once set.
    fn error(&self) -> Option<&SourceError>;

    /// Begin the single pass over this source.
    ///
    /// Calling this again after the pass has started returns a cursor that
    /// yields nothing and records [`SourceError::Busy`].
    fn chunks(&mut self) -> Self::Chunks<'_>;
}

/// Forward-only cursor over the members of one [`CollectionSource`].
pub trait MemberCursor {
    type Item: ChunkSource;

    /// Advance to the next member. The previous member is destroyed (and its
    /// handle released) before the next one is produced.
    fn next_member(&mut self) -> Option<&mut Self::Item>;
}

/// A flat collection of chunk sources.
pub trait CollectionSource: Open {
    type Member: ChunkSource;
    type Members<'a>: MemberCursor<Item = Self::Member>
    where
        Self: 'a;

    /// First error observed while opening or traversing. Sticky once set.
    fn error(&self) -> Option<&SourceError>;

    fn members(&mut self) -> Self::Members<'_>;
}
