//! Chunked HTTP streaming of single files and flat directories.
//!
//! A [`StreamingEngine`] binds a source type to a route on some
//! [`HttpServer`]. On every request it opens a fresh source and writes it as
//! a chunked body:
//! - a single file as `application/octet-stream`
//! - a directory as `multipart/mixed`, one part per regular file, filtered
//!   by the inclusive `from`/`to` query parameters
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use streamer::{DirStreamer, Route, StreamSettings};
//!
//! // `server` is any HttpServer implementation.
//! let mut streamer = DirStreamer::new("/sdcard/logs", StreamSettings::default());
//! streamer.bind(Some(server), Route::get("/dir_stream"))?;
//!
//! // GET /dir_stream?from=log_0100&to=log_0199
//! ```
//!
//! Sources never hold more than one read buffer and one open file at a time,
//! so memory stays flat regardless of file or directory size.

pub mod dir;
pub mod engine;
pub mod error;
pub mod file;
pub mod multipart;
pub mod server;
pub mod source;

// Re-exports for convenience
pub use dir::DirectoryCollectionSource;
pub use engine::{
    DirStreamer, FileStreamer, Multipart, Protocol, Single, StreamSettings, StreamingEngine,
    DEFAULT_BOUNDARY, MAX_URL_PARAM_SIZE,
};
pub use error::{SendError, SourceError, SourceErrorKind, StreamError};
pub use file::FileChunkSource;
pub use multipart::{MultipartDecoder, NameRange};
pub use server::{Exchange, Handler, HttpServer, Route};
pub use source::{
    ChunkCursor, ChunkSource, CollectionSource, EntryOrder, MemberCursor, Open, SourceOptions,
    DEFAULT_CHUNK_SIZE,
};
