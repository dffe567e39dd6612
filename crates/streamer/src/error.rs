//! Error types for sources and the streaming engine.
//!
//! Source errors never abort construction or iteration with a panic: they are
//! recorded on the source and observed through `error()`. Engine errors are
//! returned directly from the operation that detected them.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

/// Coarse classification of a [`SourceError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceErrorKind {
    /// The backing path does not exist or cannot be opened.
    Open,
    /// A second iteration was requested on a single-pass source.
    Busy,
    /// An I/O failure happened while reading or traversing.
    Read,
}

/// A sticky error recorded on a source.
///
/// Cloneable so that observers can hold on to it while the source lives on.
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: Arc<io::Error>,
    },

    #[error("{name} already has an active iteration")]
    Busy { name: String },

    #[error("failed to read {name}: {source}")]
    Read {
        name: String,
        #[source]
        source: Arc<io::Error>,
    },

    #[error("failed to stat {path}: {source}")]
    Stat {
        path: PathBuf,
        #[source]
        source: Arc<io::Error>,
    },

    #[error("failed to list {path}: {source}")]
    List {
        path: PathBuf,
        #[source]
        source: Arc<io::Error>,
    },
}

impl SourceError {
    pub(crate) fn open(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Open {
            path: path.into(),
            source: Arc::new(source),
        }
    }

    pub(crate) fn read(name: impl Into<String>, source: io::Error) -> Self {
        Self::Read {
            name: name.into(),
            source: Arc::new(source),
        }
    }

    pub(crate) fn stat(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Stat {
            path: path.into(),
            source: Arc::new(source),
        }
    }

    pub(crate) fn list(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::List {
            path: path.into(),
            source: Arc::new(source),
        }
    }

    pub fn kind(&self) -> SourceErrorKind {
        match self {
            Self::Open { .. } => SourceErrorKind::Open,
            Self::Busy { .. } => SourceErrorKind::Busy,
            Self::Read { .. } | Self::Stat { .. } | Self::List { .. } => SourceErrorKind::Read,
        }
    }

    /// Platform error code, when the failure came from the OS.
    ///
    /// `Busy` maps to `EBUSY`-like semantics but carries no OS code.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::Busy { .. } => None,
            Self::Open { source, .. }
            | Self::Read { source, .. }
            | Self::Stat { source, .. }
            | Self::List { source, .. } => source.raw_os_error(),
        }
    }

    /// The underlying `io::ErrorKind`, if any.
    pub fn io_kind(&self) -> Option<io::ErrorKind> {
        match self {
            Self::Busy { .. } => None,
            Self::Open { source, .. }
            | Self::Read { source, .. }
            | Self::Stat { source, .. }
            | Self::List { source, .. } => Some(source.kind()),
        }
    }
}

/// A transport write failed.
#[derive(Debug, Clone, Error)]
#[error("send failed: {reason}")]
pub struct SendError {
    reason: String,
}

impl SendError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// Errors returned by [`StreamingEngine`](crate::StreamingEngine) operations.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error(transparent)]
    Send(#[from] SendError),

    #[error("source failed: {0}")]
    Source(#[from] SourceError),

    #[error("invalid server handle")]
    InvalidServer,

    #[error("streamer is not bound")]
    InvalidState,

    #[error("route {route} rejected: {reason}")]
    Route { route: String, reason: String },
}
