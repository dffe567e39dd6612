//! FileChunkSource: a single file read through one fixed-size buffer.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use crate::error::SourceError;
use crate::source::{ChunkCursor, ChunkSource, Open, SourceOptions};

/// A file opened at construction and read in chunks of at most
/// `chunk_size` bytes.
///
/// The read buffer is allocated once and reused for every chunk. The file
/// handle is closed when the source is dropped. Not `Clone`: a second handle
/// to the same file is never created implicitly.
#[derive(Debug)]
pub struct FileChunkSource {
    path: PathBuf,
    name: String,
    file: Option<File>,
    buf: Box<[u8]>,
    error: Option<SourceError>,
    started: bool,
}

impl FileChunkSource {
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn record(&mut self, err: SourceError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    /// Fill the buffer from the current position. Short reads are retried so
    /// that only the final chunk of a file can be shorter than the buffer.
    fn fill(&mut self) -> io::Result<usize> {
        let Some(file) = self.file.as_mut() else {
            return Ok(0);
        };
        let mut filled = 0;
        while filled < self.buf.len() {
            match file.read(&mut self.buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }
}

/// Final path segment, or the whole path when it has none.
fn final_segment(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

impl Open for FileChunkSource {
    fn open(path: &Path, options: &SourceOptions) -> Self {
        let (file, error) = match File::open(path) {
            Ok(f) => (Some(f), None),
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "file open failed");
                (None, Some(SourceError::open(path, e)))
            }
        };

        Self {
            path: path.to_path_buf(),
            name: final_segment(path),
            file,
            buf: vec![0u8; options.chunk_size.max(1)].into_boxed_slice(),
            error,
            started: false,
        }
    }
}

impl ChunkSource for FileChunkSource {
    type Chunks<'a> = FileChunks<'a>;

    fn name(&self) -> &str {
        &self.name
    }

    fn error(&self) -> Option<&SourceError> {
        self.error.as_ref()
    }

    fn chunks(&mut self) -> FileChunks<'_> {
        if self.started {
            tracing::warn!(name = %self.name, "iteration already started on this file");
            let name = self.name.clone();
            self.record(SourceError::Busy { name });
            return FileChunks {
                source: self,
                done: true,
            };
        }
        self.started = true;
        let done = self.file.is_none() || self.error.is_some();
        FileChunks { source: self, done }
    }
}

/// The single pass over a [`FileChunkSource`].
#[derive(Debug)]
pub struct FileChunks<'a> {
    source: &'a mut FileChunkSource,
    done: bool,
}

impl ChunkCursor for FileChunks<'_> {
    fn next_chunk(&mut self) -> Option<&[u8]> {
        if self.done {
            return None;
        }
        match self.source.fill() {
            Ok(0) => {
                self.done = true;
                None
            }
            Ok(n) => Some(&self.source.buf[..n]),
            Err(e) => {
                // A partially filled buffer is discarded along with the error.
                self.done = true;
                let name = self.source.name.clone();
                self.source.record(SourceError::read(name, e));
                None
            }
        }
    }
}
