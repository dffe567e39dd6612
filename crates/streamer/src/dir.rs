//! DirectoryCollectionSource: the regular files of one directory, non-recursive.

use std::ffi::OsString;
use std::fs::{self, ReadDir};
use std::path::{Path, PathBuf};
use std::vec;

use crate::error::SourceError;
use crate::file::FileChunkSource;
use crate::source::{CollectionSource, EntryOrder, MemberCursor, Open, SourceOptions};

/// Where the next entry name comes from.
#[derive(Debug)]
enum Listing {
    /// Open directory handle, read lazily.
    Native(ReadDir),
    /// Names drained from the handle and sorted; the handle is already closed.
    Sorted(vec::IntoIter<OsString>),
    Closed,
}

/// A directory opened at construction, yielding one [`FileChunkSource`] per
/// regular file.
///
/// At most one member is open at a time, in addition to the directory handle
/// itself. Entries that are not regular files (after following symlinks) are
/// skipped.
#[derive(Debug)]
pub struct DirectoryCollectionSource {
    base: PathBuf,
    options: SourceOptions,
    listing: Listing,
    error: Option<SourceError>,
}

impl DirectoryCollectionSource {
    fn record(&mut self, err: SourceError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    /// Replace a native listing by its sorted names. Runs once, on the first
    /// advance of a sorted collection.
    fn sort_listing(&mut self) {
        let Listing::Native(read_dir) = std::mem::replace(&mut self.listing, Listing::Closed) else {
            return;
        };
        let mut names = Vec::new();
        for entry in read_dir {
            match entry {
                Ok(entry) => names.push(entry.file_name()),
                Err(e) => {
                    let base = self.base.clone();
                    self.record(SourceError::list(base, e));
                    return;
                }
            }
        }
        names.sort();
        self.listing = Listing::Sorted(names.into_iter());
    }

    fn next_name(&mut self) -> Option<OsString> {
        let next = match &mut self.listing {
            Listing::Native(read_dir) => read_dir.next().map(|r| r.map(|e| e.file_name())),
            Listing::Sorted(names) => names.next().map(Ok),
            Listing::Closed => None,
        };
        match next {
            Some(Ok(name)) => Some(name),
            Some(Err(e)) => {
                let base = self.base.clone();
                self.record(SourceError::list(base, e));
                self.listing = Listing::Closed;
                None
            }
            None => {
                // Exhausted: release the directory handle early.
                self.listing = Listing::Closed;
                None
            }
        }
    }

    /// Find the path of the next regular file, recording a stat failure as
    /// a sticky error that ends the enumeration.
    fn next_regular_file(&mut self) -> Option<PathBuf> {
        if self.error.is_some() {
            return None;
        }
        if self.options.order == EntryOrder::Sorted {
            self.sort_listing();
        }
        while let Some(name) = self.next_name() {
            // `read_dir` never yields the self/parent pseudo-entries.
            let full_path = self.base.join(&name);
            match fs::metadata(&full_path) {
                Ok(meta) if meta.is_file() => return Some(full_path),
                Ok(_) => {
                    tracing::trace!(path = %full_path.display(), "skipping non-regular entry");
                }
                Err(e) => {
                    tracing::error!(path = %full_path.display(), error = %e, "can't stat path");
                    self.record(SourceError::stat(full_path, e));
                    self.listing = Listing::Closed;
                    return None;
                }
            }
        }
        None
    }
}

impl Open for DirectoryCollectionSource {
    fn open(path: &Path, options: &SourceOptions) -> Self {
        let (listing, error) = match fs::read_dir(path) {
            Ok(read_dir) => (Listing::Native(read_dir), None),
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "directory open failed");
                (Listing::Closed, Some(SourceError::open(path, e)))
            }
        };

        Self {
            base: path.to_path_buf(),
            options: options.clone(),
            listing,
            error,
        }
    }
}

impl CollectionSource for DirectoryCollectionSource {
    type Member = FileChunkSource;
    type Members<'a> = DirMembers<'a>;

    fn error(&self) -> Option<&SourceError> {
        self.error.as_ref()
    }

    fn members(&mut self) -> DirMembers<'_> {
        DirMembers {
            dir: self,
            current: None,
        }
    }
}

/// The pass over a [`DirectoryCollectionSource`]. Owns the current member.
#[derive(Debug)]
pub struct DirMembers<'a> {
    dir: &'a mut DirectoryCollectionSource,
    current: Option<FileChunkSource>,
}

impl MemberCursor for DirMembers<'_> {
    type Item = FileChunkSource;

    fn next_member(&mut self) -> Option<&mut FileChunkSource> {
        // Close the previous member before the next file is opened.
        self.current = None;
        let path = self.dir.next_regular_file()?;
        let member = FileChunkSource::open(&path, &self.dir.options);
        Some(self.current.insert(member))
    }
}
