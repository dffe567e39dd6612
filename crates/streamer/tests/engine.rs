//! StreamingEngine behaviour against an in-memory server and exchange.

mod common;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::vec;

use common::{decode_parts, MockServer, RecordingExchange};
use http::StatusCode;
use pretty_assertions::assert_eq;
use streamer::{
    multipart, ChunkCursor, ChunkSource, CollectionSource, DirStreamer, FileStreamer,
    MemberCursor, Multipart, Open, Route, SourceError, SourceErrorKind, SourceOptions,
    StreamError, StreamSettings, StreamingEngine, MAX_URL_PARAM_SIZE,
};
use tempfile::TempDir;

fn sorted_settings(chunk_size: usize) -> StreamSettings {
    StreamSettings {
        source: SourceOptions::with_chunk_size(chunk_size).sorted(),
        ..StreamSettings::default()
    }
}

fn letters_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    for name in ["a", "b", "c", "d", "e"] {
        fs::write(dir.path().join(name), format!("contents of {name}")).unwrap();
    }
    dir
}

#[test]
fn test_bind_without_server_fails() {
    let mut streamer: FileStreamer<MockServer> =
        FileStreamer::new("/nope", StreamSettings::default());
    let err = streamer.bind(None, Route::get("/file_stream")).unwrap_err();
    assert!(matches!(err, StreamError::InvalidServer));
    assert!(!streamer.is_bound());
}

#[test]
fn test_unbind_requires_binding() {
    let server = MockServer::new();
    let mut streamer = FileStreamer::new("/nope", StreamSettings::default());
    assert!(matches!(streamer.unbind(), Err(StreamError::InvalidState)));

    streamer.bind(Some(server.clone()), Route::get("/file_stream")).unwrap();
    assert!(streamer.is_bound());
    assert_eq!(streamer.route(), Some(&Route::get("/file_stream")));
    assert_eq!(server.route_count(), 1);

    streamer.unbind().unwrap();
    assert_eq!(server.route_count(), 0);
    assert!(matches!(streamer.unbind(), Err(StreamError::InvalidState)));
}

#[test]
fn test_rebind_moves_route() {
    let server = MockServer::new();
    let mut streamer = DirStreamer::new("/nope", StreamSettings::default());
    streamer.bind(Some(server.clone()), Route::get("/one")).unwrap();
    streamer.bind(Some(server.clone()), Route::get("/two")).unwrap();

    assert_eq!(server.route_count(), 1);
    assert!(server.handler(&Route::get("/one")).is_none());
    assert!(server.handler(&Route::get("/two")).is_some());
}

#[test]
fn test_rejected_registration_leaves_engine_unbound() {
    let mut streamer = FileStreamer::new("/nope", StreamSettings::default());
    let err = streamer
        .bind(Some(MockServer::rejecting()), Route::get("/file_stream"))
        .unwrap_err();
    assert!(matches!(err, StreamError::Route { .. }));
    assert!(!streamer.is_bound());
}

#[test]
fn test_drop_unregisters_route() {
    let server = MockServer::new();
    {
        let mut streamer = FileStreamer::new("/nope", StreamSettings::default());
        streamer.bind(Some(server.clone()), Route::get("/file_stream")).unwrap();
        assert_eq!(server.route_count(), 1);
    }
    assert_eq!(server.route_count(), 0);
}

#[test]
fn test_single_file_response() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("data.bin");
    let data: Vec<u8> = (0..10_000u32).map(|i| (i % 256) as u8).collect();
    fs::write(&path, &data).unwrap();

    let streamer: FileStreamer<MockServer> = FileStreamer::new(&path, sorted_settings(1024));
    let mut ex = RecordingExchange::new();
    streamer.handle(&mut ex).unwrap();

    assert_eq!(ex.status, Some(StatusCode::OK));
    assert_eq!(ex.content_type.as_deref(), Some("application/octet-stream"));
    assert_eq!(
        ex.header("Content-Disposition"),
        Some("attachment; filename=\"data.bin\"")
    );
    assert_eq!(ex.header("X-Part-Name"), Some("data.bin"));
    assert_eq!(ex.chunks.len(), 10);
    assert!(ex.chunks.iter().all(|c| c.len() <= 1024));
    assert_eq!(ex.body(), data);
    assert!(ex.finished);
    assert!(ex.error.is_none());
}

#[test]
fn test_registered_handler_serves_requests() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("hello.txt");
    fs::write(&path, b"hello").unwrap();

    let server = MockServer::new();
    let mut streamer = FileStreamer::new(&path, StreamSettings::default());
    streamer.bind(Some(server.clone()), Route::get("/file_stream")).unwrap();

    let handler = server.handler(&Route::get("/file_stream")).unwrap();
    for _ in 0..2 {
        let mut ex = RecordingExchange::new();
        handler(&mut ex).unwrap();
        assert_eq!(ex.body(), b"hello");
    }
}

#[test]
fn test_missing_file_ends_body_and_reports_error() {
    let dir = TempDir::new().unwrap();
    let streamer: FileStreamer<MockServer> =
        FileStreamer::new(dir.path().join("gone.bin"), StreamSettings::default());
    let mut ex = RecordingExchange::new();

    let err = streamer.handle(&mut ex).unwrap_err();
    match err {
        StreamError::Source(e) => assert_eq!(e.kind(), SourceErrorKind::Open),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(ex.chunks.is_empty());
    assert!(ex.finished);
    assert_eq!(
        ex.error,
        Some((StatusCode::INTERNAL_SERVER_ERROR, "Failed to send file".to_string()))
    );
}

#[test]
fn test_directory_range_filter() {
    let dir = letters_dir();
    let streamer: DirStreamer<MockServer> = DirStreamer::new(dir.path(), sorted_settings(4));
    let mut ex = RecordingExchange::with_query("from=b&to=d");
    streamer.handle(&mut ex).unwrap();

    let boundary = &streamer.settings().boundary;
    assert_eq!(ex.status, Some(StatusCode::OK));
    assert_eq!(ex.content_type, Some(multipart::content_type(boundary)));

    let parts = decode_parts(boundary, &ex.body());
    let names: Vec<_> = parts.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, vec!["b", "c", "d"]);
    assert_eq!(parts[1].1, b"contents of c");
    assert!(ex.finished);
    assert!(ex.error.is_none());
}

#[test]
fn test_directory_without_filter_sends_everything() {
    let dir = letters_dir();
    let streamer: DirStreamer<MockServer> = DirStreamer::new(dir.path(), sorted_settings(4096));
    let mut ex = RecordingExchange::new();
    streamer.handle(&mut ex).unwrap();

    let parts = decode_parts(&streamer.settings().boundary, &ex.body());
    let names: Vec<_> = parts.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, vec!["a", "b", "c", "d", "e"]);
}

#[test]
fn test_oversized_bound_is_ignored() {
    let dir = letters_dir();
    let streamer: DirStreamer<MockServer> = DirStreamer::new(dir.path(), sorted_settings(4096));
    let long = "z".repeat(MAX_URL_PARAM_SIZE);
    let mut ex = RecordingExchange::with_query(&format!("from={long}&to=b"));
    streamer.handle(&mut ex).unwrap();

    let parts = decode_parts(&streamer.settings().boundary, &ex.body());
    let names: Vec<_> = parts.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, vec!["a", "b"]);
}

#[test]
fn test_empty_directory_is_only_the_closing_delimiter() {
    let dir = TempDir::new().unwrap();
    let streamer: DirStreamer<MockServer> = DirStreamer::new(dir.path(), StreamSettings::default());
    let mut ex = RecordingExchange::new();
    streamer.handle(&mut ex).unwrap();

    let closing = multipart::closing_delimiter(&streamer.settings().boundary);
    assert_eq!(ex.body(), closing.as_bytes());
    assert!(ex.finished);
}

#[test]
fn test_missing_directory_fails_after_closing_delimiter() {
    let dir = TempDir::new().unwrap();
    let streamer: DirStreamer<MockServer> =
        DirStreamer::new(dir.path().join("nope"), StreamSettings::default());
    let mut ex = RecordingExchange::new();

    let err = streamer.handle(&mut ex).unwrap_err();
    assert!(matches!(err, StreamError::Source(ref e) if e.kind() == SourceErrorKind::Open));
    assert_eq!(ex.status, Some(StatusCode::OK));
    assert!(ex.finished);
    assert_eq!(ex.error.map(|(s, _)| s), Some(StatusCode::INTERNAL_SERVER_ERROR));
}

#[test]
fn test_send_failure_aborts_remaining_parts() {
    let dir = letters_dir();
    let streamer: DirStreamer<MockServer> = DirStreamer::new(dir.path(), sorted_settings(4096));
    // Header and body of "a", header of "b", then the transport dies.
    let mut ex = RecordingExchange::failing_after(3);

    let err = streamer.handle(&mut ex).unwrap_err();
    assert!(matches!(err, StreamError::Send(_)));
    assert_eq!(ex.chunks.len(), 3);
    assert_eq!(ex.chunks[1], b"contents of a");
    assert!(ex.finished);
    assert!(ex.error.is_some());
}

#[cfg(unix)]
#[test]
fn test_traversal_error_surfaces_after_all_writes() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("a"), b"alpha").unwrap();
    std::os::unix::fs::symlink(dir.path().join("missing"), dir.path().join("z_link")).unwrap();

    let streamer: DirStreamer<MockServer> = DirStreamer::new(dir.path(), sorted_settings(4096));
    let mut ex = RecordingExchange::new();
    let err = streamer.handle(&mut ex).unwrap_err();

    assert!(matches!(err, StreamError::Source(ref e) if e.kind() == SourceErrorKind::Read));
    // The listing is complete on the wire; only the outcome flips.
    let parts = decode_parts(&streamer.settings().boundary, &ex.body());
    assert_eq!(parts, vec![("a".to_string(), b"alpha".to_vec())]);
    assert!(ex.finished);
    assert!(ex.error.is_some());
}

#[cfg(unix)]
#[test]
fn test_read_error_after_open_ends_body_and_reports_error() {
    // A directory opens like a file but every read fails.
    let dir = TempDir::new().unwrap();
    let streamer: FileStreamer<MockServer> =
        FileStreamer::new(dir.path(), StreamSettings::default());
    let mut ex = RecordingExchange::new();

    let err = streamer.handle(&mut ex).unwrap_err();
    assert!(matches!(err, StreamError::Source(ref e) if e.kind() == SourceErrorKind::Read));
    assert_eq!(ex.status, Some(StatusCode::OK));
    assert!(ex.chunks.is_empty());
    assert!(ex.finished);
    assert_eq!(
        ex.error,
        Some((StatusCode::INTERNAL_SERVER_ERROR, "Failed to send file".to_string()))
    );
}

/// Member that sends its contents as one chunk. Members named `bad` then
/// fail the read that should have found the end of the file.
struct ScriptedItem {
    name: String,
    data: Vec<u8>,
    error: Option<SourceError>,
}

impl Open for ScriptedItem {
    fn open(path: &Path, _options: &SourceOptions) -> Self {
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        Self {
            data: format!("contents of {name}").into_bytes(),
            name,
            error: None,
        }
    }
}

impl ChunkSource for ScriptedItem {
    type Chunks<'a> = ScriptedChunks<'a>;

    fn name(&self) -> &str {
        &self.name
    }

    fn error(&self) -> Option<&SourceError> {
        self.error.as_ref()
    }

    fn chunks(&mut self) -> ScriptedChunks<'_> {
        ScriptedChunks {
            item: self,
            sent: false,
        }
    }
}

struct ScriptedChunks<'a> {
    item: &'a mut ScriptedItem,
    sent: bool,
}

impl ChunkCursor for ScriptedChunks<'_> {
    fn next_chunk(&mut self) -> Option<&[u8]> {
        if !self.sent {
            self.sent = true;
            return Some(self.item.data.as_slice());
        }
        if self.item.name == "bad" && self.item.error.is_none() {
            self.item.error = Some(SourceError::Read {
                name: self.item.name.clone(),
                source: Arc::new(io::Error::other("device went away")),
            });
        }
        None
    }
}

/// Fixed collection `a`, `bad`, `c`.
struct ScriptedCollection {
    base: PathBuf,
    names: vec::IntoIter<&'static str>,
    current: Option<ScriptedItem>,
}

impl Open for ScriptedCollection {
    fn open(path: &Path, _options: &SourceOptions) -> Self {
        Self {
            base: path.to_path_buf(),
            names: vec!["a", "bad", "c"].into_iter(),
            current: None,
        }
    }
}

impl CollectionSource for ScriptedCollection {
    type Member = ScriptedItem;
    type Members<'a> = ScriptedMembers<'a>;

    fn error(&self) -> Option<&SourceError> {
        None
    }

    fn members(&mut self) -> ScriptedMembers<'_> {
        ScriptedMembers { collection: self }
    }
}

struct ScriptedMembers<'a> {
    collection: &'a mut ScriptedCollection,
}

impl MemberCursor for ScriptedMembers<'_> {
    type Item = ScriptedItem;

    fn next_member(&mut self) -> Option<&mut ScriptedItem> {
        let collection = &mut *self.collection;
        collection.current = None;
        let name = collection.names.next()?;
        let item = ScriptedItem::open(&collection.base.join(name), &SourceOptions::default());
        Some(collection.current.insert(item))
    }
}

#[test]
fn test_member_read_error_stops_remaining_parts() {
    let streamer: StreamingEngine<Multipart<ScriptedCollection>, MockServer> =
        StreamingEngine::new("/scripted", StreamSettings::default());
    let mut ex = RecordingExchange::new();

    let err = streamer.handle(&mut ex).unwrap_err();
    assert!(matches!(err, StreamError::Source(ref e) if e.kind() == SourceErrorKind::Read));

    let boundary = &streamer.settings().boundary;
    let sent: Vec<String> = ex
        .chunks
        .iter()
        .map(|c| String::from_utf8(c.clone()).unwrap())
        .collect();
    assert_eq!(
        sent,
        vec![
            multipart::part_header(boundary, "a"),
            "contents of a".to_string(),
            multipart::part_header(boundary, "bad"),
            "contents of bad".to_string(),
        ]
    );
    assert_eq!(ex.status, Some(StatusCode::OK));
    assert!(ex.finished);
    assert!(ex.error.is_some());
}
