//! In-memory server and exchange used by the engine tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use http::StatusCode;
use streamer::multipart::{Event, MultipartDecoder};
use streamer::{Exchange, Handler, HttpServer, Route, SendError, StreamError};

/// Route table that can be inspected after the engine took its handle.
#[derive(Clone, Default)]
pub struct MockServer {
    routes: Arc<Mutex<HashMap<Route, Handler>>>,
    reject: bool,
}

impl MockServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A server that refuses every registration.
    pub fn rejecting() -> Self {
        Self {
            reject: true,
            ..Self::default()
        }
    }

    pub fn route_count(&self) -> usize {
        self.routes.lock().unwrap().len()
    }

    pub fn handler(&self, route: &Route) -> Option<Handler> {
        self.routes.lock().unwrap().get(route).cloned()
    }
}

impl HttpServer for MockServer {
    fn register_route(&self, route: &Route, handler: Handler) -> Result<(), StreamError> {
        if self.reject {
            return Err(StreamError::Route {
                route: route.to_string(),
                reason: "rejected".to_string(),
            });
        }
        self.routes.lock().unwrap().insert(route.clone(), handler);
        Ok(())
    }

    fn unregister_route(&self, route: &Route) -> Result<(), StreamError> {
        match self.routes.lock().unwrap().remove(route) {
            Some(_) => Ok(()),
            None => Err(StreamError::Route {
                route: route.to_string(),
                reason: "not registered".to_string(),
            }),
        }
    }
}

/// Records everything the engine does to one response.
#[derive(Default)]
pub struct RecordingExchange {
    pub query: Option<String>,
    pub status: Option<StatusCode>,
    pub content_type: Option<String>,
    pub headers: Vec<(String, String)>,
    pub chunks: Vec<Vec<u8>>,
    pub finished: bool,
    pub error: Option<(StatusCode, String)>,
    /// Number of chunks accepted before every further send fails.
    pub fail_after: Option<usize>,
}

impl RecordingExchange {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_query(query: &str) -> Self {
        Self {
            query: Some(query.to_string()),
            ..Self::default()
        }
    }

    pub fn failing_after(sends: usize) -> Self {
        Self {
            fail_after: Some(sends),
            ..Self::default()
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn body(&self) -> Vec<u8> {
        self.chunks.concat()
    }
}

impl Exchange for RecordingExchange {
    fn set_status(&mut self, status: StatusCode) {
        self.status = Some(status);
    }

    fn set_content_type(&mut self, content_type: &str) {
        self.content_type = Some(content_type.to_string());
    }

    fn set_header(&mut self, name: &str, value: &str) {
        self.headers.push((name.to_string(), value.to_string()));
    }

    fn send_chunk(&mut self, chunk: &[u8]) -> Result<(), SendError> {
        if self.fail_after.is_some_and(|n| self.chunks.len() >= n) {
            return Err(SendError::new("connection reset"));
        }
        if !chunk.is_empty() {
            self.chunks.push(chunk.to_vec());
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), SendError> {
        self.finished = true;
        Ok(())
    }

    fn send_error(&mut self, status: StatusCode, message: &str) -> Result<(), SendError> {
        self.error = Some((status, message.to_string()));
        Ok(())
    }

    fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }
}

/// Decode a complete multipart body into (name, bytes) pairs.
pub fn decode_parts(boundary: &str, body: &[u8]) -> Vec<(String, Vec<u8>)> {
    let mut decoder = MultipartDecoder::new(boundary);
    let mut parts: Vec<(String, Vec<u8>)> = Vec::new();
    for event in decoder.feed(body).unwrap() {
        match event {
            Event::PartStart { name } => parts.push((name, Vec::new())),
            Event::Data(data) => parts.last_mut().unwrap().1.extend(data),
            Event::End => {}
        }
    }
    decoder.finish().unwrap();
    parts
}
