//! HTTP server operations required by the streaming engine.
//!
//! The engine never touches sockets. It registers a handler for a route with
//! an [`HttpServer`] and, per request, drives an [`Exchange`]: status and
//! headers first, then body chunks, then the zero-length terminator.

use std::fmt;
use std::sync::Arc;

use http::{Method, StatusCode};

use crate::error::{SendError, StreamError};

/// A (path, method) pair a handler is registered under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Route {
    pub path: String,
    pub method: Method,
}

impl Route {
    pub fn new(path: impl Into<String>, method: Method) -> Self {
        Self {
            path: path.into(),
            method,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(path, Method::GET)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

/// Request handler invoked by the server for every matching request.
pub type Handler = Arc<dyn Fn(&mut dyn Exchange) -> Result<(), StreamError> + Send + Sync>;

/// Route registration on a running server. Implementations are cheap handles.
pub trait HttpServer {
    fn register_route(&self, route: &Route, handler: Handler) -> Result<(), StreamError>;

    fn unregister_route(&self, route: &Route) -> Result<(), StreamError>;
}

/// One in-flight request and its chunked response.
pub trait Exchange {
    fn set_status(&mut self, status: StatusCode);

    fn set_content_type(&mut self, content_type: &str);

    fn set_header(&mut self, name: &str, value: &str);

    /// Send one body chunk. Empty chunks are ignored by implementations, the
    /// terminator is only ever sent through [`Exchange::finish`].
    fn send_chunk(&mut self, chunk: &[u8]) -> Result<(), SendError>;

    /// Send the zero-length chunk that ends the chunked body.
    fn finish(&mut self) -> Result<(), SendError>;

    /// Report a failed request. If nothing was flushed yet this may become a
    /// real error response, otherwise the transport signals it out of band.
    fn send_error(&mut self, status: StatusCode, message: &str) -> Result<(), SendError>;

    /// Raw query string, without the leading `?`.
    fn query(&self) -> Option<&str>;

    /// Value of a single query key, percent-decoded.
    ///
    /// Values of `max_len` bytes or more are not honored, as with a
    /// `max_len`-byte buffer that also needs room for a terminator.
    fn query_value(&self, key: &str, max_len: usize) -> Option<String> {
        query_value(self.query()?, key, max_len)
    }
}

/// Extract `key` from a raw query string. First occurrence wins.
pub fn query_value(query: &str, key: &str, max_len: usize) -> Option<String> {
    let value = url::form_urlencoded::parse(query.as_bytes())
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())?;
    if value.len() >= max_len {
        tracing::debug!(key, len = value.len(), max_len, "query parameter too long, ignoring");
        return None;
    }
    Some(value)
}
