//! axum implementation of the streamer server operations.
//!
//! Engines register plain synchronous handlers. Every request that matches a
//! registered route runs its handler on the blocking pool; the handler's
//! writes travel over a bounded channel into a streamed response body, so a
//! slow client applies backpressure to the file reads.
//!
//! Status and headers are held back until the first body byte or the end of
//! the body, whichever comes first. Once committed they are never rewritten:
//! a later failure makes the body stream yield an error, so the connection is
//! cut without the terminating chunk. Only a handler that fails without
//! committing anything gets a real error response.

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, PoisonError, RwLock};

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use bytes::Bytes;
use streamer::{Exchange, Handler, HttpServer, Route, SendError, StreamError};
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, warn};

/// Chunks buffered between a handler and the socket.
const BODY_CHANNEL_DEPTH: usize = 8;

/// Route table shared between the engines and the axum fallback handler.
#[derive(Clone, Default)]
pub struct AxumServer {
    routes: Arc<RwLock<HashMap<Route, Handler>>>,
}

enum Lookup {
    Found(Handler),
    WrongMethod,
    Missing,
}

impl AxumServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Router that dispatches every request to the registered handlers.
    /// Routes can be added and removed while it is serving.
    pub fn router(&self) -> Router {
        Router::new().fallback(dispatch).with_state(self.clone())
    }

    /// Registered routes, sorted by path.
    pub fn routes(&self) -> Vec<Route> {
        let routes = self.routes.read().unwrap_or_else(PoisonError::into_inner);
        let mut out: Vec<Route> = routes.keys().cloned().collect();
        out.sort_by(|a, b| a.path.cmp(&b.path));
        out
    }

    fn lookup(&self, route: &Route) -> Lookup {
        let routes = self.routes.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(handler) = routes.get(route) {
            return Lookup::Found(Arc::clone(handler));
        }
        if routes.keys().any(|r| r.path == route.path) {
            Lookup::WrongMethod
        } else {
            Lookup::Missing
        }
    }
}

impl HttpServer for AxumServer {
    fn register_route(&self, route: &Route, handler: Handler) -> Result<(), StreamError> {
        let mut routes = self.routes.write().unwrap_or_else(PoisonError::into_inner);
        if routes.contains_key(route) {
            return Err(StreamError::Route {
                route: route.to_string(),
                reason: "already registered".to_string(),
            });
        }
        routes.insert(route.clone(), handler);
        debug!(route = %route, "route registered");
        Ok(())
    }

    fn unregister_route(&self, route: &Route) -> Result<(), StreamError> {
        let mut routes = self.routes.write().unwrap_or_else(PoisonError::into_inner);
        match routes.remove(route) {
            Some(_) => {
                debug!(route = %route, "route unregistered");
                Ok(())
            }
            None => Err(StreamError::Route {
                route: route.to_string(),
                reason: "not registered".to_string(),
            }),
        }
    }
}

/// What the handler committed to before the body started.
enum Head {
    Stream { status: StatusCode, headers: HeaderMap },
    Error { status: StatusCode, message: String },
}

async fn dispatch(State(server): State<AxumServer>, method: Method, uri: Uri) -> Response {
    let route = Route::new(uri.path(), method);
    let handler = match server.lookup(&route) {
        Lookup::Found(handler) => handler,
        Lookup::WrongMethod => return StatusCode::METHOD_NOT_ALLOWED.into_response(),
        Lookup::Missing => return StatusCode::NOT_FOUND.into_response(),
    };

    let query = uri.query().map(str::to_owned);
    let (head_tx, head_rx) = oneshot::channel();
    let (body_tx, body_rx) = mpsc::channel(BODY_CHANNEL_DEPTH);

    let task = tokio::task::spawn_blocking(move || {
        let mut exchange = ChannelExchange::new(query, head_tx, body_tx);
        let result = handler(&mut exchange);
        exchange.close(&result);
    });

    match head_rx.await {
        Ok(Head::Stream { status, headers }) => {
            let mut response = Response::new(Body::from_stream(ReceiverStream::new(body_rx)));
            *response.status_mut() = status;
            *response.headers_mut() = headers;
            response
        }
        Ok(Head::Error { status, message }) => (status, message).into_response(),
        Err(_) => {
            if let Err(e) = task.await {
                error!(route = %route, error = %e, "handler panicked");
            }
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// [`Exchange`] backed by the channels of one in-flight request.
struct ChannelExchange {
    query: Option<String>,
    status: StatusCode,
    headers: HeaderMap,
    /// Present until the head is committed.
    head: Option<oneshot::Sender<Head>>,
    /// Present until the body is closed or aborted.
    body: Option<mpsc::Sender<io::Result<Bytes>>>,
    finished: bool,
    failed: bool,
}

impl ChannelExchange {
    fn new(
        query: Option<String>,
        head: oneshot::Sender<Head>,
        body: mpsc::Sender<io::Result<Bytes>>,
    ) -> Self {
        Self {
            query,
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            head: Some(head),
            body: Some(body),
            finished: false,
            failed: false,
        }
    }

    fn commit(&mut self) -> Result<(), SendError> {
        if let Some(head) = self.head.take() {
            let headers = std::mem::take(&mut self.headers);
            head.send(Head::Stream {
                status: self.status,
                headers,
            })
            .map_err(|_| SendError::new("request was dropped"))?;
        }
        Ok(())
    }

    /// Settle the response once the handler returned. Dropping the body
    /// sender afterwards ends the stream.
    fn close(mut self, result: &Result<(), StreamError>) {
        match result {
            Ok(()) => {
                if let Err(e) = self.commit() {
                    debug!(error = %e, "response head not delivered");
                }
            }
            Err(_) if !self.failed => {
                let _ = self.send_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error");
            }
            Err(_) => {}
        }
    }
}

impl Exchange for ChannelExchange {
    fn set_status(&mut self, status: StatusCode) {
        if self.head.is_none() {
            warn!(%status, "status set after the response was committed");
            return;
        }
        self.status = status;
    }

    fn set_content_type(&mut self, content_type: &str) {
        self.set_header(header::CONTENT_TYPE.as_str(), content_type);
    }

    fn set_header(&mut self, name: &str, value: &str) {
        if self.head.is_none() {
            warn!(name, "header set after the response was committed");
            return;
        }
        match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
            (Ok(name), Ok(value)) => {
                self.headers.insert(name, value);
            }
            _ => warn!(name, value, "dropping invalid header"),
        }
    }

    fn send_chunk(&mut self, chunk: &[u8]) -> Result<(), SendError> {
        if self.finished || self.failed {
            return Err(SendError::new("body already finished"));
        }
        if chunk.is_empty() {
            return Ok(());
        }
        self.commit()?;
        let body = self.body.as_ref().ok_or_else(|| SendError::new("body closed"))?;
        body.blocking_send(Ok(Bytes::copy_from_slice(chunk)))
            .map_err(|_| SendError::new("client disconnected"))
    }

    fn finish(&mut self) -> Result<(), SendError> {
        // The stream itself ends in `close`, so a later `send_error` can
        // still cut the body short.
        self.commit()?;
        self.finished = true;
        Ok(())
    }

    fn send_error(&mut self, status: StatusCode, message: &str) -> Result<(), SendError> {
        self.failed = true;
        if let Some(head) = self.head.take() {
            return head
                .send(Head::Error {
                    status,
                    message: message.to_string(),
                })
                .map_err(|_| SendError::new("request was dropped"));
        }
        match self.body.take() {
            Some(body) => body
                .blocking_send(Err(io::Error::other(message.to_string())))
                .map_err(|_| SendError::new("client disconnected")),
            None => Ok(()),
        }
    }

    fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }
}
