//! StreamingEngine: binds a source type to a route and drives the response.
//!
//! The protocol is chosen at compile time from the source's capability:
//!
//! - [`Single`] over a [`ChunkSource`]: one chunked `application/octet-stream`
//!   body.
//! - [`Multipart`] over a [`CollectionSource`]: a chunked `multipart/mixed`
//!   body, range-filtered by the `from`/`to` query parameters.
//!
//! A fresh source is opened for every request. Once the status line may have
//! been flushed, a failure is signaled by ending the body and reporting an
//! error to the server, never by changing the status.

use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use http::StatusCode;
use tracing::{debug, error, info, trace, warn};

use crate::dir::DirectoryCollectionSource;
use crate::error::StreamError;
use crate::file::FileChunkSource;
use crate::multipart::{self, NameRange, PART_NAME_HEADER};
use crate::server::{Exchange, Handler, HttpServer, Route};
use crate::source::{ChunkCursor, ChunkSource, CollectionSource, MemberCursor, SourceOptions};

/// Cap on `from`/`to` query parameter buffers.
pub const MAX_URL_PARAM_SIZE: usize = 128;

pub const DEFAULT_BOUNDARY: &str = "streamd-part-boundary";

/// Per-engine settings, fixed for the engine's lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSettings {
    pub source: SourceOptions,
    pub boundary: String,
    pub max_param_len: usize,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            source: SourceOptions::default(),
            boundary: DEFAULT_BOUNDARY.to_string(),
            max_param_len: MAX_URL_PARAM_SIZE,
        }
    }
}

/// What a successful response delivered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    pub parts: usize,
    pub bytes: u64,
}

/// A response protocol over some source capability.
pub trait Protocol {
    /// Open a fresh source at `path` and write the response body, without the
    /// terminating chunk.
    fn respond(
        path: &Path,
        settings: &StreamSettings,
        exchange: &mut dyn Exchange,
    ) -> Result<Delivery, StreamError>;
}

/// Single-item protocol.
pub struct Single<T>(PhantomData<fn() -> T>);

/// Collection protocol.
pub struct Multipart<T>(PhantomData<fn() -> T>);

pub type FileStreamer<S> = StreamingEngine<Single<FileChunkSource>, S>;
pub type DirStreamer<S> = StreamingEngine<Multipart<DirectoryCollectionSource>, S>;

/// Write every chunk of `source`, then fail if the source recorded an error.
fn send_chunks<C: ChunkSource>(
    source: &mut C,
    exchange: &mut dyn Exchange,
) -> Result<u64, StreamError> {
    let mut sent = 0u64;
    {
        let mut chunks = source.chunks();
        while let Some(chunk) = chunks.next_chunk() {
            exchange.send_chunk(chunk)?;
            sent += chunk.len() as u64;
        }
    }
    if let Some(err) = source.error() {
        return Err(err.clone().into());
    }
    Ok(sent)
}

impl<T: ChunkSource> Protocol for Single<T> {
    fn respond(
        path: &Path,
        settings: &StreamSettings,
        exchange: &mut dyn Exchange,
    ) -> Result<Delivery, StreamError> {
        let mut source = T::open(path, &settings.source);

        exchange.set_status(StatusCode::OK);
        exchange.set_content_type("application/octet-stream");
        let disposition = format!("attachment; filename=\"{}\"", source.name());
        exchange.set_header("Content-Disposition", &disposition);
        exchange.set_header(PART_NAME_HEADER, source.name());

        debug!(name = source.name(), "sending file");
        let bytes = send_chunks(&mut source, exchange)?;
        Ok(Delivery { parts: 1, bytes })
    }
}

impl<T: CollectionSource> Protocol for Multipart<T> {
    fn respond(
        path: &Path,
        settings: &StreamSettings,
        exchange: &mut dyn Exchange,
    ) -> Result<Delivery, StreamError> {
        let mut collection = T::open(path, &settings.source);

        let range = NameRange::new(
            exchange.query_value("from", settings.max_param_len),
            exchange.query_value("to", settings.max_param_len),
        );
        exchange.set_status(StatusCode::OK);
        exchange.set_content_type(&multipart::content_type(&settings.boundary));

        debug!(from = ?range.from, to = ?range.to, "sending parts");
        let mut delivery = Delivery::default();
        {
            let mut members = collection.members();
            while let Some(member) = members.next_member() {
                if !range.contains(member.name()) {
                    trace!(name = member.name(), "outside requested range");
                    continue;
                }
                debug!(name = member.name(), "sending part");
                let header = multipart::part_header(&settings.boundary, member.name());
                exchange.send_chunk(header.as_bytes())?;
                delivery.bytes += send_chunks(member, exchange)?;
                delivery.parts += 1;
            }
        }
        exchange.send_chunk(multipart::closing_delimiter(&settings.boundary).as_bytes())?;

        // A traversal fault can surface after every byte was written.
        if let Some(err) = collection.error() {
            return Err(err.clone().into());
        }
        Ok(delivery)
    }
}

/// Run one request through protocol `P` and finish the exchange.
fn handle<P: Protocol>(
    path: &Path,
    settings: &StreamSettings,
    exchange: &mut dyn Exchange,
) -> Result<(), StreamError> {
    match P::respond(path, settings, exchange) {
        Ok(delivery) => {
            exchange.finish()?;
            info!(
                path = %path.display(),
                parts = delivery.parts,
                bytes = delivery.bytes,
                "stream complete"
            );
            Ok(())
        }
        Err(err) => {
            error!(path = %path.display(), error = %err, "stream failed");
            if let Err(e) = exchange.finish() {
                debug!(error = %e, "terminating chunk not sent");
            }
            if let Err(e) =
                exchange.send_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to send file")
            {
                debug!(error = %e, "error notification not sent");
            }
            Err(err)
        }
    }
}

fn handler<P: Protocol + 'static>(path: PathBuf, settings: Arc<StreamSettings>) -> Handler {
    Arc::new(move |exchange: &mut dyn Exchange| handle::<P>(&path, &settings, exchange))
}

struct Binding<S> {
    server: S,
    route: Route,
}

/// Serves the content at one path on one route.
///
/// The owner decides how long the route exists: dropping a bound engine
/// unregisters its route.
pub struct StreamingEngine<P, S: HttpServer> {
    path: PathBuf,
    settings: Arc<StreamSettings>,
    binding: Option<Binding<S>>,
    _protocol: PhantomData<fn() -> P>,
}

impl<P: Protocol + 'static, S: HttpServer> StreamingEngine<P, S> {
    pub fn new(path: impl Into<PathBuf>, settings: StreamSettings) -> Self {
        Self {
            path: path.into(),
            settings: Arc::new(settings),
            binding: None,
            _protocol: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn settings(&self) -> &StreamSettings {
        &self.settings
    }

    pub fn is_bound(&self) -> bool {
        self.binding.is_some()
    }

    pub fn route(&self) -> Option<&Route> {
        self.binding.as_ref().map(|b| &b.route)
    }

    /// Register this engine's handler for `route` on `server`.
    ///
    /// Fails without registering anything when `server` is `None`. Binding an
    /// already bound engine moves it to the new route.
    pub fn bind(&mut self, server: Option<S>, route: Route) -> Result<(), StreamError> {
        let Some(server) = server else {
            error!(route = %route, "null server handle");
            return Err(StreamError::InvalidServer);
        };
        if self.binding.is_some() {
            self.unbind()?;
        }

        server.register_route(&route, self.handler())?;
        info!(route = %route, path = %self.path.display(), "streamer bound");
        self.binding = Some(Binding { server, route });
        Ok(())
    }

    /// Deregister the route. Fails with `InvalidState` when not bound.
    pub fn unbind(&mut self) -> Result<(), StreamError> {
        let binding = self.binding.take().ok_or(StreamError::InvalidState)?;
        binding.server.unregister_route(&binding.route)?;
        info!(route = %binding.route, "streamer unbound");
        Ok(())
    }

    /// A handler closure that serves this engine's path, independent of the
    /// engine's own lifetime.
    pub fn handler(&self) -> Handler {
        handler::<P>(self.path.clone(), Arc::clone(&self.settings))
    }

    /// Serve one request directly.
    pub fn handle(&self, exchange: &mut dyn Exchange) -> Result<(), StreamError> {
        handle::<P>(&self.path, &self.settings, exchange)
    }
}

impl<P, S: HttpServer> Drop for StreamingEngine<P, S> {
    fn drop(&mut self) {
        if let Some(binding) = self.binding.take() {
            if let Err(e) = binding.server.unregister_route(&binding.route) {
                warn!(route = %binding.route, error = %e, "failed to unbind on drop");
            }
        }
    }
}
