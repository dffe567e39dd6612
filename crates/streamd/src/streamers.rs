//! Owner of the long-lived file and directory engines.
//!
//! A route stays registered exactly as long as its engine lives here, so the
//! serving loop keeps a `Streamers` alive and dropping it takes the
//! endpoints down.

use anyhow::{Context, Result};
use streamconf::{StreamConfig, StreamdConfig};
use streamer::{DirStreamer, FileStreamer, Route, SourceOptions, StreamSettings};
use tracing::info;

use crate::bridge::AxumServer;

/// Engine settings derived from the `[stream]` section.
pub fn stream_settings(stream: &StreamConfig) -> StreamSettings {
    let mut source = SourceOptions::with_chunk_size(stream.chunk_size);
    if stream.sort_entries {
        source = source.sorted();
    }
    StreamSettings {
        source,
        boundary: stream.boundary.clone(),
        max_param_len: stream.max_param_len,
    }
}

pub struct Streamers {
    file: Option<FileStreamer<AxumServer>>,
    dir: Option<DirStreamer<AxumServer>>,
}

impl Streamers {
    /// Create and bind an engine for every configured path.
    pub fn bind(config: &StreamdConfig, server: &AxumServer) -> Result<Self> {
        let settings = stream_settings(&config.stream);

        let file = match &config.paths.file {
            Some(path) => {
                let mut streamer = FileStreamer::new(path, settings.clone());
                streamer
                    .bind(Some(server.clone()), Route::get(config.routes.file.as_str()))
                    .with_context(|| {
                        format!("Failed to bind file streamer for {}", path.display())
                    })?;
                info!(route = %config.routes.file, path = %path.display(), "file endpoint ready");
                Some(streamer)
            }
            None => None,
        };

        let dir = match &config.paths.dir {
            Some(path) => {
                let mut streamer = DirStreamer::new(path, settings);
                streamer
                    .bind(Some(server.clone()), Route::get(config.routes.dir.as_str()))
                    .with_context(|| {
                        format!("Failed to bind directory streamer for {}", path.display())
                    })?;
                info!(
                    route = %config.routes.dir,
                    path = %path.display(),
                    "directory endpoint ready"
                );
                Some(streamer)
            }
            None => None,
        };

        Ok(Self { file, dir })
    }

    pub fn is_empty(&self) -> bool {
        self.file.is_none() && self.dir.is_none()
    }

    pub fn file(&self) -> Option<&FileStreamer<AxumServer>> {
        self.file.as_ref()
    }

    pub fn dir(&self) -> Option<&DirStreamer<AxumServer>> {
        self.dir.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use streamer::EntryOrder;

    #[test]
    fn test_stream_settings_from_config() {
        let mut stream = StreamConfig::default();
        stream.chunk_size = 512;
        stream.sort_entries = true;
        stream.boundary = "frontier".to_string();

        let settings = stream_settings(&stream);
        assert_eq!(settings.source.chunk_size, 512);
        assert_eq!(settings.source.order, EntryOrder::Sorted);
        assert_eq!(settings.boundary, "frontier");
        assert_eq!(settings.max_param_len, 128);
    }

    #[test]
    fn test_only_configured_endpoints_are_bound() {
        let server = AxumServer::new();
        let mut config = StreamdConfig::default();
        config.paths.dir = Some(PathBuf::from("/tmp"));

        let streamers = Streamers::bind(&config, &server).unwrap();
        assert!(streamers.file().is_none());
        assert!(streamers.dir().is_some());
        assert_eq!(server.routes(), vec![Route::get("/dir_stream")]);

        drop(streamers);
        assert!(server.routes().is_empty());
    }

    #[test]
    fn test_nothing_configured() {
        let server = AxumServer::new();
        let streamers = Streamers::bind(&StreamdConfig::default(), &server).unwrap();
        assert!(streamers.is_empty());
        assert!(server.routes().is_empty());
    }
}
