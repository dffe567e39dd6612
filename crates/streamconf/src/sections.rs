//! Configuration sections, one struct per TOML table.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// What to serve. An absent path means the endpoint is not created.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Single file served on the file route.
    #[serde(default)]
    pub file: Option<PathBuf>,

    /// Flat directory served on the directory route.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

/// Route paths the endpoints are registered under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutesConfig {
    /// Default: /file_stream
    #[serde(default = "RoutesConfig::default_file")]
    pub file: String,

    /// Default: /dir_stream
    #[serde(default = "RoutesConfig::default_dir")]
    pub dir: String,
}

impl RoutesConfig {
    fn default_file() -> String {
        "/file_stream".to_string()
    }

    fn default_dir() -> String {
        "/dir_stream".to_string()
    }
}

impl Default for RoutesConfig {
    fn default() -> Self {
        Self {
            file: Self::default_file(),
            dir: Self::default_dir(),
        }
    }
}

/// Listen address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindConfig {
    /// Default: 0.0.0.0
    #[serde(default = "BindConfig::default_host")]
    pub host: String,

    /// Default: 8443
    #[serde(default = "BindConfig::default_port")]
    pub port: u16,
}

impl BindConfig {
    fn default_host() -> String {
        "0.0.0.0".to_string()
    }

    fn default_port() -> u16 {
        8443
    }

    /// `host:port`, ready for `SocketAddr` parsing.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for BindConfig {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            port: Self::default_port(),
        }
    }
}

/// Streaming behaviour shared by both endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Upper bound on every body chunk, in bytes.
    /// Default: 4096
    #[serde(default = "StreamConfig::default_chunk_size")]
    pub chunk_size: usize,

    /// multipart/mixed boundary token.
    /// Default: streamd-part-boundary
    #[serde(default = "StreamConfig::default_boundary")]
    pub boundary: String,

    /// Query values of this many bytes or more are ignored.
    /// Default: 128
    #[serde(default = "StreamConfig::default_max_param_len")]
    pub max_param_len: usize,

    /// Emit directory members in byte-lexicographic name order instead of
    /// listing order. Default: false
    #[serde(default)]
    pub sort_entries: bool,
}

impl StreamConfig {
    fn default_chunk_size() -> usize {
        4096
    }

    fn default_boundary() -> String {
        "streamd-part-boundary".to_string()
    }

    fn default_max_param_len() -> usize {
        128
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            chunk_size: Self::default_chunk_size(),
            boundary: Self::default_boundary(),
            max_param_len: Self::default_max_param_len(),
            sort_entries: false,
        }
    }
}

/// HTTPS settings. Paths default to the user config dir when unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub cert_path: Option<PathBuf>,

    #[serde(default)]
    pub key_path: Option<PathBuf>,
}

impl TlsConfig {
    fn default_dir() -> Option<PathBuf> {
        directories::BaseDirs::new().map(|d| d.config_dir().join("streamd/tls"))
    }

    /// Configured cert path, or `~/.config/streamd/tls/cert.pem`.
    pub fn resolved_cert_path(&self) -> Option<PathBuf> {
        self.cert_path
            .clone()
            .or_else(|| Self::default_dir().map(|d| d.join("cert.pem")))
    }

    /// Configured key path, or `~/.config/streamd/tls/key.pem`.
    pub fn resolved_key_path(&self) -> Option<PathBuf> {
        self.key_path
            .clone()
            .or_else(|| Self::default_dir().map(|d| d.join("key.pem")))
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// `EnvFilter` directive, e.g. `info` or `streamer=debug,info`.
    /// Default: info
    #[serde(default = "TelemetryConfig::default_log_level")]
    pub log_level: String,
}

impl TelemetryConfig {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
        }
    }
}
