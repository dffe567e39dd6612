//! Configuration loading for streamd.
//!
//! Everything here is fixed for the life of the process: what to serve,
//! where to listen, how to chunk and frame responses, and how to log.
//!
//! # Usage
//!
//! ```rust,no_run
//! use streamconf::StreamdConfig;
//!
//! let config = StreamdConfig::load().expect("Failed to load config");
//! println!("Listening on {}", config.bind.addr());
//! if let Some(dir) = &config.paths.dir {
//!     println!("Serving {} on {}", dir.display(), config.routes.dir);
//! }
//! ```
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins):
//! 1. `/etc/streamd/config.toml` (system)
//! 2. `~/.config/streamd/config.toml` (user)
//! 3. `./streamd.toml` (local override, or the `--config` path)
//! 4. Environment variables (`STREAMD_*`, `RUST_LOG`)
//!
//! # Example Config
//!
//! ```toml
//! [paths]
//! file = "/sdcard/data.bin"
//! dir = "/sdcard/logs"
//!
//! [routes]
//! file = "/file_stream"
//! dir = "/dir_stream"
//!
//! [bind]
//! host = "0.0.0.0"
//! port = 8443
//!
//! [stream]
//! chunk_size = 4096
//! boundary = "streamd-part-boundary"
//! max_param_len = 128
//! sort_entries = false
//!
//! [tls]
//! enabled = true
//!
//! [telemetry]
//! log_level = "info"
//! ```

pub mod loader;
pub mod sections;

pub use loader::{discover_config_files_with_override, ConfigSources};
pub use sections::{BindConfig, PathsConfig, RoutesConfig, StreamConfig, TelemetryConfig, TlsConfig};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Longest boundary RFC 2046 allows.
const MAX_BOUNDARY_LEN: usize = 70;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid value for {field}: {message}")]
    Invalid { field: &'static str, message: String },
}

/// Complete streamd configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamdConfig {
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub routes: RoutesConfig,

    #[serde(default)]
    pub bind: BindConfig,

    #[serde(default)]
    pub stream: StreamConfig,

    #[serde(default)]
    pub tls: TlsConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl StreamdConfig {
    /// Load configuration from all sources.
    pub fn load() -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(None)?;
        Ok(config)
    }

    /// Load configuration with `config_path` standing in for the local
    /// `./streamd.toml`. System and user configs still load first.
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load configuration from an optional path and report where values came
    /// from. The result is validated.
    pub fn load_with_sources_from(
        config_path: Option<&Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let files = loader::discover_config_files_with_override(config_path);
        let (config, sources) = Self::load_files(&files)?;
        Ok((config, sources))
    }

    /// Merge exactly `files` (in order), then apply environment overrides.
    pub fn load_files(files: &[PathBuf]) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut merged = toml::Table::new();

        for path in files {
            loader::merge_tables(&mut merged, loader::load_table(path)?);
            sources.files.push(path.clone());
        }

        let origin = files.last().map(PathBuf::as_path).unwrap_or(Path::new("<defaults>"));
        let mut config = loader::config_from_table(merged, origin)?;
        loader::apply_env_overrides(&mut config, &mut sources);
        config.validate()?;

        Ok((config, sources))
    }

    /// Check values that deserialize fine but cannot be served.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stream.chunk_size == 0 {
            return Err(ConfigError::Invalid {
                field: "stream.chunk_size",
                message: "must be greater than zero".to_string(),
            });
        }
        if self.stream.max_param_len == 0 {
            return Err(ConfigError::Invalid {
                field: "stream.max_param_len",
                message: "must be greater than zero".to_string(),
            });
        }
        validate_boundary(&self.stream.boundary)?;
        let routes = [
            ("routes.file", &self.routes.file),
            ("routes.dir", &self.routes.dir),
        ];
        for (field, route) in routes {
            if !route.starts_with('/') {
                return Err(ConfigError::Invalid {
                    field,
                    message: format!("route {route:?} must start with '/'"),
                });
            }
        }
        Ok(())
    }

    /// Expand `~` and `$VAR` prefixes in every configured path.
    pub(crate) fn expand_paths(&mut self) {
        let expand = |p: &mut Option<PathBuf>| {
            if let Some(path) = p.as_mut() {
                *path = loader::expand_path(&path.to_string_lossy());
            }
        };
        expand(&mut self.paths.file);
        expand(&mut self.paths.dir);
        expand(&mut self.tls.cert_path);
        expand(&mut self.tls.key_path);
    }

    /// Serialize config to a TOML string.
    pub fn to_toml(&self) -> String {
        let mut output = String::new();

        output.push_str("# streamd configuration\n\n");

        output.push_str("[paths]\n");
        match &self.paths.file {
            Some(file) => output.push_str(&format!("file = \"{}\"\n", file.display())),
            None => output.push_str("# file = \"/path/to/file\"\n"),
        }
        match &self.paths.dir {
            Some(dir) => output.push_str(&format!("dir = \"{}\"\n", dir.display())),
            None => output.push_str("# dir = \"/path/to/dir\"\n"),
        }

        output.push_str("\n[routes]\n");
        output.push_str(&format!("file = \"{}\"\n", self.routes.file));
        output.push_str(&format!("dir = \"{}\"\n", self.routes.dir));

        output.push_str("\n[bind]\n");
        output.push_str(&format!("host = \"{}\"\n", self.bind.host));
        output.push_str(&format!("port = {}\n", self.bind.port));

        output.push_str("\n[stream]\n");
        output.push_str(&format!("chunk_size = {}\n", self.stream.chunk_size));
        output.push_str(&format!("boundary = \"{}\"\n", self.stream.boundary));
        output.push_str(&format!("max_param_len = {}\n", self.stream.max_param_len));
        output.push_str(&format!("sort_entries = {}\n", self.stream.sort_entries));

        output.push_str("\n[tls]\n");
        output.push_str(&format!("enabled = {}\n", self.tls.enabled));
        if let Some(cert) = &self.tls.cert_path {
            output.push_str(&format!("cert_path = \"{}\"\n", cert.display()));
        }
        if let Some(key) = &self.tls.key_path {
            output.push_str(&format!("key_path = \"{}\"\n", key.display()));
        }

        output.push_str("\n[telemetry]\n");
        output.push_str(&format!("log_level = \"{}\"\n", self.telemetry.log_level));

        output
    }
}

/// RFC 2046 boundary: 1 to 70 characters from `bcharsnospace`. Spaces are
/// refused as well since the boundary is sent unquoted.
fn validate_boundary(boundary: &str) -> Result<(), ConfigError> {
    let invalid = |message: String| ConfigError::Invalid {
        field: "stream.boundary",
        message,
    };

    if boundary.is_empty() {
        return Err(invalid("must not be empty".to_string()));
    }
    if boundary.len() > MAX_BOUNDARY_LEN {
        return Err(invalid(format!(
            "{} characters, at most {MAX_BOUNDARY_LEN} allowed",
            boundary.len()
        )));
    }
    if let Some(c) = boundary.chars().find(|c| !is_bchar(*c)) {
        return Err(invalid(format!("character {c:?} not allowed")));
    }
    Ok(())
}

fn is_bchar(c: char) -> bool {
    c.is_ascii_alphanumeric() || "'()+_,-./:=?".contains(c)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = StreamdConfig::default();
        assert_eq!(config.bind.port, 8443);
        assert_eq!(config.stream.boundary, "streamd-part-boundary");
        assert!(config.paths.file.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_to_toml_round_trips() {
        let mut config = StreamdConfig::default();
        config.paths.dir = Some(PathBuf::from("/sdcard/logs"));
        config.stream.sort_entries = true;

        let toml = config.to_toml();
        assert!(toml.contains("[stream]"));
        assert!(toml.contains("# file ="));

        let table: toml::Table = toml.parse().unwrap();
        let parsed = loader::config_from_table(table, Path::new("out.toml")).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_later_files_win() {
        let first = write_config("[bind]\nport = 9000\n\n[stream]\nchunk_size = 1024\n");
        let second = write_config("[bind]\nport = 9100\n");

        let files = vec![first.path().to_path_buf(), second.path().to_path_buf()];
        let (config, sources) = StreamdConfig::load_files(&files).unwrap();

        assert_eq!(sources.files, files);
        assert_eq!(config.stream.chunk_size, 1024);
        // Env may override the port on a developer machine.
        if !sources.env_overrides.iter().any(|k| k == "STREAMD_PORT") {
            assert_eq!(config.bind.port, 9100);
        }
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err =
            StreamdConfig::load_files(&[PathBuf::from("/definitely/not/here.toml")]).unwrap_err();
        assert!(matches!(err, ConfigError::FileRead { .. }));
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let mut config = StreamdConfig::default();
        config.stream.chunk_size = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "stream.chunk_size", .. })
        ));
    }

    #[test]
    fn test_boundary_rules() {
        assert!(validate_boundary("simple-boundary_01").is_ok());
        assert!(validate_boundary("a'()+_,-./:=?z").is_ok());
        assert!(validate_boundary(&"b".repeat(70)).is_ok());

        assert!(validate_boundary("").is_err());
        assert!(validate_boundary(&"b".repeat(71)).is_err());
        assert!(validate_boundary("has space").is_err());
        assert!(validate_boundary("semi;colon").is_err());
        assert!(validate_boundary("quo\"te").is_err());
    }

    #[test]
    fn test_route_must_be_absolute() {
        let mut config = StreamdConfig::default();
        config.routes.dir = "dir_stream".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "routes.dir", .. })
        ));
    }
}
