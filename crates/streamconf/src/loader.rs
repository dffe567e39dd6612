//! Config file discovery, loading, and environment variable overlay.
//!
//! Files are merged table by table, so a later file only needs to name the
//! keys it changes. The merged table is deserialized once, which fills every
//! missing key from the serde defaults.

use crate::{ConfigError, StreamdConfig};
use std::env;
use std::path::{Path, PathBuf};

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// Discover config files in standard locations, in load order (system,
/// user, local). Only files that exist are returned.
///
/// If `cli_path` is provided and exists, it replaces the local override.
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/streamd/config.toml");
    if system.exists() {
        files.push(system);
    }

    // XDG_CONFIG_HOME or ~/.config
    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("streamd/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    let local = PathBuf::from("streamd.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Read one config file as a raw TOML table.
pub fn load_table(path: &Path) -> Result<toml::Table, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse_table(&contents, path)
}

fn parse_table(contents: &str, path: &Path) -> Result<toml::Table, ConfigError> {
    let table: toml::Table = contents.parse().map_err(|e: toml::de::Error| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    // Type errors are reported against the file that introduced them.
    config_from_table(table.clone(), path)?;
    Ok(table)
}

/// Deep-merge `overlay` into `base`. Nested tables merge key by key, every
/// other value is replaced.
pub fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// Build a config from a merged table, filling defaults and expanding paths.
pub fn config_from_table(table: toml::Table, origin: &Path) -> Result<StreamdConfig, ConfigError> {
    let mut config: StreamdConfig = toml::Value::Table(table)
        .try_into()
        .map_err(|e: toml::de::Error| ConfigError::Parse {
            path: origin.to_path_buf(),
            message: e.to_string(),
        })?;
    config.expand_paths();
    Ok(config)
}

/// Apply process environment overrides to config.
pub fn apply_env_overrides(config: &mut StreamdConfig, sources: &mut ConfigSources) {
    apply_overrides_with(config, sources, |key| env::var(key).ok());
}

/// Apply overrides from an arbitrary variable lookup.
///
/// Values that fail to parse are ignored and not recorded as overrides.
pub fn apply_overrides_with<F>(config: &mut StreamdConfig, sources: &mut ConfigSources, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let mut env = Overlay {
        lookup,
        seen: &mut sources.env_overrides,
    };

    // Paths
    if let Some(v) = env.string("STREAMD_FILE") {
        config.paths.file = Some(expand_path(&v));
    }
    if let Some(v) = env.string("STREAMD_DIR") {
        config.paths.dir = Some(expand_path(&v));
    }

    // Routes
    if let Some(v) = env.string("STREAMD_FILE_ROUTE") {
        config.routes.file = v;
    }
    if let Some(v) = env.string("STREAMD_DIR_ROUTE") {
        config.routes.dir = v;
    }

    // Bind address
    if let Some(v) = env.string("STREAMD_HOST") {
        config.bind.host = v;
    }
    if let Some(port) = env.parsed("STREAMD_PORT") {
        config.bind.port = port;
    }

    // Streaming
    if let Some(size) = env.parsed("STREAMD_CHUNK_SIZE") {
        config.stream.chunk_size = size;
    }
    if let Some(v) = env.string("STREAMD_BOUNDARY") {
        config.stream.boundary = v;
    }
    if let Some(len) = env.parsed("STREAMD_MAX_PARAM_LEN") {
        config.stream.max_param_len = len;
    }
    if let Some(sort) = env.flag("STREAMD_SORT_ENTRIES") {
        config.stream.sort_entries = sort;
    }

    // TLS
    if let Some(enabled) = env.flag("STREAMD_TLS") {
        config.tls.enabled = enabled;
    }
    if let Some(v) = env.string("STREAMD_TLS_CERT") {
        config.tls.cert_path = Some(expand_path(&v));
    }
    if let Some(v) = env.string("STREAMD_TLS_KEY") {
        config.tls.key_path = Some(expand_path(&v));
    }

    // Logging, RUST_LOG wins
    if let Some(v) = env.string("STREAMD_LOG_LEVEL") {
        config.telemetry.log_level = v;
    }
    if let Some(v) = env.string("RUST_LOG") {
        config.telemetry.log_level = v;
    }
}

/// Variable lookup that records which keys took effect.
struct Overlay<'a, F> {
    lookup: F,
    seen: &'a mut Vec<String>,
}

impl<F: Fn(&str) -> Option<String>> Overlay<'_, F> {
    fn accept<T>(&mut self, key: &str, value: Option<T>) -> Option<T> {
        if value.is_some() {
            self.seen.push(key.to_string());
        }
        value
    }

    fn string(&mut self, key: &str) -> Option<String> {
        let value = (self.lookup)(key);
        self.accept(key, value)
    }

    fn parsed<T: std::str::FromStr>(&mut self, key: &str) -> Option<T> {
        let value = (self.lookup)(key).and_then(|v| v.trim().parse().ok());
        self.accept(key, value)
    }

    fn flag(&mut self, key: &str) -> Option<bool> {
        let value = (self.lookup)(key).and_then(|v| parse_bool(&v));
        self.accept(key, value)
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Expand ~ and environment variables in a path.
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
            return home.join(stripped);
        }
    } else if let Some(stripped) = path.strip_prefix('$') {
        // $VAR/rest/of/path
        let (var_name, rest) = stripped.split_once('/').unwrap_or((stripped, ""));
        if let Ok(var_value) = env::var(var_name) {
            let base = PathBuf::from(var_value);
            return if rest.is_empty() { base } else { base.join(rest) };
        }
    }
    PathBuf::from(path)
}
