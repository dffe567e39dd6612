//! TLS certificate management.
//!
//! Provides self-signed certificate generation and RustlsConfig loading.

use anyhow::{Context, Result};
use std::path::PathBuf;
use streamconf::TlsConfig;

/// Resolved TLS certificate paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsCertPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
}

impl TlsCertPaths {
    /// Resolve certificate paths from config, using XDG defaults if not specified.
    pub fn from_config(config: &TlsConfig) -> Result<Self> {
        let cert = config
            .resolved_cert_path()
            .context("Could not determine certificate path (HOME not set?)")?;
        let key = config
            .resolved_key_path()
            .context("Could not determine key path (HOME not set?)")?;

        Ok(Self { cert, key })
    }

    /// Check if both cert and key exist.
    pub fn exists(&self) -> bool {
        self.cert.exists() && self.key.exists()
    }
}

/// Generate a self-signed certificate for `hostname`, plus `localhost` and
/// the loopback addresses. Existing files are only replaced with `force`.
pub fn generate_self_signed(hostname: &str, paths: &TlsCertPaths, force: bool) -> Result<()> {
    use rcgen::{generate_simple_self_signed, CertifiedKey};

    if paths.exists() && !force {
        anyhow::bail!(
            "Certificate already exists at {} (use --force to replace it)",
            paths.cert.display()
        );
    }

    for path in [&paths.cert, &paths.key] {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
    }

    let mut subject_alt_names = vec![hostname.to_string()];
    for extra in ["localhost", "127.0.0.1", "::1"] {
        if extra != hostname {
            subject_alt_names.push(extra.to_string());
        }
    }

    let CertifiedKey { cert, key_pair } = generate_simple_self_signed(subject_alt_names)
        .context("Failed to generate self-signed certificate")?;

    std::fs::write(&paths.cert, cert.pem())
        .with_context(|| format!("Failed to write certificate to {}", paths.cert.display()))?;

    std::fs::write(&paths.key, key_pair.serialize_pem())
        .with_context(|| format!("Failed to write private key to {}", paths.key.display()))?;

    Ok(())
}

/// Load TLS configuration from certificate files.
pub async fn load_rustls_config(
    config: &TlsConfig,
) -> Result<axum_server::tls_rustls::RustlsConfig> {
    let paths = TlsCertPaths::from_config(config)?;

    if !paths.exists() {
        anyhow::bail!(
            "TLS enabled but certificates not found.\n\
             Expected:\n  cert: {}\n  key: {}\n\n\
             Generate certificates with:\n  streamd generate-cert --hostname <your-hostname>",
            paths.cert.display(),
            paths.key.display()
        );
    }

    axum_server::tls_rustls::RustlsConfig::from_pem_file(&paths.cert, &paths.key)
        .await
        .with_context(|| {
            format!(
                "Failed to load TLS config from {} and {}",
                paths.cert.display(),
                paths.key.display()
            )
        })
}
