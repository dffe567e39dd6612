//! streamd - chunked HTTP(S) file and directory streaming
//!
//! Subcommands:
//! - `streamd serve` - Serve the configured file and directory
//! - `streamd generate-cert --hostname <host>` - Create a self-signed certificate
//! - `streamd pull <url> --download-dir <dir>` - Download from a streamd endpoint
//! - `streamd config` - Print the effective configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use streamconf::StreamdConfig;
use streamd::{pull, serve, telemetry, tls};

#[derive(Parser)]
#[command(name = "streamd")]
#[command(about = "Chunked HTTP(S) streaming of a file and a flat directory")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the streaming server
    Serve {
        /// Config file used instead of ./streamd.toml
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Port to bind, overriding the config
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Generate a self-signed TLS certificate at the configured paths
    GenerateCert {
        /// Hostname the certificate is issued for
        #[arg(long, default_value = "localhost")]
        hostname: String,

        /// Config file used instead of ./streamd.toml
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Replace an existing certificate
        #[arg(long)]
        force: bool,
    },

    /// Download a file or a directory listing from a streamd endpoint
    Pull {
        /// Endpoint URL (e.g., https://device.local:8443/dir_stream)
        url: String,

        /// Directory the downloaded files are written to
        #[arg(short, long, default_value = ".")]
        download_dir: PathBuf,

        /// First name to include (inclusive)
        #[arg(long)]
        from: Option<String>,

        /// Last name to include (inclusive)
        #[arg(long)]
        to: Option<String>,

        /// PEM certificate to trust in addition to the system roots
        #[arg(long)]
        ca_cert: Option<PathBuf>,

        /// Accept any server certificate
        #[arg(long)]
        insecure: bool,
    },

    /// Print the effective configuration as TOML
    Config {
        /// Config file used instead of ./streamd.toml
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config, port } => {
            let mut config =
                StreamdConfig::load_from(config.as_deref()).context("Failed to load config")?;
            if let Some(port) = port {
                config.bind.port = port;
            }
            telemetry::init(&config.telemetry.log_level)?;
            serve::run(config).await?;
        }
        Commands::GenerateCert {
            hostname,
            config,
            force,
        } => {
            telemetry::init_cli()?;
            let config =
                StreamdConfig::load_from(config.as_deref()).context("Failed to load config")?;
            let paths = tls::TlsCertPaths::from_config(&config.tls)?;
            tls::generate_self_signed(&hostname, &paths, force)?;
            println!("Certificate: {}", paths.cert.display());
            println!("Private key: {}", paths.key.display());
            println!(
                "\nClients can trust it with:\n  streamd pull --ca-cert {} <url>",
                paths.cert.display()
            );
        }
        Commands::Pull {
            url,
            download_dir,
            from,
            to,
            ca_cert,
            insecure,
        } => {
            telemetry::init_cli()?;
            let summary = pull::run(&pull::PullOptions {
                url,
                download_dir,
                from,
                to,
                ca_cert,
                insecure,
            })
            .await?;
            println!("{} file(s), {} bytes", summary.files.len(), summary.bytes);
        }
        Commands::Config { config } => {
            let (config, sources) = StreamdConfig::load_with_sources_from(config.as_deref())
                .context("Failed to load config")?;
            for file in &sources.files {
                eprintln!("# loaded {}", file.display());
            }
            for var in &sources.env_overrides {
                eprintln!("# override {}", var);
            }
            print!("{}", config.to_toml());
        }
    }

    Ok(())
}
