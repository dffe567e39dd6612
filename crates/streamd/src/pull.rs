//! Download client for both endpoint kinds.
//!
//! A `multipart/mixed` response is decoded on the fly and each part is
//! written to `<download_dir>/<name>`. Any other response is saved as a
//! single file named from its `Content-Disposition`.

use anyhow::{bail, Context, Result};
use futures::StreamExt;
use reqwest::header::{HeaderMap, CONTENT_DISPOSITION, CONTENT_TYPE};
use reqwest::Url;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use streamer::multipart::{self, Event, MultipartDecoder, PART_NAME_HEADER};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// What to fetch and where to put it.
#[derive(Debug, Clone, Default)]
pub struct PullOptions {
    pub url: String,
    pub download_dir: PathBuf,
    pub from: Option<String>,
    pub to: Option<String>,
    /// Extra PEM root to trust, e.g. a `generate-cert` certificate.
    pub ca_cert: Option<PathBuf>,
    /// Skip certificate verification entirely.
    pub insecure: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullSummary {
    pub files: Vec<PathBuf>,
    pub bytes: u64,
}

/// Reduce a server-supplied name to a bare file name. `None` when nothing
/// usable is left.
pub fn sanitize_name(name: &str) -> Option<String> {
    let name = name.rsplit(['/', '\\']).next()?.trim();
    match name {
        "" | "." | ".." => None,
        _ => Some(name.to_string()),
    }
}

/// `filename` parameter of a `Content-Disposition` value.
pub fn filename_from_disposition(value: &str) -> Option<&str> {
    value
        .split(';')
        .filter_map(|p| p.split_once('='))
        .find(|(k, _)| k.trim().eq_ignore_ascii_case("filename"))
        .map(|(_, v)| v.trim().trim_matches('"'))
        .filter(|v| !v.is_empty())
}

/// Request URL with the range bounds appended to the query.
pub fn request_url(options: &PullOptions) -> Result<Url> {
    let mut url = Url::parse(&options.url).with_context(|| format!("Invalid URL {}", options.url))?;
    if options.from.is_some() || options.to.is_some() {
        let mut query = url.query_pairs_mut();
        if let Some(from) = &options.from {
            query.append_pair("from", from);
        }
        if let Some(to) = &options.to {
            query.append_pair("to", to);
        }
    }
    Ok(url)
}

fn build_client(options: &PullOptions) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder();

    if let Some(path) = &options.ca_cert {
        let pem = std::fs::read(path)
            .with_context(|| format!("Failed to read CA certificate {}", path.display()))?;
        let cert = reqwest::Certificate::from_pem(&pem)
            .with_context(|| format!("Invalid CA certificate {}", path.display()))?;
        builder = builder.add_root_certificate(cert);
    }
    if options.insecure {
        warn!("Certificate verification disabled");
        builder = builder.danger_accept_invalid_certs(true);
    }

    builder.build().context("Failed to build HTTP client")
}

/// Fetch `options.url` into `options.download_dir`.
pub async fn run(options: &PullOptions) -> Result<PullSummary> {
    let url = request_url(options)?;
    let client = build_client(options)?;

    tokio::fs::create_dir_all(&options.download_dir)
        .await
        .with_context(|| format!("Failed to create {}", options.download_dir.display()))?;

    info!("Pulling {}", url);
    let started = Instant::now();
    let response = client
        .get(url.clone())
        .send()
        .await
        .with_context(|| format!("Request to {} failed", url))?
        .error_for_status()
        .context("Server returned an error")?;

    let headers = response.headers().clone();
    let boundary = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(multipart::boundary_from_content_type)
        .map(str::to_owned);

    let mut sink = match &boundary {
        Some(_) => Sink::Parts(PartWriter::new(&options.download_dir)),
        None => {
            let name = single_name(&headers, &url).context("Response carries no usable file name")?;
            Sink::Single(PartWriter::open(&options.download_dir, &name).await?)
        }
    };
    let mut decoder = boundary.as_deref().map(MultipartDecoder::new);

    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.context("Stream interrupted")?;
        match (&mut decoder, &mut sink) {
            (Some(decoder), Sink::Parts(writer)) => {
                for event in decoder.feed(&chunk).context("Malformed multipart body")? {
                    writer.apply(event).await?;
                }
            }
            (_, writer) => writer.writer().write(&chunk).await?,
        }
    }
    if let Some(decoder) = &decoder {
        decoder.finish().context("Incomplete multipart body")?;
    }

    let summary = sink.into_writer().close().await?;
    log_throughput(&summary, started.elapsed());
    Ok(summary)
}

fn single_name(headers: &HeaderMap, url: &Url) -> Option<String> {
    let from_headers = headers
        .get(CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .and_then(filename_from_disposition)
        .or_else(|| headers.get(PART_NAME_HEADER).and_then(|v| v.to_str().ok()));
    let from_url = || url.path_segments().and_then(|mut s| s.next_back());
    from_headers.or_else(from_url).and_then(sanitize_name)
}

fn log_throughput(summary: &PullSummary, elapsed: Duration) {
    let secs = elapsed.as_secs_f64().max(f64::EPSILON);
    let mib = summary.bytes as f64 / (1024.0 * 1024.0);
    info!(
        files = summary.files.len(),
        bytes = summary.bytes,
        elapsed_ms = elapsed.as_millis() as u64,
        "Downloaded {:.2} MiB in {:.2}s ({:.2} MiB/s)",
        mib,
        secs,
        mib / secs
    );
}

enum Sink {
    Single(PartWriter),
    Parts(PartWriter),
}

impl Sink {
    fn writer(&mut self) -> &mut PartWriter {
        match self {
            Sink::Single(w) | Sink::Parts(w) => w,
        }
    }

    fn into_writer(self) -> PartWriter {
        match self {
            Sink::Single(w) | Sink::Parts(w) => w,
        }
    }
}

/// Writes one file at a time into the download directory.
struct PartWriter {
    dir: PathBuf,
    current: Option<(PathBuf, File)>,
    summary: PullSummary,
}

impl PartWriter {
    fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            current: None,
            summary: PullSummary::default(),
        }
    }

    async fn open(dir: &Path, name: &str) -> Result<Self> {
        let mut writer = Self::new(dir);
        writer.start(name).await?;
        Ok(writer)
    }

    async fn start(&mut self, name: &str) -> Result<()> {
        self.flush_current().await?;
        let path = self.dir.join(name);
        let file = File::create(&path)
            .await
            .with_context(|| format!("Failed to create {}", path.display()))?;
        debug!(path = %path.display(), "writing");
        self.summary.files.push(path.clone());
        self.current = Some((path, file));
        Ok(())
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        let Some((path, file)) = self.current.as_mut() else {
            bail!("Data received outside of a part");
        };
        file.write_all(data)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        self.summary.bytes += data.len() as u64;
        Ok(())
    }

    async fn apply(&mut self, event: Event) -> Result<()> {
        match event {
            Event::PartStart { name } => {
                let safe = sanitize_name(&name)
                    .with_context(|| format!("Refusing part with unusable name {name:?}"))?;
                if safe != name {
                    warn!("Part name {:?} reduced to {:?}", name, safe);
                }
                self.start(&safe).await
            }
            Event::Data(data) => self.write(&data).await,
            Event::End => self.flush_current().await,
        }
    }

    async fn flush_current(&mut self) -> Result<()> {
        if let Some((path, mut file)) = self.current.take() {
            file.flush()
                .await
                .with_context(|| format!("Failed to flush {}", path.display()))?;
            info!("Saved {}", path.display());
        }
        Ok(())
    }

    async fn close(mut self) -> Result<PullSummary> {
        self.flush_current().await?;
        Ok(self.summary)
    }
}
