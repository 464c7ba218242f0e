//! Resumable HTTP transfers
//!
//! [`HttpTransfer`] streams a URL into a local file. An existing file is treated
//! as a prefix of the remote content: the request asks for the remaining byte
//! range and new bytes are appended. Interrupted attempts are retried with the
//! backoff in [`crate::retry`], each retry resuming from whatever reached disk.
//!
//! Bytes already on disk are never rewritten. A local file longer than the
//! remote content is reported as [`DownloadError::LocalLarger`] and left as is.

use crate::config::{Config, RetryConfig};
use crate::error::{DownloadError, Error, Result};
use crate::retry::download_with_retry;
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, HeaderMap, RANGE};
use reqwest::{Client, StatusCode};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Connect timeout for the underlying client
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Snapshot of a running transfer
#[derive(Clone, Debug, PartialEq)]
pub struct TransferProgress {
    /// Bytes on disk, including any resumed prefix
    pub downloaded: u64,
    /// Total size when the server reported one
    pub total: Option<u64>,
    /// Completion percentage (0.0 when the total is unknown)
    pub percent: f32,
    /// Throughput of the current attempt
    pub speed_bps: u64,
    /// Estimated seconds remaining, 0 when throughput is zero or total unknown
    pub eta_secs: f64,
}

impl TransferProgress {
    /// Build a snapshot from raw counters
    ///
    /// `received` counts only bytes of the current attempt; the resumed prefix
    /// does not inflate the reported speed.
    pub fn compute(downloaded: u64, total: Option<u64>, received: u64, elapsed: Duration) -> Self {
        let secs = elapsed.as_secs_f64();
        let speed = if secs > 0.0 { received as f64 / secs } else { 0.0 };

        let (percent, eta_secs) = match total {
            Some(total) if total > 0 => {
                let percent = (downloaded as f64 / total as f64 * 100.0).min(100.0) as f32;
                let remaining = total.saturating_sub(downloaded) as f64;
                let eta = if speed > 0.0 { remaining / speed } else { 0.0 };
                (percent, eta)
            }
            _ => (0.0, 0.0),
        };

        Self {
            downloaded,
            total,
            percent,
            speed_bps: speed as u64,
            eta_secs,
        }
    }
}

type ProgressFn = Arc<dyn Fn(&TransferProgress) + Send + Sync>;

/// Resumable downloader with retry and progress reporting
///
/// Cloning is cheap; the HTTP connection pool is shared between clones.
#[derive(Clone)]
pub struct HttpTransfer {
    client: Client,
    retry: RetryConfig,
    chunk_timeout: Duration,
    cancel: CancellationToken,
    progress: Option<ProgressFn>,
}

impl std::fmt::Debug for HttpTransfer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransfer")
            .field("retry", &self.retry)
            .field("chunk_timeout", &self.chunk_timeout)
            .field("has_progress", &self.progress.is_some())
            .finish()
    }
}

impl HttpTransfer {
    /// Create a transfer using the retry policy, chunk timeout and user agent from `config`
    pub fn new(config: &Config, cancel: CancellationToken) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            retry: config.retry.clone(),
            chunk_timeout: config.chunk_timeout,
            cancel,
            progress: None,
        })
    }

    /// Attach a progress callback, called after every received chunk
    pub fn with_progress(mut self, progress: impl Fn(&TransferProgress) + Send + Sync + 'static) -> Self {
        self.progress = Some(Arc::new(progress));
        self
    }

    /// Download `url` to `destination`, resuming from any bytes already present
    ///
    /// Returns the destination path once the file holds the full remote content.
    pub async fn download(&self, url: &str, destination: &Path) -> Result<PathBuf> {
        if let Some(parent) = destination.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        self.retrying(|attempt| self.attempt(url, destination, attempt))
            .await?;

        info!(url, path = ?destination, "download complete");
        Ok(destination.to_path_buf())
    }

    /// Download with a size pre-flight for files that already exist locally
    ///
    /// When `destination` exists, a HEAD request compares sizes first. A match
    /// returns immediately without any GET request. A missing `Content-Length`
    /// is taken to mean there is nothing to compare and the file is kept as is.
    /// Otherwise the transfer resumes through [`download`](Self::download).
    pub async fn fetch(&self, url: &str, destination: &Path) -> Result<PathBuf> {
        let local = match tokio::fs::metadata(destination).await {
            Ok(meta) => Some(meta.len()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        if let Some(local) = local {
            let remote = self.retrying(|_| self.remote_size(url)).await?;
            match remote {
                Some(remote) if remote == local => {
                    info!(url, size = local, "local file already complete");
                    return Ok(destination.to_path_buf());
                }
                None => {
                    info!(url, size = local, "server reported no size; keeping local file");
                    return Ok(destination.to_path_buf());
                }
                Some(remote) => {
                    debug!(url, local, remote, "local file incomplete, resuming");
                }
            }
        }

        self.download(url, destination).await
    }

    /// Retry `operation`, reporting [`Error::Cancelled`] once cancellation stopped it
    async fn retrying<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        match download_with_retry(&self.retry, &self.cancel, operation).await {
            Err(_) if self.cancel.is_cancelled() => Err(Error::Cancelled),
            other => other,
        }
    }

    /// Size advertised by a HEAD request, if any
    async fn remote_size(&self, url: &str) -> Result<Option<u64>> {
        let response = self.send_with_timeout(self.client.head(url)).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::UnexpectedStatus {
                status: status.as_u16(),
                url: url.to_string(),
            }
            .into());
        }
        // content_length() reports the (empty) body size for HEAD, so read the header
        Ok(header_u64(response.headers(), CONTENT_LENGTH.as_str()))
    }

    async fn send_with_timeout(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(Error::Cancelled),
            sent = tokio::time::timeout(self.chunk_timeout, request.send()) => match sent {
                Ok(response) => Ok(response?),
                Err(_) => Err(self.stalled()),
            },
        }
    }

    fn stalled(&self) -> Error {
        DownloadError::Stalled {
            seconds: self.chunk_timeout.as_secs(),
        }
        .into()
    }

    /// One GET attempt, appending to whatever is already on disk
    async fn attempt(&self, url: &str, destination: &Path, attempt: u32) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let existing = match tokio::fs::metadata(destination).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };

        let mut request = self.client.get(url);
        if existing > 0 {
            request = request.header(RANGE, format!("bytes={}-", existing));
        }
        debug!(url, existing, attempt, "requesting");

        let mut response = self.send_with_timeout(request).await?;
        let status = response.status();

        let (total, mut skip) = match status {
            StatusCode::PARTIAL_CONTENT => {
                let total = content_range_total(response.headers())
                    .or_else(|| response.content_length().map(|len| existing + len))
                    .ok_or_else(|| DownloadError::MissingLength {
                        url: url.to_string(),
                    })?;
                (Some(total), 0)
            }
            StatusCode::OK => match response.content_length() {
                // The partial file cannot be a prefix of this content; leave it alone
                Some(len) if existing > len => {
                    return Err(DownloadError::LocalLarger {
                        local: existing,
                        remote: len,
                        url: url.to_string(),
                    }
                    .into());
                }
                // Range ignored: drop the prefix we already have
                Some(len) => (Some(len), existing),
                None => (None, existing),
            },
            StatusCode::RANGE_NOT_SATISFIABLE if existing > 0 => {
                match content_range_total(response.headers()) {
                    Some(total) if total == existing => {
                        debug!(url, existing, "range starts at end of file, nothing left to fetch");
                        return Ok(());
                    }
                    Some(total) if total < existing => {
                        return Err(DownloadError::LocalLarger {
                            local: existing,
                            remote: total,
                            url: url.to_string(),
                        }
                        .into());
                    }
                    _ => {
                        return Err(DownloadError::UnexpectedStatus {
                            status: status.as_u16(),
                            url: url.to_string(),
                        }
                        .into());
                    }
                }
            }
            other => {
                return Err(DownloadError::UnexpectedStatus {
                    status: other.as_u16(),
                    url: url.to_string(),
                }
                .into());
            }
        };

        if total == Some(existing) {
            return Ok(());
        }

        // Append only: bytes already on disk are never rewritten
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(destination)
            .await?;

        let mut on_disk = existing;
        let mut received: u64 = 0;
        let started = Instant::now();

        loop {
            let next = tokio::select! {
                _ = self.cancel.cancelled() => {
                    file.flush().await?;
                    return Err(Error::Cancelled);
                }
                next = tokio::time::timeout(self.chunk_timeout, response.chunk()) => next,
            };

            let chunk = match next {
                Ok(Ok(chunk)) => chunk,
                Ok(Err(e)) => {
                    // Land the bytes written so far before the retry measures the file
                    file.flush().await?;
                    return Err(e.into());
                }
                Err(_) => {
                    file.flush().await?;
                    return Err(self.stalled());
                }
            };
            let Some(chunk) = chunk else {
                break;
            };

            let mut data: &[u8] = &chunk;
            if skip > 0 {
                let n = skip.min(data.len() as u64) as usize;
                data = &data[n..];
                skip -= n as u64;
            }
            if data.is_empty() {
                continue;
            }

            file.write_all(data).await?;
            on_disk += data.len() as u64;
            received += data.len() as u64;

            self.report(TransferProgress::compute(on_disk, total, received, started.elapsed()));
        }

        file.flush().await?;

        if let Some(total) = total
            && on_disk < total
        {
            return Err(DownloadError::Truncated {
                received: on_disk,
                total,
            }
            .into());
        }

        Ok(())
    }

    fn report(&self, progress: TransferProgress) {
        if let Some(callback) = &self.progress {
            callback(&progress);
        }
    }
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

/// Total size from `Content-Range: bytes <start>-<end>/<total>` or `bytes */<total>`
fn content_range_total(headers: &HeaderMap) -> Option<u64> {
    let value = headers.get(CONTENT_RANGE)?.to_str().ok()?;
    let (_, total) = value.trim().rsplit_once('/')?;
    total.trim().parse().ok()
}
