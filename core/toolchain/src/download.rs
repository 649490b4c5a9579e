//! HTTP transfers with progress reporting and cancellation.
//!
//! ## Features
//!
//! - Streaming downloads that never hold the artifact in memory
//! - Progress events sent over an unbounded channel, throttled to 100 ms
//! - Cancellation through a [`CancellationToken`]; cancelling drops the
//!   response stream, which closes the underlying connection
//! - Downloads land in a `.part` file that is renamed on success

use std::path::Path;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use reqwest::{Client, Url};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Error, Result};

/// User agent sent with every request.
pub const USER_AGENT: &str = concat!("zigx/", env!("CARGO_PKG_VERSION"));

/// Connect timeout for every request.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 300;

/// Minimum interval between progress events.
const PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

/// A progress update for a long-running install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallProgress {
    /// Completion percentage when the total size is known.
    pub percent: Option<u8>,
    pub message: String,
}

/// Sending half of a progress stream. Reporting to a closed or absent
/// receiver is a no-op.
#[derive(Debug, Clone, Default)]
pub struct ProgressReporter {
    sender: Option<mpsc::UnboundedSender<InstallProgress>>,
}

impl ProgressReporter {
    #[must_use]
    pub fn new(sender: mpsc::UnboundedSender<InstallProgress>) -> Self {
        Self {
            sender: Some(sender),
        }
    }

    /// A reporter and the receiver that consumes its events.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<InstallProgress>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    /// A reporter that drops every event.
    #[must_use]
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn report(&self, percent: Option<u8>, message: impl Into<String>) {
        if let Some(sender) = &self.sender {
            let _ = sender.send(InstallProgress {
                percent,
                message: message.into(),
            });
        }
    }
}

/// Builds the shared HTTP client.
///
/// # Errors
///
/// Returns [`Error::Network`] if the TLS backend cannot be initialised.
pub fn http_client() -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .build()
        .map_err(|e| Error::network("<client>", e))
}

async fn send(client: &Client, url: &Url, cancel: &CancellationToken) -> Result<reqwest::Response> {
    let response = tokio::select! {
        biased;
        () = cancel.cancelled() => return Err(Error::Cancelled),
        response = client.get(url.clone()).send() => response.map_err(|e| Error::network(url, e))?,
    };
    let status = response.status();
    if !status.is_success() {
        return Err(Error::network(url, format!("HTTP {status}")));
    }
    Ok(response)
}

/// Fetches a small document into memory.
///
/// # Errors
///
/// Returns [`Error::Network`] on connection failure or a non-success status,
/// and [`Error::Cancelled`] if `cancel` fires first.
pub async fn fetch_bytes(client: &Client, url: &Url, cancel: &CancellationToken) -> Result<Vec<u8>> {
    let response = send(client, url, cancel).await?;
    let body = tokio::select! {
        biased;
        () = cancel.cancelled() => return Err(Error::Cancelled),
        body = response.bytes() => body.map_err(|e| Error::network(url, e))?,
    };
    debug!(%url, bytes = body.len(), "fetched");
    Ok(body.to_vec())
}

/// Fetches and parses a JSON document.
///
/// # Errors
///
/// Returns [`Error::Network`] as [`fetch_bytes`] does, or [`Error::Format`] if
/// the body is not JSON.
pub async fn fetch_json(
    client: &Client,
    url: &Url,
    cancel: &CancellationToken,
) -> Result<serde_json::Value> {
    let body = fetch_bytes(client, url, cancel).await?;
    serde_json::from_slice(&body).map_err(|e| Error::format(format!("JSON from {url}"), e))
}

/// Streams `url` into `dest`, reporting progress as `label`.
///
/// Returns the number of bytes written.
///
/// # Errors
///
/// Returns [`Error::Network`] for transfer failures, [`Error::Io`] for file
/// errors and [`Error::Cancelled`] if `cancel` fires. The partial file is
/// removed in every error case.
pub async fn download_file(
    client: &Client,
    url: &Url,
    dest: &Path,
    cancel: &CancellationToken,
    progress: &ProgressReporter,
    label: &str,
) -> Result<u64> {
    let temp_path = dest.with_extension("part");
    let result = stream_to_file(client, url, &temp_path, cancel, progress, label).await;
    match result {
        Ok(downloaded) => {
            tokio::fs::rename(&temp_path, dest).await.map_err(|e| {
                Error::io(
                    format!(
                        "failed to rename {} to {}",
                        temp_path.display(),
                        dest.display()
                    ),
                    e,
                )
            })?;
            Ok(downloaded)
        }
        Err(e) => {
            let _ = tokio::fs::remove_file(&temp_path).await;
            Err(e)
        }
    }
}

async fn stream_to_file(
    client: &Client,
    url: &Url,
    dest: &Path,
    cancel: &CancellationToken,
    progress: &ProgressReporter,
    label: &str,
) -> Result<u64> {
    let response = send(client, url, cancel).await?;
    let total_size = response.content_length().filter(|n| *n > 0);

    let mut file = tokio::fs::File::create(dest)
        .await
        .map_err(|e| Error::io(format!("failed to create file {}", dest.display()), e))?;

    progress.report(total_size.map(|_| 0), format!("Downloading {label}"));

    let mut stream = response.bytes_stream();
    let mut downloaded: u64 = 0;
    let mut last_report = Instant::now();

    loop {
        let chunk = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(Error::Cancelled),
            chunk = stream.next() => chunk,
        };
        let Some(chunk) = chunk else { break };
        let chunk = chunk.map_err(|e| Error::network(url, e))?;
        file.write_all(&chunk)
            .await
            .map_err(|e| Error::io(format!("failed to write to {}", dest.display()), e))?;
        downloaded += chunk.len() as u64;

        if last_report.elapsed() >= PROGRESS_INTERVAL {
            progress.report(
                total_size.map(|total| percent(downloaded, total)),
                format!("Downloading {label}"),
            );
            last_report = Instant::now();
        }
    }

    file.flush()
        .await
        .map_err(|e| Error::io(format!("failed to flush {}", dest.display()), e))?;

    progress.report(total_size.map(|_| 100), format!("Downloaded {label}"));
    debug!(%url, bytes = downloaded, "download complete");
    Ok(downloaded)
}

fn percent(downloaded: u64, total: u64) -> u8 {
    u8::try_from((downloaded.saturating_mul(100) / total).min(100)).unwrap_or(100)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn url(server: &MockServer, p: &str) -> Url {
        Url::parse(&format!("{}{p}", server.uri())).expect("Should build URL")
    }

    #[test]
    fn percent_is_clamped() {
        assert_eq!(percent(0, 10), 0);
        assert_eq!(percent(5, 10), 50);
        assert_eq!(percent(15, 10), 100);
    }

    #[test]
    fn reporter_without_receiver_is_silent() {
        ProgressReporter::disabled().report(Some(10), "nothing listens");
        let (reporter, rx) = ProgressReporter::channel();
        drop(rx);
        reporter.report(None, "receiver gone");
    }

    #[tokio::test]
    async fn download_writes_file_and_reports_completion() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/zig.tar.xz"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 4096]))
            .mount(&server)
            .await;

        let temp = tempfile::tempdir().expect("Should create temp dir");
        let dest = temp.path().join("zig.tar.xz");
        let (reporter, mut rx) = ProgressReporter::channel();

        let written = download_file(
            &http_client().expect("Should build client"),
            &url(&server, "/zig.tar.xz"),
            &dest,
            &CancellationToken::new(),
            &reporter,
            "Zig 0.13.0",
        )
        .await
        .expect("Should download");

        assert_eq!(written, 4096);
        assert_eq!(std::fs::read(&dest).expect("Should read").len(), 4096);
        assert!(!dest.with_extension("part").exists());

        let mut last = None;
        while let Ok(event) = rx.try_recv() {
            last = Some(event);
        }
        let last = last.expect("Should report progress");
        assert_eq!(last.percent, Some(100));
        assert_eq!(last.message, "Downloaded Zig 0.13.0");
    }

    #[tokio::test]
    async fn error_status_is_a_network_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let temp = tempfile::tempdir().expect("Should create temp dir");
        let dest = temp.path().join("missing.tar.xz");
        let err = download_file(
            &http_client().expect("Should build client"),
            &url(&server, "/missing.tar.xz"),
            &dest,
            &CancellationToken::new(),
            &ProgressReporter::disabled(),
            "missing",
        )
        .await
        .expect_err("Should fail");

        assert!(err.is_network());
        assert!(err.to_string().contains("404"));
        assert!(!dest.exists());
        assert!(!dest.with_extension("part").exists());
    }

    #[tokio::test]
    async fn cancelled_download_stops_without_leaving_files() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(vec![0u8; 16])
                    .set_delay(Duration::from_secs(30)),
            )
            .mount(&server)
            .await;

        let temp = tempfile::tempdir().expect("Should create temp dir");
        let dest = temp.path().join("slow.tar.xz");
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let err = download_file(
            &http_client().expect("Should build client"),
            &url(&server, "/slow.tar.xz"),
            &dest,
            &cancel,
            &ProgressReporter::disabled(),
            "slow",
        )
        .await
        .expect_err("Should be cancelled");

        assert!(matches!(err, Error::Cancelled));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn fetch_json_rejects_non_json() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let err = fetch_json(
            &http_client().expect("Should build client"),
            &url(&server, "/index.json"),
            &CancellationToken::new(),
        )
        .await
        .expect_err("Should fail");
        assert!(matches!(err, Error::Format { .. }));
    }
}
