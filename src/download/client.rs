//! HTTP client wrapper for streaming documents to disk.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument};
use url::Url;

use super::constants::{BROWSER_USER_AGENT, DOWNLOAD_TIMEOUT_SECS, PARTIAL_SUFFIX};
use super::error::DownloadError;
use super::file_kind::FileKind;

/// HTTP client for document downloads.
///
/// Created once and reused so connections are pooled across attempts.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

/// A document written to disk by [`HttpClient::fetch_to_file`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedFile {
    /// Final path (`<dir>/<stem>.<ext>`).
    pub path: PathBuf,
    /// Size of the written file.
    pub bytes: u64,
    /// Kind derived from the `Content-Type` header.
    pub kind: FileKind,
    /// Raw `Content-Type` header, when sent.
    pub content_type: Option<String>,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    /// Creates a client with the default 30 second timeout.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails with the static configuration.
    /// This should never happen in practice.
    #[must_use]
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(DOWNLOAD_TIMEOUT_SECS))
    }

    /// Creates a client whose connect and total request timeouts are `timeout`.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails with the supplied timeout.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn with_timeout(timeout: Duration) -> Self {
        let client = Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .user_agent(BROWSER_USER_AGENT)
            .gzip(true)
            .build()
            .expect("failed to build HTTP client with static configuration");
        Self { client }
    }

    /// Downloads `url` into `output_dir` as `<stem>.<ext>`.
    ///
    /// The extension comes from the response `Content-Type`. The body is
    /// streamed into a sibling `.part` file that is renamed into place only
    /// once it is complete and non-empty, so a failed call leaves nothing
    /// behind and never clobbers an earlier good copy.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError`] on an invalid URL, transport failure or
    /// timeout, non-2xx status, IO failure, or an empty body.
    #[instrument(skip(self, output_dir), fields(url = %url))]
    pub async fn fetch_to_file(
        &self,
        url: &str,
        output_dir: &Path,
        stem: &str,
    ) -> Result<FetchedFile, DownloadError> {
        let parsed_url = Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;

        let response = self
            .client
            .get(parsed_url)
            .send()
            .await
            .map_err(|e| DownloadError::from_request(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::http_status(url, status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string);
        let kind = FileKind::from_content_type(content_type.as_deref());
        debug!(content_type = ?content_type, %kind, "classified response");

        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|e| DownloadError::io(output_dir, e))?;

        let final_path = output_dir.join(format!("{stem}.{}", kind.extension()));
        let partial_path = output_dir.join(format!("{stem}.{}.{PARTIAL_SUFFIX}", kind.extension()));

        let mut file = File::create(&partial_path)
            .await
            .map_err(|e| DownloadError::io(&partial_path, e))?;
        let streamed = stream_to_file(&mut file, response, url, &partial_path).await;
        drop(file);

        let bytes = match streamed {
            Ok(0) => {
                discard(&partial_path).await;
                return Err(DownloadError::empty_file(&final_path));
            }
            Ok(bytes) => bytes,
            Err(error) => {
                debug!(path = %partial_path.display(), "cleaning up partial file after error");
                discard(&partial_path).await;
                return Err(error);
            }
        };

        if let Err(error) = tokio::fs::rename(&partial_path, &final_path).await {
            discard(&partial_path).await;
            return Err(DownloadError::io(&final_path, error));
        }

        info!(path = %final_path.display(), bytes, "download complete");
        Ok(FetchedFile {
            path: final_path,
            bytes,
            kind,
            content_type,
        })
    }
}

/// Streams the response body to `file`, returning bytes written.
async fn stream_to_file(
    file: &mut File,
    response: reqwest::Response,
    url: &str,
    file_path: &Path,
) -> Result<u64, DownloadError> {
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| DownloadError::from_request(url, e))?;
        writer
            .write_all(&chunk)
            .await
            .map_err(|e| DownloadError::io(file_path, e))?;
        bytes_written += chunk.len() as u64;
    }

    writer
        .flush()
        .await
        .map_err(|e| DownloadError::io(file_path, e))?;

    Ok(bytes_written)
}

async fn discard(path: &Path) {
    if let Err(error) = tokio::fs::remove_file(path).await
        && error.kind() != std::io::ErrorKind::NotFound
    {
        debug!(path = %path.display(), %error, "failed to remove partial file");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tempfile::TempDir;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, ResponseTemplate};

    use super::*;
    use crate::test_support::socket_guard::start_mock_server_or_skip;

    const STEM: &str = "NFE_51240228517882000186550010000090161000270486";

    #[tokio::test]
    async fn test_fetch_writes_pdf_with_browser_user_agent() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/doc"))
            .and(header("user-agent", BROWSER_USER_AGENT))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/pdf")
                    .set_body_bytes(b"%PDF-1.4 body".to_vec()),
            )
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let fetched = HttpClient::new()
            .fetch_to_file(&format!("{}/doc", server.uri()), dir.path(), STEM)
            .await
            .unwrap();

        assert_eq!(fetched.kind, FileKind::Pdf);
        assert_eq!(fetched.path, dir.path().join(format!("{STEM}.pdf")));
        assert_eq!(fetched.bytes, 13);
        assert!(!dir.path().join(format!("{STEM}.pdf.part")).exists());
    }

    #[tokio::test]
    async fn test_fetch_creates_missing_output_dir() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/xml")
                    .set_body_string("<nfeProc/>"),
            )
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a").join("b");
        let fetched = HttpClient::new()
            .fetch_to_file(&server.uri(), &nested, STEM)
            .await
            .unwrap();
        assert_eq!(fetched.kind, FileKind::Xml);
        assert!(nested.join(format!("{STEM}.xml")).exists());
    }

    #[tokio::test]
    async fn test_fetch_empty_body_leaves_no_file() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let err = HttpClient::new()
            .fetch_to_file(&server.uri(), dir.path(), STEM)
            .await
            .unwrap_err();

        assert!(matches!(err, DownloadError::EmptyFile { .. }));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_fetch_non_2xx_is_http_status_error() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let err = HttpClient::new()
            .fetch_to_file(&server.uri(), dir.path(), STEM)
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::HttpStatus { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_fetch_invalid_url() {
        let dir = TempDir::new().unwrap();
        let err = HttpClient::new()
            .fetch_to_file("not a url", dir.path(), STEM)
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::InvalidUrl { .. }));
    }
}
