//! Google Drive v3 backend
//!
//! Downloads are fetched as `Range` requests of `chunk_size` bytes until the
//! server reports the last byte. Uploads use a resumable session: the
//! session is opened together with the metadata update (`modifiedTime`),
//! then content is sent chunk by chunk. Transient chunk failures are retried
//! with exponential backoff; nothing else is retried here.

use std::future::Future;
use std::io::SeekFrom;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_RANGE, LOCATION, RANGE};
use reqwest::{Response, StatusCode};
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use super::auth::{Credentials, TokenSource};
use super::RemoteStore;
use crate::config::DriveConfig;
use crate::error::{MirrorError, Result};
use crate::timestamp::Timestamp;

const USER_AGENT: &str = concat!("drive-mirror/", env!("CARGO_PKG_VERSION"));

/// 308 "Resume Incomplete" from the resumable upload protocol
const RESUME_INCOMPLETE: u16 = 308;

/// Longest response body quoted in an error
const MAX_ERROR_BODY: usize = 300;

/// Whether a failed step may be attempted again within the same transfer
enum Failure {
    Transient(MirrorError),
    Fatal(MirrorError),
}

impl From<Failure> for MirrorError {
    fn from(f: Failure) -> Self {
        match f {
            Failure::Transient(e) | Failure::Fatal(e) => e,
        }
    }
}

impl From<reqwest::Error> for Failure {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() || e.is_body() {
            Failure::Transient(e.into())
        } else {
            Failure::Fatal(e.into())
        }
    }
}

/// `error.errors[0].reason` from a Drive error body
fn error_reason(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .pointer("/error/errors/0/reason")
        .and_then(|r| r.as_str())
        .map(String::from)
}

/// One response of a ranged download
enum DownloadChunk {
    /// 206 with the byte range and the total size if known
    Partial { bytes: Vec<u8>, end: u64, total: Option<u64> },
    /// 200: the server ignored `Range` and sent everything
    Whole(Vec<u8>),
    /// 416 at offset zero: the document is empty
    Empty,
}

/// Server's answer to one uploaded chunk
enum UploadProgress {
    /// Next byte offset the server expects
    Acknowledged(u64),
    Complete,
}

/// Drive client
pub struct DriveClient {
    http: reqwest::Client,
    tokens: TokenSource,
    config: DriveConfig,
}

impl DriveClient {
    pub fn new(config: DriveConfig, credentials: Credentials) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(30))
            // 308 belongs to the upload protocol, never follow it
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        let tokens = TokenSource::new(http.clone(), credentials);

        Ok(Self {
            http,
            tokens,
            config,
        })
    }

    /// Build a client from ambient credentials
    pub fn from_env(config: DriveConfig) -> Result<Self> {
        Self::new(config, Credentials::from_env()?)
    }

    fn chunk_size(&self) -> u64 {
        self.config.chunk_size.max(1) as u64
    }

    fn file_url(&self, id: &str) -> String {
        format!("{}/files/{}", self.config.api_base, id)
    }

    fn upload_url(&self, id: &str) -> String {
        format!("{}/files/{}", self.config.upload_base, id)
    }

    async fn bearer(&self) -> std::result::Result<String, Failure> {
        self.tokens.token().await.map_err(|e| {
            if e.is_retryable() {
                Failure::Transient(e)
            } else {
                Failure::Fatal(e)
            }
        })
    }

    /// Classify a non-success response
    async fn status_failure(&self, id: &str, response: Response) -> Failure {
        let status = response.status();
        let mut body = response.text().await.unwrap_or_default();
        let reason = error_reason(&body);
        if body.len() > MAX_ERROR_BODY {
            let cut = (0..=MAX_ERROR_BODY)
                .rev()
                .find(|i| body.is_char_boundary(*i))
                .unwrap_or(0);
            body.truncate(cut);
        }
        let detail = format!("{} returned {}: {}", id, status, body.trim());

        match status {
            StatusCode::NOT_FOUND => Failure::Fatal(MirrorError::NotFound(id.to_string())),
            StatusCode::UNAUTHORIZED => {
                self.tokens.invalidate();
                Failure::Fatal(MirrorError::Transport(detail))
            }
            StatusCode::FORBIDDEN => match reason.as_deref() {
                Some("rateLimitExceeded" | "userRateLimitExceeded" | "sharingRateLimitExceeded") => {
                    Failure::Transient(MirrorError::Transport(detail))
                }
                // the document exists but this account cannot reach it
                Some("insufficientFilePermissions" | "appNotAuthorizedToFile" | "forbidden") => {
                    Failure::Fatal(MirrorError::NotFound(id.to_string()))
                }
                _ => Failure::Fatal(MirrorError::Transport(detail)),
            },
            StatusCode::TOO_MANY_REQUESTS => Failure::Transient(MirrorError::Transport(detail)),
            s if s.is_server_error() => Failure::Transient(MirrorError::Transport(detail)),
            _ => Failure::Fatal(MirrorError::Transport(detail)),
        }
    }

    /// Run `op`, retrying transient failures with exponential backoff
    async fn with_retries<T, F, Fut>(&self, id: &str, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, Failure>>,
    {
        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(Failure::Transient(e)) if attempt < self.config.chunk_retries => {
                    let delay = Duration::from_millis(
                        self.config
                            .retry_backoff_ms
                            .saturating_mul(1u64 << attempt.min(16)),
                    );
                    tracing::warn!(
                        "{} for {} failed (attempt {}), retrying in {:?}: {}",
                        what,
                        id,
                        attempt + 1,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(failure) => return Err(failure.into()),
            }
        }
    }

    async fn fetch_metadata(&self, id: &str) -> std::result::Result<Vec<u8>, Failure> {
        let token = self.bearer().await?;
        let response = self
            .http
            .get(self.file_url(id))
            .query(&[("fields", "modifiedTime"), ("supportsAllDrives", "true")])
            .bearer_auth(token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.status_failure(id, response).await);
        }
        Ok(response.bytes().await?.to_vec())
    }

    async fn download_chunk(
        &self,
        id: &str,
        start: u64,
    ) -> std::result::Result<DownloadChunk, Failure> {
        let end = start + self.chunk_size() - 1;
        let token = self.bearer().await?;
        let response = self
            .http
            .get(self.file_url(id))
            .query(&[("alt", "media"), ("supportsAllDrives", "true")])
            .bearer_auth(token)
            .header(RANGE, format!("bytes={}-{}", start, end))
            .send()
            .await?;

        match response.status() {
            StatusCode::PARTIAL_CONTENT => {
                let range = response
                    .headers()
                    .get(CONTENT_RANGE)
                    .and_then(|v| v.to_str().ok())
                    .and_then(parse_content_range);
                let Some((first, last, total)) = range else {
                    return Err(Failure::Fatal(MirrorError::Transport(format!(
                        "{} returned 206 without a usable Content-Range",
                        id
                    ))));
                };
                if first != start {
                    return Err(Failure::Fatal(MirrorError::Transport(format!(
                        "{} returned bytes from {} when {} was requested",
                        id, first, start
                    ))));
                }
                let bytes = response.bytes().await?.to_vec();
                Ok(DownloadChunk::Partial {
                    bytes,
                    end: last,
                    total,
                })
            }
            StatusCode::OK => Ok(DownloadChunk::Whole(response.bytes().await?.to_vec())),
            StatusCode::RANGE_NOT_SATISFIABLE if start == 0 => Ok(DownloadChunk::Empty),
            _ => Err(self.status_failure(id, response).await),
        }
    }

    async fn open_upload_session(
        &self,
        id: &str,
        modified_time: &str,
        total: u64,
    ) -> std::result::Result<String, Failure> {
        let token = self.bearer().await?;
        let response = self
            .http
            .patch(self.upload_url(id))
            .query(&[("uploadType", "resumable"), ("supportsAllDrives", "true")])
            .bearer_auth(token)
            .header("X-Upload-Content-Type", "application/octet-stream")
            .header("X-Upload-Content-Length", total.to_string())
            .json(&serde_json::json!({ "modifiedTime": modified_time }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.status_failure(id, response).await);
        }

        response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(String::from)
            .ok_or_else(|| {
                Failure::Fatal(MirrorError::Transport(format!(
                    "{} upload session has no Location header",
                    id
                )))
            })
    }

    async fn put_chunk(
        &self,
        id: &str,
        session: &str,
        chunk: &[u8],
        offset: u64,
        total: u64,
    ) -> std::result::Result<UploadProgress, Failure> {
        let content_range = if chunk.is_empty() {
            format!("bytes */{}", total)
        } else {
            format!("bytes {}-{}/{}", offset, offset + chunk.len() as u64 - 1, total)
        };

        let token = self.bearer().await?;
        let response = self
            .http
            .put(session)
            .bearer_auth(token)
            .header(CONTENT_RANGE, content_range)
            .body(chunk.to_vec())
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == RESUME_INCOMPLETE {
            // `Range: bytes=0-N` is what the server holds; absent means nothing
            let next = response
                .headers()
                .get(RANGE)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_received_range)
                .map_or(0, |last| last + 1);
            if next <= offset {
                return Err(Failure::Transient(MirrorError::Transport(format!(
                    "{} upload made no progress past byte {}",
                    id, offset
                ))));
            }
            return Ok(UploadProgress::Acknowledged(next));
        }
        if status.is_success() {
            return Ok(UploadProgress::Complete);
        }
        Err(self.status_failure(id, response).await)
    }
}

#[async_trait]
impl RemoteStore for DriveClient {
    async fn modification_time(&self, id: &str) -> Result<Timestamp> {
        let body = self.fetch_metadata(id).await?;

        let value: serde_json::Value = serde_json::from_slice(&body)
            .map_err(|e| MirrorError::malformed(id, format!("response is not JSON: {}", e)))?;
        let field = value
            .get("modifiedTime")
            .ok_or_else(|| MirrorError::malformed(id, "response has no modifiedTime"))?;
        let raw = field.as_str().ok_or_else(|| {
            MirrorError::malformed(id, format!("modifiedTime is not a string: {}", field))
        })?;

        Timestamp::parse_canonical(raw).map_err(|e| MirrorError::malformed(id, e.to_string()))
    }

    async fn download(&self, id: &str) -> Result<Vec<u8>> {
        tracing::debug!("Downloading {}", id);

        let mut content: Vec<u8> = Vec::new();
        loop {
            let start = content.len() as u64;
            let chunk = self
                .with_retries(id, "download chunk", || self.download_chunk(id, start))
                .await?;

            match chunk {
                DownloadChunk::Partial { bytes, end, total } => {
                    if bytes.is_empty() {
                        return Err(MirrorError::Transport(format!(
                            "{} returned an empty chunk at byte {}",
                            id, start
                        )));
                    }
                    content.extend_from_slice(&bytes);
                    tracing::debug!(
                        "Downloaded {} bytes of {} ({:?} total)",
                        content.len(),
                        id,
                        total
                    );
                    let done = match total {
                        Some(total) => end + 1 >= total,
                        None => (bytes.len() as u64) < self.chunk_size(),
                    };
                    if done {
                        break;
                    }
                }
                DownloadChunk::Whole(bytes) => {
                    content = bytes;
                    break;
                }
                DownloadChunk::Empty => break,
            }
        }

        tracing::debug!("Downloaded {} bytes from {}", content.len(), id);
        Ok(content)
    }

    async fn upload(&self, local_path: &Path, id: &str, modified: Timestamp) -> Result<()> {
        tracing::debug!("Uploading {} to {}", local_path.display(), id);

        let local_read = |source| MirrorError::LocalRead {
            path: local_path.to_path_buf(),
            source,
        };

        let modified_time = modified.to_canonical().ok_or_else(|| {
            MirrorError::malformed(id, format!("modification time {} out of range", modified))
        })?;

        let mut file = tokio::fs::File::open(local_path).await.map_err(local_read)?;
        let total = file.metadata().await.map_err(local_read)?.len();

        let session = self
            .with_retries(id, "upload session", || {
                self.open_upload_session(id, &modified_time, total)
            })
            .await?;

        let mut offset = 0u64;
        loop {
            let len = (total - offset).min(self.chunk_size()) as usize;
            let mut chunk = vec![0u8; len];
            file.seek(SeekFrom::Start(offset))
                .await
                .map_err(local_read)?;
            file.read_exact(&mut chunk).await.map_err(local_read)?;

            let progress = self
                .with_retries(id, "upload chunk", || {
                    self.put_chunk(id, &session, &chunk, offset, total)
                })
                .await?;

            match progress {
                UploadProgress::Complete => break,
                UploadProgress::Acknowledged(next) if next < total => offset = next,
                UploadProgress::Acknowledged(_) => {
                    return Err(MirrorError::Transport(format!(
                        "{} upload acknowledged every byte but did not complete",
                        id
                    )));
                }
            }
        }

        tracing::debug!("Uploaded {} bytes to {} (modifiedTime {})", total, id, modified_time);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "google-drive"
    }
}

/// Parse `bytes first-last/total` (total may be `*`)
fn parse_content_range(value: &str) -> Option<(u64, u64, Option<u64>)> {
    let rest = value.trim().strip_prefix("bytes ")?;
    let (range, total) = rest.split_once('/')?;
    let (first, last) = range.split_once('-')?;
    let total = match total {
        "*" => None,
        n => Some(n.parse().ok()?),
    };
    Some((first.parse().ok()?, last.parse().ok()?, total))
}

/// Parse the last byte from a 308 `Range: bytes=0-N` header
fn parse_received_range(value: &str) -> Option<u64> {
    let (_, last) = value.trim().strip_prefix("bytes=")?.split_once('-')?;
    last.parse().ok()
}
