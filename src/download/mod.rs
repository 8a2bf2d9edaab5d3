//! Download module
//!
//! Fetches remote objects (packages, artifacts, results, run payloads) through
//! the service's download endpoint:
//!
//! 1. `GET /<collection>/<id>/download/` answers either with the payload
//!    itself or with `{"action": "redirect", "target": "<storage url>"}`.
//! 2. For a redirect, `HEAD <target>` discovers `Content-Length` and
//!    `Accept-Ranges`.
//! 3. When ranges are supported and the size is known and non-zero, a ranged GET is
//!    streamed into the sink chunk by chunk; otherwise the body is buffered
//!    and written in one go.

use crate::metrics;
use crate::routes::{RemoteObjectReference, RouteError, Routes};
use crate::transport::{HttpTransport, TransportError};
use reqwest::header::{ACCEPT_RANGES, CONTENT_LENGTH};
use reqwest::{Response, StatusCode, Url};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Download errors
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("404 - {resource} was not found")]
    NotFound { resource: RemoteObjectReference },

    #[error("{status} - Failed to download {resource}")]
    Status {
        resource: RemoteObjectReference,
        status: u16,
    },

    #[error("{status} - Storage rejected the download of {resource}")]
    StorageStatus {
        resource: RemoteObjectReference,
        status: u16,
    },

    #[error("Invalid redirect target for {resource}: {target}")]
    InvalidRedirect {
        resource: RemoteObjectReference,
        target: String,
    },

    #[error("Invalid route: {0}")]
    Route(#[from] RouteError),

    #[error("Request failed: {0}")]
    Transport(#[from] TransportError),

    #[error("Cannot write '{0}': {1}")]
    Destination(String, #[source] std::io::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DownloadError {
    /// HTTP status behind the failure, if the server answered
    pub fn status(&self) -> Option<u16> {
        match self {
            DownloadError::NotFound { .. } => Some(404),
            DownloadError::Status { status, .. } | DownloadError::StorageStatus { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }
}

impl From<reqwest::Error> for DownloadError {
    fn from(e: reqwest::Error) -> Self {
        DownloadError::Transport(TransportError::RequestError(e))
    }
}

/// How the bytes were fetched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadMode {
    /// Payload returned directly by the download endpoint
    Inline,
    /// Streamed ranged GET from storage
    Ranged,
    /// Plain GET from storage, buffered in memory
    Buffered,
}

impl DownloadMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadMode::Inline => "inline",
            DownloadMode::Ranged => "ranged",
            DownloadMode::Buffered => "buffered",
        }
    }
}

impl fmt::Display for DownloadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final result of one download call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOutcome {
    pub ok: bool,
    pub bytes_written: u64,
    pub message: String,
    pub status: Option<u16>,
    pub mode: Option<DownloadMode>,
}

/// Body of the download endpoint when the object lives in storage
#[derive(Debug, Deserialize)]
struct DownloadAction {
    action: String,
    #[serde(default)]
    target: Option<String>,
}

/// What HEAD revealed about the storage object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Probe {
    content_length: Option<u64>,
    accepts_ranges: bool,
}

/// Range-aware downloader
pub struct RangedDownloader {
    transport: HttpTransport,
    routes: Routes,
}

impl RangedDownloader {
    pub fn new(transport: HttpTransport, routes: Routes) -> Self {
        Self { transport, routes }
    }

    /// Download `resource` into `sink`
    #[tracing::instrument(
        name = "download.fetch",
        skip(self, sink),
        fields(download.resource = %resource)
    )]
    pub async fn fetch<W>(&self, resource: &RemoteObjectReference, sink: &mut W) -> DownloadOutcome
    where
        W: AsyncWrite + Unpin,
    {
        let start_time = Instant::now();
        let result = self.try_fetch(resource, sink).await;
        metrics::record_transfer_duration("download", start_time.elapsed().as_secs_f64());
        Self::outcome(resource, result)
    }

    /// Download `resource` to a file at `destination`
    ///
    /// Bytes go to a hidden sibling file first, which is renamed into place on
    /// success and removed on failure. When `destination` is an existing
    /// directory, the file is named after the resource SUUID.
    pub async fn fetch_to_path(
        &self,
        resource: &RemoteObjectReference,
        destination: &Path,
    ) -> DownloadOutcome {
        let start_time = Instant::now();
        let result = self.try_fetch_to_path(resource, destination).await;
        metrics::record_transfer_duration("download", start_time.elapsed().as_secs_f64());
        Self::outcome(resource, result)
    }

    async fn try_fetch_to_path(
        &self,
        resource: &RemoteObjectReference,
        destination: &Path,
    ) -> Result<(u64, DownloadMode), DownloadError> {
        let destination = resolve_destination(destination, resource).await;
        let partial = partial_path(&destination);
        let mut file = tokio::fs::File::create(&partial)
            .await
            .map_err(|e| DownloadError::Destination(partial.display().to_string(), e))?;

        let result = self.try_fetch(resource, &mut file).await;
        drop(file);

        match result {
            Ok(done) => {
                if let Err(e) = tokio::fs::rename(&partial, &destination).await {
                    remove_partial(&partial).await;
                    return Err(DownloadError::Destination(
                        destination.display().to_string(),
                        e,
                    ));
                }
                tracing::info!(path = %destination.display(), "Saved download");
                Ok(done)
            }
            Err(e) => {
                remove_partial(&partial).await;
                Err(e)
            }
        }
    }

    async fn try_fetch<W>(
        &self,
        resource: &RemoteObjectReference,
        sink: &mut W,
    ) -> Result<(u64, DownloadMode), DownloadError>
    where
        W: AsyncWrite + Unpin,
    {
        let url = self.routes.download(resource)?;
        let response = self.transport.get(url, &[]).await?;
        match response.status() {
            status if status.is_success() => {}
            StatusCode::NOT_FOUND => {
                return Err(DownloadError::NotFound {
                    resource: resource.clone(),
                })
            }
            status => {
                return Err(DownloadError::Status {
                    resource: resource.clone(),
                    status: status.as_u16(),
                })
            }
        }

        let body = response.bytes().await?;
        let target = match serde_json::from_slice::<DownloadAction>(&body) {
            Ok(DownloadAction {
                action,
                target: Some(target),
            }) if action == "redirect" => target,
            _ => {
                sink.write_all(&body).await?;
                sink.flush().await?;
                return Ok((body.len() as u64, DownloadMode::Inline));
            }
        };

        let target_url = self.resolve_target(resource, &target)?;
        tracing::debug!(target = %target_url, "Following download redirect");

        let probe = self.probe(resource, target_url.clone()).await?;
        match probe {
            // Storage answers 416 to any range on an empty object
            Probe {
                content_length: Some(size),
                accepts_ranges: true,
            } if size > 0 => {
                let written = self.fetch_ranged(resource, target_url, size, sink).await?;
                Ok((written, DownloadMode::Ranged))
            }
            _ => {
                let written = self.fetch_buffered(resource, target_url, sink).await?;
                Ok((written, DownloadMode::Buffered))
            }
        }
    }

    fn resolve_target(
        &self,
        resource: &RemoteObjectReference,
        target: &str,
    ) -> Result<Url, DownloadError> {
        Url::parse(target)
            .or_else(|_| self.routes.base().join(target))
            .map_err(|_| DownloadError::InvalidRedirect {
                resource: resource.clone(),
                target: target.to_string(),
            })
    }

    async fn probe(&self, resource: &RemoteObjectReference, url: Url) -> Result<Probe, DownloadError> {
        let response = self.transport.head_external(url).await?;
        check_storage_status(resource, &response)?;

        let headers = response.headers();
        let content_length = headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let accepts_ranges = headers
            .get(ACCEPT_RANGES)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("bytes"));

        tracing::debug!(?content_length, accepts_ranges, "Probed storage object");
        Ok(Probe {
            content_length,
            accepts_ranges,
        })
    }

    async fn fetch_ranged<W>(
        &self,
        resource: &RemoteObjectReference,
        url: Url,
        size: u64,
        sink: &mut W,
    ) -> Result<u64, DownloadError>
    where
        W: AsyncWrite + Unpin,
    {
        let range = format!("bytes=0-{}", size);
        let mut response = self.transport.get_external(url, Some(&range)).await?;
        check_storage_status(resource, &response)?;

        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await? {
            sink.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        sink.flush().await?;
        Ok(written)
    }

    async fn fetch_buffered<W>(
        &self,
        resource: &RemoteObjectReference,
        url: Url,
        sink: &mut W,
    ) -> Result<u64, DownloadError>
    where
        W: AsyncWrite + Unpin,
    {
        let response = self.transport.get_external(url, None).await?;
        check_storage_status(resource, &response)?;

        let body = response.bytes().await?;
        sink.write_all(&body).await?;
        sink.flush().await?;
        Ok(body.len() as u64)
    }

    fn outcome(
        resource: &RemoteObjectReference,
        result: Result<(u64, DownloadMode), DownloadError>,
    ) -> DownloadOutcome {
        match result {
            Ok((bytes_written, mode)) => {
                metrics::record_download(mode.as_str(), true, bytes_written);
                tracing::info!(bytes = bytes_written, mode = %mode, "Download completed");
                DownloadOutcome {
                    ok: true,
                    bytes_written,
                    message: format!("{} downloaded ({} bytes)", resource, bytes_written),
                    status: None,
                    mode: Some(mode),
                }
            }
            Err(e) => {
                metrics::record_download("none", false, 0);
                tracing::error!(error = %e, "Download failed");
                DownloadOutcome {
                    ok: false,
                    bytes_written: 0,
                    message: e.to_string(),
                    status: e.status(),
                    mode: None,
                }
            }
        }
    }
}

fn check_storage_status(
    resource: &RemoteObjectReference,
    response: &Response,
) -> Result<(), DownloadError> {
    let status = response.status();
    if status.is_client_error() || status.is_server_error() {
        return Err(DownloadError::StorageStatus {
            resource: resource.clone(),
            status: status.as_u16(),
        });
    }
    Ok(())
}

async fn resolve_destination(destination: &Path, resource: &RemoteObjectReference) -> PathBuf {
    match tokio::fs::metadata(destination).await {
        Ok(metadata) if metadata.is_dir() => destination.join(&resource.suuid),
        _ => destination.to_path_buf(),
    }
}

async fn remove_partial(partial: &Path) {
    if let Err(e) = tokio::fs::remove_file(partial).await {
        tracing::warn!(
            path = %partial.display(),
            error = %e,
            "Failed to clean up partial download"
        );
    }
}

/// `dir/.name.<uuid>.part` next to the final destination
fn partial_path(destination: &Path) -> PathBuf {
    let name = destination
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "download".to_string());
    let partial = format!(".{}.{}.part", name, uuid::Uuid::new_v4());
    match destination.parent() {
        Some(parent) => parent.join(partial),
        None => PathBuf::from(partial),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::ResourceKind;

    #[test]
    fn test_not_found_message() {
        let err = DownloadError::NotFound {
            resource: RemoteObjectReference::new(ResourceKind::Package, "pkg9"),
        };
        assert_eq!(err.to_string(), "404 - Package SUUID 'pkg9' was not found");
        assert_eq!(err.status(), Some(404));
    }

    #[test]
    fn test_status_message() {
        let err = DownloadError::Status {
            resource: RemoteObjectReference::new(ResourceKind::Run, "r1"),
            status: 500,
        };
        assert_eq!(err.to_string(), "500 - Failed to download Run SUUID 'r1'");
    }

    #[test]
    fn test_partial_path_is_hidden_sibling() {
        let partial = partial_path(Path::new("/tmp/out/model.bin"));
        assert_eq!(partial.parent(), Some(Path::new("/tmp/out")));
        let name = partial.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with(".model.bin."));
        assert!(name.ends_with(".part"));
    }

    #[tokio::test]
    async fn test_resolve_destination_directory() {
        let dir = tempfile::tempdir().unwrap();
        let resource = RemoteObjectReference::new(ResourceKind::Artifact, "art1");
        let resolved = resolve_destination(dir.path(), &resource).await;
        assert_eq!(resolved, dir.path().join("art1"));

        let file = dir.path().join("out.bin");
        assert_eq!(resolve_destination(&file, &resource).await, file);
    }
}
