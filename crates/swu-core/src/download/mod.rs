//! Resumable streaming download engine.
//!
//! One artifact at a time: resolves the destination name from the URL,
//! resumes from an existing partial file via a Range request, retries
//! connection establishment with exponential backoff, and streams the body
//! to disk in bounded chunks. The partial file left behind by an
//! interrupted or failed transfer is the only resume checkpoint; there is
//! no separate metadata, and the engine never deletes it.

mod transfer;

use crate::cancel::CancelToken;
use crate::locator;
use crate::retry::{classify_curl_error, ErrorKind, RetryDecision, RetryPolicy};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("connection failed after {attempts} attempts: {source}")]
    ConnectExhausted {
        attempts: u32,
        #[source]
        source: curl::Error,
    },
    #[error("unexpected HTTP status {0}")]
    Status(u32),
    #[error("transfer failed: {0}")]
    Stream(#[source] curl::Error),
    #[error("write failed for {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("download cancelled")]
    Cancelled,
}

/// Streaming downloader owning a destination directory.
///
/// The directory is exclusively owned by the engine while a transfer is in
/// flight; the orchestration loop only touches artifacts there once `fetch`
/// has returned.
pub struct DownloadEngine {
    download_dir: PathBuf,
    policy: RetryPolicy,
}

impl DownloadEngine {
    /// Creates an engine writing into `download_dir`, creating the
    /// directory if it does not exist yet.
    pub fn new(download_dir: impl Into<PathBuf>) -> Self {
        let download_dir = download_dir.into();
        if !download_dir.exists() {
            tracing::info!(dir = %download_dir.display(), "download directory missing, creating");
            if let Err(e) = fs::create_dir_all(&download_dir) {
                tracing::warn!(dir = %download_dir.display(), "could not create download directory: {}", e);
            }
        }
        Self {
            download_dir,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    /// Fetches `url` into the download directory and returns the
    /// destination path.
    ///
    /// An existing file at the destination is treated as a resume
    /// checkpoint: its length becomes the Range offset, and a remote that
    /// answers with full content instead of partial content restarts the
    /// write from zero. Connection-establishment failures are retried with
    /// exponential backoff up to the policy's attempt bound; mid-stream and
    /// protocol failures are terminal. Cancellation aborts between chunks
    /// and leaves the partial file in place.
    pub fn fetch(&self, url: &str, cancel: &CancelToken) -> Result<PathBuf, DownloadError> {
        let dest = self.download_dir.join(locator::filename_from_url(url));
        let mut attempt = 1u32;
        loop {
            let resume_offset = fs::metadata(&dest).map(|m| m.len()).unwrap_or(0);
            if resume_offset > 0 {
                tracing::info!(
                    offset = resume_offset,
                    path = %dest.display(),
                    "partial file present, requesting resume"
                );
            }
            tracing::info!(%url, attempt, max = self.policy.max_attempts, "starting download attempt");

            let err = match transfer::run(url, &dest, resume_offset, cancel) {
                Ok(outcome) => {
                    tracing::info!(bytes = outcome.total_bytes, path = %dest.display(), "download complete");
                    return Ok(dest);
                }
                Err(err) => err,
            };
            if cancel.is_cancelled() {
                return Err(DownloadError::Cancelled);
            }
            match err {
                transfer::TransferError::Curl {
                    source,
                    bytes_received,
                } => match classify_curl_error(&source, bytes_received) {
                    ErrorKind::Connect => match self.policy.decide(attempt, ErrorKind::Connect) {
                        RetryDecision::RetryAfter(delay) => {
                            tracing::warn!(
                                attempt,
                                "connection attempt failed ({}), retrying in {:?}",
                                source,
                                delay
                            );
                            if !cancel.sleep(delay) {
                                return Err(DownloadError::Cancelled);
                            }
                            attempt += 1;
                        }
                        RetryDecision::NoRetry => {
                            return Err(DownloadError::ConnectExhausted {
                                attempts: attempt,
                                source,
                            });
                        }
                    },
                    _ => return Err(DownloadError::Stream(source)),
                },
                transfer::TransferError::Status(code) => {
                    return Err(DownloadError::Status(code));
                }
                transfer::TransferError::Io { path, source } => {
                    return Err(DownloadError::Io { path, source });
                }
            }
        }
    }
}
