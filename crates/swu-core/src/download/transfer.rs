//! One curl transfer attempt.
//!
//! Streams the response body to the destination file through the write
//! callback: the cancellation token is checked before every chunk, the
//! resume decision (append vs restart from zero) is taken when the first
//! chunk arrives and the final status line is known, and throughput is
//! logged on a time threshold.

use crate::cancel::CancelToken;
use std::cell::{Cell, RefCell};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Minimum interval between throughput log lines.
const PROGRESS_INTERVAL: Duration = Duration::from_secs(5);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_REDIRECTS: u32 = 10;

pub(super) struct TransferOutcome {
    /// Destination file size after the transfer, resume offset included.
    pub total_bytes: u64,
}

pub(super) enum TransferError {
    Curl {
        source: curl::Error,
        /// Body bytes received during this attempt, for retry classification.
        bytes_received: u64,
    },
    Status(u32),
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Runs a single GET against `url`, writing the body to `dest`.
///
/// With `resume_offset > 0` a `Range` request is issued; a 206 answer
/// appends at the offset, a 200 answer truncates and restarts from zero
/// (the remote did not honor resume). No whole-transfer deadline is set;
/// cancellation and the connect timeout are the only time bounds.
pub(super) fn run(
    url: &str,
    dest: &Path,
    resume_offset: u64,
    cancel: &CancelToken,
) -> Result<TransferOutcome, TransferError> {
    let mut easy = curl::easy::Easy::new();
    configure(&mut easy, url, resume_offset).map_err(|source| TransferError::Curl {
        source,
        bytes_received: 0,
    })?;

    let status = Cell::new(0u32);
    let sink = RefCell::new(BodySink {
        dest,
        resume_offset,
        file: None,
        total: resume_offset,
        received: 0,
        last_report: Instant::now(),
        started: Instant::now(),
        io_error: None,
    });

    let result = {
        let mut xfer = easy.transfer();
        xfer.header_function(|line| {
            if let Some(code) = parse_status_line(line) {
                status.set(code);
            }
            true
        })
        .map_err(|source| TransferError::Curl {
            source,
            bytes_received: 0,
        })?;
        xfer.write_function(|data| {
            if cancel.is_cancelled() {
                // Abort; the partial file stays as the resume point.
                return Ok(0);
            }
            let mut sink = sink.borrow_mut();
            match sink.write_chunk(status.get(), data) {
                Ok(()) => Ok(data.len()),
                Err(e) => {
                    sink.io_error = Some(e);
                    Ok(0)
                }
            }
        })
        .map_err(|source| TransferError::Curl {
            source,
            bytes_received: 0,
        })?;
        xfer.perform()
    };

    let sink = sink.into_inner();
    if let Err(source) = result {
        if let Some(io) = sink.io_error {
            return Err(TransferError::Io {
                path: dest.to_path_buf(),
                source: io,
            });
        }
        if source.is_http_returned_error() {
            return Err(TransferError::Status(easy.response_code().unwrap_or(0)));
        }
        return Err(TransferError::Curl {
            source,
            bytes_received: sink.received,
        });
    }

    let code = easy.response_code().map_err(|source| TransferError::Curl {
        source,
        bytes_received: sink.received,
    })?;
    if code != 200 && code != 206 {
        return Err(TransferError::Status(code));
    }

    // An empty 200 body never reaches the write callback; the destination
    // must still exist (and drop any stale partial content).
    if sink.file.is_none() && code == 200 {
        File::create(dest).map_err(|source| TransferError::Io {
            path: dest.to_path_buf(),
            source,
        })?;
        return Ok(TransferOutcome { total_bytes: 0 });
    }
    if let Some(file) = sink.file.as_ref() {
        file.sync_all().map_err(|source| TransferError::Io {
            path: dest.to_path_buf(),
            source,
        })?;
    }
    tracing::debug!(code, bytes = sink.total, "transfer finished");
    Ok(TransferOutcome {
        total_bytes: sink.total,
    })
}

fn configure(easy: &mut curl::easy::Easy, url: &str, resume_offset: u64) -> Result<(), curl::Error> {
    easy.url(url)?;
    easy.follow_location(true)?;
    easy.max_redirections(MAX_REDIRECTS)?;
    easy.connect_timeout(CONNECT_TIMEOUT)?;
    easy.fail_on_error(true)?;
    if resume_offset > 0 {
        // Range set by hand: libcurl's own resume option rejects a 200
        // answer outright, and a non-resuming remote must instead fall
        // back to a restart from zero.
        let mut headers = curl::easy::List::new();
        headers.append(&format!("Range: bytes={}-", resume_offset))?;
        easy.http_headers(headers)?;
    }
    Ok(())
}

/// Parses the status code out of an `HTTP/x.y NNN ...` header line.
/// Redirect status lines overwrite earlier ones; the value seen when the
/// body starts flowing is the final response status.
fn parse_status_line(line: &[u8]) -> Option<u32> {
    let line = std::str::from_utf8(line).ok()?;
    if !line.starts_with("HTTP/") {
        return None;
    }
    line.split_whitespace().nth(1)?.parse().ok()
}

struct BodySink<'a> {
    dest: &'a Path,
    resume_offset: u64,
    file: Option<File>,
    /// Destination size so far, resume offset included.
    total: u64,
    /// Bytes received during this attempt.
    received: u64,
    last_report: Instant,
    started: Instant,
    io_error: Option<std::io::Error>,
}

impl BodySink<'_> {
    fn write_chunk(&mut self, status: u32, data: &[u8]) -> std::io::Result<()> {
        if self.file.is_none() {
            let file = self.open(status)?;
            self.file = Some(file);
        }
        if let Some(file) = self.file.as_mut() {
            file.write_all(data)?;
        }
        self.total += data.len() as u64;
        self.received += data.len() as u64;
        if self.last_report.elapsed() >= PROGRESS_INTERVAL {
            let secs = self.started.elapsed().as_secs_f64();
            let rate = if secs > 0.0 {
                self.received as f64 / secs / 1_048_576.0
            } else {
                0.0
            };
            tracing::info!(bytes = self.total, "downloaded ({:.2} MiB/s)", rate);
            self.last_report = Instant::now();
        }
        Ok(())
    }

    /// Opens the destination once the final status is known: 206 honors the
    /// Range request and appends, anything else restarts from zero.
    fn open(&mut self, status: u32) -> std::io::Result<File> {
        if self.resume_offset > 0 && status == 206 {
            tracing::debug!(offset = self.resume_offset, "remote honored resume, appending");
            OpenOptions::new().append(true).open(self.dest)
        } else {
            if self.resume_offset > 0 {
                tracing::info!("remote did not honor the range request, restarting from zero");
                self.total = 0;
            }
            File::create(self.dest)
        }
    }
}
