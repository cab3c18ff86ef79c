//! Command socket: the delivery surface update commands arrive on.
//! Protocol: one line per command, "update <locator> [<digest>]" to queue an
//! update and "checksum <digest>" to latch a side-channel checksum.

use crate::source::CommandPublisher;
use anyhow::Result;
use std::path::Path;
use std::time::Duration;
use swu_core::cancel::CancelToken;
use swu_core::source::UpdateCommand;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::UnixListener;

/// Granularity of cancellation checks in the accept loop.
const POLL_TICK: Duration = Duration::from_millis(100);

/// Spawns a task that listens on `path` and forwards each well-formed line
/// to the publisher. Malformed lines are logged and ignored; they never
/// reach the orchestration loop. When `cancel` fires, the task stops
/// accepting and unlinks the socket file.
pub fn spawn_listener(
    publisher: CommandPublisher,
    path: impl AsRef<Path>,
    cancel: CancelToken,
) -> Result<tokio::task::JoinHandle<()>> {
    let path = path.as_ref().to_path_buf();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let _ = std::fs::remove_file(&path);
    let listener = UnixListener::bind(&path)?;
    tracing::info!(path = %path.display(), "listening for update commands");

    let handle = tokio::spawn(async move {
        let mut poll = tokio::time::interval(POLL_TICK);
        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        let publisher = publisher.clone();
                        tokio::spawn(async move {
                            let mut reader = BufReader::new(stream).lines();
                            while let Ok(Some(line)) = reader.next_line().await {
                                handle_line(&publisher, line.trim());
                            }
                        });
                    }
                    Err(e) => tracing::debug!("command socket accept: {}", e),
                },
                _ = poll.tick() => {
                    if cancel.is_cancelled() {
                        break;
                    }
                }
            }
        }
        if let Err(e) = std::fs::remove_file(&path) {
            tracing::debug!(path = %path.display(), "could not remove command socket: {}", e);
        }
        tracing::info!("command socket closed");
    });
    Ok(handle)
}

fn handle_line(publisher: &CommandPublisher, line: &str) {
    if line.is_empty() {
        return;
    }
    let mut parts = line.split_whitespace();
    match parts.next() {
        Some("update") => {
            let Some(locator) = parts.next() else {
                tracing::debug!("ignoring update command without locator");
                return;
            };
            let checksum = parts.next().map(str::to_string);
            if parts.next().is_some() {
                tracing::debug!(line, "ignoring update command with trailing fields");
                return;
            }
            publisher.publish_update(UpdateCommand {
                locator: locator.to_string(),
                checksum,
            });
        }
        Some("checksum") => match (parts.next(), parts.next()) {
            (Some(spec), None) => publisher.publish_checksum(spec),
            _ => tracing::debug!(line, "ignoring malformed checksum command"),
        },
        _ => tracing::debug!(line, "ignoring unknown command"),
    }
}
