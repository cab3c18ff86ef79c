//! Orchestration loop: the state machine sequencing dequeue, download,
//! verification, and install, and mapping every branch to an observable
//! status.
//!
//! The loop is the sole writer of the status; the engine and verifier only
//! return values and errors. Terminal failures inside one cycle are mapped
//! to the nearest error status, written to the failure sink, and return the
//! loop to polling; they never crash the process.

#[cfg(test)]
mod tests;

use crate::cancel::CancelToken;
use crate::digest;
use crate::download::{DownloadEngine, DownloadError};
use crate::installer::{Installer, InstallerError};
use crate::locator;
use crate::sink::StatusSink;
use crate::source::{CommandSource, SourceError, UpdateCommand};
use crate::status::{UpdateMode, UpdateStatus};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Pause before re-polling after a command source transport error.
const SOURCE_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Terminal failure of one orchestration cycle.
#[derive(Debug, Error)]
enum CycleError {
    #[error("error downloading update: {0}")]
    Download(#[source] DownloadError),
    #[error("local file {} does not exist", .0.display())]
    MissingLocalFile(PathBuf),
    #[error("checksum verification failed: {0}")]
    Verify(#[source] digest::VerifyError),
    #[error("error installing update: {0}")]
    Install(#[source] InstallerError),
    /// Shutdown short-circuited the cycle; not a failure.
    #[error("update cancelled")]
    Cancelled,
}

impl CycleError {
    fn status(&self) -> UpdateStatus {
        match self {
            CycleError::Download(_)
            | CycleError::MissingLocalFile(_)
            | CycleError::Verify(_) => UpdateStatus::DownloadingUpdateError,
            CycleError::Install(_) => UpdateStatus::InstallingUpdateError,
            CycleError::Cancelled => UpdateStatus::Unknown,
        }
    }
}

/// The orchestration loop over the three capabilities and the download
/// engine. Processes one artifact reference at a time, to completion or
/// failure.
pub struct Agent<S, K, I> {
    source: S,
    sink: K,
    installer: I,
    engine: DownloadEngine,
    mode: UpdateMode,
}

impl<S: CommandSource, K: StatusSink, I: Installer> Agent<S, K, I> {
    pub fn new(source: S, sink: K, installer: I, engine: DownloadEngine, mode: UpdateMode) -> Self {
        Self {
            source,
            sink,
            installer,
            engine,
            mode,
        }
    }

    /// Runs until cancellation. In blocking mode a successful install halts
    /// polling and only waits for shutdown (the installed update needs an
    /// external reboot before further work is meaningful).
    pub fn run(&self, cancel: &CancelToken) {
        self.sink.set_status(UpdateStatus::Initializing);
        self.sink.set_update_mode(Some(self.mode));
        self.commit_pending();

        loop {
            if cancel.is_cancelled() {
                break;
            }
            self.sink.set_status(UpdateStatus::CheckingUpdates);
            let command = match self.source.next(cancel) {
                Ok(command) => command,
                Err(SourceError::Cancelled) => break,
                Err(err) => {
                    tracing::warn!("error waiting for update command: {}", err);
                    self.sink.set_status(UpdateStatus::CheckingUpdateError);
                    if !cancel.sleep(SOURCE_ERROR_BACKOFF) {
                        break;
                    }
                    continue;
                }
            };
            tracing::info!(locator = %command.locator, "received update command");

            match self.run_cycle(&command, cancel) {
                Ok(()) => {
                    self.sink.set_update_mode(None);
                    if self.mode == UpdateMode::Blocking {
                        tracing::info!("update installed, waiting for reboot");
                        while cancel.sleep(Duration::from_secs(1)) {}
                        break;
                    }
                }
                Err(CycleError::Cancelled) => break,
                Err(err) => {
                    tracing::warn!("update failed: {}", err);
                    self.sink.set_status(err.status());
                    self.sink.set_failure(&err.to_string());
                }
            }
        }

        // Clean shutdown: the observable state reflects that nothing is
        // known about the agent anymore.
        self.sink.set_status(UpdateStatus::Unknown);
        self.sink.set_update_mode(None);
        tracing::info!("orchestration loop stopped");
    }

    /// One pass of the state machine for a dequeued reference.
    fn run_cycle(&self, command: &UpdateCommand, cancel: &CancelToken) -> Result<(), CycleError> {
        let (artifact, downloaded) = match locator::local_path(&command.locator) {
            Some(path) => {
                tracing::info!(path = %path.display(), "local artifact reference, skipping download");
                if !path.exists() {
                    return Err(CycleError::MissingLocalFile(path));
                }
                (path, false)
            }
            None => {
                self.sink.set_status(UpdateStatus::DownloadingUpdates);
                let path = self
                    .engine
                    .fetch(&command.locator, cancel)
                    .map_err(|err| match err {
                        DownloadError::Cancelled => CycleError::Cancelled,
                        other => CycleError::Download(other),
                    })?;
                tracing::info!(path = %path.display(), "downloaded update");
                (path, true)
            }
        };

        match command.checksum.clone().or_else(|| self.source.checksum()) {
            Some(spec) => {
                tracing::info!(%spec, "verifying checksum");
                if let Err(err) = digest::verify(&artifact, &spec) {
                    self.discard(&artifact, downloaded);
                    return Err(CycleError::Verify(err));
                }
                tracing::info!("checksum verification successful");
            }
            None => tracing::info!("no checksum provided, skipping verification"),
        }

        self.sink.set_status(UpdateStatus::InstallingUpdates);
        tracing::info!("installing update");
        if let Err(err) = self.installer.install(&artifact) {
            self.discard(&artifact, downloaded);
            return Err(CycleError::Install(err));
        }
        tracing::info!("update installed successfully");
        self.discard(&artifact, downloaded);

        self.sink.set_status(self.mode.success_status());
        Ok(())
    }

    /// Deletes a downloaded artifact. Local-file references are never
    /// deleted; the engine does not own them.
    fn discard(&self, artifact: &Path, downloaded: bool) {
        if !downloaded {
            return;
        }
        if let Err(err) = fs::remove_file(artifact) {
            tracing::warn!(path = %artifact.display(), "could not remove artifact: {}", err);
        }
    }

    /// Startup pre-flight: commit an update left pending by a previous run
    /// before accepting new work. Failures are logged and do not block
    /// startup.
    fn commit_pending(&self) {
        match self.installer.needs_commit() {
            Ok(true) => {
                tracing::info!("pending update found, committing");
                match self.installer.commit() {
                    Ok(()) => tracing::info!("pending update committed"),
                    Err(err) => tracing::warn!("error committing pending update: {}", err),
                }
            }
            Ok(false) => tracing::info!("no pending update to commit"),
            Err(err) => tracing::warn!("error checking for pending update: {}", err),
        }
    }
}
