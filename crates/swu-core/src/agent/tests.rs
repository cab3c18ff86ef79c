//! State-machine tests with deterministic in-memory fakes for the three
//! capabilities, plus a canned local HTTP fixture for cycles that exercise
//! the real download engine.

use super::*;
use crate::digest::sha256_file;
use std::collections::VecDeque;
use std::io::{Read as _, Write as _};
use std::net::TcpListener;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
enum SinkEvent {
    Status(UpdateStatus),
    Mode(Option<UpdateMode>),
    Failure(String),
}

/// Records every sink write in order.
#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<SinkEvent>>,
}

impl RecordingSink {
    fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().unwrap().clone()
    }

    fn statuses(&self) -> Vec<UpdateStatus> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SinkEvent::Status(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    fn failures(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SinkEvent::Failure(m) => Some(m),
                _ => None,
            })
            .collect()
    }
}

impl StatusSink for RecordingSink {
    fn set_status(&self, status: UpdateStatus) {
        self.events.lock().unwrap().push(SinkEvent::Status(status));
    }

    fn set_update_mode(&self, mode: Option<UpdateMode>) {
        self.events.lock().unwrap().push(SinkEvent::Mode(mode));
    }

    fn set_failure(&self, message: &str) {
        self.events
            .lock()
            .unwrap()
            .push(SinkEvent::Failure(message.to_string()));
    }
}

/// Replays a fixed script of commands, then cancels the token so the run
/// ends deterministically.
struct ScriptedSource {
    commands: Mutex<VecDeque<UpdateCommand>>,
    side_checksum: Option<String>,
}

impl ScriptedSource {
    fn new(commands: Vec<UpdateCommand>) -> Self {
        Self {
            commands: Mutex::new(commands.into()),
            side_checksum: None,
        }
    }

    fn empty() -> Self {
        Self::new(Vec::new())
    }

    fn with_side_checksum(mut self, spec: &str) -> Self {
        self.side_checksum = Some(spec.to_string());
        self
    }
}

impl CommandSource for ScriptedSource {
    fn next(&self, cancel: &CancelToken) -> Result<UpdateCommand, SourceError> {
        if cancel.is_cancelled() {
            return Err(SourceError::Cancelled);
        }
        match self.commands.lock().unwrap().pop_front() {
            Some(command) => Ok(command),
            None => {
                cancel.cancel();
                Err(SourceError::Cancelled)
            }
        }
    }

    fn checksum(&self) -> Option<String> {
        self.side_checksum.clone()
    }
}

#[derive(Default)]
struct FakeInstaller {
    needs_commit: bool,
    fail_install: bool,
    fail_commit: bool,
    /// Simulates a shutdown request arriving while an install is running.
    cancel_on_install: Option<CancelToken>,
    installs: Mutex<Vec<PathBuf>>,
    commits: Mutex<u32>,
}

impl Installer for FakeInstaller {
    fn needs_commit(&self) -> Result<bool, InstallerError> {
        Ok(self.needs_commit)
    }

    fn commit(&self) -> Result<(), InstallerError> {
        *self.commits.lock().unwrap() += 1;
        if self.fail_commit {
            return Err(InstallerError::Failed {
                tool: "fake".into(),
                operation: "commit",
                detail: "exit code 1".into(),
            });
        }
        Ok(())
    }

    fn install(&self, path: &Path) -> Result<(), InstallerError> {
        self.installs.lock().unwrap().push(path.to_path_buf());
        if let Some(token) = &self.cancel_on_install {
            token.cancel();
        }
        if self.fail_install {
            return Err(InstallerError::Failed {
                tool: "fake".into(),
                operation: "install",
                detail: "exit code 1".into(),
            });
        }
        Ok(())
    }
}

fn file_url(path: &Path) -> String {
    format!("file://{}", path.display())
}

fn command(locator: String, checksum: Option<String>) -> UpdateCommand {
    UpdateCommand { locator, checksum }
}

fn write_artifact(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

/// Serves exactly one connection with a canned HTTP response, then exits.
fn serve_once(status_line: &str, body: Vec<u8>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let status_line = status_line.to_string();
    std::thread::spawn(move || {
        if let Ok((mut stream, _)) = listener.accept() {
            let mut buf = [0u8; 4096];
            let _ = stream.read(&mut buf);
            let head = format!(
                "{}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                status_line,
                body.len()
            );
            let _ = stream.write_all(head.as_bytes());
            let _ = stream.write_all(&body);
        }
    });
    format!("http://{}", addr)
}

const ZERO_DIGEST: &str =
    "sha256:0000000000000000000000000000000000000000000000000000000000000000";

#[test]
fn local_file_success_reports_full_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let artifact = write_artifact(dir.path(), "u.bin", b"payload");
    let spec = format!("sha256:{}", sha256_file(&artifact).unwrap());

    let source = ScriptedSource::new(vec![command(file_url(&artifact), Some(spec))]);
    let sink = RecordingSink::default();
    let installer = FakeInstaller::default();
    let engine = DownloadEngine::new(dir.path().join("downloads"));

    Agent::new(&source, &sink, &installer, engine, UpdateMode::NonBlocking)
        .run(&CancelToken::new());

    assert_eq!(
        sink.events(),
        vec![
            SinkEvent::Status(UpdateStatus::Initializing),
            SinkEvent::Mode(Some(UpdateMode::NonBlocking)),
            SinkEvent::Status(UpdateStatus::CheckingUpdates),
            SinkEvent::Status(UpdateStatus::InstallingUpdates),
            SinkEvent::Status(UpdateStatus::InstallationCompleteWaitingReboot),
            SinkEvent::Mode(None),
            SinkEvent::Status(UpdateStatus::CheckingUpdates),
            SinkEvent::Status(UpdateStatus::Unknown),
            SinkEvent::Mode(None),
        ]
    );
    // A local-file reference bypasses the download and is never deleted.
    assert!(artifact.exists());
    assert_eq!(*installer.installs.lock().unwrap(), vec![artifact]);
}

#[test]
fn blocking_mode_reports_dashboard_variant_and_halts() {
    let dir = tempfile::tempdir().unwrap();
    let artifact = write_artifact(dir.path(), "u.bin", b"payload");
    let token = CancelToken::new();

    let source = ScriptedSource::new(vec![command(file_url(&artifact), None)]);
    let sink = RecordingSink::default();
    let installer = FakeInstaller {
        cancel_on_install: Some(token.clone()),
        ..FakeInstaller::default()
    };
    let engine = DownloadEngine::new(dir.path().join("downloads"));

    Agent::new(&source, &sink, &installer, engine, UpdateMode::Blocking).run(&token);

    // The install ran to completion despite the shutdown request, the
    // dashboard success variant was reported, and the loop never returned
    // to polling.
    let statuses = sink.statuses();
    assert_eq!(
        statuses,
        vec![
            UpdateStatus::Initializing,
            UpdateStatus::CheckingUpdates,
            UpdateStatus::InstallingUpdates,
            UpdateStatus::InstallationCompleteWaitingDashboardReboot,
            UpdateStatus::Unknown,
        ]
    );
    assert!(sink.failures().is_empty());
}

#[test]
fn checksum_mismatch_keeps_local_file() {
    let dir = tempfile::tempdir().unwrap();
    let artifact = write_artifact(dir.path(), "u.bin", b"payload");

    let source = ScriptedSource::new(vec![command(
        file_url(&artifact),
        Some(ZERO_DIGEST.to_string()),
    )]);
    let sink = RecordingSink::default();
    let installer = FakeInstaller::default();
    let engine = DownloadEngine::new(dir.path().join("downloads"));

    Agent::new(&source, &sink, &installer, engine, UpdateMode::NonBlocking)
        .run(&CancelToken::new());

    assert!(sink.statuses().contains(&UpdateStatus::DownloadingUpdateError));
    let failures = sink.failures();
    assert_eq!(failures.len(), 1);
    assert!(failures[0].contains("checksum verification failed"));
    assert!(artifact.exists());
    assert!(installer.installs.lock().unwrap().is_empty());
}

#[test]
fn side_channel_checksum_is_consulted() {
    let dir = tempfile::tempdir().unwrap();
    let artifact = write_artifact(dir.path(), "u.bin", b"payload");

    let source = ScriptedSource::new(vec![command(file_url(&artifact), None)])
        .with_side_checksum(ZERO_DIGEST);
    let sink = RecordingSink::default();
    let installer = FakeInstaller::default();
    let engine = DownloadEngine::new(dir.path().join("downloads"));

    Agent::new(&source, &sink, &installer, engine, UpdateMode::NonBlocking)
        .run(&CancelToken::new());

    assert!(sink.statuses().contains(&UpdateStatus::DownloadingUpdateError));
    assert!(installer.installs.lock().unwrap().is_empty());
}

#[test]
fn missing_checksum_skips_verification() {
    let dir = tempfile::tempdir().unwrap();
    let artifact = write_artifact(dir.path(), "u.bin", b"payload");

    let source = ScriptedSource::new(vec![command(file_url(&artifact), None)]);
    let sink = RecordingSink::default();
    let installer = FakeInstaller::default();
    let engine = DownloadEngine::new(dir.path().join("downloads"));

    Agent::new(&source, &sink, &installer, engine, UpdateMode::NonBlocking)
        .run(&CancelToken::new());

    assert_eq!(installer.installs.lock().unwrap().len(), 1);
    assert!(sink.failures().is_empty());
}

#[test]
fn install_failure_reports_error_and_keeps_local_file() {
    let dir = tempfile::tempdir().unwrap();
    let artifact = write_artifact(dir.path(), "u.bin", b"payload");

    let source = ScriptedSource::new(vec![command(file_url(&artifact), None)]);
    let sink = RecordingSink::default();
    let installer = FakeInstaller {
        fail_install: true,
        ..FakeInstaller::default()
    };
    let engine = DownloadEngine::new(dir.path().join("downloads"));

    Agent::new(&source, &sink, &installer, engine, UpdateMode::NonBlocking)
        .run(&CancelToken::new());

    assert!(sink.statuses().contains(&UpdateStatus::InstallingUpdateError));
    let failures = sink.failures();
    assert_eq!(failures.len(), 1);
    assert!(failures[0].contains("error installing update"));
    assert!(artifact.exists());
}

#[test]
fn missing_local_file_is_a_download_error() {
    let dir = tempfile::tempdir().unwrap();
    let source = ScriptedSource::new(vec![command(
        file_url(&dir.path().join("nonexistent.bin")),
        None,
    )]);
    let sink = RecordingSink::default();
    let installer = FakeInstaller::default();
    let engine = DownloadEngine::new(dir.path().join("downloads"));

    Agent::new(&source, &sink, &installer, engine, UpdateMode::NonBlocking)
        .run(&CancelToken::new());

    assert!(sink.statuses().contains(&UpdateStatus::DownloadingUpdateError));
    assert_eq!(sink.failures().len(), 1);
    assert!(installer.installs.lock().unwrap().is_empty());
}

#[test]
fn cancellation_during_wait_is_clean_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let source = ScriptedSource::empty();
    let sink = RecordingSink::default();
    let installer = FakeInstaller::default();
    let engine = DownloadEngine::new(dir.path().join("downloads"));

    Agent::new(&source, &sink, &installer, engine, UpdateMode::NonBlocking)
        .run(&CancelToken::new());

    assert_eq!(
        sink.events(),
        vec![
            SinkEvent::Status(UpdateStatus::Initializing),
            SinkEvent::Mode(Some(UpdateMode::NonBlocking)),
            SinkEvent::Status(UpdateStatus::CheckingUpdates),
            SinkEvent::Status(UpdateStatus::Unknown),
            SinkEvent::Mode(None),
        ]
    );
}

#[test]
fn preflight_commits_pending_update() {
    let dir = tempfile::tempdir().unwrap();
    let source = ScriptedSource::empty();
    let sink = RecordingSink::default();
    let installer = FakeInstaller {
        needs_commit: true,
        ..FakeInstaller::default()
    };
    let engine = DownloadEngine::new(dir.path().join("downloads"));

    Agent::new(&source, &sink, &installer, engine, UpdateMode::NonBlocking)
        .run(&CancelToken::new());

    assert_eq!(*installer.commits.lock().unwrap(), 1);
}

#[test]
fn preflight_commit_failure_does_not_block_startup() {
    let dir = tempfile::tempdir().unwrap();
    let source = ScriptedSource::empty();
    let sink = RecordingSink::default();
    let installer = FakeInstaller {
        needs_commit: true,
        fail_commit: true,
        ..FakeInstaller::default()
    };
    let engine = DownloadEngine::new(dir.path().join("downloads"));

    Agent::new(&source, &sink, &installer, engine, UpdateMode::NonBlocking)
        .run(&CancelToken::new());

    // The loop still reached polling, and no failure was reported.
    assert!(sink.statuses().contains(&UpdateStatus::CheckingUpdates));
    assert!(sink.failures().is_empty());
}

#[test]
fn downloaded_cycle_reports_statuses_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let body = b"artifact-bytes".to_vec();
    let url = format!("{}/u.bin", serve_once("HTTP/1.1 200 OK", body.clone()));

    let downloads = dir.path().join("downloads");
    let source = ScriptedSource::new(vec![command(url, None)]);
    let sink = RecordingSink::default();
    let installer = FakeInstaller::default();
    let engine = DownloadEngine::new(&downloads);

    Agent::new(&source, &sink, &installer, engine, UpdateMode::NonBlocking)
        .run(&CancelToken::new());

    assert_eq!(
        sink.statuses(),
        vec![
            UpdateStatus::Initializing,
            UpdateStatus::CheckingUpdates,
            UpdateStatus::DownloadingUpdates,
            UpdateStatus::InstallingUpdates,
            UpdateStatus::InstallationCompleteWaitingReboot,
            UpdateStatus::CheckingUpdates,
            UpdateStatus::Unknown,
        ]
    );
    // Downloaded artifacts are deleted after a successful install.
    assert!(!downloads.join("u.bin").exists());
    assert_eq!(installer.installs.lock().unwrap().len(), 1);
}

#[test]
fn downloaded_artifact_deleted_on_checksum_mismatch() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!(
        "{}/u.bin",
        serve_once("HTTP/1.1 200 OK", b"artifact-bytes".to_vec())
    );

    let downloads = dir.path().join("downloads");
    let source = ScriptedSource::new(vec![command(url, Some(ZERO_DIGEST.to_string()))]);
    let sink = RecordingSink::default();
    let installer = FakeInstaller::default();
    let engine = DownloadEngine::new(&downloads);

    Agent::new(&source, &sink, &installer, engine, UpdateMode::NonBlocking)
        .run(&CancelToken::new());

    assert!(sink.statuses().contains(&UpdateStatus::DownloadingUpdateError));
    assert!(!downloads.join("u.bin").exists());
    assert!(installer.installs.lock().unwrap().is_empty());
}
