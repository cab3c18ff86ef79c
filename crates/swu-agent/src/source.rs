//! Channel-backed command source bridging the async socket tasks to the
//! synchronous orchestration loop.
//!
//! Commands pile up while a cycle is running; when the loop dequeues again,
//! the backlog is drained and only the most recently published command is
//! processed. The side-channel checksum is a latched value, overwritten by
//! each `checksum` line and read at verification time.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use swu_core::cancel::CancelToken;
use swu_core::source::{CommandSource, SourceError, UpdateCommand};

/// Granularity of cancellation checks while waiting for a command.
const POLL_TICK: Duration = Duration::from_millis(100);

/// Write end, cloned into every socket connection task.
#[derive(Clone)]
pub struct CommandPublisher {
    commands: Sender<UpdateCommand>,
    checksum: Arc<Mutex<Option<String>>>,
}

impl CommandPublisher {
    pub fn publish_update(&self, command: UpdateCommand) {
        // A dropped receiver means the loop is gone and shutdown is underway.
        if self.commands.send(command).is_err() {
            tracing::debug!("update command dropped, orchestration loop stopped");
        }
    }

    pub fn publish_checksum(&self, spec: &str) {
        *self.checksum.lock().unwrap() = Some(spec.to_string());
    }
}

/// Read end, owned by the orchestration loop.
pub struct ChannelCommandSource {
    commands: Mutex<Receiver<UpdateCommand>>,
    checksum: Arc<Mutex<Option<String>>>,
}

/// Creates a connected publisher/source pair.
pub fn channel() -> (CommandPublisher, ChannelCommandSource) {
    let (tx, rx) = mpsc::channel();
    let checksum = Arc::new(Mutex::new(None));
    (
        CommandPublisher {
            commands: tx,
            checksum: Arc::clone(&checksum),
        },
        ChannelCommandSource {
            commands: Mutex::new(rx),
            checksum,
        },
    )
}

impl CommandSource for ChannelCommandSource {
    fn next(&self, cancel: &CancelToken) -> Result<UpdateCommand, SourceError> {
        let receiver = self.commands.lock().unwrap();
        loop {
            match receiver.recv_timeout(POLL_TICK) {
                Ok(first) => {
                    // Drain the backlog; only the latest command matters.
                    let mut command = first;
                    while let Ok(newer) = receiver.try_recv() {
                        tracing::info!(
                            locator = %command.locator,
                            "superseding queued update command"
                        );
                        command = newer;
                    }
                    return Ok(command);
                }
                Err(RecvTimeoutError::Timeout) => {
                    if cancel.is_cancelled() {
                        return Err(SourceError::Cancelled);
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(SourceError::Transport(
                        "command channel closed".to_string(),
                    ));
                }
            }
        }
    }

    fn checksum(&self) -> Option<String> {
        self.checksum.lock().unwrap().clone()
    }
}
