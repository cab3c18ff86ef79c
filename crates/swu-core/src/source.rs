//! Command source capability: delivery of update references.

use crate::cancel::CancelToken;
use thiserror::Error;

/// One dequeued update reference. Immutable once dequeued; consumed exactly
/// once per orchestration cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateCommand {
    /// Network URL or `file://` reference to the artifact.
    pub locator: String,
    /// Digest spec delivered together with the locator, if any.
    pub checksum: Option<String>,
}

#[derive(Debug, Error)]
pub enum SourceError {
    /// Cancellation observed while waiting. A clean-shutdown signal, never
    /// reported as a failure.
    #[error("wait for update command cancelled")]
    Cancelled,
    #[error("command source failed: {0}")]
    Transport(String),
}

pub trait CommandSource {
    /// Blocks until the next update command is delivered or `cancel` fires.
    fn next(&self, cancel: &CancelToken) -> Result<UpdateCommand, SourceError>;

    /// Side-channel digest lookup, used when the checksum travels
    /// separately from the queued locator. `None` when nothing was
    /// published; that is not an error.
    fn checksum(&self) -> Option<String>;
}

impl<T: CommandSource + ?Sized> CommandSource for &T {
    fn next(&self, cancel: &CancelToken) -> Result<UpdateCommand, SourceError> {
        (**self).next(cancel)
    }

    fn checksum(&self) -> Option<String> {
        (**self).checksum()
    }
}
