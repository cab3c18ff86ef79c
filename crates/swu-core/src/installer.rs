//! Installer capability consumed by the orchestration loop.
//!
//! The installer is an external black box invoked with a file path; its
//! update-engine semantics (A/B slots, rollback) are out of scope here and
//! assumed idempotent per its own documentation. An in-flight install runs
//! to completion even when shutdown has been requested.

use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InstallerError {
    #[error("failed to launch {tool}: {source}")]
    Launch {
        tool: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{tool} {operation} failed: {detail}")]
    Failed {
        tool: String,
        operation: &'static str,
        detail: String,
    },
}

pub trait Installer {
    /// Whether a previously installed update is awaiting commit.
    fn needs_commit(&self) -> Result<bool, InstallerError>;

    /// Commits a pending update.
    fn commit(&self) -> Result<(), InstallerError>;

    /// Installs the artifact at `path`.
    fn install(&self, path: &Path) -> Result<(), InstallerError>;
}

impl<T: Installer + ?Sized> Installer for &T {
    fn needs_commit(&self) -> Result<bool, InstallerError> {
        (**self).needs_commit()
    }

    fn commit(&self) -> Result<(), InstallerError> {
        (**self).commit()
    }

    fn install(&self, path: &Path) -> Result<(), InstallerError> {
        (**self).install(path)
    }
}
