//! Installer adapter shelling out to an external update tool.
//!
//! The tool is expected to expose three subcommands: `install <path>`,
//! `commit`, and `needs-commit` (exit 0 when a commit is pending, exit 2
//! when not). Anything else on its update-engine side, slot bookkeeping
//! included, stays the tool's business.

use anyhow::{bail, Result};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use swu_core::installer::{Installer, InstallerError};

pub struct CommandInstaller {
    tool: String,
}

impl CommandInstaller {
    pub fn new(tool: impl Into<String>) -> Self {
        Self { tool: tool.into() }
    }

    /// Fails fast at startup when the tool is missing or not executable.
    pub fn ensure_available(&self) -> Result<()> {
        match lookup_tool(&self.tool) {
            Some(path) => {
                tracing::info!(tool = %path.display(), "using installer");
                Ok(())
            }
            None => bail!("installer '{}' not found or not executable", self.tool),
        }
    }

    fn run(&self, args: &[&std::ffi::OsStr]) -> Result<Output, InstallerError> {
        Command::new(&self.tool)
            .args(args)
            .output()
            .map_err(|source| InstallerError::Launch {
                tool: self.tool.clone(),
                source,
            })
    }

    fn failed(&self, operation: &'static str, output: &Output) -> InstallerError {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let detail = match output.status.code() {
            Some(code) if !stderr.trim().is_empty() => {
                format!("exit code {}: {}", code, stderr.trim())
            }
            Some(code) => format!("exit code {}", code),
            None => "terminated by signal".to_string(),
        };
        InstallerError::Failed {
            tool: self.tool.clone(),
            operation,
            detail,
        }
    }
}

impl Installer for CommandInstaller {
    fn needs_commit(&self) -> Result<bool, InstallerError> {
        let output = self.run(&["needs-commit".as_ref()])?;
        match output.status.code() {
            Some(0) => Ok(true),
            Some(2) => Ok(false),
            _ => Err(self.failed("needs-commit", &output)),
        }
    }

    fn commit(&self) -> Result<(), InstallerError> {
        let output = self.run(&["commit".as_ref()])?;
        if !output.status.success() {
            return Err(self.failed("commit", &output));
        }
        Ok(())
    }

    fn install(&self, path: &Path) -> Result<(), InstallerError> {
        let output = self.run(&["install".as_ref(), path.as_os_str()])?;
        if !output.status.success() {
            return Err(self.failed("install", &output));
        }
        Ok(())
    }
}

/// Resolves `tool` to an executable path: taken literally when it contains a
/// separator, otherwise looked up on PATH.
fn lookup_tool(tool: &str) -> Option<PathBuf> {
    if tool.contains('/') {
        let path = PathBuf::from(tool);
        return is_executable(&path).then_some(path);
    }
    std::env::var_os("PATH").and_then(|paths| {
        std::env::split_paths(&paths)
            .map(|dir| dir.join(tool))
            .find(|candidate| is_executable(candidate))
    })
}

fn is_executable(path: &Path) -> bool {
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}
