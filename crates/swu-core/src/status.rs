//! Externally observable agent status and update mode.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Most recently known activity or outcome of the agent.
///
/// Written to the status sink by the orchestration loop only; no other
/// component mutates it. Transitions are strictly sequential within one
/// orchestration cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpdateStatus {
    Initializing,
    CheckingUpdates,
    DownloadingUpdates,
    InstallingUpdates,
    InstallationCompleteWaitingReboot,
    InstallationCompleteWaitingDashboardReboot,
    CheckingUpdateError,
    DownloadingUpdateError,
    InstallingUpdateError,
    Unknown,
}

impl UpdateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateStatus::Initializing => "initializing",
            UpdateStatus::CheckingUpdates => "checking-updates",
            UpdateStatus::DownloadingUpdates => "downloading-updates",
            UpdateStatus::InstallingUpdates => "installing-updates",
            UpdateStatus::InstallationCompleteWaitingReboot => {
                "installation-complete-waiting-reboot"
            }
            UpdateStatus::InstallationCompleteWaitingDashboardReboot => {
                "installation-complete-waiting-dashboard-reboot"
            }
            UpdateStatus::CheckingUpdateError => "checking-update-error",
            UpdateStatus::DownloadingUpdateError => "downloading-update-error",
            UpdateStatus::InstallingUpdateError => "installing-update-error",
            UpdateStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for UpdateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Update policy, fixed at process start.
///
/// `Blocking` halts the loop after a successful install until an external
/// reboot; `NonBlocking` resumes polling. The two modes also select which
/// terminal success status is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpdateMode {
    Blocking,
    NonBlocking,
}

impl UpdateMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateMode::Blocking => "blocking",
            UpdateMode::NonBlocking => "non-blocking",
        }
    }

    /// Terminal status reported after a successful install in this mode.
    pub fn success_status(&self) -> UpdateStatus {
        match self {
            UpdateMode::Blocking => UpdateStatus::InstallationCompleteWaitingDashboardReboot,
            UpdateMode::NonBlocking => UpdateStatus::InstallationCompleteWaitingReboot,
        }
    }
}

impl fmt::Display for UpdateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UpdateMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "blocking" => Ok(UpdateMode::Blocking),
            "non-blocking" => Ok(UpdateMode::NonBlocking),
            other => Err(format!(
                "invalid update mode '{}', must be 'blocking' or 'non-blocking'",
                other
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_wire_strings() {
        assert_eq!(UpdateStatus::CheckingUpdates.as_str(), "checking-updates");
        assert_eq!(
            UpdateStatus::InstallationCompleteWaitingDashboardReboot.as_str(),
            "installation-complete-waiting-dashboard-reboot"
        );
        assert_eq!(UpdateStatus::Unknown.to_string(), "unknown");
    }

    #[test]
    fn serde_matches_as_str() {
        for status in [
            UpdateStatus::Initializing,
            UpdateStatus::DownloadingUpdateError,
            UpdateStatus::InstallationCompleteWaitingReboot,
        ] {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
        }
    }

    #[test]
    fn success_status_per_mode() {
        assert_eq!(
            UpdateMode::NonBlocking.success_status(),
            UpdateStatus::InstallationCompleteWaitingReboot
        );
        assert_eq!(
            UpdateMode::Blocking.success_status(),
            UpdateStatus::InstallationCompleteWaitingDashboardReboot
        );
    }

    #[test]
    fn mode_from_str() {
        assert_eq!("blocking".parse::<UpdateMode>(), Ok(UpdateMode::Blocking));
        assert_eq!(
            "non-blocking".parse::<UpdateMode>(),
            Ok(UpdateMode::NonBlocking)
        );
        assert!("sometimes".parse::<UpdateMode>().is_err());
    }
}
