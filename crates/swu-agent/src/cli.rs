use clap::Parser;
use std::path::PathBuf;
use swu_core::status::UpdateMode;

/// Unattended update agent.
#[derive(Debug, Parser)]
#[command(name = "swu-agent")]
#[command(about = "SWU: download, verify and install published updates", long_about = None)]
pub struct Cli {
    /// Directory downloads are written to (and resumed from).
    #[arg(long, default_value = "/tmp")]
    pub download_dir: PathBuf,

    /// Whether a successful install halts the agent until reboot.
    #[arg(long, default_value = "non-blocking")]
    pub update_mode: UpdateMode,

    /// Unix socket update commands are delivered on.
    #[arg(long, default_value = "/run/swu/command.sock")]
    pub command_socket: PathBuf,

    /// JSON file the agent state is published to.
    #[arg(long, default_value = "/run/swu/status.json")]
    pub status_file: PathBuf,

    /// External installer tool handed the verified artifact.
    #[arg(long, default_value = "mender-update")]
    pub installer: String,
}
