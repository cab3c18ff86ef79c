//! Core engine for the SWU unattended update agent.
//!
//! The agent blocks on a command source for an artifact locator, downloads
//! it with resume and bounded connection retries, verifies an optional
//! `algorithm:hex` digest, hands the file to an external installer, and
//! mirrors every step into a status sink. The command transport, the status
//! sink, and the installer tool are capabilities consumed through traits;
//! production adapters live in the `swu-agent` binary crate.

pub mod agent;
pub mod cancel;
pub mod digest;
pub mod download;
pub mod installer;
pub mod locator;
pub mod logging;
pub mod retry;
pub mod sink;
pub mod source;
pub mod status;
