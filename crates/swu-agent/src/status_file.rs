//! Status sink publishing agent state to a JSON file.
//!
//! The whole document is rewritten on every change through a temp file and
//! rename, so readers never observe a torn write. Publishing is
//! best-effort: write failures are logged and the loop keeps running.

use serde::Serialize;
use std::ffi::OsString;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use swu_core::sink::StatusSink;
use swu_core::status::{UpdateMode, UpdateStatus};

#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
struct StatusDocument {
    status: UpdateStatus,
    #[serde(serialize_with = "mode_as_str")]
    update_mode: Option<UpdateMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_failure: Option<String>,
}

/// An absent mode is published as the literal string "none".
fn mode_as_str<S: serde::Serializer>(
    mode: &Option<UpdateMode>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match mode {
        Some(mode) => serializer.serialize_str(mode.as_str()),
        None => serializer.serialize_str("none"),
    }
}

pub struct FileStatusSink {
    path: PathBuf,
    state: Mutex<StatusDocument>,
}

impl FileStatusSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                tracing::warn!(dir = %parent.display(), "could not create status directory: {}", e);
            }
        }
        Self {
            path,
            state: Mutex::new(StatusDocument {
                status: UpdateStatus::Unknown,
                update_mode: None,
                last_failure: None,
            }),
        }
    }

    fn flush(&self, doc: &StatusDocument) {
        let bytes = match serde_json::to_vec_pretty(doc) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!("could not serialize status: {}", e);
                return;
            }
        };
        let mut tmp = OsString::from(self.path.as_os_str());
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        if let Err(e) = fs::write(&tmp, &bytes).and_then(|()| fs::rename(&tmp, &self.path)) {
            tracing::warn!(path = %self.path.display(), "could not publish status: {}", e);
        }
    }
}

impl StatusSink for FileStatusSink {
    fn set_status(&self, status: UpdateStatus) {
        let mut state = self.state.lock().unwrap();
        state.status = status;
        self.flush(&state);
    }

    fn set_update_mode(&self, mode: Option<UpdateMode>) {
        let mut state = self.state.lock().unwrap();
        state.update_mode = mode;
        self.flush(&state);
    }

    fn set_failure(&self, message: &str) {
        let mut state = self.state.lock().unwrap();
        state.last_failure = Some(message.to_string());
        self.flush(&state);
    }
}
