//! Status sink capability: best-effort externally observable state.

use crate::status::{UpdateMode, UpdateStatus};

/// Fire-and-forget status reporting, layered over the authoritative
/// in-process state. Implementations log their own write failures; nothing
/// here may abort the orchestration loop.
pub trait StatusSink {
    fn set_status(&self, status: UpdateStatus);

    /// `None` is reported as `none` (no update in progress).
    fn set_update_mode(&self, mode: Option<UpdateMode>);

    fn set_failure(&self, message: &str);
}

impl<T: StatusSink + ?Sized> StatusSink for &T {
    fn set_status(&self, status: UpdateStatus) {
        (**self).set_status(status)
    }

    fn set_update_mode(&self, mode: Option<UpdateMode>) {
        (**self).set_update_mode(mode)
    }

    fn set_failure(&self, message: &str) {
        (**self).set_failure(message)
    }
}
