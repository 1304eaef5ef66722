//! Scan task lifecycle states.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Lifecycle state of a scan task as owned by the backend.
///
/// The `Requested*` states record that a transition has been asked for but
/// not yet observed from the scan worker.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "title_case", ascii_case_insensitive)]
pub enum TaskStatus {
    New,
    RequestedStart,
    Running,
    RequestedPause,
    Paused,
    RequestedStop,
    Stopped,
    Done,
    RequestedDelete,
    Deleted,
}

impl TaskStatus {
    /// Whether a scan worker currently owns this task.
    ///
    /// An active task cannot be started again or deleted immediately.
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(
            self,
            Self::RequestedStart
                | Self::Running
                | Self::RequestedPause
                | Self::Paused
                | Self::RequestedStop
        )
    }

    /// Whether a fresh run may be started from this state.
    #[must_use]
    pub fn may_start(self) -> bool {
        matches!(self, Self::New | Self::Stopped | Self::Done)
    }
}
