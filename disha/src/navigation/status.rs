//! Navigation task status machine.
//!
//! ```text
//! NONE --dispatch--> RUNNING
//! RUNNING --succeeded--> END_SUCCESS        (terminal)
//! RUNNING --failed--> END_FAILED            (terminal)
//! RUNNING --pause--> PAUSE --resume--> CONTINUE --progress--> RUNNING
//! RUNNING | PAUSE | CONTINUE --cancel--> CANCEL (terminal)
//! terminal --dispatch--> RUNNING (new id)
//! ```

use serde::{Deserialize, Serialize};

/// Status of a navigation task. Numeric values match the robot SDK.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(i32)]
pub enum NavStatusType {
    /// No task has been issued since the last reset.
    #[default]
    None = 0,
    Running = 1,
    EndSuccess = 2,
    EndFailed = 3,
    Pause = 4,
    /// Resume acknowledged, waiting for the engine to report progress.
    Continue = 5,
    Cancel = 6,
}

/// Events that move a task between statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavEvent {
    /// New goal accepted by the engine.
    Dispatch,
    Pause,
    Resume,
    Cancel,
    /// Engine reports the goal was reached.
    Succeeded,
    /// Engine reports the task cannot complete.
    Failed,
    /// Engine reports motion resumed after a resume request.
    ProgressResumed,
}

impl NavStatusType {
    /// Task is in flight and may still change on its own.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            NavStatusType::Running | NavStatusType::Pause | NavStatusType::Continue
        )
    }

    /// Task ended; only a new dispatch leaves this status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            NavStatusType::EndSuccess | NavStatusType::EndFailed | NavStatusType::Cancel
        )
    }

    /// Status after `event`, or `None` if the transition is illegal.
    pub fn next(self, event: NavEvent) -> Option<NavStatusType> {
        use NavStatusType::*;
        match (self, event) {
            (None | EndSuccess | EndFailed | Cancel, NavEvent::Dispatch) => Some(Running),
            (Running, NavEvent::Pause) => Some(Pause),
            (Pause, NavEvent::Resume) => Some(Continue),
            (Continue, NavEvent::ProgressResumed) => Some(Running),
            (Running | Pause | Continue, NavEvent::Cancel) => Some(Cancel),
            // The engine may finish the leg before reporting progress after resume.
            (Running | Continue, NavEvent::Succeeded) => Some(EndSuccess),
            (Running | Continue, NavEvent::Failed) => Some(EndFailed),
            _ => Option::None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NavStatusType::None => "NONE",
            NavStatusType::Running => "RUNNING",
            NavStatusType::EndSuccess => "END_SUCCESS",
            NavStatusType::EndFailed => "END_FAILED",
            NavStatusType::Pause => "PAUSE",
            NavStatusType::Continue => "CONTINUE",
            NavStatusType::Cancel => "CANCEL",
        }
    }
}

impl std::fmt::Display for NavStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pollable snapshot of the current (or last) navigation task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavStatus {
    /// Task id, -1 when no task exists.
    pub id: i32,
    pub status: NavStatusType,
    /// Domain error code, 0 when none.
    pub error_code: i32,
    pub error_desc: String,
}

impl Default for NavStatus {
    fn default() -> Self {
        Self {
            id: -1,
            status: NavStatusType::None,
            error_code: 0,
            error_desc: String::new(),
        }
    }
}

impl NavStatus {
    /// Fresh RUNNING status for a newly dispatched task.
    pub fn running(id: i32) -> Self {
        Self {
            id,
            status: NavStatusType::Running,
            ..Default::default()
        }
    }

    /// Back to `{-1, NONE, 0, ""}`.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}
