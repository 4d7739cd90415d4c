//! Reporting channel from the engine back into the session.
//!
//! Task outcomes are queued on the worker's command channel so they are
//! serialized with caller mutations. Telemetry bypasses the worker and goes
//! straight to the stream hubs.

use std::sync::Arc;
use std::time::Duration;

use crate::core::types::{LocalizationInfo, Odometry};
use crate::error::Result;
use crate::state::{
    CommandResponse, CommandSender, SessionCommand, SharedStateHandle, SlamMode, send_command,
    send_command_sync,
};
use crate::telemetry::{PublishOutcome, TelemetryHub};
use crate::threads::is_session_thread;

/// Asynchronous task outcome reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Goal reached.
    TaskSucceeded { id: i32 },
    /// Task cannot complete.
    TaskFailed {
        id: i32,
        error_code: i32,
        error_desc: String,
    },
    /// Motion resumed after a resume request.
    TaskProgressResumed { id: i32 },
}

impl EngineEvent {
    pub fn task_id(&self) -> i32 {
        match self {
            EngineEvent::TaskSucceeded { id }
            | EngineEvent::TaskFailed { id, .. }
            | EngineEvent::TaskProgressResumed { id } => *id,
        }
    }
}

/// What the session did with a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportOutcome {
    /// Task status changed.
    Applied,
    /// Report named a stale task or an illegal transition.
    Ignored,
    /// Report was made from the worker thread and will be applied after the
    /// current command.
    Queued,
}

/// Handle given to the engine for reporting back into the session.
#[derive(Clone)]
pub struct EngineFeedback {
    commands: CommandSender,
    shared: SharedStateHandle,
    telemetry: Arc<TelemetryHub>,
    ack_timeout: Duration,
}

impl EngineFeedback {
    pub(crate) fn new(
        commands: CommandSender,
        shared: SharedStateHandle,
        telemetry: Arc<TelemetryHub>,
        ack_timeout: Duration,
    ) -> Self {
        Self {
            commands,
            shared,
            telemetry,
            ack_timeout,
        }
    }

    /// Report a task outcome and wait for the worker to apply it.
    pub fn report(&self, event: EngineEvent) -> Result<ReportOutcome> {
        if is_session_thread() {
            // Waiting here would wait on ourselves.
            send_command(&self.commands, SessionCommand::Engine(event))?;
            return Ok(ReportOutcome::Queued);
        }
        match send_command_sync(&self.commands, SessionCommand::Engine(event), self.ack_timeout)? {
            CommandResponse::Ignored => Ok(ReportOutcome::Ignored),
            CommandResponse::Done | CommandResponse::PointCloud(_) => Ok(ReportOutcome::Applied),
        }
    }

    pub fn task_succeeded(&self, id: i32) -> Result<ReportOutcome> {
        self.report(EngineEvent::TaskSucceeded { id })
    }

    pub fn task_failed(
        &self,
        id: i32,
        error_code: i32,
        error_desc: impl Into<String>,
    ) -> Result<ReportOutcome> {
        self.report(EngineEvent::TaskFailed {
            id,
            error_code,
            error_desc: error_desc.into(),
        })
    }

    pub fn task_progress_resumed(&self, id: i32) -> Result<ReportOutcome> {
        self.report(EngineEvent::TaskProgressResumed { id })
    }

    /// Push an odometry sample. Never blocks.
    pub fn publish_odometry(&self, sample: Odometry) -> PublishOutcome {
        self.telemetry.odometry.publish(sample)
    }

    /// Update the localization estimate and push it to subscribers.
    ///
    /// Ignored unless SLAM mode is LOCALIZATION.
    pub fn publish_localization(&self, info: LocalizationInfo) -> PublishOutcome {
        {
            let mut state = self.shared.write();
            if state.slam_mode != SlamMode::Localization {
                log::debug!("Localization estimate outside LOCALIZATION mode ignored");
                return PublishOutcome::Discarded;
            }
            state.localization = info;
        }
        self.telemetry.localization.publish(info)
    }
}

impl std::fmt::Debug for EngineFeedback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineFeedback")
            .field("ack_timeout", &self.ack_timeout)
            .finish_non_exhaustive()
    }
}
