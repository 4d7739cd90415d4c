//! Command types for the session worker.
//!
//! Every mode, task and map mutation is sent to the session worker as a
//! command. Each command carries a one-shot channel for its result; the
//! caller waits on it with a timeout.

use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded, unbounded};

use crate::core::types::{PointCloud2, Pose3D};
use crate::engine::EngineEvent;
use crate::error::{Error, Result};
use crate::navigation::NavTarget;
use crate::state::{ControllerLevel, NavMode, SlamMode};

/// Commands handled by the session worker.
#[derive(Debug)]
pub enum SessionCommand {
    ActivateSlamMode { mode: SlamMode, map_path: String },
    StartMapping,
    CancelMapping,
    SaveMap { name: String },
    LoadMap { name: String },
    DeleteMap { name: String },
    InitPose { pose: Pose3D },
    PointCloudMap,

    ActivateNavMode { mode: NavMode, map_path: String },
    SetNavTarget { target: NavTarget },
    PauseNavTask,
    ResumeNavTask,
    CancelNavTask,

    SetOdometryStream { open: bool },
    SetLocalizationStream { open: bool },
    SetControllerLevel { level: ControllerLevel },

    /// Asynchronous outcome reported by the engine.
    Engine(EngineEvent),

    /// Return to IDLE, release the engine and stop the worker.
    Shutdown,
}

impl SessionCommand {
    /// Short operation name for logs and timeout errors.
    pub fn operation(&self) -> &'static str {
        match self {
            SessionCommand::ActivateSlamMode { .. } => "activate_slam_mode",
            SessionCommand::StartMapping => "start_mapping",
            SessionCommand::CancelMapping => "cancel_mapping",
            SessionCommand::SaveMap { .. } => "save_map",
            SessionCommand::LoadMap { .. } => "load_map",
            SessionCommand::DeleteMap { .. } => "delete_map",
            SessionCommand::InitPose { .. } => "init_pose",
            SessionCommand::PointCloudMap => "get_point_cloud_map",
            SessionCommand::ActivateNavMode { .. } => "activate_nav_mode",
            SessionCommand::SetNavTarget { .. } => "set_nav_target",
            SessionCommand::PauseNavTask => "pause_nav_task",
            SessionCommand::ResumeNavTask => "resume_nav_task",
            SessionCommand::CancelNavTask => "cancel_nav_task",
            SessionCommand::SetOdometryStream { .. } => "set_odometry_stream",
            SessionCommand::SetLocalizationStream { .. } => "set_localization_stream",
            SessionCommand::SetControllerLevel { .. } => "set_controller_level",
            SessionCommand::Engine(_) => "engine_event",
            SessionCommand::Shutdown => "shutdown",
        }
    }
}

/// Response data from command execution.
#[derive(Debug, Clone)]
pub enum CommandResponse {
    /// Command applied.
    Done,
    /// Engine event did not match the current task and was dropped.
    Ignored,
    PointCloud(PointCloud2),
}

/// Result of a command execution.
pub type CommandResult = Result<CommandResponse>;

/// Command with response channel for acknowledgment.
pub struct CommandWithResponse {
    pub command: SessionCommand,
    pub response_tx: Sender<CommandResult>,
}

impl std::fmt::Debug for CommandWithResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandWithResponse")
            .field("command", &self.command)
            .field("response_tx", &"...")
            .finish()
    }
}

/// Sender end of the command channel (held by the session and engine feedback).
pub type CommandSender = Sender<CommandWithResponse>;

/// Receiver end of the command channel (held by the session worker).
pub type CommandReceiver = Receiver<CommandWithResponse>;

/// Create a new command channel pair.
pub fn create_command_channel() -> (CommandSender, CommandReceiver) {
    unbounded()
}

/// Queue a command without waiting for its result.
pub fn send_command(sender: &CommandSender, command: SessionCommand) -> Result<Receiver<CommandResult>> {
    let (response_tx, response_rx) = bounded(1);
    sender
        .send(CommandWithResponse {
            command,
            response_tx,
        })
        .map_err(|_| Error::ServiceNotReady("session worker not running".into()))?;
    Ok(response_rx)
}

/// Send a command and wait up to `timeout` for its result.
///
/// On timeout the command stays queued and is still applied by the worker.
pub fn send_command_sync(
    sender: &CommandSender,
    command: SessionCommand,
    timeout: Duration,
) -> CommandResult {
    let operation = command.operation();
    let response_rx = send_command(sender, command)?;

    match response_rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => Err(Error::Timeout {
            operation,
            timeout_ms: timeout.as_millis() as u64,
        }),
        Err(RecvTimeoutError::Disconnected) => Err(Error::ServiceNotReady(format!(
            "session worker stopped before answering {}",
            operation
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use std::thread;

    #[test]
    fn test_command_channel() {
        let (tx, rx) = create_command_channel();

        let response_rx = send_command(&tx, SessionCommand::StartMapping).unwrap();

        let cmd = rx.recv().unwrap();
        assert!(matches!(cmd.command, SessionCommand::StartMapping));
        cmd.response_tx.send(Ok(CommandResponse::Done)).unwrap();

        let result = response_rx.recv().unwrap();
        assert!(matches!(result, Ok(CommandResponse::Done)));
    }

    #[test]
    fn test_send_command_sync() {
        let (tx, rx) = create_command_channel();

        let handle = thread::spawn(move || {
            let cmd = rx.recv().unwrap();
            assert!(matches!(cmd.command, SessionCommand::PauseNavTask));
            cmd.response_tx.send(Ok(CommandResponse::Done)).unwrap();
        });

        let result = send_command_sync(&tx, SessionCommand::PauseNavTask, Duration::from_secs(1));
        assert!(matches!(result, Ok(CommandResponse::Done)));
        handle.join().unwrap();
    }

    #[test]
    fn test_send_command_timeout() {
        let (tx, _rx) = create_command_channel();

        let err = send_command_sync(
            &tx,
            SessionCommand::SaveMap {
                name: "office".into(),
            },
            Duration::from_millis(10),
        )
        .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Timeout);
        assert!(err.to_string().contains("save_map"));
    }

    #[test]
    fn test_send_to_stopped_worker() {
        let (tx, rx) = create_command_channel();
        drop(rx);

        let err = send_command_sync(&tx, SessionCommand::StartMapping, Duration::from_millis(10))
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ServiceNotReady);
    }
}
