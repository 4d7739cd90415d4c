//! Session worker thread.
//!
//! Owns the engine and the mode controllers, and applies every command
//! strictly one at a time. Callers wait on each command's response channel
//! with a timeout; if they give up, the command still runs to completion
//! here and its state change sticks.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::RecvTimeoutError;

use super::SESSION_THREAD_NAME;
use crate::core::types::LocalizationInfo;
use crate::engine::SlamNavEngine;
use crate::error::{Error, Result};
use crate::io::MapRepository;
use crate::navigation::NavModeController;
use crate::slam::SlamModeController;
use crate::state::{
    CommandReceiver, CommandResponse, CommandResult, NavMode, SessionCommand, SharedStateHandle,
    SlamMode,
};
use crate::telemetry::TelemetryHub;

/// How often the loop wakes to check the running flag.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Handles the worker needs besides the engine.
pub struct SessionContext {
    pub shared: SharedStateHandle,
    pub repository: Arc<MapRepository>,
    pub telemetry: Arc<TelemetryHub>,
}

/// Session worker thread handle.
pub struct SessionThread {
    handle: JoinHandle<Box<dyn SlamNavEngine>>,
}

impl SessionThread {
    /// Spawn the session worker.
    ///
    /// # Arguments
    ///
    /// - `context`: shared state, map repository and telemetry hub.
    /// - `engine`: connected engine, handed back by [`join`](Self::join).
    /// - `command_rx`: receiver for session commands.
    /// - `running`: atomic flag for shutdown.
    pub fn spawn(
        context: SessionContext,
        engine: Box<dyn SlamNavEngine>,
        command_rx: CommandReceiver,
        running: Arc<AtomicBool>,
    ) -> Result<Self> {
        let handle = thread::Builder::new()
            .name(SESSION_THREAD_NAME.into())
            .spawn(move || {
                let mut worker = SessionWorker::new(context, engine);
                worker.run(&command_rx, &running);
                worker.engine
            })?;
        Ok(Self { handle })
    }

    /// Wait for the worker to finish and take back the engine.
    pub fn join(self) -> Option<Box<dyn SlamNavEngine>> {
        match self.handle.join() {
            Ok(engine) => Some(engine),
            Err(_) => {
                log::error!("Session worker panicked; engine lost");
                None
            }
        }
    }
}

struct SessionWorker {
    engine: Box<dyn SlamNavEngine>,
    shared: SharedStateHandle,
    telemetry: Arc<TelemetryHub>,
    slam: SlamModeController,
    nav: NavModeController,
    stopped: bool,
}

impl SessionWorker {
    fn new(context: SessionContext, engine: Box<dyn SlamNavEngine>) -> Self {
        let slam = SlamModeController::new(context.shared.clone(), context.repository.clone());
        let nav = NavModeController::new(context.shared.clone(), context.repository);
        Self {
            engine,
            shared: context.shared,
            telemetry: context.telemetry,
            slam,
            nav,
            stopped: false,
        }
    }

    fn run(&mut self, command_rx: &CommandReceiver, running: &AtomicBool) {
        log::info!("Session worker started");

        while running.load(Ordering::Relaxed) && !self.stopped {
            match command_rx.recv_timeout(POLL_INTERVAL) {
                Ok(cmd_with_response) => {
                    let operation = cmd_with_response.command.operation();
                    log::debug!("Handling {}", operation);
                    let result = self.handle_command(cmd_with_response.command);
                    if let Err(e) = &result {
                        log::debug!("{} failed: {}", operation, e);
                    }
                    // The caller may have timed out; the state change stands either way.
                    if cmd_with_response.response_tx.send(result).is_err() {
                        log::debug!("{} finished after its caller stopped waiting", operation);
                    }
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        if !self.stopped {
            self.teardown();
        }
        log::info!("Session worker stopped");
    }

    fn handle_command(&mut self, command: SessionCommand) -> CommandResult {
        let engine = self.engine.as_mut();
        match command {
            SessionCommand::ActivateSlamMode { mode, map_path } => {
                self.slam.activate(engine, &mut self.nav, mode, &map_path)?;
            }
            SessionCommand::StartMapping => self.slam.start_mapping(engine)?,
            SessionCommand::CancelMapping => self.slam.cancel_mapping(engine)?,
            SessionCommand::SaveMap { name } => self.slam.save_map(engine, &name)?,
            SessionCommand::LoadMap { name } => self.slam.load_map(&name)?,
            SessionCommand::DeleteMap { name } => self.slam.delete_map(&name)?,
            SessionCommand::InitPose { pose } => self.slam.init_pose(engine, &pose)?,
            SessionCommand::PointCloudMap => {
                return Ok(CommandResponse::PointCloud(self.slam.point_cloud_map(engine)?));
            }

            SessionCommand::ActivateNavMode { mode, map_path } => {
                self.nav.activate(engine, mode, &map_path)?;
            }
            SessionCommand::SetNavTarget { target } => {
                self.nav.tasks().set_target(engine, target)?;
            }
            SessionCommand::PauseNavTask => self.nav.tasks().pause(engine)?,
            SessionCommand::ResumeNavTask => self.nav.tasks().resume(engine)?,
            SessionCommand::CancelNavTask => self.nav.tasks().cancel(engine)?,

            SessionCommand::SetOdometryStream { open } => {
                if self.telemetry.odometry.is_open() != open {
                    engine.set_odometry_stream(open)?;
                    self.telemetry.odometry.set_open(open);
                }
            }
            SessionCommand::SetLocalizationStream { open } => {
                if self.telemetry.localization.is_open() != open {
                    engine.set_localization_stream(open)?;
                    self.telemetry.localization.set_open(open);
                }
            }
            SessionCommand::SetControllerLevel { level } => {
                let mut state = self.shared.write();
                if level != state.controller_level {
                    if state.nav_mode == NavMode::GridMap {
                        return Err(Error::InvalidState(
                            "cannot switch controller level while navigating".into(),
                        ));
                    }
                    state.controller_level = level;
                    log::info!("Controller level: {:?}", level);
                }
            }

            SessionCommand::Engine(event) => {
                return Ok(if self.nav.tasks().apply_event(&event) {
                    CommandResponse::Done
                } else {
                    CommandResponse::Ignored
                });
            }

            SessionCommand::Shutdown => self.teardown(),
        }
        Ok(CommandResponse::Done)
    }

    /// Return both modes to IDLE, close streams and release the engine.
    fn teardown(&mut self) {
        let engine = self.engine.as_mut();
        if self.nav.mode() != NavMode::Idle
            && let Err(e) = self.nav.deactivate(engine)
        {
            log::warn!("Navigation shutdown failed: {}", e);
        }
        if self.slam.mode() != SlamMode::Idle
            && let Err(e) = self.slam.activate(engine, &mut self.nav, SlamMode::Idle, "")
        {
            log::warn!("SLAM shutdown failed: {}", e);
        }
        if self.telemetry.odometry.is_open()
            && let Err(e) = engine.set_odometry_stream(false)
        {
            log::warn!("Closing odometry stream failed: {}", e);
        }
        if self.telemetry.localization.is_open()
            && let Err(e) = engine.set_localization_stream(false)
        {
            log::warn!("Closing localization stream failed: {}", e);
        }
        self.telemetry.shutdown();
        engine.shutdown();

        // Anything left is stale once the engine is gone.
        {
            let mut state = self.shared.write();
            state.nav_mode = NavMode::Idle;
            state.navigation_map = None;
            state.nav_status.reset();
            state.slam_mode = SlamMode::Idle;
            state.mapping_active = false;
            state.localization = LocalizationInfo::untrusted();
        }
        self.stopped = true;
        log::info!("Session torn down");
    }
}
