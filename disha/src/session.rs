//! Caller-facing session API.
//!
//! A [`SlamNavSession`] owns one engine, one map repository and the
//! telemetry streams. Mutating calls are forwarded to the session worker and
//! block until it answers or the timeout elapses; queries read a snapshot of
//! shared state and never wait on the worker.
//!
//! ```no_run
//! use disha::{DishaConfig, NavMode, NavTarget, Pose3D, SimulatedEngine, SlamMode, SlamNavSession};
//!
//! # fn main() -> disha::Result<()> {
//! let config = DishaConfig::default();
//! let session = SlamNavSession::new(&config, Box::new(SimulatedEngine::default()))?;
//! session.initialize()?;
//!
//! session.activate_slam_mode(SlamMode::Localization, "maps/office")?;
//! session.init_pose(Pose3D::identity())?;
//! session.activate_nav_mode(NavMode::GridMap, "maps/office")?;
//! session.set_nav_target(NavTarget::in_map(1, Pose3D::planar(2.0, 1.0, 0.0)))?;
//! println!("{:?}", session.get_nav_task_status()?);
//!
//! session.shutdown()?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use crate::config::DishaConfig;
use crate::core::types::{AllMapInfo, LocalizationInfo, Odometry, PointCloud2, Pose3D};
use crate::engine::{EngineFeedback, SlamNavEngine};
use crate::error::{Error, Result};
use crate::io::MapRepository;
use crate::navigation::{NavStatus, NavTarget};
use crate::state::{
    CommandResponse, CommandResult, CommandSender, ControllerLevel, NavMode, SessionCommand,
    SharedStateHandle, SlamMode, create_command_channel, create_shared_state, send_command_sync,
};
use crate::telemetry::{DeliveryThread, Subscription, TelemetryHub, TelemetryStats};
use crate::threads::{SessionContext, SessionThread};

/// Worker resources that exist between `initialize` and `shutdown`.
struct Runtime {
    command_tx: CommandSender,
    running: Arc<AtomicBool>,
    thread: SessionThread,
}

#[derive(Default)]
struct Deliveries {
    odometry: Option<DeliveryThread>,
    localization: Option<DeliveryThread>,
}

/// Navigation and SLAM orchestration session.
pub struct SlamNavSession {
    shared: SharedStateHandle,
    repository: Arc<MapRepository>,
    telemetry: Arc<TelemetryHub>,
    default_timeout_ms: AtomicU64,
    ready: AtomicBool,
    /// Engine while the worker is not running.
    engine: Mutex<Option<Box<dyn SlamNavEngine>>>,
    runtime: Mutex<Option<Runtime>>,
    deliveries: Mutex<Deliveries>,
}

impl SlamNavSession {
    /// Create a session over `engine`, opening the map repository.
    ///
    /// The session starts uninitialized; call [`initialize`](Self::initialize)
    /// before anything else.
    pub fn new(config: &DishaConfig, engine: Box<dyn SlamNavEngine>) -> Result<Self> {
        config.validate()?;
        let repository = Arc::new(MapRepository::open(&config.map_storage.path)?);
        Ok(Self {
            shared: create_shared_state(config.session.controller_level),
            repository,
            telemetry: Arc::new(TelemetryHub::new(
                config.telemetry.odometry_queue_capacity,
                config.telemetry.localization_queue_capacity,
            )),
            default_timeout_ms: AtomicU64::new(config.session.default_timeout_ms),
            ready: AtomicBool::new(false),
            engine: Mutex::new(Some(engine)),
            runtime: Mutex::new(None),
            deliveries: Mutex::new(Deliveries::default()),
        })
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Attach and connect the engine and start the session worker.
    ///
    /// Calling it again while initialized is a no-op.
    pub fn initialize(&self) -> Result<()> {
        let mut runtime = self.runtime.lock();
        if runtime.is_some() {
            return Ok(());
        }

        let mut engine = self
            .engine
            .lock()
            .take()
            .ok_or_else(|| Error::Internal("engine was lost by a previous session worker".into()))?;

        let (command_tx, command_rx) = create_command_channel();
        engine.attach(EngineFeedback::new(
            command_tx.clone(),
            self.shared.clone(),
            self.telemetry.clone(),
            self.default_timeout(),
        ));
        if let Err(e) = engine.connect() {
            *self.engine.lock() = Some(engine);
            log::error!("Engine connection failed: {}", e);
            return Err(e.into());
        }

        let running = Arc::new(AtomicBool::new(true));
        let context = SessionContext {
            shared: self.shared.clone(),
            repository: self.repository.clone(),
            telemetry: self.telemetry.clone(),
        };
        let thread = SessionThread::spawn(context, engine, command_rx, running.clone())?;

        *runtime = Some(Runtime {
            command_tx,
            running,
            thread,
        });
        self.ready.store(true, Ordering::Release);
        log::info!(
            "Session initialized ({} maps in {})",
            self.repository.len(),
            self.repository.base_path().display()
        );
        Ok(())
    }

    /// Return SLAM and navigation to IDLE, close telemetry and stop the worker.
    ///
    /// Calling it while not initialized is a no-op. Runs on drop.
    pub fn shutdown(&self) -> Result<()> {
        let Some(runtime) = self.runtime.lock().take() else {
            return Ok(());
        };
        self.ready.store(false, Ordering::Release);

        let result = send_command_sync(
            &runtime.command_tx,
            SessionCommand::Shutdown,
            self.default_timeout(),
        );
        if let Err(e) = &result {
            log::warn!("Shutdown did not complete in time ({}), stopping worker", e);
        }
        runtime.running.store(false, Ordering::Relaxed);
        if let Some(engine) = runtime.thread.join() {
            *self.engine.lock() = Some(engine);
        }

        let pending = {
            let mut deliveries = self.deliveries.lock();
            [deliveries.odometry.take(), deliveries.localization.take()]
        };
        for delivery in pending.into_iter().flatten() {
            delivery.join();
        }

        log::info!("Session shut down");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(Error::ServiceNotReady("session is not initialized".into()))
        }
    }

    /// Timeout used by calls that don't take one.
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms.load(Ordering::Relaxed))
    }

    pub fn set_default_timeout(&self, timeout: Duration) {
        self.default_timeout_ms
            .store(timeout.as_millis().max(1) as u64, Ordering::Relaxed);
    }

    fn command_with_timeout(&self, command: SessionCommand, timeout: Duration) -> CommandResult {
        let command_tx = self
            .runtime
            .lock()
            .as_ref()
            .map(|runtime| runtime.command_tx.clone())
            .ok_or_else(|| Error::ServiceNotReady("session is not initialized".into()))?;
        send_command_sync(&command_tx, command, timeout)
    }

    fn command(&self, command: SessionCommand) -> Result<()> {
        self.command_with_timeout(command, self.default_timeout())
            .map(|_| ())
    }

    // ========================================================================
    // SLAM mode and maps
    // ========================================================================

    /// Switch SLAM mode. `map_path` is required for LOCALIZATION and ignored
    /// otherwise.
    pub fn activate_slam_mode(&self, mode: SlamMode, map_path: &str) -> Result<()> {
        self.command(SessionCommand::ActivateSlamMode {
            mode,
            map_path: map_path.to_string(),
        })
    }

    pub fn start_mapping(&self) -> Result<()> {
        self.command(SessionCommand::StartMapping)
    }

    pub fn cancel_mapping(&self) -> Result<()> {
        self.command(SessionCommand::CancelMapping)
    }

    /// Persist the map being built under `name`.
    ///
    /// On TIMEOUT the save may still complete; re-query
    /// [`get_all_map_info`](Self::get_all_map_info).
    pub fn save_map(&self, name: &str, timeout: Duration) -> Result<()> {
        self.command_with_timeout(
            SessionCommand::SaveMap {
                name: name.to_string(),
            },
            timeout,
        )
        .map(|_| ())
    }

    /// Stage a persisted map for a later activation.
    pub fn load_map(&self, name: &str) -> Result<()> {
        self.command(SessionCommand::LoadMap {
            name: name.to_string(),
        })
    }

    pub fn delete_map(&self, name: &str) -> Result<()> {
        self.command(SessionCommand::DeleteMap {
            name: name.to_string(),
        })
    }

    /// `[yaml, pgm]` paths of a persisted map.
    pub fn get_map_path(&self, name: &str) -> Result<Vec<String>> {
        self.ensure_ready()?;
        self.repository
            .map_paths(name)
            .map(|paths| {
                paths
                    .into_iter()
                    .map(|p| p.to_string_lossy().into_owned())
                    .collect()
            })
            .ok_or_else(|| Error::NotFound(format!("map {}", name)))
    }

    pub fn get_all_map_info(&self) -> Result<AllMapInfo> {
        self.ensure_ready()?;
        Ok(AllMapInfo {
            current_map_name: self.shared.read().current_map_name(),
            map_infos: self.repository.snapshot(),
        })
    }

    /// Seed localization with an initial pose guess.
    pub fn init_pose(&self, pose: Pose3D) -> Result<()> {
        self.command(SessionCommand::InitPose { pose })
    }

    pub fn get_current_localization_info(&self) -> Result<LocalizationInfo> {
        self.ensure_ready()?;
        Ok(self.shared.read().localization)
    }

    pub fn get_point_cloud_map(&self, timeout: Duration) -> Result<PointCloud2> {
        match self.command_with_timeout(SessionCommand::PointCloudMap, timeout)? {
            CommandResponse::PointCloud(cloud) => Ok(cloud),
            other => Err(Error::Internal(format!(
                "unexpected response to get_point_cloud_map: {:?}",
                other
            ))),
        }
    }

    pub fn slam_mode(&self) -> Result<SlamMode> {
        self.ensure_ready()?;
        Ok(self.shared.read().slam_mode)
    }

    // ========================================================================
    // Navigation
    // ========================================================================

    /// Switch navigation mode. `map_path` is required for GRID_MAP and must
    /// name the map localization runs against.
    pub fn activate_nav_mode(&self, mode: NavMode, map_path: &str) -> Result<()> {
        self.command(SessionCommand::ActivateNavMode {
            mode,
            map_path: map_path.to_string(),
        })
    }

    pub fn set_nav_target(&self, target: NavTarget) -> Result<()> {
        self.command(SessionCommand::SetNavTarget { target })
    }

    pub fn pause_nav_task(&self) -> Result<()> {
        self.command(SessionCommand::PauseNavTask)
    }

    pub fn resume_nav_task(&self) -> Result<()> {
        self.command(SessionCommand::ResumeNavTask)
    }

    pub fn cancel_nav_task(&self) -> Result<()> {
        self.command(SessionCommand::CancelNavTask)
    }

    pub fn get_nav_task_status(&self) -> Result<NavStatus> {
        self.ensure_ready()?;
        Ok(self.shared.read().nav_status.clone())
    }

    pub fn nav_mode(&self) -> Result<NavMode> {
        self.ensure_ready()?;
        Ok(self.shared.read().nav_mode)
    }

    pub fn controller_level(&self) -> Result<ControllerLevel> {
        self.ensure_ready()?;
        Ok(self.shared.read().controller_level)
    }

    /// Rejected while navigation is GRID_MAP.
    pub fn set_controller_level(&self, level: ControllerLevel) -> Result<()> {
        self.command(SessionCommand::SetControllerLevel { level })
    }

    // ========================================================================
    // Telemetry
    // ========================================================================

    pub fn open_odometry_stream(&self) -> Result<()> {
        self.command(SessionCommand::SetOdometryStream { open: true })
    }

    pub fn close_odometry_stream(&self) -> Result<()> {
        self.command(SessionCommand::SetOdometryStream { open: false })
    }

    /// Queue handle for odometry samples. A second call returns a handle on
    /// the same queue.
    pub fn subscribe_odometry(&self) -> Result<Subscription<Odometry>> {
        self.ensure_ready()?;
        Ok(self.telemetry.odometry.subscribe())
    }

    /// Deliver odometry samples to `callback` on a dedicated thread.
    ///
    /// No-op if a callback is already attached.
    pub fn subscribe_odometry_with<F>(&self, callback: F) -> Result<()>
    where
        F: FnMut(Odometry) + Send + 'static,
    {
        self.ensure_ready()?;
        let mut deliveries = self.deliveries.lock();
        if deliveries.odometry.as_ref().is_some_and(|d| !d.is_finished()) {
            return Ok(());
        }
        let subscription = self.telemetry.odometry.subscribe();
        deliveries.odometry = Some(DeliveryThread::spawn("odometry", subscription, callback)?);
        Ok(())
    }

    pub fn unsubscribe_odometry(&self) -> Result<()> {
        self.ensure_ready()?;
        self.telemetry.odometry.unsubscribe();
        let delivery = self.deliveries.lock().odometry.take();
        if let Some(delivery) = delivery {
            delivery.join();
        }
        Ok(())
    }

    pub fn open_localization_stream(&self) -> Result<()> {
        self.command(SessionCommand::SetLocalizationStream { open: true })
    }

    pub fn close_localization_stream(&self) -> Result<()> {
        self.command(SessionCommand::SetLocalizationStream { open: false })
    }

    /// Queue handle for localization estimates.
    pub fn subscribe_localization(&self) -> Result<Subscription<LocalizationInfo>> {
        self.ensure_ready()?;
        Ok(self.telemetry.localization.subscribe())
    }

    /// Deliver localization estimates to `callback` on a dedicated thread.
    pub fn subscribe_localization_with<F>(&self, callback: F) -> Result<()>
    where
        F: FnMut(LocalizationInfo) + Send + 'static,
    {
        self.ensure_ready()?;
        let mut deliveries = self.deliveries.lock();
        if deliveries
            .localization
            .as_ref()
            .is_some_and(|d| !d.is_finished())
        {
            return Ok(());
        }
        let subscription = self.telemetry.localization.subscribe();
        deliveries.localization =
            Some(DeliveryThread::spawn("localization", subscription, callback)?);
        Ok(())
    }

    pub fn unsubscribe_localization(&self) -> Result<()> {
        self.ensure_ready()?;
        self.telemetry.localization.unsubscribe();
        let delivery = self.deliveries.lock().localization.take();
        if let Some(delivery) = delivery {
            delivery.join();
        }
        Ok(())
    }

    pub fn telemetry_stats(&self) -> TelemetryStats {
        self.telemetry.stats()
    }
}

impl Drop for SlamNavSession {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            log::warn!("Session shutdown on drop failed: {}", e);
        }
    }
}
