//! In-process simulated engine.
//!
//! Drives a point robot straight toward its goal at a fixed speed, reveals a
//! rectangular room while mapping, and reports outcomes through
//! [`EngineFeedback`] from whichever thread calls [`SimulatedEngineHandle::step`].
//!
//! The [`SimulatedEngineHandle`] stays with the test (or demo driver) after
//! the engine itself is moved into the session, and exposes controls for
//! latency injection, unreachability and manual outcome reports.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::{EngineError, EngineEvent, EngineFeedback, EngineResult, ReportOutcome, SlamNavEngine};
use crate::core::math::normalize_angle;
use crate::core::types::{
    FREE_GRAY, Header, LocalizationInfo, MapImageData, MapInfo, MapMetaData, OCCUPIED_GRAY,
    Odometry, PointCloud2, Pose3D,
};
use crate::error::{Error, Result};
use crate::navigation::NavTarget;
use crate::state::{NavMode, SlamMode};

/// Simulation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Driver step rate (Hz).
    pub update_rate_hz: f32,
    /// Robot speed toward the goal (m/s).
    pub linear_speed: f64,
    /// Distance at which a goal counts as reached (m).
    pub goal_tolerance: f64,
    /// Simulated room raster width (pixels).
    pub map_width: u32,
    /// Simulated room raster height (pixels).
    pub map_height: u32,
    /// Raster resolution (m/pixel).
    pub map_resolution: f64,
    /// Radius revealed around the robot while mapping (m).
    pub sensor_range: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            update_rate_hz: 20.0,
            linear_speed: 0.5,
            goal_tolerance: 0.05,
            map_width: 120,
            map_height: 80,
            map_resolution: 0.05,
            sensor_range: 1.5,
        }
    }
}

/// Result of one simulation step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    pub pose: Pose3D,
    /// Robot moved during this step.
    pub moving: bool,
    /// Task id whose goal was reached during this step.
    pub reached: Option<i32>,
}

#[derive(Debug)]
struct SimState {
    config: SimulationConfig,
    feedback: Option<EngineFeedback>,
    connected: bool,
    unreachable: bool,
    latency: HashMap<&'static str, Duration>,
    calls: Vec<String>,

    slam_mode: SlamMode,
    nav_mode: NavMode,
    mapping: bool,
    raster: Option<MapImageData>,
    localization_map: Option<MapInfo>,
    localized: bool,

    pose: Pose3D,
    goal: Option<NavTarget>,
    paused: bool,
    awaiting_progress: bool,

    odometry_open: bool,
    localization_open: bool,
    stamp_ns: i64,
}

impl SimState {
    fn new(config: SimulationConfig) -> Self {
        Self {
            config,
            feedback: None,
            connected: false,
            unreachable: false,
            latency: HashMap::new(),
            calls: Vec::new(),
            slam_mode: SlamMode::Idle,
            nav_mode: NavMode::Idle,
            mapping: false,
            raster: None,
            localization_map: None,
            localized: false,
            pose: Pose3D::identity(),
            goal: None,
            paused: false,
            awaiting_progress: false,
            odometry_open: false,
            localization_open: false,
            stamp_ns: 0,
        }
    }

    /// World origin of the simulated room raster (room centered on 0,0).
    fn map_origin(&self) -> Pose3D {
        let c = &self.config;
        Pose3D::planar(
            -(c.map_width as f64) * c.map_resolution / 2.0,
            -(c.map_height as f64) * c.map_resolution / 2.0,
            0.0,
        )
    }

    fn blank_room(&self) -> EngineResult<MapImageData> {
        let c = &self.config;
        let mut raster = MapImageData::unknown(c.map_width, c.map_height)
            .map_err(|e| EngineError::Internal(e.to_string()))?;
        for col in 0..c.map_width {
            raster.set_pixel(col, 0, OCCUPIED_GRAY);
            raster.set_pixel(col, c.map_height - 1, OCCUPIED_GRAY);
        }
        for row in 0..c.map_height {
            raster.set_pixel(0, row, OCCUPIED_GRAY);
            raster.set_pixel(c.map_width - 1, row, OCCUPIED_GRAY);
        }
        Ok(raster)
    }

    /// Mark interior cells within sensor range of the robot as free.
    fn reveal(&mut self) {
        let origin = self.map_origin();
        let pose = self.pose;
        let res = self.config.map_resolution;
        let range = self.config.sensor_range;
        let Some(raster) = self.raster.as_mut() else {
            return;
        };
        let (w, h) = (raster.width(), raster.height());
        for row in 1..h.saturating_sub(1) {
            for col in 1..w.saturating_sub(1) {
                let x = origin.x() + (col as f64 + 0.5) * res;
                let y = origin.y() + ((h - 1 - row) as f64 + 0.5) * res;
                if (x - pose.x()).hypot(y - pose.y()) <= range {
                    raster.set_pixel(col, row, FREE_GRAY);
                }
            }
        }
    }

    /// Advance the robot by `dt` seconds.
    fn advance(&mut self, dt: f64) -> (Vec<EngineEvent>, StepOutcome, f64) {
        let mut events = Vec::new();
        let mut reached = None;
        let mut speed = 0.0;
        self.stamp_ns += (dt * 1e9) as i64;

        if let Some(goal) = self.goal.clone()
            && !self.paused
        {
            if self.awaiting_progress {
                self.awaiting_progress = false;
                events.push(EngineEvent::TaskProgressResumed { id: goal.id });
            }
            let dist = self.pose.planar_distance(&goal.goal);
            let step = self.config.linear_speed * dt;
            if dist <= self.config.goal_tolerance + step {
                self.pose = Pose3D::planar(goal.goal.x(), goal.goal.y(), goal.goal.yaw());
                self.goal = None;
                reached = Some(goal.id);
                events.push(EngineEvent::TaskSucceeded { id: goal.id });
            } else {
                let heading = (goal.goal.y() - self.pose.y()).atan2(goal.goal.x() - self.pose.x());
                self.pose = Pose3D::planar(
                    self.pose.x() + step * heading.cos(),
                    self.pose.y() + step * heading.sin(),
                    normalize_angle(heading),
                );
                speed = self.config.linear_speed;
            }
        }

        if self.mapping {
            self.reveal();
        }

        let outcome = StepOutcome {
            pose: self.pose,
            moving: speed > 0.0,
            reached,
        };
        (events, outcome, speed)
    }
}

/// Simulated engine backend.
pub struct SimulatedEngine {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedEngine {
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState::new(config))),
        }
    }

    /// Control handle that outlives the move into the session.
    pub fn handle(&self) -> SimulatedEngineHandle {
        SimulatedEngineHandle {
            state: Arc::clone(&self.state),
        }
    }

    /// Record the call, fail if unreachable, then apply injected latency.
    fn begin(&self, operation: &'static str) -> EngineResult<()> {
        let latency = {
            let mut s = self.state.lock();
            s.calls.push(operation.to_string());
            if s.unreachable {
                return Err(EngineError::Unreachable(format!(
                    "simulated link down during {}",
                    operation
                )));
            }
            s.latency.get(operation).copied()
        };
        if let Some(latency) = latency {
            thread::sleep(latency);
        }
        Ok(())
    }
}

impl Default for SimulatedEngine {
    fn default() -> Self {
        Self::new(SimulationConfig::default())
    }
}

impl SlamNavEngine for SimulatedEngine {
    fn attach(&mut self, feedback: EngineFeedback) {
        self.state.lock().feedback = Some(feedback);
    }

    fn connect(&mut self) -> EngineResult<()> {
        self.begin("connect")?;
        self.state.lock().connected = true;
        log::info!("Simulated engine connected");
        Ok(())
    }

    fn shutdown(&mut self) {
        let mut s = self.state.lock();
        s.calls.push("shutdown".to_string());
        s.connected = false;
        s.goal = None;
        s.mapping = false;
        s.slam_mode = SlamMode::Idle;
        s.nav_mode = NavMode::Idle;
        s.odometry_open = false;
        s.localization_open = false;
        s.feedback = None;
    }

    fn set_slam_mode(&mut self, mode: SlamMode, map: Option<&MapInfo>) -> EngineResult<()> {
        self.begin("set_slam_mode")?;
        let mut s = self.state.lock();
        s.calls.push(format!("slam_mode:{}", mode));
        s.mapping = false;
        s.localized = false;
        match mode {
            SlamMode::Idle => {
                s.raster = None;
                s.localization_map = None;
            }
            SlamMode::Mapping => {
                s.raster = Some(s.blank_room()?);
                s.localization_map = None;
            }
            SlamMode::Localization => {
                let map = map.ok_or_else(|| {
                    EngineError::Rejected("localization needs a map".to_string())
                })?;
                s.raster = None;
                s.localization_map = Some(map.clone());
            }
        }
        s.slam_mode = mode;
        Ok(())
    }

    fn start_mapping(&mut self) -> EngineResult<()> {
        self.begin("start_mapping")?;
        let mut s = self.state.lock();
        if s.slam_mode != SlamMode::Mapping {
            return Err(EngineError::Rejected("not in mapping mode".into()));
        }
        if s.raster.is_none() {
            s.raster = Some(s.blank_room()?);
        }
        s.mapping = true;
        s.reveal();
        Ok(())
    }

    fn cancel_mapping(&mut self) -> EngineResult<()> {
        self.begin("cancel_mapping")?;
        let mut s = self.state.lock();
        s.mapping = false;
        if s.slam_mode == SlamMode::Mapping {
            s.raster = Some(s.blank_room()?);
        }
        Ok(())
    }

    fn capture_map(&mut self) -> EngineResult<MapMetaData> {
        self.begin("capture_map")?;
        let mut s = self.state.lock();
        if s.slam_mode != SlamMode::Mapping {
            return Err(EngineError::Rejected("not in mapping mode".into()));
        }
        let raster = match s.raster.clone() {
            Some(raster) => raster,
            None => s.blank_room()?,
        };
        s.mapping = false;
        MapMetaData::new(s.config.map_resolution, s.map_origin(), raster)
            .map_err(|e| EngineError::Internal(e.to_string()))
    }

    fn init_pose(&mut self, pose: &Pose3D) -> EngineResult<()> {
        self.begin("init_pose")?;
        let feedback = {
            let mut s = self.state.lock();
            if s.slam_mode != SlamMode::Localization {
                return Err(EngineError::Rejected("not in localization mode".into()));
            }
            s.pose = *pose;
            s.localized = true;
            s.feedback.clone()
        };
        if let Some(feedback) = feedback {
            feedback.publish_localization(LocalizationInfo::localized(*pose));
        }
        Ok(())
    }

    fn set_nav_mode(&mut self, mode: NavMode, map: Option<&MapInfo>) -> EngineResult<()> {
        self.begin("set_nav_mode")?;
        let mut s = self.state.lock();
        s.calls.push(format!("nav_mode:{}", mode));
        if mode == NavMode::GridMap && map.is_none() {
            return Err(EngineError::Rejected("grid map navigation needs a map".into()));
        }
        if mode == NavMode::Idle {
            s.goal = None;
            s.paused = false;
            s.awaiting_progress = false;
        }
        s.nav_mode = mode;
        Ok(())
    }

    fn dispatch_goal(&mut self, target: &NavTarget) -> EngineResult<()> {
        self.begin("dispatch_goal")?;
        let mut s = self.state.lock();
        if s.nav_mode != NavMode::GridMap {
            return Err(EngineError::Rejected("navigation mode is idle".into()));
        }
        s.goal = Some(target.clone());
        s.paused = false;
        s.awaiting_progress = false;
        Ok(())
    }

    fn pause_task(&mut self, id: i32) -> EngineResult<()> {
        self.begin("pause_task")?;
        let mut s = self.state.lock();
        match &s.goal {
            Some(goal) if goal.id == id => {
                s.paused = true;
                Ok(())
            }
            _ => Err(EngineError::Rejected(format!("no task {} to pause", id))),
        }
    }

    fn resume_task(&mut self, id: i32) -> EngineResult<()> {
        self.begin("resume_task")?;
        let mut s = self.state.lock();
        match &s.goal {
            Some(goal) if goal.id == id => {
                s.paused = false;
                s.awaiting_progress = true;
                Ok(())
            }
            _ => Err(EngineError::Rejected(format!("no task {} to resume", id))),
        }
    }

    fn cancel_task(&mut self, id: i32) -> EngineResult<()> {
        self.begin("cancel_task")?;
        let mut s = self.state.lock();
        if s.goal.as_ref().is_some_and(|g| g.id == id) {
            s.goal = None;
            s.paused = false;
            s.awaiting_progress = false;
        }
        Ok(())
    }

    fn set_odometry_stream(&mut self, open: bool) -> EngineResult<()> {
        self.begin("set_odometry_stream")?;
        self.state.lock().odometry_open = open;
        Ok(())
    }

    fn set_localization_stream(&mut self, open: bool) -> EngineResult<()> {
        self.begin("set_localization_stream")?;
        self.state.lock().localization_open = open;
        Ok(())
    }

    fn point_cloud_map(&mut self) -> EngineResult<PointCloud2> {
        self.begin("point_cloud_map")?;
        let s = self.state.lock();
        let (raster, resolution, origin) = match s.slam_mode {
            SlamMode::Mapping => (s.raster.clone(), s.config.map_resolution, s.map_origin()),
            SlamMode::Localization => match &s.localization_map {
                Some(map) => (
                    Some(map.map_meta_data.map_image_data.clone()),
                    map.map_meta_data.resolution,
                    map.map_meta_data.origin,
                ),
                None => (None, s.config.map_resolution, s.map_origin()),
            },
            SlamMode::Idle => {
                return Err(EngineError::Rejected("no active map".into()));
            }
        };

        let mut points = Vec::new();
        if let Some(raster) = raster {
            let h = raster.height();
            for row in 0..h {
                for col in 0..raster.width() {
                    if raster.pixel(col, row) == Some(OCCUPIED_GRAY) {
                        let x = origin.x() + (col as f64 + 0.5) * resolution;
                        let y = origin.y() + ((h - 1 - row) as f64 + 0.5) * resolution;
                        points.push([x as f32, y as f32, 0.0]);
                    }
                }
            }
        }
        Ok(PointCloud2::from_xyz(Header::new(s.stamp_ns, "map"), &points))
    }
}

/// Test and driver controls for a [`SimulatedEngine`].
#[derive(Clone)]
pub struct SimulatedEngineHandle {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedEngineHandle {
    /// Make every subsequent engine call fail as unreachable.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().unreachable = unreachable;
    }

    /// Delay every call to `operation` (e.g. `"capture_map"`) by `latency`.
    pub fn set_latency(&self, operation: &'static str, latency: Duration) {
        self.state.lock().latency.insert(operation, latency);
    }

    pub fn clear_latency(&self) {
        self.state.lock().latency.clear();
    }

    /// Every engine call made so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    pub fn pose(&self) -> Pose3D {
        self.state.lock().pose
    }

    pub fn slam_mode(&self) -> SlamMode {
        self.state.lock().slam_mode
    }

    pub fn nav_mode(&self) -> NavMode {
        self.state.lock().nav_mode
    }

    pub fn active_goal(&self) -> Option<NavTarget> {
        self.state.lock().goal.clone()
    }

    pub fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    pub fn is_mapping(&self) -> bool {
        self.state.lock().mapping
    }

    pub fn is_odometry_open(&self) -> bool {
        self.state.lock().odometry_open
    }

    fn feedback(&self) -> Result<EngineFeedback> {
        self.state
            .lock()
            .feedback
            .clone()
            .ok_or_else(|| Error::ServiceNotReady("simulated engine not attached".into()))
    }

    pub fn report_success(&self, id: i32) -> Result<ReportOutcome> {
        self.feedback()?.task_succeeded(id)
    }

    pub fn report_failure(&self, id: i32, error_code: i32, error_desc: &str) -> Result<ReportOutcome> {
        self.feedback()?.task_failed(id, error_code, error_desc)
    }

    pub fn report_progress(&self, id: i32) -> Result<ReportOutcome> {
        self.feedback()?.task_progress_resumed(id)
    }

    /// Finish the active goal immediately, as if the robot arrived.
    pub fn complete_active_task(&self) -> Result<Option<ReportOutcome>> {
        let goal = {
            let mut s = self.state.lock();
            let goal = s.goal.take();
            if let Some(goal) = &goal {
                s.pose = goal.goal;
            }
            goal
        };
        match goal {
            Some(goal) => Ok(Some(self.report_success(goal.id)?)),
            None => Ok(None),
        }
    }

    /// Abort the active goal with a fault code.
    pub fn fail_active_task(&self, error_code: i32, error_desc: &str) -> Result<Option<ReportOutcome>> {
        let goal = self.state.lock().goal.take();
        match goal {
            Some(goal) => Ok(Some(self.report_failure(goal.id, error_code, error_desc)?)),
            None => Ok(None),
        }
    }

    /// Acknowledge a pending resume by reporting progress.
    pub fn resume_progress(&self) -> Result<Option<ReportOutcome>> {
        let id = {
            let mut s = self.state.lock();
            match &s.goal {
                Some(goal) if s.awaiting_progress && !s.paused => {
                    let id = goal.id;
                    s.awaiting_progress = false;
                    Some(id)
                }
                _ => None,
            }
        };
        match id {
            Some(id) => Ok(Some(self.report_progress(id)?)),
            None => Ok(None),
        }
    }

    /// Advance the simulation by `dt` seconds, publishing telemetry and
    /// reporting task outcomes.
    ///
    /// Must not be called from the session worker thread.
    pub fn step(&self, dt: f64) -> StepOutcome {
        let (events, outcome, odometry, localization, feedback) = {
            let mut s = self.state.lock();
            if !s.connected {
                return StepOutcome {
                    pose: s.pose,
                    moving: false,
                    reached: None,
                };
            }
            let (events, outcome, speed) = s.advance(dt);
            let odometry = s
                .odometry_open
                .then(|| Odometry::from_pose(s.stamp_ns, &s.pose, [speed, 0.0, 0.0], [0.0; 3]));
            let localization = (s.localized && s.slam_mode == SlamMode::Localization)
                .then(|| LocalizationInfo::localized(s.pose));
            (events, outcome, odometry, localization, s.feedback.clone())
        };

        let Some(feedback) = feedback else {
            return outcome;
        };
        if let Some(sample) = odometry {
            feedback.publish_odometry(sample);
        }
        if let Some(info) = localization {
            feedback.publish_localization(info);
        }
        for event in events {
            let id = event.task_id();
            match feedback.report(event) {
                Ok(ReportOutcome::Ignored) => log::debug!("Report for task {} ignored", id),
                Ok(_) => {}
                Err(e) => log::warn!("Failed to report outcome for task {}: {}", id, e),
            }
        }
        outcome
    }

    /// Spawn a thread that calls [`step`](Self::step) at the configured rate
    /// until `running` is cleared.
    pub fn spawn_driver(&self, running: Arc<AtomicBool>) -> Result<JoinHandle<()>> {
        let handle = self.clone();
        let rate = self.state.lock().config.update_rate_hz.max(1.0);
        let period = Duration::from_secs_f32(1.0 / rate);
        let join = thread::Builder::new()
            .name("sim-driver".into())
            .spawn(move || {
                log::info!("Simulation driver started at {:.0} Hz", rate);
                while running.load(Ordering::Relaxed) {
                    handle.step(period.as_secs_f64());
                    thread::sleep(period);
                }
                log::info!("Simulation driver stopped");
            })?;
        Ok(join)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn connected_engine() -> (SimulatedEngine, SimulatedEngineHandle) {
        let mut engine = SimulatedEngine::default();
        let handle = engine.handle();
        engine.connect().unwrap();
        (engine, handle)
    }

    #[test]
    fn test_unreachable_fails_calls() {
        let (mut engine, handle) = connected_engine();
        handle.set_unreachable(true);
        assert!(matches!(
            engine.set_slam_mode(SlamMode::Mapping, None),
            Err(EngineError::Unreachable(_))
        ));
        assert_eq!(handle.slam_mode(), SlamMode::Idle);
    }

    #[test]
    fn test_capture_reveals_room() {
        let (mut engine, handle) = connected_engine();
        engine.set_slam_mode(SlamMode::Mapping, None).unwrap();
        engine.start_mapping().unwrap();
        assert!(handle.is_mapping());

        let meta = engine.capture_map().unwrap();
        let img = &meta.map_image_data;
        assert_eq!(img.width(), 120);
        assert_eq!(img.pixel(0, 0), Some(OCCUPIED_GRAY));
        assert_eq!(img.pixel(60, 40), Some(FREE_GRAY));
        assert!(!handle.is_mapping());
    }

    #[test]
    fn test_localization_requires_map() {
        let (mut engine, _) = connected_engine();
        assert!(matches!(
            engine.set_slam_mode(SlamMode::Localization, None),
            Err(EngineError::Rejected(_))
        ));
    }

    #[test]
    fn test_step_moves_toward_goal() {
        let (mut engine, handle) = connected_engine();
        let meta = {
            engine.set_slam_mode(SlamMode::Mapping, None).unwrap();
            engine.capture_map().unwrap()
        };
        let map = MapInfo {
            map_name: "room".into(),
            map_meta_data: meta,
        };
        engine.set_nav_mode(NavMode::GridMap, Some(&map)).unwrap();
        engine
            .dispatch_goal(&NavTarget::in_map(1, Pose3D::planar(1.0, 0.0, 0.0)))
            .unwrap();

        let outcome = handle.step(0.5);
        assert!(outcome.moving);
        assert_relative_eq!(outcome.pose.x(), 0.25, epsilon = 1e-9);

        engine.pause_task(1).unwrap();
        let outcome = handle.step(0.5);
        assert!(!outcome.moving);

        engine.resume_task(1).unwrap();
        for _ in 0..10 {
            handle.step(0.5);
        }
        assert!(handle.active_goal().is_none());
        assert_relative_eq!(handle.pose().x(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_point_cloud_contains_walls() {
        let (mut engine, _) = connected_engine();
        assert!(engine.point_cloud_map().is_err());
        engine.set_slam_mode(SlamMode::Mapping, None).unwrap();
        let cloud = engine.point_cloud_map().unwrap();
        // Perimeter of a 120x80 raster.
        assert_eq!(cloud.len(), 2 * 120 + 2 * 78);
    }

    #[test]
    fn test_calls_are_recorded() {
        let (mut engine, handle) = connected_engine();
        engine.set_slam_mode(SlamMode::Mapping, None).unwrap();
        let calls = handle.calls();
        assert!(calls.contains(&"connect".to_string()));
        assert!(calls.contains(&"slam_mode:MAPPING".to_string()));
    }
}
