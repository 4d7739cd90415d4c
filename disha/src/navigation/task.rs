//! Navigation task manager.
//!
//! Owns the [`NavStatus`] state machine. Caller requests are checked against
//! the current status before the engine is asked; the status only changes
//! after the engine accepts. Engine outcome reports are applied only when
//! they name the current task and the transition is legal.

use crate::engine::{EngineEvent, SlamNavEngine};
use crate::error::{Error, Result};
use crate::state::{NavMode, SharedStateHandle};

use super::faults::failure_description;
use super::{NavEvent, NavStatus, NavStatusType, NavTarget};

/// Drives navigation tasks through their status machine.
pub struct NavTaskManager {
    shared: SharedStateHandle,
}

impl NavTaskManager {
    pub fn new(shared: SharedStateHandle) -> Self {
        Self { shared }
    }

    /// Current task status snapshot.
    pub fn status(&self) -> NavStatus {
        self.shared.read().nav_status.clone()
    }

    /// Status after `event`, or INVALID_STATE naming the operation.
    fn check(&self, event: NavEvent, operation: &str) -> Result<(NavStatus, NavStatusType)> {
        let status = self.status();
        match status.status.next(event) {
            Some(next) => Ok((status, next)),
            None => Err(Error::InvalidState(format!(
                "cannot {} task {} in status {}",
                operation, status.id, status.status
            ))),
        }
    }

    fn set_status(&self, id: i32, status: NavStatusType) {
        let mut state = self.shared.write();
        state.nav_status.id = id;
        state.nav_status.status = status;
    }

    /// Dispatch a new goal.
    pub fn set_target(&mut self, engine: &mut dyn SlamNavEngine, target: NavTarget) -> Result<()> {
        let nav_mode = self.shared.read().nav_mode;
        if nav_mode != NavMode::GridMap {
            return Err(Error::InvalidState(format!(
                "navigation mode is {}, targets need GRID_MAP",
                nav_mode
            )));
        }
        let current = self.status();
        if current.is_active() {
            return Err(Error::InvalidState(format!(
                "task {} is still {}, cancel it first",
                current.id, current.status
            )));
        }
        target.validate()?;

        engine.dispatch_goal(&target)?;
        self.shared.write().nav_status = NavStatus::running(target.id);
        log::info!(
            "Navigation task {} started: goal ({:.2}, {:.2}, {:.2}) in {}",
            target.id,
            target.goal.x(),
            target.goal.y(),
            target.goal.yaw(),
            target.frame_id
        );
        Ok(())
    }

    pub fn pause(&mut self, engine: &mut dyn SlamNavEngine) -> Result<()> {
        let (status, next) = self.check(NavEvent::Pause, "pause")?;
        engine.pause_task(status.id)?;
        self.set_status(status.id, next);
        log::info!("Navigation task {} paused", status.id);
        Ok(())
    }

    pub fn resume(&mut self, engine: &mut dyn SlamNavEngine) -> Result<()> {
        let (status, next) = self.check(NavEvent::Resume, "resume")?;
        engine.resume_task(status.id)?;
        self.set_status(status.id, next);
        log::info!("Navigation task {} resuming", status.id);
        Ok(())
    }

    pub fn cancel(&mut self, engine: &mut dyn SlamNavEngine) -> Result<()> {
        let (status, next) = self.check(NavEvent::Cancel, "cancel")?;
        engine.cancel_task(status.id)?;
        self.set_status(status.id, next);
        log::info!("Navigation task {} cancelled", status.id);
        Ok(())
    }

    /// Cancel any active task on the engine ahead of leaving GRID_MAP.
    ///
    /// Engine errors are logged, not returned: the caller resets the status
    /// regardless once navigation is disabled.
    pub fn abort_active(&mut self, engine: &mut dyn SlamNavEngine) {
        let status = self.status();
        if status.is_active()
            && let Err(e) = engine.cancel_task(status.id)
        {
            log::warn!("Engine refused to cancel task {}: {}", status.id, e);
        }
    }

    /// Back to `{-1, NONE, 0, ""}`.
    pub fn reset(&mut self) {
        self.shared.write().nav_status.reset();
    }

    /// Apply an engine outcome report. Returns true if the status changed.
    pub fn apply_event(&mut self, event: &EngineEvent) -> bool {
        let nav_event = match event {
            EngineEvent::TaskSucceeded { .. } => NavEvent::Succeeded,
            EngineEvent::TaskFailed { .. } => NavEvent::Failed,
            EngineEvent::TaskProgressResumed { .. } => NavEvent::ProgressResumed,
        };

        let mut state = self.shared.write();
        let status = &mut state.nav_status;
        if status.id != event.task_id() {
            log::warn!(
                "Dropping {:?} for task {}: current task is {}",
                nav_event,
                event.task_id(),
                status.id
            );
            return false;
        }
        let Some(next) = status.status.next(nav_event) else {
            log::warn!(
                "Dropping {:?} for task {} in status {}",
                nav_event,
                status.id,
                status.status
            );
            return false;
        };

        status.status = next;
        if let EngineEvent::TaskFailed {
            error_code,
            error_desc,
            ..
        } = event
        {
            status.error_code = *error_code;
            status.error_desc = failure_description(*error_code, error_desc);
            log::warn!(
                "Navigation task {} failed: 0x{:04X} {}",
                status.id,
                status.error_code,
                status.error_desc
            );
        } else {
            log::info!("Navigation task {} is now {}", status.id, status.status);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{SimulatedEngine, SimulatedEngineHandle};
    use crate::core::types::{MapImageData, MapInfo, MapMetaData, Pose3D};
    use crate::state::{ControllerLevel, create_shared_state};

    fn setup() -> (NavTaskManager, SimulatedEngine, SimulatedEngineHandle, SharedStateHandle) {
        let shared = create_shared_state(ControllerLevel::HighLevel);
        let mut engine = SimulatedEngine::default();
        let handle = engine.handle();
        engine.connect().unwrap();
        let map = MapInfo {
            map_name: "office".into(),
            map_meta_data: MapMetaData::new(
                0.05,
                Pose3D::identity(),
                MapImageData::unknown(4, 4).unwrap(),
            )
            .unwrap(),
        };
        engine.set_nav_mode(NavMode::GridMap, Some(&map)).unwrap();
        shared.write().nav_mode = NavMode::GridMap;
        (NavTaskManager::new(shared.clone()), engine, handle, shared)
    }

    fn target(id: i32) -> NavTarget {
        NavTarget::in_map(id, Pose3D::planar(2.0, 1.0, 0.0))
    }

    #[test]
    fn test_target_requires_grid_map() {
        let (mut tasks, mut engine, _, shared) = setup();
        shared.write().nav_mode = NavMode::Idle;
        let err = tasks.set_target(&mut engine, target(1)).unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
        assert_eq!(tasks.status(), NavStatus::default());
    }

    #[test]
    fn test_second_target_rejected_while_active() {
        let (mut tasks, mut engine, handle, _) = setup();
        tasks.set_target(&mut engine, target(1)).unwrap();
        assert!(matches!(
            tasks.set_target(&mut engine, target(2)),
            Err(Error::InvalidState(_))
        ));
        assert_eq!(tasks.status().id, 1);
        assert_eq!(handle.active_goal().unwrap().id, 1);
    }

    #[test]
    fn test_pause_resume_cancel() {
        let (mut tasks, mut engine, _, _) = setup();
        tasks.set_target(&mut engine, target(1)).unwrap();

        assert!(tasks.resume(&mut engine).is_err());
        tasks.pause(&mut engine).unwrap();
        assert_eq!(tasks.status().status, NavStatusType::Pause);
        assert!(tasks.pause(&mut engine).is_err());

        tasks.resume(&mut engine).unwrap();
        assert_eq!(tasks.status().status, NavStatusType::Continue);
        assert!(tasks.apply_event(&EngineEvent::TaskProgressResumed { id: 1 }));
        assert_eq!(tasks.status().status, NavStatusType::Running);

        tasks.cancel(&mut engine).unwrap();
        assert_eq!(tasks.status().status, NavStatusType::Cancel);
        assert!(tasks.pause(&mut engine).is_err());
        assert!(tasks.cancel(&mut engine).is_err());
    }

    #[test]
    fn test_late_success_after_cancel_ignored() {
        let (mut tasks, mut engine, _, _) = setup();
        tasks.set_target(&mut engine, target(1)).unwrap();
        tasks.cancel(&mut engine).unwrap();
        assert!(!tasks.apply_event(&EngineEvent::TaskSucceeded { id: 1 }));
        assert_eq!(tasks.status().status, NavStatusType::Cancel);
    }

    #[test]
    fn test_stale_id_ignored() {
        let (mut tasks, mut engine, _, _) = setup();
        tasks.set_target(&mut engine, target(3)).unwrap();
        assert!(!tasks.apply_event(&EngineEvent::TaskSucceeded { id: 2 }));
        assert_eq!(tasks.status().status, NavStatusType::Running);
    }

    #[test]
    fn test_failure_fills_description() {
        let (mut tasks, mut engine, _, _) = setup();
        tasks.set_target(&mut engine, target(1)).unwrap();
        assert!(tasks.apply_event(&EngineEvent::TaskFailed {
            id: 1,
            error_code: 0x5203,
            error_desc: String::new(),
        }));
        let status = tasks.status();
        assert_eq!(status.status, NavStatusType::EndFailed);
        assert_eq!(status.error_code, 0x5203);
        assert_eq!(status.error_desc, "No navigation localization data");

        // A terminal task accepts a new target, which clears the error.
        tasks.set_target(&mut engine, target(2)).unwrap();
        assert_eq!(tasks.status(), NavStatus::running(2));
    }

    #[test]
    fn test_engine_rejection_leaves_status() {
        let (mut tasks, mut engine, handle, _) = setup();
        tasks.set_target(&mut engine, target(1)).unwrap();
        handle.set_unreachable(true);
        let err = tasks.pause(&mut engine).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::ServiceError);
        assert_eq!(tasks.status().status, NavStatusType::Running);
    }
}
