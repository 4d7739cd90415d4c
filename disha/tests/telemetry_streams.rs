//! Telemetry stream lifecycle through the session API.

use std::sync::Arc;
use std::time::Duration;

use approx::assert_relative_eq;
use crossbeam_channel::RecvTimeoutError;
use disha::{DishaConfig, Pose3D, SimulatedEngine, SimulatedEngineHandle, SlamMode, SlamNavSession};
use tempfile::TempDir;

const STEP: f64 = 0.01;

fn stream_calls(sim: &SimulatedEngineHandle, operation: &str) -> usize {
    sim.calls().iter().filter(|c| *c == operation).count()
}

fn start_session(odometry_capacity: usize) -> (SlamNavSession, SimulatedEngineHandle, TempDir) {
    let dir = TempDir::new().unwrap();
    let mut config = DishaConfig::default();
    config.map_storage.path = dir.path().join("maps");
    config.session.default_timeout_ms = 2000;
    config.telemetry.odometry_queue_capacity = odometry_capacity;
    let engine = SimulatedEngine::default();
    let sim = engine.handle();
    let session = SlamNavSession::new(&config, Box::new(engine)).unwrap();
    session.initialize().unwrap();
    (session, sim, dir)
}

#[test]
fn test_closed_stream_discards() {
    let (session, sim, _dir) = start_session(8);
    let sub = session.subscribe_odometry().unwrap();

    sim.step(STEP);
    assert!(sub.is_empty());
    // The engine only emits once the stream is opened.
    assert_eq!(session.telemetry_stats().odometry.published, 0);

    session.open_odometry_stream().unwrap();
    assert!(sim.is_odometry_open());
    sim.step(STEP);
    assert_eq!(sub.len(), 1);

    session.close_odometry_stream().unwrap();
    assert!(!sim.is_odometry_open());
    sim.step(STEP);
    assert_eq!(sub.len(), 1);
}

#[test]
fn test_full_queue_drops_oldest() {
    let (session, sim, _dir) = start_session(4);
    session.open_odometry_stream().unwrap();
    let sub = session.subscribe_odometry().unwrap();

    for _ in 0..10 {
        sim.step(STEP);
    }

    let samples = sub.drain();
    assert_eq!(samples.len(), 4);
    let stamps: Vec<i64> = samples.iter().map(|s| s.header.stamp).collect();
    assert!(stamps.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(*stamps.last().unwrap(), 10 * (STEP * 1e9) as i64);

    let stats = session.telemetry_stats().odometry;
    assert_eq!(stats.published, 10);
    assert_eq!(stats.dropped, 6);
    assert_eq!(stats.delivered, 4);
}

#[test]
fn test_subscribe_twice_shares_queue() {
    let (session, sim, _dir) = start_session(8);
    session.open_odometry_stream().unwrap();
    let first = session.subscribe_odometry().unwrap();
    let second = session.subscribe_odometry().unwrap();

    sim.step(STEP);
    assert!(first.try_recv().is_some());
    assert!(second.try_recv().is_none());
}

#[test]
fn test_unsubscribe_disconnects() {
    let (session, sim, _dir) = start_session(8);
    session.open_odometry_stream().unwrap();
    let sub = session.subscribe_odometry().unwrap();
    session.unsubscribe_odometry().unwrap();
    session.unsubscribe_odometry().unwrap();

    sim.step(STEP);
    assert_eq!(
        sub.recv_timeout(Duration::from_millis(50)).unwrap_err(),
        RecvTimeoutError::Disconnected
    );
    assert_eq!(session.telemetry_stats().odometry.discarded, 1);
}

#[test]
fn test_callback_delivery() {
    let (session, sim, _dir) = start_session(8);
    session.open_odometry_stream().unwrap();

    let (tx, rx) = crossbeam_channel::unbounded();
    session
        .subscribe_odometry_with(move |sample| {
            let _ = tx.send(sample.header.stamp);
        })
        .unwrap();

    for _ in 0..3 {
        sim.step(STEP);
    }
    let received: Vec<i64> = (0..3)
        .map(|_| rx.recv_timeout(Duration::from_secs(1)).unwrap())
        .collect();
    assert_eq!(received.len(), 3);
    assert!(received.windows(2).all(|w| w[0] < w[1]));

    session.unsubscribe_odometry().unwrap();
    sim.step(STEP);
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
}

#[test]
fn test_localization_stream() {
    let (session, sim, _dir) = start_session(8);
    session.activate_slam_mode(SlamMode::Mapping, "").unwrap();
    session.start_mapping().unwrap();
    session.save_map("office", Duration::from_secs(5)).unwrap();
    session
        .activate_slam_mode(SlamMode::Localization, "office")
        .unwrap();

    session.open_localization_stream().unwrap();
    let sub = session.subscribe_localization().unwrap();
    session.init_pose(Pose3D::planar(0.5, 0.25, 0.0)).unwrap();

    let info = sub.try_recv().unwrap();
    assert!(info.is_localization);
    assert_relative_eq!(info.pose.x(), 0.5, epsilon = 1e-9);
    assert_relative_eq!(info.pose.y(), 0.25, epsilon = 1e-9);

    sim.step(STEP);
    assert!(sub.try_recv().unwrap().is_localization);
}

#[test]
fn test_shutdown_closes_streams() {
    let (session, sim, _dir) = start_session(8);
    session.open_odometry_stream().unwrap();
    let sub = session.subscribe_odometry().unwrap();
    sim.step(STEP);

    session.shutdown().unwrap();
    assert!(!sim.is_odometry_open());

    // Buffered samples are still readable, then the queue reports closed.
    assert!(sub.try_recv().is_some());
    assert_eq!(
        sub.recv_timeout(Duration::from_millis(50)).unwrap_err(),
        RecvTimeoutError::Disconnected
    );
}

#[test]
fn test_open_close_twice() {
    let (session, sim, _dir) = start_session(8);

    session.open_odometry_stream().unwrap();
    session.open_odometry_stream().unwrap();
    assert!(sim.is_odometry_open());
    assert_eq!(stream_calls(&sim, "set_odometry_stream"), 1);

    session.close_odometry_stream().unwrap();
    session.close_odometry_stream().unwrap();
    assert!(!sim.is_odometry_open());
    assert_eq!(stream_calls(&sim, "set_odometry_stream"), 2);

    session.close_localization_stream().unwrap();
    assert_eq!(stream_calls(&sim, "set_localization_stream"), 0);
    session.open_localization_stream().unwrap();
    session.open_localization_stream().unwrap();
    assert_eq!(stream_calls(&sim, "set_localization_stream"), 1);

    // Reopening after a double close still delivers.
    session.open_odometry_stream().unwrap();
    let sub = session.subscribe_odometry().unwrap();
    sim.step(STEP);
    assert_eq!(sub.len(), 1);
}

#[test]
fn test_unsubscribe_from_callback() {
    let (session, sim, _dir) = start_session(8);
    let session = Arc::new(session);
    session.open_odometry_stream().unwrap();

    let (tx, rx) = crossbeam_channel::unbounded();
    let session_cb = Arc::clone(&session);
    session
        .subscribe_odometry_with(move |_| {
            let _ = tx.send(session_cb.unsubscribe_odometry().is_ok());
        })
        .unwrap();

    sim.step(STEP);
    assert!(rx.recv_timeout(Duration::from_secs(2)).unwrap());
    // The delivery thread exits after the callback returns.
    assert_eq!(
        rx.recv_timeout(Duration::from_secs(2)).unwrap_err(),
        RecvTimeoutError::Disconnected
    );

    sim.step(STEP);
    assert_eq!(session.telemetry_stats().odometry.discarded, 1);
    let sub = session.subscribe_odometry().unwrap();
    sim.step(STEP);
    assert_eq!(sub.len(), 1);
    session.shutdown().unwrap();
}
