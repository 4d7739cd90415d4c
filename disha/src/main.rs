//! Disha - SLAM and navigation orchestration demo daemon
//!
//! Runs a session against the simulated engine: builds a map, saves it,
//! localizes on it and drives to a goal in GRID_MAP navigation.
//!
//! # Usage
//!
//! ```bash
//! # With default config
//! cargo run --release
//!
//! # With custom config file
//! cargo run --release -- --config disha.toml
//!
//! # With command line overrides
//! cargo run --release -- --maps /tmp/maps --goal 1.5,0.5
//! ```

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;

use disha::{
    DishaConfig, NavMode, NavTarget, Pose3D, SimulatedEngine, SimulatedEngineHandle, SlamMode,
    SlamNavSession,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Disha SLAM/navigation orchestration demo", long_about = None)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Map storage directory (overrides config)
    #[arg(short, long)]
    maps: Option<PathBuf>,

    /// Name the demo map is saved under
    #[arg(long, default_value = "demo")]
    map_name: String,

    /// Navigation goal as "x,y" in the map frame
    #[arg(long, default_value = "1.0,0.5", value_parser = parse_goal)]
    goal: (f64, f64),

    /// Seconds spent mapping before the map is saved
    #[arg(long, default_value_t = 1.0)]
    mapping_secs: f64,

    /// Give up on the goal after this many seconds
    #[arg(long, default_value_t = 30.0)]
    nav_timeout_secs: f64,

    /// Write the effective configuration to this path and exit
    #[arg(long)]
    write_config: Option<PathBuf>,
}

fn parse_goal(s: &str) -> Result<(f64, f64), String> {
    let (x, y) = s
        .split_once(',')
        .ok_or_else(|| format!("expected \"x,y\", got {:?}", s))?;
    let x = x.trim().parse::<f64>().map_err(|e| e.to_string())?;
    let y = y.trim().parse::<f64>().map_err(|e| e.to_string())?;
    Ok((x, y))
}

fn load_config(args: &Args) -> disha::Result<DishaConfig> {
    let mut config = match &args.config {
        Some(path) => DishaConfig::from_file(path)?,
        None => DishaConfig::default(),
    };
    if let Some(maps) = &args.maps {
        config.map_storage.path = maps.clone();
    }
    config.validate()?;
    Ok(config)
}

fn main() {
    let args = Args::parse();
    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.as_str()),
    )
    .format(|buf, record| {
        writeln!(
            buf,
            "[{}] {} - {}",
            record.level(),
            record.target(),
            record.args()
        )
    })
    .init();

    if let Some(path) = &args.write_config {
        match config.to_file(path) {
            Ok(()) => log::info!("Configuration written to {}", path.display()),
            Err(e) => {
                log::error!("Failed to write configuration: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    log::info!("disha starting");
    log::info!("  Maps: {}", config.map_storage.path.display());
    log::info!("  Default timeout: {} ms", config.session.default_timeout_ms);
    log::info!("  Controller level: {:?}", config.session.controller_level);
    log::info!(
        "  Simulation: {:.0} Hz, {:.2} m/s",
        config.simulation.update_rate_hz,
        config.simulation.linear_speed
    );

    // Setup signal handler
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        r.store(false, Ordering::Relaxed);
    }) {
        log::warn!("Error setting Ctrl-C handler: {}", e);
    }

    if let Err(e) = run(&config, &args, running) {
        log::error!("Demo failed: {} ({})", e, e.code());
    }

    log::info!("disha shutdown complete");
}

fn run(config: &DishaConfig, args: &Args, running: Arc<AtomicBool>) -> disha::Result<()> {
    let engine = SimulatedEngine::new(config.simulation.clone());
    let sim = engine.handle();
    let session = SlamNavSession::new(config, Box::new(engine))?;
    session.initialize()?;

    let driver = sim.spawn_driver(running.clone())?;
    let result = run_scenario(&session, &sim, args, &running);

    running.store(false, Ordering::Relaxed);
    if driver.join().is_err() {
        log::warn!("Simulation driver panicked");
    }
    let stats = session.telemetry_stats();
    log::info!(
        "Telemetry: odometry {} published / {} dropped, localization {} published / {} dropped",
        stats.odometry.published,
        stats.odometry.dropped,
        stats.localization.published,
        stats.localization.dropped
    );
    session.shutdown()?;
    result
}

fn run_scenario(
    session: &SlamNavSession,
    sim: &SimulatedEngineHandle,
    args: &Args,
    running: &AtomicBool,
) -> disha::Result<()> {
    // 1. Build and save a map
    session.activate_slam_mode(SlamMode::Mapping, "")?;
    session.start_mapping()?;
    log::info!("Mapping for {:.1}s", args.mapping_secs);
    thread::sleep(Duration::from_secs_f64(args.mapping_secs.max(0.0)));
    session.save_map(&args.map_name, Duration::from_secs(10))?;

    let maps = session.get_all_map_info()?;
    for info in &maps.map_infos {
        let img = &info.map_meta_data.map_image_data;
        log::info!(
            "  Map {}: {}x{} @ {:.3} m/px",
            info.map_name,
            img.width(),
            img.height(),
            info.map_meta_data.resolution
        );
    }

    // 2. Localize on it
    session.activate_slam_mode(SlamMode::Localization, &args.map_name)?;
    session.init_pose(Pose3D::identity())?;
    let localization = session.get_current_localization_info()?;
    log::info!(
        "Localized: {} at ({:.2}, {:.2})",
        localization.is_localization,
        localization.pose.x(),
        localization.pose.y()
    );

    // 3. Stream telemetry
    session.open_odometry_stream()?;
    session.subscribe_odometry_with(|sample| {
        let pose = sample.pose();
        log::debug!("Odometry: ({:.2}, {:.2}, {:.2})", pose.x(), pose.y(), pose.yaw());
    })?;

    // 4. Navigate
    session.activate_nav_mode(NavMode::GridMap, &args.map_name)?;
    let (x, y) = args.goal;
    session.set_nav_target(NavTarget::in_map(1, Pose3D::planar(x, y, 0.0)))?;

    let deadline = Instant::now() + Duration::from_secs_f64(args.nav_timeout_secs.max(0.0));
    let mut last = None;
    loop {
        let status = session.get_nav_task_status()?;
        if last != Some(status.status) {
            log::info!("Task {}: {}", status.id, status.status);
            last = Some(status.status);
        }
        if status.status.is_terminal() {
            if status.error_code != 0 {
                log::warn!("Task failed: {}", status.error_desc);
            }
            break;
        }
        if !running.load(Ordering::Relaxed) || Instant::now() >= deadline {
            log::info!("Cancelling task {}", status.id);
            session.cancel_nav_task()?;
            break;
        }
        thread::sleep(Duration::from_millis(100));
    }
    let pose = sim.pose();
    log::info!("Robot at ({:.2}, {:.2})", pose.x(), pose.y());

    // 5. Back to idle
    session.unsubscribe_odometry()?;
    session.close_odometry_stream()?;
    session.activate_nav_mode(NavMode::Idle, "")?;
    session.activate_slam_mode(SlamMode::Idle, "")?;
    Ok(())
}
