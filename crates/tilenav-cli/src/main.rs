//! `tilenav` – runs the tile navigation stack against a simulated robot.
//!
//! A frame producer task renders what the edge camera sees from the robot's
//! true pose and feeds it through tile-edge detection, while the control
//! loop drives the default routine through the drive train.  Both share one
//! [`DetectionState`].

mod config;
mod demo;
mod telemetry;
mod world;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use clap::Parser;
use colored::Colorize;
use tilenav_drive::pose::{START_HEADING, START_POSITION};
use tilenav_drive::{DriveTrain, Kinematics};
use tilenav_hal::camera::{Camera, save_frame};
use tilenav_hal::clock::SystemClock;
use tilenav_hal::sim::{SimCamera, SimDrive};
use tilenav_perception::{DetectionState, Overlay, TileEdgeDetector, WebCamDescriptor};
use tilenav_types::{Heading, NavError, Position, units};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::demo::Outcome;
use crate::world::{FieldPose, SimWorld};

#[derive(Debug, Parser)]
#[command(name = "tilenav", version, about = "Tile-edge navigation on a simulated mecanum robot")]
struct Args {
    /// Configuration file (defaults to ~/.tilenav/config.toml).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Maximum number of control cycles to run.
    #[arg(long, default_value_t = 3000)]
    cycles: u32,

    /// Save the final camera frame as a PNG.
    #[arg(long)]
    save_frame: Option<PathBuf>,

    /// Write the effective configuration back to the config file and exit.
    #[arg(long)]
    write_config: bool,
}

#[tokio::main]
async fn main() {
    telemetry::init_tracing();
    let args = Args::parse();

    if let Err(e) = run(args).await {
        error!(error = %e, "tilenav failed");
        eprintln!("{} {e}", "error:".red().bold());
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), NavError> {
    let path = args.config.clone().unwrap_or_else(config::config_path);
    let cfg = match config::load_from(&path)? {
        Some(cfg) => {
            info!(path = %path.display(), "configuration loaded");
            cfg
        }
        None => {
            info!(path = %path.display(), "no configuration file, using defaults");
            let mut cfg = Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
    };

    if args.write_config {
        config::save_to(&cfg, &path)?;
        println!("{} {}", "wrote".green().bold(), path.display());
        return Ok(());
    }

    let descriptor = cfg.camera.descriptor();
    let detection = Arc::new(DetectionState::new().with_grace_period(cfg.detection.grace_period()));
    let detector = Arc::new(build_detector(&cfg, descriptor, Arc::clone(&detection))?);

    let sim = SimDrive::new(cfg.sim.ticks_per_step).with_turn_rate(cfg.sim.turn_rate);
    let start = FieldPose::new(
        Position::new(START_POSITION.x + units::inches(cfg.sim.start_offset), START_POSITION.y),
        Heading::new(START_HEADING + cfg.sim.start_skew),
    );
    let world = SimWorld::new(sim.clone(), Kinematics::new(cfg.drive.ticks_per_tile), start);
    let camera = SimCamera::new(cfg.camera.id.clone(), descriptor.width, descriptor.height);
    let running = Arc::new(AtomicBool::new(true));

    let producer = tokio::spawn(produce_frames(
        Arc::clone(&detector),
        camera,
        world.clone(),
        descriptor,
        Duration::from_millis(cfg.sim.frame_period_ms),
        Arc::clone(&running),
    ));

    let mut dt = DriveTrain::new(Box::new(sim.clone()), Box::new(sim.imu()), cfg.drive)
        .with_detection(Arc::clone(&detection));

    let mut control = {
        let world = world.clone();
        let detection = Arc::clone(&detection);
        let running = Arc::clone(&running);
        let cycles = args.cycles;
        tokio::task::spawn_blocking(move || {
            demo::run_plan(
                &mut dt,
                &world,
                Some(detection.as_ref()),
                &demo::default_plan(),
                cycles,
                &running,
                &SystemClock,
            )
        })
    };

    let outcome = tokio::select! {
        joined = &mut control => joined,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted, stopping");
            running.store(false, Ordering::Relaxed);
            control.await
        }
    };
    running.store(false, Ordering::Relaxed);
    if let Err(e) = producer.await {
        warn!(error = %e, "frame producer ended abnormally");
    }
    let outcome = outcome.map_err(|e| NavError::Io(format!("control loop ended abnormally: {e}")))?;

    for overlay in detector.annotate(Some(outcome.status.position), cfg.robot) {
        if let Overlay::Text { text, .. } = overlay {
            info!(%text, "overlay");
        }
    }
    if let Some(frame_path) = &args.save_frame {
        save_frame(&world.render(&descriptor), frame_path)?;
    }

    print_summary(&outcome, world.truth());
    Ok(())
}

fn build_detector(
    cfg: &Config,
    descriptor: WebCamDescriptor,
    detection: Arc<DetectionState>,
) -> Result<TileEdgeDetector, NavError> {
    let detector = TileEdgeDetector::new(descriptor, cfg.solver, cfg.detection, detection)?;
    if let Some(p) = cfg.hough.horizontal {
        *detector
            .horizontal_parameters()
            .write()
            .unwrap_or_else(|e| e.into_inner()) = p;
    }
    if let Some(p) = cfg.hough.vertical {
        *detector
            .vertical_parameters()
            .write()
            .unwrap_or_else(|e| e.into_inner()) = p;
    }
    Ok(detector)
}

/// Render, capture and process one frame per `period` until `running` is
/// cleared.
async fn produce_frames(
    detector: Arc<TileEdgeDetector>,
    camera: SimCamera,
    world: SimWorld,
    descriptor: WebCamDescriptor,
    period: Duration,
    running: Arc<AtomicBool>,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    while running.load(Ordering::Relaxed) {
        interval.tick().await;
        let detector = Arc::clone(&detector);
        let mut capture = camera.clone();
        let world = world.clone();
        let processed = tokio::task::spawn_blocking(move || {
            capture.push_frame(world.render(&descriptor));
            let frame = capture.capture()?;
            Ok::<_, NavError>(detector.process_frame(&frame, Instant::now()))
        })
        .await;

        match processed {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!(camera = camera.id(), error = %e, "frame capture failed"),
            Err(e) => {
                warn!(error = %e, "frame processing task failed");
                break;
            }
        }
    }
}

fn print_summary(outcome: &Outcome, truth: FieldPose) {
    let status = &outcome.status;
    println!("{}", "tilenav run complete".green().bold());
    println!(
        "  {:<10} {} completed, {} skipped, {} cycles",
        "steps".bold(),
        outcome.completed,
        outcome.skipped,
        outcome.cycles
    );
    println!("  {:<10} {} at {}", "estimate".bold(), status.position, status.heading);
    println!("  {:<10} {} at {}", "truth".bold(), truth.position, truth.heading);
    if let Some(obs) = &status.detection {
        let fmt = |v: Option<f64>| v.map_or_else(|| "-".dimmed().to_string(), |v| format!("{v:.3}"));
        println!(
            "  {:<10} right {} front {} offset {}",
            "edges".bold(),
            fmt(obs.distance_right),
            fmt(obs.distance_front),
            fmt(obs.heading_offset)
        );
    }
}
