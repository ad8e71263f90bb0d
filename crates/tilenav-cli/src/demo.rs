//! Scripted autonomous routine run against the simulated world.
//!
//! Each [`Step`] either issues a motion command or asks the drive train for
//! a vision-assisted alignment; the control loop then cycles until the
//! command finishes, the cycle budget runs out or a shutdown is requested.

use std::sync::atomic::{AtomicBool, Ordering};

use tilenav_drive::{Direction, DriveStatus, DriveTrain, MotionCommand};
use tilenav_hal::clock::Clock;
use tilenav_perception::DetectionState;
use tracing::info;

use crate::world::SimWorld;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Step {
    /// Rotate until the tile grid sits `target` degrees off the robot axes.
    AlignToTileAngle { target: f64, speed: f64 },
    /// Strafe until the right tile edge is `target` tiles away.
    DistanceFromTileEdge { target: f64, speed: f64 },
    Command(MotionCommand),
}

/// Square up on the start tile, then drive one tile up field and turn to
/// face left.
pub fn default_plan() -> Vec<Step> {
    vec![
        Step::AlignToTileAngle {
            target: 0.0,
            speed: 0.3,
        },
        Step::DistanceFromTileEdge {
            target: 0.5,
            speed: 0.3,
        },
        Step::Command(MotionCommand::MoveAlignedToTileCenter {
            direction: Direction::Y,
            distance: 1.0,
            speed: 0.6,
        }),
        Step::Command(MotionCommand::Rotate {
            angle: 90.0,
            speed: 0.5,
        }),
    ]
}

#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    /// Steps whose motion ran to completion.
    pub completed: usize,
    /// Alignment steps skipped for lack of a usable detection.
    pub skipped: usize,
    pub cycles: u32,
    pub status: DriveStatus,
}

/// Drives `dt` through `plan`.
///
/// One cycle is `update_status`, one world step and one control-period
/// sleep on `clock`.  When `budget` cycles have elapsed or `running` is
/// cleared, the drive train is stopped and the remaining steps are dropped.
pub fn run_plan(
    dt: &mut DriveTrain,
    world: &SimWorld,
    detection: Option<&DetectionState>,
    plan: &[Step],
    budget: u32,
    running: &AtomicBool,
    clock: &dyn Clock,
) -> Outcome {
    let period = dt.config().control_period();
    let mut completed = 0;
    let mut skipped = 0;
    let mut cycles = 0;

    // Seed the pose estimate before anything moves.
    dt.update_status();

    'plan: for step in plan {
        if let Some(d) = detection
            && matches!(step, Step::AlignToTileAngle { .. } | Step::DistanceFromTileEdge { .. })
        {
            // Only frames from the current pose count.
            d.clear();
        }

        let issued = match *step {
            Step::AlignToTileAngle { target, speed } => dt.align_to_tile_angle(target, speed),
            Step::DistanceFromTileEdge { target, speed } => dt.move_distance_from_tile_edge(target, speed),
            Step::Command(command) => {
                dt.execute(command);
                true
            }
        };
        if !issued {
            info!(step = ?step, "step skipped");
            skipped += 1;
            continue;
        }

        while dt.is_busy() {
            if cycles >= budget || !running.load(Ordering::Relaxed) {
                info!(cycles, "control loop halted");
                dt.stop();
                break 'plan;
            }
            dt.update_status();
            world.step();
            clock.sleep(period);
            cycles += 1;
        }
        completed += 1;
    }

    Outcome {
        completed,
        skipped,
        cycles,
        status: dt.update_status(),
    }
}
