//! Autonomous motion commands.
//!
//! A [`MotionCommand`] describes a move; a [`RunningCommand`] carries it
//! through `NotStarted → Running → Done`, capturing its baselines on
//! [`start`](RunningCommand::start) and driving the motors on each
//! [`update`](RunningCommand::update) until it reports completion.
//!
//! | command | drive mode | completion |
//! |---|---|---|
//! | `MoveForward`, `Strafe` | encoder run-to-position | average wheel travel reaches the tick target |
//! | `Rotate` | open loop | accumulated rotation reaches the requested angle |
//! | `MoveAlignedToTileCenter` | closed loop on the pose | distance travelled reaches the planned distance |

use std::fmt;

use tilenav_hal::motor::DriveMotors;
use tilenav_types::{EncoderMode, Heading, MotorTicks, NavError, Position, Vector2, WheelPowers, units};

use crate::kinematics::Kinematics;
use crate::pose::PoseEstimator;
use crate::power_curve::{PowerCurve, scale_progress};

/// A field axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    X,
    Y,
}

/// What to do.  Distances are in tiles, angles in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MotionCommand {
    /// Travel `distance` along a field axis to the nearest tile centre,
    /// squaring up to the closest right angle on the way.
    MoveAlignedToTileCenter { direction: Direction, distance: f64, speed: f64 },
    /// Drive straight, positive forward.
    MoveForward { distance: f64, speed: f64 },
    /// Slide sideways, positive to the left.
    Strafe { distance: f64, speed: f64 },
    /// Turn in place, positive counter-clockwise.
    Rotate { angle: f64, speed: f64 },
}

impl MotionCommand {
    pub fn name(&self) -> &'static str {
        match self {
            MotionCommand::MoveAlignedToTileCenter { .. } => "move_aligned_to_tile_center",
            MotionCommand::MoveForward { .. } => "move_forward",
            MotionCommand::Strafe { .. } => "strafe",
            MotionCommand::Rotate { .. } => "rotate",
        }
    }
}

impl fmt::Display for MotionCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MotionCommand::MoveAlignedToTileCenter {
                direction,
                distance,
                speed,
            } => write!(f, "{} {direction:?} {distance:.3} @ {speed:.2}", self.name()),
            MotionCommand::MoveForward { distance, speed } | MotionCommand::Strafe { distance, speed } => {
                write!(f, "{} {distance:.3} @ {speed:.2}", self.name())
            }
            MotionCommand::Rotate { angle, speed } => write!(f, "{} {angle:.1}° @ {speed:.2}", self.name()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandState {
    NotStarted,
    Running,
    Done,
}

// ────────────────────────────────────────────────────────────────────────────
// DriveContext
// ────────────────────────────────────────────────────────────────────────────

/// Everything a command may touch during one call.
pub struct DriveContext<'a> {
    pub motors: &'a mut dyn DriveMotors,
    pub pose: &'a mut PoseEstimator,
    pub kinematics: &'a Kinematics,
    pub curve: &'a PowerCurve,
    /// Last mode applied to the motors, `None` if unknown.
    pub mode: &'a mut Option<EncoderMode>,
}

impl DriveContext<'_> {
    /// Switch encoder mode, dropping the pose's tick snapshot when the
    /// counts are about to become meaningless.
    pub fn set_mode(&mut self, mode: EncoderMode) -> Result<(), NavError> {
        self.motors.set_mode(mode)?;
        *self.mode = Some(mode);
        if mode.invalidates_ticks() {
            self.pose.invalidate_ticks();
        }
        Ok(())
    }

    /// Switch mode only if the motors are not already in it.
    pub fn ensure_mode(&mut self, mode: EncoderMode) -> Result<(), NavError> {
        if *self.mode == Some(mode) {
            return Ok(());
        }
        self.set_mode(mode)
    }

    pub fn set_powers(&mut self, powers: WheelPowers) -> Result<(), NavError> {
        self.motors.set_powers(powers)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// RunningCommand
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
enum Baseline {
    Pending,
    Ticks {
        target: i32,
    },
    Rotation {
        target: Heading,
        last: Heading,
        rotated: f64,
    },
    Aligned {
        start: Position,
        target: Position,
        target_heading: Heading,
        planned: f64,
    },
}

/// A [`MotionCommand`] in flight.
#[derive(Debug, Clone)]
pub struct RunningCommand {
    command: MotionCommand,
    state: CommandState,
    baseline: Baseline,
}

impl RunningCommand {
    pub fn new(command: MotionCommand) -> Self {
        Self {
            command,
            state: CommandState::NotStarted,
            baseline: Baseline::Pending,
        }
    }

    pub fn command(&self) -> MotionCommand {
        self.command
    }

    pub fn state(&self) -> CommandState {
        self.state
    }

    /// Capture baselines and configure the motors.
    ///
    /// # Errors
    ///
    /// Propagates motor faults; the command stays `NotStarted`.
    pub fn start(&mut self, ctx: &mut DriveContext<'_>) -> Result<(), NavError> {
        let position = ctx.pose.position();
        let heading = ctx.pose.heading();

        let (baseline, initial_power) = match self.command {
            MotionCommand::MoveForward { distance, speed } | MotionCommand::Strafe { distance, speed } => {
                let target = units::tiles_to_ticks(distance, ctx.kinematics.ticks_per_tile);
                let targets = match self.command {
                    MotionCommand::Strafe { .. } => MotorTicks::new(target, -target, -target, target),
                    _ => MotorTicks::uniform(target),
                };
                ctx.set_mode(EncoderMode::StopAndResetEncoder)?;
                ctx.motors.set_target_ticks(targets)?;
                ctx.set_mode(EncoderMode::RunToPosition)?;
                let power = ctx.curve.power(0.0, 0.0, target.unsigned_abs() as f64, speed);
                (Baseline::Ticks { target }, WheelPowers::uniform(power))
            }
            MotionCommand::Rotate { angle, speed } => {
                ctx.ensure_mode(EncoderMode::RunUsingEncoder)?;
                let baseline = Baseline::Rotation {
                    target: heading.add(angle),
                    last: heading,
                    rotated: 0.0,
                };
                let power = ctx.curve.power(0.0, 0.0, angle.abs(), speed) * angle.signum();
                (baseline, WheelPowers::new(-power, power, -power, power))
            }
            MotionCommand::MoveAlignedToTileCenter {
                direction,
                distance,
                speed,
            } => {
                ctx.ensure_mode(EncoderMode::RunUsingEncoder)?;
                let offset = match direction {
                    Direction::X => Vector2::new(distance, 0.0),
                    Direction::Y => Vector2::new(0.0, distance),
                };
                let target = position.add(offset).align_to_tile_middle();
                let target_heading = heading.align_to_right_angle();
                let planned = position.distance(target);
                let power = ctx.curve.power(0.0, 0.0, planned, speed);
                let baseline = Baseline::Aligned {
                    start: position,
                    target,
                    target_heading,
                    planned,
                };
                let powers = ctx
                    .kinematics
                    .target_powers(position, heading, target, target_heading, power);
                (baseline, powers)
            }
        };

        ctx.set_powers(initial_power)?;
        self.baseline = baseline;
        self.state = CommandState::Running;
        Ok(())
    }

    /// Advance one control cycle.  Returns `true` once the command is done;
    /// the motors are stopped at that point.
    ///
    /// # Errors
    ///
    /// Propagates motor faults; the command keeps its state and can be
    /// updated again next cycle.
    pub fn update(&mut self, ctx: &mut DriveContext<'_>) -> Result<bool, NavError> {
        match self.state {
            CommandState::Done => return Ok(true),
            CommandState::NotStarted => self.start(ctx)?,
            CommandState::Running => {}
        }

        let finished = match (self.command, &mut self.baseline) {
            (
                MotionCommand::MoveForward { speed, .. } | MotionCommand::Strafe { speed, .. },
                Baseline::Ticks { target },
            ) => {
                let moved = ctx.motors.ticks()?.average_magnitude() as f64;
                let goal = target.unsigned_abs() as f64;
                if scale_progress(moved, 0.0, goal) >= 1.0 {
                    true
                } else {
                    ctx.set_powers(WheelPowers::uniform(ctx.curve.power(moved, 0.0, goal, speed)))?;
                    false
                }
            }
            (
                MotionCommand::Rotate { angle, speed },
                Baseline::Rotation {
                    target,
                    last,
                    rotated,
                },
            ) => {
                let current = ctx.pose.heading();
                *rotated += current.delta(*last) * angle.signum();
                *last = current;
                let planned = angle.abs();
                if scale_progress(*rotated, 0.0, planned) >= 1.0 {
                    true
                } else {
                    // Past half a turn the shortest delta points the wrong way.
                    let sign = if planned - *rotated > 180.0 {
                        angle.signum()
                    } else {
                        target.delta(current).signum()
                    };
                    let power = ctx.curve.power(*rotated, 0.0, planned, speed) * sign;
                    ctx.set_powers(WheelPowers::new(-power, power, -power, power))?;
                    false
                }
            }
            (
                MotionCommand::MoveAlignedToTileCenter { speed, .. },
                Baseline::Aligned {
                    start,
                    target,
                    target_heading,
                    planned,
                },
            ) => {
                let position = ctx.pose.position();
                let moved = start.distance(position);
                if scale_progress(moved, 0.0, *planned) >= 1.0 {
                    true
                } else {
                    let power = ctx.curve.power(moved, 0.0, *planned, speed);
                    let powers = ctx.kinematics.target_powers(
                        position,
                        ctx.pose.heading(),
                        *target,
                        *target_heading,
                        power,
                    );
                    ctx.set_powers(powers)?;
                    false
                }
            }
            _ => true,
        };

        if finished {
            self.finish(ctx)?;
        }
        Ok(finished)
    }

    /// Stop the motors and mark the command done.
    ///
    /// # Errors
    ///
    /// Propagates motor faults; the command is marked done regardless.
    pub fn stop(&mut self, ctx: &mut DriveContext<'_>) -> Result<(), NavError> {
        self.state = CommandState::Done;
        ctx.set_powers(WheelPowers::zero())
    }

    fn finish(&mut self, ctx: &mut DriveContext<'_>) -> Result<(), NavError> {
        self.stop(ctx)?;
        if matches!(self.baseline, Baseline::Ticks { .. }) {
            ctx.set_mode(EncoderMode::RunUsingEncoder)?;
        }
        Ok(())
    }
}
