//! # tilenav-drive
//!
//! Motion side of tilenav: pose estimation and motor control for an
//! X-pattern mecanum chassis.
//!
//! - [`kinematics`] – wheel ticks ↔ field motion, teleop and closed-loop
//!   power mixing.
//! - [`power_curve`] – acceleration/deceleration profile.
//! - [`pose`] – dead-reckoning pose estimate.
//! - [`command`] – autonomous motion commands and their state machine.
//! - [`drivetrain`] – per-cycle orchestration, teleop and vision-assisted
//!   alignment.

pub mod command;
pub mod drivetrain;
pub mod kinematics;
pub mod pose;
pub mod power_curve;

pub use command::{CommandState, Direction, DriveContext, MotionCommand, RunningCommand};
pub use drivetrain::{DriveConfig, DriveStatus, DriveTrain};
pub use kinematics::Kinematics;
pub use pose::PoseEstimator;
pub use power_curve::PowerCurve;
