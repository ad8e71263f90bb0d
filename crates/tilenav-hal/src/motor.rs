//! Generic `DriveMotors` trait for the four-wheel omnidirectional chassis.
//!
//! Drivers implement this trait and hand a boxed instance to the drive train,
//! which owns it exclusively.  The drive train only ever talks to the trait,
//! so drivers can be swapped (or simulated) without touching control logic.

use tilenav_types::{EncoderMode, MotorTicks, NavError, WheelPowers};

/// The four drive motors of an X-pattern mecanum chassis.
///
/// All wheels are assumed to be configured so that positive power drives the
/// robot forward (the left-side motors reversed in the driver).
pub trait DriveMotors: Send {
    /// Stable identifier for logging, e.g. `"drive_base"`.
    fn id(&self) -> &str;

    /// Apply a power to each wheel.
    ///
    /// # Errors
    ///
    /// Returns [`NavError::HardwareFault`] if the motor controller rejects
    /// the command.
    fn set_powers(&mut self, powers: WheelPowers) -> Result<(), NavError>;

    /// Switch every motor to `mode`.
    ///
    /// # Errors
    ///
    /// Returns [`NavError::HardwareFault`] if the mode cannot be applied.
    fn set_mode(&mut self, mode: EncoderMode) -> Result<(), NavError>;

    /// Set per-wheel targets used by [`EncoderMode::RunToPosition`].
    ///
    /// # Errors
    ///
    /// Returns [`NavError::HardwareFault`] if the targets cannot be applied.
    fn set_target_ticks(&mut self, targets: MotorTicks) -> Result<(), NavError>;

    /// Read the current encoder counts.
    ///
    /// # Errors
    ///
    /// Returns [`NavError::HardwareFault`] if the encoders cannot be read.
    fn ticks(&mut self) -> Result<MotorTicks, NavError>;
}
