//! Raw readings from, and commands to, the drive hardware.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Encoder tick counts for the four drive wheels, captured once per cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MotorTicks {
    pub back_left: i32,
    pub back_right: i32,
    pub front_left: i32,
    pub front_right: i32,
}

impl MotorTicks {
    pub fn new(back_left: i32, back_right: i32, front_left: i32, front_right: i32) -> Self {
        Self {
            back_left,
            back_right,
            front_left,
            front_right,
        }
    }

    /// The same count on every wheel.
    pub fn uniform(ticks: i32) -> Self {
        Self::new(ticks, ticks, ticks, ticks)
    }

    /// Per-wheel change since `previous`.
    pub fn delta(&self, previous: &MotorTicks) -> MotorTicks {
        MotorTicks::new(
            self.back_left.wrapping_sub(previous.back_left),
            self.back_right.wrapping_sub(previous.back_right),
            self.front_left.wrapping_sub(previous.front_left),
            self.front_right.wrapping_sub(previous.front_right),
        )
    }

    /// Mean of the absolute tick counts, truncated toward zero.
    pub fn average_magnitude(&self) -> i32 {
        let sum = self.back_left.unsigned_abs() as i64
            + self.back_right.unsigned_abs() as i64
            + self.front_left.unsigned_abs() as i64
            + self.front_right.unsigned_abs() as i64;
        (sum / 4) as i32
    }
}

impl fmt::Display for MotorTicks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BL {}\tBR {}\tFL {}\tFR {}",
            self.back_left, self.back_right, self.front_left, self.front_right
        )
    }
}

/// Power for each drive wheel, nominally in `[-1, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WheelPowers {
    pub front_left: f64,
    pub front_right: f64,
    pub back_left: f64,
    pub back_right: f64,
}

impl WheelPowers {
    pub fn new(front_left: f64, front_right: f64, back_left: f64, back_right: f64) -> Self {
        Self {
            front_left,
            front_right,
            back_left,
            back_right,
        }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    pub fn uniform(power: f64) -> Self {
        Self::new(power, power, power, power)
    }

    pub fn max_magnitude(&self) -> f64 {
        self.front_left
            .abs()
            .max(self.front_right.abs())
            .max(self.back_left.abs())
            .max(self.back_right.abs())
    }

    pub fn scale(&self, factor: f64) -> Self {
        Self::new(
            self.front_left * factor,
            self.front_right * factor,
            self.back_left * factor,
            self.back_right * factor,
        )
    }

    /// Scale down uniformly so no wheel exceeds magnitude 1; ratios between
    /// wheels are preserved.
    pub fn normalized(&self) -> Self {
        let max = self.max_magnitude();
        if max > 1.0 { self.scale(1.0 / max) } else { *self }
    }

    pub fn is_zero(&self) -> bool {
        self.max_magnitude() == 0.0
    }
}

impl fmt::Display for WheelPowers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FL {:.2}\tFR {:.2}\tBL {:.2}\tBR {:.2}",
            self.front_left, self.front_right, self.back_left, self.back_right
        )
    }
}

/// A raw IMU orientation reading in degrees.
///
/// `first_angle` is the heading (yaw) axis and is reported in `(-180, 180]`,
/// jumping discontinuously when the robot turns through ±180°.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Orientation {
    pub first_angle: f64,
    pub second_angle: f64,
    pub third_angle: f64,
}

impl Orientation {
    pub fn new(first_angle: f64, second_angle: f64, third_angle: f64) -> Self {
        Self {
            first_angle,
            second_angle,
            third_angle,
        }
    }

    /// A reading with only the heading axis set.
    pub fn yaw(degrees: f64) -> Self {
        Self::new(degrees, 0.0, 0.0)
    }
}

/// How the motor controller interprets power and encoder state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EncoderMode {
    /// Closed-loop velocity control; power is a velocity fraction.
    RunUsingEncoder,
    /// Open-loop power; encoder counts are not maintained.
    RunWithoutEncoder,
    /// Zero the encoder counts and hold.
    StopAndResetEncoder,
    /// Drive toward the configured target ticks; power magnitude caps speed.
    RunToPosition,
}

impl EncoderMode {
    /// `true` for modes after which previously read tick counts no longer
    /// line up with new readings.
    pub fn invalidates_ticks(self) -> bool {
        matches!(
            self,
            EncoderMode::RunWithoutEncoder | EncoderMode::StopAndResetEncoder
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticks_delta_per_wheel() {
        let prev = MotorTicks::new(10, 20, 30, 40);
        let now = MotorTicks::new(15, 10, 30, 140);
        assert_eq!(now.delta(&prev), MotorTicks::new(5, -10, 0, 100));
    }

    #[test]
    fn average_magnitude_ignores_sign() {
        let t = MotorTicks::new(-100, 100, 100, -100);
        assert_eq!(t.average_magnitude(), 100);
        assert_eq!(MotorTicks::new(1, 1, 1, 2).average_magnitude(), 1);
    }

    #[test]
    fn ticks_display_lists_all_wheels() {
        let s = MotorTicks::new(1, 2, 3, 4).to_string();
        assert_eq!(s, "BL 1\tBR 2\tFL 3\tFR 4");
    }

    #[test]
    fn normalized_preserves_ratios() {
        let p = WheelPowers::new(2.0, -1.0, 0.5, 0.0).normalized();
        assert!((p.front_left - 1.0).abs() < 1e-12);
        assert!((p.front_right + 0.5).abs() < 1e-12);
        assert!((p.back_left - 0.25).abs() < 1e-12);
    }

    #[test]
    fn normalized_leaves_small_powers_alone() {
        let p = WheelPowers::new(0.3, -0.2, 0.1, 0.0);
        assert_eq!(p.normalized(), p);
    }

    #[test]
    fn encoder_modes_that_invalidate_ticks() {
        assert!(EncoderMode::StopAndResetEncoder.invalidates_ticks());
        assert!(EncoderMode::RunWithoutEncoder.invalidates_ticks());
        assert!(!EncoderMode::RunUsingEncoder.invalidates_ticks());
        assert!(!EncoderMode::RunToPosition.invalidates_ticks());
    }
}
