//! Smooth acceleration/deceleration profile for closed-loop moves.
//!
//! Power rises quickly over the first quarter of a move, holds near full
//! speed, and falls off on approach to the target.  A floor keeps the motors
//! above their stall threshold at both ends.
//!
//! ```text
//! x < 0.25 : 1 / (1 + e^(-16 (2x - 0.125)))
//! x ≥ 0.25 : 1 / (1 + e^( 8 (2x - 1.675)))
//! ```
//!
//! # Example
//!
//! ```rust
//! use tilenav_drive::power_curve::PowerCurve;
//!
//! let curve = PowerCurve::default();
//! assert_eq!(curve.power(0.0, 0.0, 100.0, 1.0), 0.15);
//! assert!(curve.power(50.0, 0.0, 100.0, 1.0) > 0.99);
//! ```

use serde::{Deserialize, Serialize};

/// Default stall-avoidance floor.
pub const DEFAULT_MIN_POWER: f64 = 0.15;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowerCurve {
    pub min_power: f64,
}

impl Default for PowerCurve {
    fn default() -> Self {
        Self {
            min_power: DEFAULT_MIN_POWER,
        }
    }
}

impl PowerCurve {
    pub fn new(min_power: f64) -> Self {
        Self { min_power }
    }

    /// Motor power for a move from `initial` to `target` currently at
    /// `current` (any unit: ticks, degrees, tiles).
    pub fn power(&self, current: f64, initial: f64, target: f64, speed: f64) -> f64 {
        let x = scale_progress(current, initial, target);
        let shape = if x < 0.25 {
            1.0 / (1.0 + (-16.0 * (2.0 * x - 0.125)).exp())
        } else {
            1.0 / (1.0 + (8.0 * (2.0 * x - 1.675)).exp())
        };
        (shape * speed).max(self.min_power)
    }
}

/// Fraction of the way from `initial` to `target`.
///
/// A zero-length move counts as complete (1.0).
pub fn scale_progress(current: f64, initial: f64, target: f64) -> f64 {
    let span = target - initial;
    if span.abs() < f64::EPSILON {
        1.0
    } else {
        (current - initial) / span
    }
}
