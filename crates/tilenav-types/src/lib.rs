//! `tilenav-types` – shared value types for the tilenav stack.
//!
//! Everything that crosses a crate boundary lives here: field geometry
//! ([`Position`], [`Vector2`], [`Heading`], [`Line`]), the raw hardware
//! readings and commands ([`MotorTicks`], [`WheelPowers`], [`Orientation`],
//! [`EncoderMode`]), the vision records ([`HoughParameters`],
//! [`Observation`]) and the crate-wide [`NavError`].
//!
//! # Modules
//!
//! - [`geometry`] – positions, vectors, headings and lines in tile units.
//! - [`hardware`] – encoder snapshots, wheel power vectors, IMU orientation.
//! - [`observation`] – line-detection parameters and tile-edge observations.
//! - [`units`] – tile/inch conversions.

pub mod geometry;
pub mod hardware;
pub mod observation;
pub mod units;

pub use geometry::{Heading, Line, Position, Vector2};
pub use hardware::{EncoderMode, MotorTicks, Orientation, WheelPowers};
pub use observation::{HoughParameters, Observation};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type spanning hardware failures, configuration and frame handling.
///
/// Nothing inside the control loop propagates this to the caller; the drive
/// train logs it and skips the affected update for the current cycle.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NavError {
    #[error("Hardware Fault on {component}: {details}")]
    HardwareFault { component: String, details: String },

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("Invalid Frame: {0}")]
    InvalidFrame(String),

    #[error("I/O Error: {0}")]
    Io(String),
}

impl NavError {
    /// Shorthand for a [`NavError::HardwareFault`].
    pub fn hardware(component: impl Into<String>, details: impl Into<String>) -> Self {
        NavError::HardwareFault {
            component: component.into(),
            details: details.into(),
        }
    }
}
