//! Generic `Imu` trait for the orientation sensor.

use tilenav_types::{NavError, Orientation};

/// An inertial measurement unit reporting absolute orientation.
pub trait Imu: Send {
    /// Stable identifier for logging, e.g. `"imu"`.
    fn id(&self) -> &str;

    /// Read the current orientation, intrinsic Z-Y-X order, degrees.
    ///
    /// # Errors
    ///
    /// Returns [`NavError::HardwareFault`] if the sensor cannot be read.
    fn orientation(&mut self) -> Result<Orientation, NavError>;
}
