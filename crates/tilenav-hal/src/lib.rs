//! `tilenav-hal` – hardware seams for the drive train and camera.
//!
//! The rest of the stack never talks to a device directly; it holds one of
//! the traits below, so real drivers and the in-process simulation are
//! interchangeable.
//!
//! # Modules
//!
//! - [`motor`] – [`DriveMotors`][motor::DriveMotors]: the four-wheel drive
//!   (power, encoder mode, target ticks, tick readout).
//! - [`imu`] – [`Imu`][imu::Imu]: raw 3-axis orientation.
//! - [`camera`] – [`Camera`][camera::Camera] and greyscale
//!   [`CameraFrame`][camera::CameraFrame], plus on-demand frame saving.
//! - [`clock`] – [`Clock`][clock::Clock]: injectable time source used by
//!   bounded waits and the detection staleness policy.
//! - [`sim`] – simulated drive, IMU and camera drivers for tests and the
//!   demo binary.

pub mod camera;
pub mod clock;
pub mod imu;
pub mod motor;
pub mod sim;

pub use camera::{Camera, CameraFrame, save_frame};
pub use clock::{Clock, ManualClock, SystemClock};
pub use imu::Imu;
pub use motor::DriveMotors;
