//! Simulated field: the robot's true pose and what the edge camera sees.
//!
//! [`SimWorld`] wraps a [`SimDrive`] and integrates the robot's true field
//! pose from the wheel motion of every simulation step.  The pose estimate
//! inside the drive train starts from the nominal start pose; the world may
//! start somewhere slightly different, which is the error the vision
//! alignment helpers exist to remove.  [`render`] paints the tile seams
//! visible to the edge camera from a given pose.

use std::sync::{Arc, Mutex};

use tilenav_drive::Kinematics;
use tilenav_hal::camera::CameraFrame;
use tilenav_hal::imu::Imu;
use tilenav_hal::sim::{SimDrive, SimImu};
use tilenav_perception::WebCamDescriptor;
use tilenav_types::{Heading, Position, units};

const SEAM: u8 = 255;

/// A pose in field tiles and field degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldPose {
    pub position: Position,
    pub heading: Heading,
}

impl FieldPose {
    pub fn new(position: Position, heading: Heading) -> Self {
        Self { position, heading }
    }

    /// Field coordinates of a robot-frame point given in tiles.
    pub fn to_field(&self, right: f64, forward: f64) -> Position {
        let (sin, cos) = self.heading.value().to_radians().sin_cos();
        Position::new(
            self.position.x + forward * cos + right * sin,
            self.position.y + forward * sin - right * cos,
        )
    }
}

#[derive(Debug, Clone)]
pub struct SimWorld {
    drive: SimDrive,
    imu: SimImu,
    kinematics: Kinematics,
    truth: Arc<Mutex<FieldPose>>,
}

impl SimWorld {
    pub fn new(drive: SimDrive, kinematics: Kinematics, start: FieldPose) -> Self {
        let imu = drive.imu();
        Self {
            drive,
            imu,
            kinematics,
            truth: Arc::new(Mutex::new(start)),
        }
    }

    /// Where the robot really is.
    pub fn truth(&self) -> FieldPose {
        *self.truth.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Advance the chassis one control period and carry the true pose along.
    pub fn step(&self) {
        let ticks_before = self.drive.current_ticks();
        let yaw_before = self.yaw();
        self.drive.step();
        let moved = self.drive.current_ticks().delta(&ticks_before);
        let turned = Heading::new(self.yaw()).delta(Heading::new(yaw_before));

        let mut truth = self.truth.lock().unwrap_or_else(|e| e.into_inner());
        let shift = self.kinematics.forward(&moved, truth.heading);
        truth.position = truth.position.add(shift);
        truth.heading = truth.heading.add(turned);
    }

    /// The camera image for the current true pose.
    pub fn render(&self, camera: &WebCamDescriptor) -> CameraFrame {
        render(self.truth(), camera)
    }

    fn yaw(&self) -> f64 {
        // The simulated IMU never faults.
        self.imu.clone().orientation().map(|o| o.first_angle).unwrap_or_default()
    }
}

/// Paint every tile seam the camera would see from `pose` in white on black.
///
/// Seams lie on integer field coordinates.  A pixel is lit when its centre
/// is within 0.6 pixels of one, so a seam is never thinner than a pixel.
pub fn render(pose: FieldPose, camera: &WebCamDescriptor) -> CameraFrame {
    let mut frame = CameraFrame::filled(camera.width, camera.height, 0);

    let origin = camera.top_left;
    let scale_x = (camera.top_right.robot.x - origin.robot.x) / (camera.top_right.pixel.x - origin.pixel.x);
    let scale_y = (camera.bottom_left.robot.y - origin.robot.y) / (camera.bottom_left.pixel.y - origin.pixel.y);
    let tolerance = units::inches(scale_x.abs().max(scale_y.abs())) * 0.6;

    for py in 0..camera.height {
        let forward = units::inches(origin.robot.y + (py as f64 + 0.5 - origin.pixel.y) * scale_y);
        for px in 0..camera.width {
            let right = units::inches(origin.robot.x + (px as f64 + 0.5 - origin.pixel.x) * scale_x);
            let p = pose.to_field(right, forward);
            if on_seam(p.x, tolerance) || on_seam(p.y, tolerance) {
                frame.set_pixel(px, py, SEAM);
            }
        }
    }
    frame
}

fn on_seam(coordinate: f64, tolerance: f64) -> bool {
    (coordinate - coordinate.round()).abs() <= tolerance
}
