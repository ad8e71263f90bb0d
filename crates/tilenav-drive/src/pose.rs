//! Dead-reckoning pose estimate from wheel encoders and the IMU.
//!
//! Position integrates per-cycle wheel tick deltas through
//! [`Kinematics::forward`]; heading integrates per-cycle IMU yaw deltas.
//! Working in deltas makes the IMU's ±180° wrap harmless as long as the
//! robot turns less than half a revolution between two updates.
//!
//! # Example
//!
//! ```rust
//! use tilenav_drive::kinematics::Kinematics;
//! use tilenav_drive::pose::PoseEstimator;
//! use tilenav_types::{MotorTicks, Orientation};
//!
//! let kin = Kinematics::new(100.0);
//! let mut pose = PoseEstimator::new();
//! pose.update(MotorTicks::uniform(0), Orientation::yaw(0.0), &kin);
//! pose.update(MotorTicks::uniform(50), Orientation::yaw(0.0), &kin);
//! assert!((pose.position().y - 1.0).abs() < 1e-9);
//! ```

use std::sync::Arc;

use tilenav_types::{Heading, MotorTicks, Observation, Orientation, Position};

use crate::kinematics::Kinematics;

/// Starting position: the centre of the first tile.
pub const START_POSITION: Position = Position { x: 0.5, y: 0.5 };

/// Starting heading: facing away from the driver.
pub const START_HEADING: f64 = 90.0;

#[derive(Debug, Clone)]
pub struct PoseEstimator {
    position: Position,
    heading: Heading,
    previous_ticks: Option<MotorTicks>,
    previous_orientation: Option<Orientation>,
    observation: Option<Arc<Observation>>,
}

impl Default for PoseEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl PoseEstimator {
    pub fn new() -> Self {
        Self::with_pose(START_POSITION, Heading::new(START_HEADING))
    }

    pub fn with_pose(position: Position, heading: Heading) -> Self {
        Self {
            position,
            heading,
            previous_ticks: None,
            previous_orientation: None,
            observation: None,
        }
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn heading(&self) -> Heading {
        self.heading
    }

    /// One control-cycle update from fresh encoder and IMU readings.
    ///
    /// Position moves with the heading held before this cycle's rotation.
    pub fn update(&mut self, ticks: MotorTicks, orientation: Orientation, kinematics: &Kinematics) {
        self.update_position(ticks, kinematics);
        self.update_heading(orientation);
    }

    /// Integrate the tick change since the last snapshot.  The first
    /// snapshot after construction or [`invalidate_ticks`](Self::invalidate_ticks)
    /// only seeds.
    pub fn update_position(&mut self, ticks: MotorTicks, kinematics: &Kinematics) {
        if let Some(previous) = self.previous_ticks {
            let moved = kinematics.forward(&ticks.delta(&previous), self.heading);
            self.position = self.position.add(moved);
        }
        self.previous_ticks = Some(ticks);
    }

    /// Integrate the yaw change since the last reading.
    pub fn update_heading(&mut self, orientation: Orientation) {
        if let Some(previous) = self.previous_orientation {
            self.heading = self.heading.add(orientation.first_angle - previous.first_angle);
        }
        self.previous_orientation = Some(orientation);
    }

    /// Forget the tick snapshot; needed whenever the encoders are reset or
    /// stop counting.
    pub fn invalidate_ticks(&mut self) {
        self.previous_ticks = None;
    }

    /// Store the latest vision observation.  It is kept for diagnostics and
    /// not folded into the pose.
    pub fn observe(&mut self, observation: Option<Arc<Observation>>) {
        self.observation = observation;
    }

    pub fn observation(&self) -> Option<&Arc<Observation>> {
        self.observation.as_ref()
    }

    /// Overwrite the estimate.  Snapshots are kept, so integration continues
    /// from the new pose.
    pub fn set_pose(&mut self, position: Position, heading: Heading) {
        self.position = position;
        self.heading = heading;
    }

    /// Move the estimate back to the start tile centre, keeping heading.
    pub fn reset_position(&mut self) {
        self.position = START_POSITION;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    const EPS: f64 = 1e-9;

    fn kin() -> Kinematics {
        Kinematics::default()
    }

    #[test]
    fn starts_at_first_tile_facing_forward() {
        let pose = PoseEstimator::new();
        assert_eq!(pose.position(), Position::new(0.5, 0.5));
        assert_eq!(pose.heading().value(), 90.0);
    }

    #[test]
    fn first_update_only_seeds() {
        let mut pose = PoseEstimator::new();
        pose.update(MotorTicks::uniform(5000), Orientation::yaw(40.0), &kin());
        assert_eq!(pose.position(), Position::new(0.5, 0.5));
        assert_eq!(pose.heading().value(), 90.0);
    }

    #[test]
    fn forward_ticks_move_up_field() {
        let mut pose = PoseEstimator::new();
        pose.update(MotorTicks::uniform(0), Orientation::yaw(0.0), &kin());
        pose.update(MotorTicks::uniform(100), Orientation::yaw(0.0), &kin());
        let p = pose.position();
        assert!((p.x - 0.5).abs() < EPS);
        assert!((p.y - (0.5 + 100.0 / 1087.0)).abs() < EPS);
    }

    #[test]
    fn heading_survives_imu_wrap() {
        let mut pose = PoseEstimator::new();
        pose.update_heading(Orientation::yaw(179.0));
        pose.update_heading(Orientation::yaw(-179.0));
        assert!((pose.heading().value() - 92.0).abs() < EPS);

        pose.update_heading(Orientation::yaw(179.0));
        assert!((pose.heading().value() - 90.0).abs() < EPS);
    }

    #[test]
    fn invalidated_ticks_reseed() {
        let mut pose = PoseEstimator::new();
        pose.update_position(MotorTicks::uniform(1000), &kin());
        pose.invalidate_ticks();
        // Encoders were reset to zero; no backwards jump.
        pose.update_position(MotorTicks::uniform(0), &kin());
        assert_eq!(pose.position(), Position::new(0.5, 0.5));
        pose.update_position(MotorTicks::uniform(1087), &kin());
        assert!((pose.position().y - 1.5).abs() < EPS);
    }

    #[test]
    fn motion_uses_heading_before_rotation() {
        let mut pose = PoseEstimator::with_pose(Position::new(0.0, 0.0), Heading::new(0.0));
        let kin = Kinematics::new(100.0);
        pose.update(MotorTicks::uniform(0), Orientation::yaw(0.0), &kin);
        pose.update(MotorTicks::uniform(100), Orientation::yaw(90.0), &kin);
        assert!((pose.position().x - 1.0).abs() < EPS);
        assert!(pose.position().y.abs() < EPS);
        assert!((pose.heading().value() - 90.0).abs() < EPS);
    }

    #[test]
    fn reset_position_keeps_heading() {
        let mut pose = PoseEstimator::with_pose(Position::new(3.2, 1.1), Heading::new(180.0));
        pose.reset_position();
        assert_eq!(pose.position(), START_POSITION);
        assert_eq!(pose.heading().value(), 180.0);
    }

    #[test]
    fn observation_is_stored_not_applied() {
        let mut pose = PoseEstimator::new();
        let mut obs = Observation::empty(Instant::now());
        obs.distance_right = Some(0.2);
        pose.observe(Some(Arc::new(obs)));
        assert_eq!(pose.observation().and_then(|o| o.distance_right), Some(0.2));
        assert_eq!(pose.position(), START_POSITION);
        pose.observe(None);
        assert!(pose.observation().is_none());
    }
}
