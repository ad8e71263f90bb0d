//! Control-cycle orchestration for the mecanum chassis.
//!
//! [`DriveTrain`] owns the motors and IMU, keeps the pose estimate, runs at
//! most one [`MotionCommand`] at a time and exposes teleop mixing plus the
//! vision-assisted alignment helpers.  Call [`DriveTrain::update_status`]
//! once per control period.
//!
//! Hardware faults never escape the control loop: each is logged with
//! `warn!` and the affected part of the cycle is skipped.
//!
//! # Example
//!
//! ```rust
//! use tilenav_drive::drivetrain::{DriveConfig, DriveTrain};
//! use tilenav_hal::sim::SimDrive;
//!
//! let sim = SimDrive::new(40.0);
//! let mut dt = DriveTrain::new(Box::new(sim.clone()), Box::new(sim.imu()), DriveConfig::default());
//!
//! dt.move_forward(0.5, 1.0);
//! while dt.is_busy() {
//!     dt.update_status();
//!     sim.step();
//! }
//! assert!((dt.position().y - 1.0).abs() < 0.05);
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tilenav_hal::imu::Imu;
use tilenav_hal::motor::DriveMotors;
use tilenav_perception::detector::DetectionState;
use tilenav_types::{EncoderMode, Heading, MotorTicks, Observation, Position, WheelPowers, units};
use tracing::{debug, info, warn};

use crate::command::{Direction, DriveContext, MotionCommand, RunningCommand};
use crate::kinematics::{DEFAULT_TICKS_PER_TILE, Kinematics};
use crate::pose::PoseEstimator;
use crate::power_curve::{DEFAULT_MIN_POWER, PowerCurve};

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

/// Drive-train tunables.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    /// Encoder ticks per tile of straight travel.
    pub ticks_per_tile: f64,
    /// Power-curve floor.
    pub min_power: f64,
    /// Control-loop period in milliseconds.
    pub control_period_ms: u64,
    /// How long alignment helpers wait for a tile-edge detection.
    pub alignment_timeout_ms: u64,
    /// Heading corrections at or beyond this (degrees) are ignored.
    pub max_heading_correction: f64,
    /// Edge-distance corrections at or beyond this (inches) are ignored.
    pub max_distance_correction: f64,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            ticks_per_tile: DEFAULT_TICKS_PER_TILE,
            min_power: DEFAULT_MIN_POWER,
            control_period_ms: 20,
            alignment_timeout_ms: 1000,
            max_heading_correction: 45.0,
            max_distance_correction: 10.0,
        }
    }
}

impl DriveConfig {
    pub fn control_period(&self) -> Duration {
        Duration::from_millis(self.control_period_ms)
    }

    pub fn alignment_timeout(&self) -> Duration {
        Duration::from_millis(self.alignment_timeout_ms)
    }
}

/// Snapshot returned by every control cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct DriveStatus {
    pub position: Position,
    pub heading: Heading,
    /// Encoder counts read this cycle, if the read succeeded.
    pub ticks: Option<MotorTicks>,
    /// Name of the command still running after this cycle.
    pub command: Option<&'static str>,
    /// Aggregated tile-edge estimate, if a detector is attached.
    pub detection: Option<Observation>,
}

// ────────────────────────────────────────────────────────────────────────────
// DriveTrain
// ────────────────────────────────────────────────────────────────────────────

pub struct DriveTrain {
    motors: Box<dyn DriveMotors>,
    imu: Box<dyn Imu>,
    pose: PoseEstimator,
    kinematics: Kinematics,
    curve: PowerCurve,
    mode: Option<EncoderMode>,
    command: Option<RunningCommand>,
    detection: Option<Arc<DetectionState>>,
    config: DriveConfig,
}

/// Borrow the parts of a [`DriveTrain`] a command needs, leaving
/// `command` free for the caller.
macro_rules! drive_context {
    ($dt:expr) => {
        DriveContext {
            motors: $dt.motors.as_mut(),
            pose: &mut $dt.pose,
            kinematics: &$dt.kinematics,
            curve: &$dt.curve,
            mode: &mut $dt.mode,
        }
    };
}

impl DriveTrain {
    pub fn new(motors: Box<dyn DriveMotors>, imu: Box<dyn Imu>, config: DriveConfig) -> Self {
        Self {
            motors,
            imu,
            pose: PoseEstimator::new(),
            kinematics: Kinematics::new(config.ticks_per_tile),
            curve: PowerCurve::new(config.min_power),
            mode: None,
            command: None,
            detection: None,
            config,
        }
    }

    /// Attach the tile-edge detection state used by the alignment helpers.
    /// Their waits run on the state's clock.
    pub fn with_detection(mut self, detection: Arc<DetectionState>) -> Self {
        self.detection = Some(detection);
        self
    }

    pub fn config(&self) -> &DriveConfig {
        &self.config
    }

    pub fn position(&self) -> Position {
        self.pose.position()
    }

    pub fn heading(&self) -> Heading {
        self.pose.heading()
    }

    pub fn pose(&self) -> &PoseEstimator {
        &self.pose
    }

    /// `true` while an autonomous command is running.
    pub fn is_busy(&self) -> bool {
        self.command.is_some()
    }

    pub fn current_command(&self) -> Option<MotionCommand> {
        self.command.as_ref().map(RunningCommand::command)
    }

    /// Put the pose estimate back on the start tile centre.
    pub fn reset_position(&mut self) {
        self.pose.reset_position();
        info!(position = %self.pose.position(), "position reset");
    }

    /// One control cycle: refresh the pose, then advance the running
    /// command.
    pub fn update_status(&mut self) -> DriveStatus {
        let ticks = self
            .motors
            .ticks()
            .inspect_err(|e| warn!(motors = self.motors.id(), error = %e, "encoder read failed"))
            .ok();
        let orientation = self
            .imu
            .orientation()
            .inspect_err(|e| warn!(imu = self.imu.id(), error = %e, "orientation read failed"))
            .ok();

        if let Some(t) = ticks {
            self.pose.update_position(t, &self.kinematics);
        }
        if let Some(o) = orientation {
            self.pose.update_heading(o);
        }
        if let Some(detection) = &self.detection {
            self.pose.observe(detection.latest());
        }

        self.advance_command();

        let status = DriveStatus {
            position: self.pose.position(),
            heading: self.pose.heading(),
            ticks,
            command: self.command.as_ref().map(|c| c.command().name()),
            detection: self.detection.as_ref().and_then(|d| d.aggregate()),
        };
        debug!(
            position = %status.position,
            heading = %status.heading,
            ticks = ?status.ticks.map(|t| t.to_string()),
            command = ?status.command,
            distance_front = ?status.detection.as_ref().and_then(|o| o.distance_front),
            distance_right = ?status.detection.as_ref().and_then(|o| o.distance_right),
            heading_offset = ?status.detection.as_ref().and_then(|o| o.heading_offset),
            "drive status"
        );
        status
    }

    fn advance_command(&mut self) {
        let Some(cmd) = self.command.as_mut() else {
            return;
        };
        let result = cmd.update(&mut drive_context!(self));
        match result {
            Ok(true) => {
                info!(command = %cmd.command(), position = %self.pose.position(), heading = %self.pose.heading(), "command complete");
                self.command = None;
            }
            Ok(false) => {}
            Err(e) => warn!(command = cmd.command().name(), error = %e, "command update failed"),
        }
    }

    // ── Teleop ──────────────────────────────────────────────────────────────

    /// Robot-relative teleop.  Cancels any running command.
    pub fn drive(&mut self, drive: f64, turn: f64, strafe: f64, speed: f64) {
        let powers = self.kinematics.mix(drive, turn, strafe, speed);
        self.apply_teleop(powers);
    }

    /// Driver-relative teleop using the current heading estimate.  Cancels
    /// any running command.
    pub fn attempt_driver_relative(&mut self, drive: f64, turn: f64, strafe: f64, speed: f64) {
        let powers = self
            .kinematics
            .driver_relative(drive, turn, strafe, speed, self.pose.heading());
        self.apply_teleop(powers);
    }

    fn apply_teleop(&mut self, powers: WheelPowers) {
        self.cancel_command();
        let mut ctx = drive_context!(self);
        let result = ctx
            .ensure_mode(EncoderMode::RunUsingEncoder)
            .and_then(|()| ctx.set_powers(powers));
        if let Err(e) = result {
            warn!(motors = self.motors.id(), error = %e, "teleop command failed");
        }
    }

    // ── Autonomous commands ─────────────────────────────────────────────────

    pub fn move_forward(&mut self, distance: f64, speed: f64) {
        self.execute(MotionCommand::MoveForward { distance, speed });
    }

    pub fn strafe(&mut self, distance: f64, speed: f64) {
        self.execute(MotionCommand::Strafe { distance, speed });
    }

    pub fn rotate(&mut self, angle: f64, speed: f64) {
        self.execute(MotionCommand::Rotate { angle, speed });
    }

    pub fn move_aligned_to_tile_center(&mut self, direction: Direction, distance: f64, speed: f64) {
        self.execute(MotionCommand::MoveAlignedToTileCenter {
            direction,
            distance,
            speed,
        });
    }

    /// Start `command`, stopping whatever was running first.
    pub fn execute(&mut self, command: MotionCommand) {
        self.cancel_command();
        let mut running = RunningCommand::new(command);
        let result = running.start(&mut drive_context!(self));
        match result {
            Ok(()) => {
                info!(command = %command, position = %self.pose.position(), heading = %self.pose.heading(), "command started");
                self.command = Some(running);
            }
            Err(e) => warn!(command = command.name(), error = %e, "command failed to start"),
        }
    }

    /// Stop the running command (if any) and the motors.
    pub fn stop(&mut self) {
        self.cancel_command();
        if let Err(e) = self.motors.set_powers(WheelPowers::zero()) {
            warn!(motors = self.motors.id(), error = %e, "failed to stop motors");
        }
    }

    fn cancel_command(&mut self) {
        let Some(mut cmd) = self.command.take() else {
            return;
        };
        info!(command = %cmd.command(), "command preempted");
        if let Err(e) = cmd.stop(&mut drive_context!(self)) {
            warn!(command = cmd.command().name(), error = %e, "failed to stop command");
        }
    }

    // ── Vision-assisted alignment ───────────────────────────────────────────

    /// [`align_to_tile_angle_within`](Self::align_to_tile_angle_within) the
    /// configured alignment timeout.
    pub fn align_to_tile_angle(&mut self, target: f64, speed: f64) -> bool {
        self.align_to_tile_angle_within(target, speed, self.config.alignment_timeout())
    }

    /// Rotate so the robot sits `target` degrees off the tile grid.
    ///
    /// Waits up to `timeout` for a detection.  Returns `true` when a
    /// rotation was issued; a missing detection or an implausibly large
    /// correction is skipped.
    pub fn align_to_tile_angle_within(&mut self, target: f64, speed: f64, timeout: Duration) -> bool {
        let Some(offset) = self.wait_for_aggregate(timeout, |o| o.heading_offset) else {
            debug!("tile angle alignment skipped: no heading observation");
            return false;
        };
        let correction = target - offset;
        if correction.abs() >= self.config.max_heading_correction {
            debug!(correction, "tile angle alignment skipped: correction too large");
            return false;
        }
        self.rotate(correction, speed);
        true
    }

    /// [`move_distance_from_tile_edge_within`](Self::move_distance_from_tile_edge_within)
    /// the configured alignment timeout.
    pub fn move_distance_from_tile_edge(&mut self, target: f64, speed: f64) -> bool {
        self.move_distance_from_tile_edge_within(target, speed, self.config.alignment_timeout())
    }

    /// Strafe so the tile edge on the right is `target` tiles from the robot
    /// centre.
    ///
    /// Waits up to `timeout` for a detection.  Returns `true` when a strafe
    /// was issued.
    pub fn move_distance_from_tile_edge_within(&mut self, target: f64, speed: f64, timeout: Duration) -> bool {
        let Some(distance) = self.wait_for_aggregate(timeout, |o| o.distance_right) else {
            debug!("edge distance alignment skipped: no right edge observation");
            return false;
        };
        // Strafe is positive to the left, away from the edge.
        let correction = target - distance;
        if units::tiles_to_inches(correction).abs() >= self.config.max_distance_correction {
            debug!(correction, "edge distance alignment skipped: correction too large");
            return false;
        }
        self.strafe(correction, speed);
        true
    }

    fn wait_for_aggregate(&self, timeout: Duration, field: impl Fn(&Observation) -> Option<f64>) -> Option<f64> {
        let detection = self.detection.as_ref()?;
        if !detection.wait_for_detection(timeout) {
            return None;
        }
        detection.aggregate().as_ref().and_then(field)
    }
}

impl std::fmt::Debug for DriveTrain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriveTrain")
            .field("motors", &self.motors.id())
            .field("imu", &self.imu.id())
            .field("pose", &self.pose)
            .field("mode", &self.mode)
            .field("command", &self.current_command())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use tilenav_hal::clock::{Clock, ManualClock};
    use tilenav_hal::sim::{SimDrive, SimImu};

    fn rig(ticks_per_step: f64) -> (SimDrive, DriveTrain) {
        let sim = SimDrive::new(ticks_per_step);
        let dt = DriveTrain::new(
            Box::new(sim.clone()),
            Box::new(sim.imu()),
            DriveConfig::default(),
        );
        (sim, dt)
    }

    fn run(sim: &SimDrive, dt: &mut DriveTrain, max_cycles: usize) {
        for _ in 0..max_cycles {
            if !dt.is_busy() {
                return;
            }
            dt.update_status();
            sim.step();
        }
        panic!("command still running after {max_cycles} cycles: {:?}", dt.current_command());
    }

    fn detection_with(f: impl FnOnce(&mut Observation)) -> Arc<DetectionState> {
        let mut obs = Observation::empty(Instant::now());
        f(&mut obs);
        let state = Arc::new(DetectionState::new());
        state.publish(Arc::new(obs));
        state
    }

    #[test]
    fn encoder_ticks_advance_pose() {
        let (sim, mut dt) = rig(10.0);
        dt.update_status();
        sim.set_ticks(MotorTicks::uniform(100));
        let status = dt.update_status();
        assert!((status.position.x - 0.5).abs() < 1e-9);
        assert!((status.position.y - (0.5 + 100.0 / 1087.0)).abs() < 1e-9);
        assert_eq!(status.ticks, Some(MotorTicks::uniform(100)));
    }

    #[test]
    fn imu_wrap_is_continuous() {
        let sim = SimDrive::new(10.0);
        let imu = SimImu::new();
        let mut dt = DriveTrain::new(
            Box::new(sim),
            Box::new(imu.clone()),
            DriveConfig::default(),
        );
        imu.set_yaw(179.0);
        dt.update_status();
        imu.set_yaw(181.0);
        let status = dt.update_status();
        assert!((status.heading.value() - 92.0).abs() < 1e-9);
    }

    #[test]
    fn hardware_faults_are_absorbed() {
        let (sim, mut dt) = rig(10.0);
        dt.update_status();
        sim.set_ticks(MotorTicks::uniform(500));
        sim.set_faulted(true);
        let status = dt.update_status();
        assert_eq!(status.ticks, None);
        assert_eq!(status.position, Position::new(0.5, 0.5));

        dt.move_forward(1.0, 1.0);
        assert!(!dt.is_busy());
        dt.drive(1.0, 0.0, 0.0, 1.0);
        dt.stop();
    }

    #[test]
    fn move_forward_reaches_next_tile() {
        let (sim, mut dt) = rig(40.0);
        dt.move_forward(1.0, 1.0);
        assert_eq!(dt.update_status().command, Some("move_forward"));
        run(&sim, &mut dt, 1000);

        let p = dt.position();
        assert!((p.x - 0.5).abs() < 1e-6);
        assert!((p.y - 1.5).abs() < 0.05, "ended at {p}");
        assert!(sim.powers().is_zero());
    }

    #[test]
    fn strafe_right_moves_toward_positive_x() {
        let (sim, mut dt) = rig(40.0);
        dt.strafe(-0.5, 0.8);
        assert_eq!(sim.targets(), MotorTicks::new(-544, 544, 544, -544));
        run(&sim, &mut dt, 1000);
        let p = dt.position();
        assert!((p.x - 1.0).abs() < 0.05, "ended at {p}");
        assert!((p.y - 0.5).abs() < 1e-6);
    }

    #[test]
    fn rotate_turns_linked_chassis() {
        let sim = SimDrive::new(20.0).with_turn_rate(0.05);
        let mut dt = DriveTrain::new(
            Box::new(sim.clone()),
            Box::new(sim.imu()),
            DriveConfig::default(),
        );
        dt.update_status();
        dt.rotate(90.0, 1.0);
        let p = sim.powers();
        assert!(p.front_left < 0.0 && p.front_right > 0.0);
        run(&sim, &mut dt, 2000);
        // One extra step of turn at most before the stop lands.
        assert!((dt.heading().value() - 180.0).abs() < 1.5, "ended at {}", dt.heading());
    }

    #[test]
    fn aligned_move_lands_on_tile_centre() {
        let (sim, mut dt) = rig(40.0);
        dt.move_aligned_to_tile_center(Direction::Y, 1.0, 0.8);
        run(&sim, &mut dt, 1000);
        let p = dt.position();
        assert!((p.x - 0.5).abs() < 1e-6);
        assert!((p.y - 1.5).abs() < 0.05, "ended at {p}");
    }

    #[test]
    fn execute_preempts_running_command() {
        let (_sim, mut dt) = rig(40.0);
        dt.move_forward(2.0, 1.0);
        dt.rotate(45.0, 0.5);
        assert_eq!(
            dt.current_command(),
            Some(MotionCommand::Rotate {
                angle: 45.0,
                speed: 0.5
            })
        );
    }

    #[test]
    fn teleop_cancels_command_and_runs_using_encoders() {
        let (sim, mut dt) = rig(40.0);
        dt.move_forward(2.0, 1.0);
        dt.drive(0.0, 0.0, 1.0, 0.5);
        assert!(!dt.is_busy());
        assert_eq!(sim.mode(), EncoderMode::RunUsingEncoder);
        assert_eq!(sim.powers(), WheelPowers::new(-0.5, 0.5, 0.5, -0.5));

        dt.attempt_driver_relative(0.0, 0.0, 0.0, 1.0);
        assert!(sim.powers().is_zero());
    }

    #[test]
    fn stop_zeroes_motors() {
        let (sim, mut dt) = rig(40.0);
        dt.drive(1.0, 0.0, 0.0, 1.0);
        dt.stop();
        assert!(sim.powers().is_zero());
    }

    #[test]
    fn reset_position_returns_to_start_tile() {
        let (sim, mut dt) = rig(40.0);
        dt.update_status();
        sim.set_ticks(MotorTicks::uniform(2000));
        dt.update_status();
        dt.reset_position();
        assert_eq!(dt.position(), Position::new(0.5, 0.5));
    }

    #[test]
    fn align_to_tile_angle_rotates_by_correction() {
        let (_sim, dt) = rig(40.0);
        let mut dt = dt.with_detection(detection_with(|o| o.heading_offset = Some(5.0)));
        assert!(dt.align_to_tile_angle(0.0, 0.4));
        assert_eq!(
            dt.current_command(),
            Some(MotionCommand::Rotate {
                angle: -5.0,
                speed: 0.4
            })
        );
    }

    #[test]
    fn align_to_tile_angle_skips_large_correction() {
        let (_sim, dt) = rig(40.0);
        let mut dt = dt.with_detection(detection_with(|o| o.heading_offset = Some(50.0)));
        assert!(!dt.align_to_tile_angle(0.0, 0.4));
        assert!(!dt.is_busy());
    }

    #[test]
    fn alignment_times_out_without_detection() {
        let sim = SimDrive::new(10.0);
        let clock = Arc::new(ManualClock::new());
        let mut dt = DriveTrain::new(Box::new(sim.clone()), Box::new(sim.imu()), DriveConfig::default())
            .with_detection(Arc::new(DetectionState::new().with_clock(clock.clone())));

        assert!(!dt.align_to_tile_angle(0.0, 0.4));
        assert_eq!(clock.elapsed(), Duration::from_secs(1));
        assert!(!dt.move_distance_from_tile_edge_within(0.3, 0.4, Duration::from_millis(250)));
        assert_eq!(clock.elapsed(), Duration::from_millis(1250));
    }

    #[test]
    fn stale_detection_is_not_acted_on() {
        let (_sim, dt) = rig(40.0);
        let clock = Arc::new(ManualClock::new());
        let state = Arc::new(DetectionState::new().with_clock(clock.clone()));
        let mut obs = Observation::empty(clock.now());
        obs.heading_offset = Some(7.0);
        obs.distance_right = Some(0.4);
        state.publish(Arc::new(obs));
        let mut dt = dt.with_detection(state);

        clock.advance(Duration::from_secs(10));
        assert!(!dt.align_to_tile_angle_within(0.0, 0.4, Duration::from_secs(1)));
        assert!(!dt.move_distance_from_tile_edge_within(0.3, 0.4, Duration::from_secs(1)));
        assert!(!dt.is_busy());
        assert_eq!(dt.update_status().detection, None);
    }

    #[test]
    fn no_detector_means_no_alignment() {
        let (_sim, mut dt) = rig(40.0);
        assert!(!dt.align_to_tile_angle(0.0, 0.4));
        assert!(!dt.move_distance_from_tile_edge(0.3, 0.4));
    }

    #[test]
    fn move_distance_from_tile_edge_strafes_toward_edge() {
        let (_sim, dt) = rig(40.0);
        let mut dt = dt.with_detection(detection_with(|o| o.distance_right = Some(0.5)));
        assert!(dt.move_distance_from_tile_edge(0.3, 0.6));
        match dt.current_command() {
            Some(MotionCommand::Strafe { distance, speed }) => {
                assert!((distance + 0.2).abs() < 1e-9);
                assert_eq!(speed, 0.6);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn move_distance_from_tile_edge_skips_large_correction() {
        let (_sim, dt) = rig(40.0);
        let mut dt = dt.with_detection(detection_with(|o| o.distance_right = Some(0.9)));
        assert!(!dt.move_distance_from_tile_edge(0.3, 0.6));
        assert!(!dt.is_busy());
    }

    #[test]
    fn status_carries_detection_aggregate() {
        let (_sim, dt) = rig(40.0);
        let mut dt = dt.with_detection(detection_with(|o| o.distance_front = Some(0.25)));
        let status = dt.update_status();
        assert_eq!(status.detection.and_then(|o| o.distance_front), Some(0.25));
        assert!(dt.pose().observation().is_some());
    }
}
