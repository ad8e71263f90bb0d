//! In-process simulated hardware for tests and the demo binary.
//!
//! [`SimDrive`] records every command and integrates wheel ticks and chassis
//! yaw on each [`SimDrive::step`]; [`SimImu`] reports that yaw wrapped into
//! `(-180, 180]` like a real IMU; [`SimCamera`] replays queued frames.  All
//! three are cheap handles over shared state, so a test can keep a clone
//! after boxing one into the drive train and inspect what was commanded.
//!
//! # Example
//!
//! ```rust
//! use tilenav_hal::motor::DriveMotors;
//! use tilenav_hal::sim::SimDrive;
//! use tilenav_types::WheelPowers;
//!
//! let drive = SimDrive::new(10.0);
//! let mut boxed: Box<dyn DriveMotors> = Box::new(drive.clone());
//! boxed.set_powers(WheelPowers::uniform(0.5)).expect("sim never fails");
//! drive.step();
//! assert_eq!(boxed.ticks().unwrap().front_left, 5);
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use tilenav_types::{EncoderMode, MotorTicks, NavError, Orientation, WheelPowers};

use crate::camera::{Camera, CameraFrame};
use crate::imu::Imu;
use crate::motor::DriveMotors;

// ────────────────────────────────────────────────────────────────────────────
// Shared chassis state
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct ChassisState {
    powers: WheelPowers,
    mode: EncoderMode,
    targets: MotorTicks,
    // back_left, back_right, front_left, front_right
    ticks: [f64; 4],
    yaw: f64,
    faulted: bool,
    mode_history: Vec<EncoderMode>,
}

impl Default for ChassisState {
    fn default() -> Self {
        Self {
            powers: WheelPowers::zero(),
            mode: EncoderMode::RunUsingEncoder,
            targets: MotorTicks::default(),
            ticks: [0.0; 4],
            yaw: 0.0,
            faulted: false,
            mode_history: Vec::new(),
        }
    }
}

impl ChassisState {
    fn motor_ticks(&self) -> MotorTicks {
        MotorTicks::new(
            self.ticks[0].round() as i32,
            self.ticks[1].round() as i32,
            self.ticks[2].round() as i32,
            self.ticks[3].round() as i32,
        )
    }
}

fn lock(state: &Mutex<ChassisState>) -> MutexGuard<'_, ChassisState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

fn wrap_half_turn(degrees: f64) -> f64 {
    let mut d = degrees.rem_euclid(360.0);
    if d > 180.0 {
        d -= 360.0;
    }
    d
}

// ────────────────────────────────────────────────────────────────────────────
// SimDrive
// ────────────────────────────────────────────────────────────────────────────

/// A simulated four-wheel drive.
///
/// `ticks_per_step` is how far a wheel at full power turns in one
/// [`SimDrive::step`].  Yaw changes by `degrees_per_tick` for every tick of
/// right-minus-left wheel difference (halved), counter-clockwise positive.
#[derive(Debug, Clone)]
pub struct SimDrive {
    state: Arc<Mutex<ChassisState>>,
    ticks_per_step: f64,
    degrees_per_tick: f64,
}

impl SimDrive {
    pub fn new(ticks_per_step: f64) -> Self {
        Self {
            state: Arc::new(Mutex::new(ChassisState::default())),
            ticks_per_step,
            degrees_per_tick: 0.0,
        }
    }

    /// Couple wheel differential to chassis yaw.
    pub fn with_turn_rate(mut self, degrees_per_tick: f64) -> Self {
        self.degrees_per_tick = degrees_per_tick;
        self
    }

    /// An IMU reading this chassis' yaw.
    pub fn imu(&self) -> SimImu {
        SimImu {
            state: Arc::clone(&self.state),
        }
    }

    /// Advance the simulation by one control period.
    pub fn step(&self) {
        let mut s = lock(&self.state);
        let p = s.powers;
        // back_left, back_right, front_left, front_right
        let powers = [p.back_left, p.back_right, p.front_left, p.front_right];
        let targets = [
            s.targets.back_left,
            s.targets.back_right,
            s.targets.front_left,
            s.targets.front_right,
        ];
        let before = s.ticks;

        match s.mode {
            EncoderMode::RunUsingEncoder | EncoderMode::RunWithoutEncoder => {
                for (tick, power) in s.ticks.iter_mut().zip(powers) {
                    *tick += power.clamp(-1.0, 1.0) * self.ticks_per_step;
                }
            }
            EncoderMode::RunToPosition => {
                for ((tick, power), target) in s.ticks.iter_mut().zip(powers).zip(targets) {
                    let remaining = target as f64 - *tick;
                    let max_move = power.abs().min(1.0) * self.ticks_per_step;
                    *tick += remaining.clamp(-max_move, max_move);
                }
            }
            EncoderMode::StopAndResetEncoder => {}
        }

        let d: Vec<f64> = s.ticks.iter().zip(before).map(|(a, b)| a - b).collect();
        let left = (d[0] + d[2]) / 2.0;
        let right = (d[1] + d[3]) / 2.0;
        s.yaw += (right - left) / 2.0 * self.degrees_per_tick;
    }

    /// Overwrite the encoder counts (e.g. to script an odometry sequence).
    pub fn set_ticks(&self, ticks: MotorTicks) {
        let mut s = lock(&self.state);
        s.ticks = [
            ticks.back_left as f64,
            ticks.back_right as f64,
            ticks.front_left as f64,
            ticks.front_right as f64,
        ];
    }

    /// Make every subsequent call fail with a hardware fault until cleared.
    pub fn set_faulted(&self, faulted: bool) {
        lock(&self.state).faulted = faulted;
    }

    /// The most recently commanded wheel powers.
    pub fn powers(&self) -> WheelPowers {
        lock(&self.state).powers
    }

    /// The current encoder mode.
    pub fn mode(&self) -> EncoderMode {
        lock(&self.state).mode
    }

    /// Every mode change, oldest first.
    pub fn mode_history(&self) -> Vec<EncoderMode> {
        lock(&self.state).mode_history.clone()
    }

    /// The most recently commanded run-to-position targets.
    pub fn targets(&self) -> MotorTicks {
        lock(&self.state).targets
    }

    /// The current encoder counts.
    pub fn current_ticks(&self) -> MotorTicks {
        lock(&self.state).motor_ticks()
    }

    fn check(&self, s: &ChassisState) -> Result<(), NavError> {
        if s.faulted {
            Err(NavError::hardware("sim_drive", "simulated fault"))
        } else {
            Ok(())
        }
    }
}

impl DriveMotors for SimDrive {
    fn id(&self) -> &str {
        "sim_drive"
    }

    fn set_powers(&mut self, powers: WheelPowers) -> Result<(), NavError> {
        let mut s = lock(&self.state);
        self.check(&s)?;
        s.powers = powers;
        Ok(())
    }

    fn set_mode(&mut self, mode: EncoderMode) -> Result<(), NavError> {
        let mut s = lock(&self.state);
        self.check(&s)?;
        if mode == EncoderMode::StopAndResetEncoder {
            s.ticks = [0.0; 4];
        }
        s.mode = mode;
        s.mode_history.push(mode);
        Ok(())
    }

    fn set_target_ticks(&mut self, targets: MotorTicks) -> Result<(), NavError> {
        let mut s = lock(&self.state);
        self.check(&s)?;
        s.targets = targets;
        Ok(())
    }

    fn ticks(&mut self) -> Result<MotorTicks, NavError> {
        let s = lock(&self.state);
        self.check(&s)?;
        Ok(s.motor_ticks())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SimImu
// ────────────────────────────────────────────────────────────────────────────

/// A simulated IMU.
///
/// Either linked to a [`SimDrive`] via [`SimDrive::imu`], or standalone
/// ([`SimImu::new`]) with its yaw scripted through [`SimImu::set_yaw`].
#[derive(Debug, Clone)]
pub struct SimImu {
    state: Arc<Mutex<ChassisState>>,
}

impl SimImu {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ChassisState::default())),
        }
    }

    /// Set the accumulated yaw in degrees (reported wrapped).
    pub fn set_yaw(&self, degrees: f64) {
        lock(&self.state).yaw = degrees;
    }
}

impl Default for SimImu {
    fn default() -> Self {
        Self::new()
    }
}

impl Imu for SimImu {
    fn id(&self) -> &str {
        "sim_imu"
    }

    fn orientation(&mut self) -> Result<Orientation, NavError> {
        let s = lock(&self.state);
        Ok(Orientation::yaw(wrap_half_turn(s.yaw)))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SimCamera
// ────────────────────────────────────────────────────────────────────────────

/// A simulated camera that replays queued frames, then blank ones.
#[derive(Debug, Clone)]
pub struct SimCamera {
    id: String,
    width: u32,
    height: u32,
    frames: Arc<Mutex<VecDeque<CameraFrame>>>,
}

impl SimCamera {
    pub fn new(id: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            id: id.into(),
            width,
            height,
            frames: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// Queue a frame to be returned by a later [`Camera::capture`].
    pub fn push_frame(&self, frame: CameraFrame) {
        self.frames
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(frame);
    }
}

impl Camera for SimCamera {
    fn id(&self) -> &str {
        &self.id
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn capture(&mut self) -> Result<CameraFrame, NavError> {
        let queued = self
            .frames
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        Ok(queued.unwrap_or_else(|| CameraFrame::filled(self.width, self.height, 0)))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Synthetic frames
// ────────────────────────────────────────────────────────────────────────────

/// Paint a one-pixel-wide line from `from` to `to` (pixel coordinates) with
/// luminance `value`.  Parts outside the frame are clipped.
pub fn draw_line(frame: &mut CameraFrame, from: (f64, f64), to: (f64, f64), value: u8) {
    let (dx, dy) = (to.0 - from.0, to.1 - from.1);
    let steps = dx.abs().max(dy.abs()).ceil().max(1.0) as usize;
    for i in 0..=steps {
        let t = i as f64 / steps as f64;
        let x = (from.0 + dx * t).round();
        let y = (from.1 + dy * t).round();
        if x >= 0.0 && y >= 0.0 {
            frame.set_pixel(x as u32, y as u32, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_using_encoder_integrates_power() {
        let drive = SimDrive::new(100.0);
        let mut motors = drive.clone();
        motors
            .set_powers(WheelPowers::new(1.0, 0.5, -0.5, 0.0))
            .unwrap();
        drive.step();
        drive.step();
        let t = motors.ticks().unwrap();
        assert_eq!(t.front_left, 200);
        assert_eq!(t.front_right, 100);
        assert_eq!(t.back_left, -100);
        assert_eq!(t.back_right, 0);
    }

    #[test]
    fn run_to_position_stops_at_target() {
        let drive = SimDrive::new(100.0);
        let mut motors = drive.clone();
        motors.set_target_ticks(MotorTicks::uniform(250)).unwrap();
        motors.set_mode(EncoderMode::RunToPosition).unwrap();
        motors.set_powers(WheelPowers::uniform(1.0)).unwrap();
        for _ in 0..5 {
            drive.step();
        }
        assert_eq!(motors.ticks().unwrap(), MotorTicks::uniform(250));
    }

    #[test]
    fn run_to_position_moves_backwards_for_negative_targets() {
        let drive = SimDrive::new(10.0);
        let mut motors = drive.clone();
        motors
            .set_target_ticks(MotorTicks::new(30, -30, -30, 30))
            .unwrap();
        motors.set_mode(EncoderMode::RunToPosition).unwrap();
        motors.set_powers(WheelPowers::uniform(0.5)).unwrap();
        drive.step();
        assert_eq!(motors.ticks().unwrap(), MotorTicks::new(5, -5, -5, 5));
    }

    #[test]
    fn stop_and_reset_zeroes_ticks() {
        let drive = SimDrive::new(10.0);
        drive.set_ticks(MotorTicks::uniform(42));
        let mut motors = drive.clone();
        motors.set_mode(EncoderMode::StopAndResetEncoder).unwrap();
        assert_eq!(drive.current_ticks(), MotorTicks::default());
        assert_eq!(drive.mode_history(), vec![EncoderMode::StopAndResetEncoder]);
    }

    #[test]
    fn faulted_drive_reports_hardware_fault() {
        let drive = SimDrive::new(10.0);
        drive.set_faulted(true);
        let mut motors = drive.clone();
        assert!(matches!(
            motors.ticks(),
            Err(NavError::HardwareFault { .. })
        ));
        drive.set_faulted(false);
        assert!(motors.ticks().is_ok());
    }

    #[test]
    fn linked_imu_tracks_turning_and_wraps() {
        let drive = SimDrive::new(100.0).with_turn_rate(1.0);
        let mut imu = drive.imu();
        let mut motors = drive.clone();
        // Right side forward, left side back: counter-clockwise.
        motors
            .set_powers(WheelPowers::new(-1.0, 1.0, -1.0, 1.0))
            .unwrap();
        drive.step();
        assert!((imu.orientation().unwrap().first_angle - 100.0).abs() < 1e-9);
        drive.step();
        // 200° accumulated is reported as -160°.
        assert!((imu.orientation().unwrap().first_angle + 160.0).abs() < 1e-9);
    }

    #[test]
    fn standalone_imu_reports_scripted_yaw() {
        let sim = SimImu::new();
        let mut imu = sim.clone();
        sim.set_yaw(-179.0);
        assert!((imu.orientation().unwrap().first_angle + 179.0).abs() < 1e-9);
        sim.set_yaw(181.0);
        assert!((imu.orientation().unwrap().first_angle + 179.0).abs() < 1e-9);
    }

    #[test]
    fn sim_camera_replays_then_blanks() {
        let cam = SimCamera::new("side", 4, 3);
        cam.push_frame(CameraFrame::filled(4, 3, 7));
        let mut c = cam.clone();
        assert_eq!(c.capture().unwrap().pixel(0, 0), Some(7));
        assert_eq!(c.capture().unwrap().pixel(0, 0), Some(0));
        assert_eq!(c.resolution(), (4, 3));
    }

    #[test]
    fn draw_line_paints_and_clips() {
        let mut frame = CameraFrame::filled(10, 10, 0);
        draw_line(&mut frame, (-5.0, 4.0), (20.0, 4.0), 255);
        for x in 0..10 {
            assert_eq!(frame.pixel(x, 4), Some(255));
        }
        assert_eq!(frame.pixel(0, 3), Some(0));
    }
}
