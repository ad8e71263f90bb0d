//! Mecanum kinematics for an X-pattern chassis.
//!
//! Conventions: drive positive is forward, strafe positive is to the left,
//! turn positive is counter-clockwise.  Field headings are measured
//! counter-clockwise from +x, so a robot at 90° faces +y.
//!
//! # Example
//!
//! ```rust
//! use tilenav_drive::kinematics::Kinematics;
//! use tilenav_types::{Heading, MotorTicks};
//!
//! let kin = Kinematics::default();
//! // Every wheel turned one tile's worth of ticks while facing +y.
//! let moved = kin.forward(&MotorTicks::uniform(1087), Heading::new(90.0));
//! assert!(moved.x.abs() < 1e-9);
//! assert!((moved.y - 1.0).abs() < 1e-9);
//! ```

use serde::{Deserialize, Serialize};
use tilenav_types::{Heading, MotorTicks, Position, Vector2, WheelPowers};

/// Encoder ticks per 24-inch tile: 537.7 ticks/rev on a 96 mm wheel.
pub const DEFAULT_TICKS_PER_TILE: f64 = 1087.0;

/// Chassis geometry needed to convert between wheel ticks and field motion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Kinematics {
    pub ticks_per_tile: f64,
}

impl Default for Kinematics {
    fn default() -> Self {
        Self::new(DEFAULT_TICKS_PER_TILE)
    }
}

impl Kinematics {
    pub fn new(ticks_per_tile: f64) -> Self {
        Self { ticks_per_tile }
    }

    /// Field-frame displacement (tiles) for per-wheel tick `deltas` while
    /// facing `heading`.
    pub fn forward(&self, deltas: &MotorTicks, heading: Heading) -> Vector2 {
        let fl = deltas.front_left as f64;
        let fr = deltas.front_right as f64;
        let bl = deltas.back_left as f64;
        let br = deltas.back_right as f64;

        let forward = (fl + fr + bl + br) / 4.0 / self.ticks_per_tile;
        let left = (-fl + fr + bl - br) / 4.0 / self.ticks_per_tile;
        robot_to_field(forward, left, heading)
    }

    /// Wheel powers for teleop-style `drive`, `turn` and `strafe` inputs.
    ///
    /// The mix is normalised so no wheel exceeds 1, then scaled by `speed`.
    pub fn mix(&self, drive: f64, turn: f64, strafe: f64, speed: f64) -> WheelPowers {
        WheelPowers::new(
            drive - turn - strafe,
            drive + turn + strafe,
            drive - turn + strafe,
            drive + turn - strafe,
        )
        .normalized()
        .scale(speed)
    }

    /// Wheel powers for joystick inputs given relative to the driver, who
    /// faces +y, rather than to the robot.
    pub fn driver_relative(&self, drive: f64, turn: f64, strafe: f64, speed: f64, heading: Heading) -> WheelPowers {
        let stick = Vector2::new(-strafe, drive);
        let magnitude = stick.magnitude().min(1.0);
        // Direction in the robot frame, measured from the robot's right side.
        let angle = (stick.y.atan2(stick.x).to_degrees() - heading.value() + 90.0).to_radians();
        let quarter = std::f64::consts::FRAC_PI_4;
        let flbr = magnitude * (angle + quarter).sin();
        let frbl = magnitude * (angle - quarter).sin();

        WheelPowers::new(flbr - turn, frbl + turn, frbl - turn, flbr + turn)
            .normalized()
            .scale(speed)
    }

    /// Closed-loop wheel powers steering from the current pose toward
    /// `target` at `target_heading`.
    ///
    /// Translation is a unit vector toward the target in the robot frame;
    /// the turn term is the heading error over 90°, clamped to ±1.  The
    /// result is scaled so its largest wheel runs at `speed`.
    pub fn target_powers(
        &self,
        position: Position,
        heading: Heading,
        target: Position,
        target_heading: Heading,
        speed: f64,
    ) -> WheelPowers {
        let error = target.minus(position);
        let (forward, left) = field_to_robot(error, heading);
        let reach = forward.hypot(left);
        let (drive, strafe) = if reach > f64::EPSILON {
            (forward / reach, left / reach)
        } else {
            (0.0, 0.0)
        };
        let turn = (target_heading.delta(heading) / 90.0).clamp(-1.0, 1.0);

        let raw = WheelPowers::new(
            drive - turn - strafe,
            drive + turn + strafe,
            drive - turn + strafe,
            drive + turn - strafe,
        );
        let max = raw.max_magnitude();
        if max > f64::EPSILON {
            raw.scale(speed / max)
        } else {
            WheelPowers::zero()
        }
    }
}

fn robot_to_field(forward: f64, left: f64, heading: Heading) -> Vector2 {
    let (sin, cos) = heading.value().to_radians().sin_cos();
    Vector2::new(forward * cos - left * sin, forward * sin + left * cos)
}

fn field_to_robot(v: Vector2, heading: Heading) -> (f64, f64) {
    let (sin, cos) = heading.value().to_radians().sin_cos();
    (v.x * cos + v.y * sin, -v.x * sin + v.y * cos)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < EPS
    }

    fn assert_powers(p: WheelPowers, fl: f64, fr: f64, bl: f64, br: f64) {
        assert!(
            close(p.front_left, fl) && close(p.front_right, fr) && close(p.back_left, bl) && close(p.back_right, br),
            "got {p}, expected FL {fl} FR {fr} BL {bl} BR {br}"
        );
    }

    #[test]
    fn forward_ticks_move_along_heading() {
        let kin = Kinematics::new(100.0);
        let v = kin.forward(&MotorTicks::uniform(100), Heading::new(0.0));
        assert!(close(v.x, 1.0) && close(v.y, 0.0));

        let v = kin.forward(&MotorTicks::uniform(-50), Heading::new(90.0));
        assert!(close(v.x, 0.0) && close(v.y, -0.5));
    }

    #[test]
    fn strafe_left_ticks_move_left_of_heading() {
        let kin = Kinematics::new(100.0);
        // fl -, fr +, bl +, br -
        let deltas = MotorTicks::new(100, -100, -100, 100);
        let v = kin.forward(&deltas, Heading::new(90.0));
        assert!(close(v.x, -1.0) && close(v.y, 0.0), "{v}");
    }

    #[test]
    fn spin_in_place_does_not_translate() {
        let kin = Kinematics::new(100.0);
        let deltas = MotorTicks::new(-40, 40, -40, 40);
        let v = kin.forward(&deltas, Heading::new(33.0));
        assert!(v.magnitude() < EPS);
    }

    #[test]
    fn mix_matches_wheel_pattern() {
        let kin = Kinematics::default();
        assert_powers(kin.mix(1.0, 0.0, 0.0, 0.5), 0.5, 0.5, 0.5, 0.5);
        assert_powers(kin.mix(0.0, 1.0, 0.0, 1.0), -1.0, 1.0, -1.0, 1.0);
        assert_powers(kin.mix(0.0, 0.0, 1.0, 1.0), -1.0, 1.0, 1.0, -1.0);
    }

    #[test]
    fn mix_normalises_before_scaling() {
        let kin = Kinematics::default();
        let p = kin.mix(1.0, 1.0, 0.0, 0.8);
        assert!(close(p.max_magnitude(), 0.8));
        assert!(close(p.front_left, 0.0));
        assert!(close(p.front_right, 0.8));
    }

    #[test]
    fn driver_relative_matches_robot_relative_when_facing_away() {
        let kin = Kinematics::default();
        let p = kin.driver_relative(1.0, 0.0, 0.0, 1.0, Heading::new(90.0));
        let s = std::f64::consts::FRAC_1_SQRT_2;
        assert_powers(p, s, s, s, s);
    }

    #[test]
    fn driver_relative_forward_becomes_strafe_when_facing_right() {
        let kin = Kinematics::default();
        // Robot faces +x; pushing away from the driver (+y) is robot-left.
        let p = kin.driver_relative(1.0, 0.0, 0.0, 1.0, Heading::new(0.0));
        assert!(p.front_left < 0.0 && p.back_right < 0.0);
        assert!(p.front_right > 0.0 && p.back_left > 0.0);
        assert!(close(p.front_left, -p.front_right));
    }

    #[test]
    fn driver_relative_adds_turn_and_normalises() {
        let kin = Kinematics::default();
        let p = kin.driver_relative(1.0, 1.0, 0.0, 0.5, Heading::new(90.0));
        assert!(close(p.max_magnitude(), 0.5));
        assert!(p.front_right > p.front_left);

        let idle = kin.driver_relative(0.0, 0.0, 0.0, 1.0, Heading::new(45.0));
        assert!(idle.is_zero());
    }

    #[test]
    fn target_powers_drive_straight_ahead() {
        let kin = Kinematics::default();
        let p = kin.target_powers(
            Position::new(0.5, 0.5),
            Heading::new(90.0),
            Position::new(0.5, 2.5),
            Heading::new(90.0),
            0.6,
        );
        assert_powers(p, 0.6, 0.6, 0.6, 0.6);
    }

    #[test]
    fn target_powers_strafe_toward_side_target() {
        let kin = Kinematics::default();
        // Facing +y, target on +x: robot must strafe right (strafe negative).
        let p = kin.target_powers(
            Position::new(0.5, 0.5),
            Heading::new(90.0),
            Position::new(1.5, 0.5),
            Heading::new(90.0),
            1.0,
        );
        assert_powers(p, 1.0, -1.0, -1.0, 1.0);
    }

    #[test]
    fn target_powers_turn_only_when_on_target() {
        let kin = Kinematics::default();
        let p = kin.target_powers(
            Position::new(1.5, 1.5),
            Heading::new(80.0),
            Position::new(1.5, 1.5),
            Heading::new(90.0),
            0.4,
        );
        assert_powers(p, -0.4, 0.4, -0.4, 0.4);

        let idle = kin.target_powers(
            Position::new(1.5, 1.5),
            Heading::new(90.0),
            Position::new(1.5, 1.5),
            Heading::new(90.0),
            0.4,
        );
        assert!(idle.is_zero());
    }
}
