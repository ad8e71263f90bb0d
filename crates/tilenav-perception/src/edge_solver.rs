//! Turns image-space lines into a tile-edge [`Observation`].
//!
//! Lines are projected into the robot frame (origin at the robot centre, +x
//! right, +y forward, tiles) through the camera's calibration points, then
//! classified as front edge (roughly parallel to robot x), right edge
//! (roughly parallel to robot y) or bad.  The first valid line of each class
//! wins; later ones of the same class are reported as unused.
//!
//! # Example
//!
//! ```rust
//! use std::time::Instant;
//! use tilenav_perception::edge_solver::{EdgeSolver, SolverConfig, WebCamDescriptor};
//! use tilenav_types::{Line, Position};
//!
//! // 640×480 camera covering robot x ∈ [0, 16] in, y ∈ [12, 0] in.
//! let camera = WebCamDescriptor::rectangle(640, 480, (0.0, 12.0), (16.0, 0.0));
//! let solver = EdgeSolver::new(camera, SolverConfig::default()).unwrap();
//!
//! // Image-vertical line at x = 480 px → 12 in to the right.
//! let line = Line::new(Position::new(480.0, 0.0), Position::new(480.0, 479.0));
//! let obs = solver.solve(&[line], Instant::now()).unwrap();
//! assert!((obs.distance_right.unwrap() - 0.5).abs() < 1e-9);
//! assert!(obs.distance_front.is_none());
//! ```

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tilenav_types::{HoughParameters, Line, NavError, Observation, Position, units};
use tracing::trace;

// ────────────────────────────────────────────────────────────────────────────
// Camera extrinsics
// ────────────────────────────────────────────────────────────────────────────

/// One pixel ↔ robot-frame correspondence, robot coordinates in inches.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationPoint {
    pub pixel: Position,
    pub robot: Position,
}

impl CalibrationPoint {
    pub fn new(pixel: (f64, f64), robot: (f64, f64)) -> Self {
        Self {
            pixel: Position::new(pixel.0, pixel.1),
            robot: Position::new(robot.0, robot.1),
        }
    }
}

/// Fixed mounting of the edge camera: its resolution and where the image
/// corners land on the floor around the robot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WebCamDescriptor {
    pub width: u32,
    pub height: u32,
    pub top_left: CalibrationPoint,
    pub top_right: CalibrationPoint,
    pub bottom_left: CalibrationPoint,
    pub bottom_right: CalibrationPoint,
}

impl WebCamDescriptor {
    /// A camera whose image boundary maps onto an axis-aligned floor
    /// rectangle from `top_left` to `bottom_right` (robot inches).
    pub fn rectangle(width: u32, height: u32, top_left: (f64, f64), bottom_right: (f64, f64)) -> Self {
        let (w, h) = (width as f64, height as f64);
        let (l, t) = top_left;
        let (r, b) = bottom_right;
        Self {
            width,
            height,
            top_left: CalibrationPoint::new((0.0, 0.0), (l, t)),
            top_right: CalibrationPoint::new((w, 0.0), (r, t)),
            bottom_left: CalibrationPoint::new((0.0, h), (l, b)),
            bottom_right: CalibrationPoint::new((w, h), (r, b)),
        }
    }

    /// Image pixels per inch along image x.
    pub fn horizontal_pixels_per_inch(&self) -> f64 {
        self.width as f64 / (self.top_right.robot.x - self.top_left.robot.x).abs()
    }

    /// Image pixels per inch along image y.
    pub fn vertical_pixels_per_inch(&self) -> f64 {
        self.height as f64 / (self.bottom_left.robot.y - self.top_left.robot.y).abs()
    }

    /// Default detector tuning for image-horizontal lines.
    pub fn horizontal_hough_parameters(&self) -> HoughParameters {
        HoughParameters::horizontal(self.horizontal_pixels_per_inch())
    }

    /// Default detector tuning for image-vertical lines.
    pub fn vertical_hough_parameters(&self) -> HoughParameters {
        HoughParameters::vertical(self.vertical_pixels_per_inch())
    }
}

impl Default for WebCamDescriptor {
    /// A 640×480 camera on the right side, looking down at a 16 × 12 inch
    /// patch that starts at the robot's right edge.
    fn default() -> Self {
        Self::rectangle(640, 480, (8.0, 6.0), (24.0, -6.0))
    }
}

/// Affine pixel → robot-tile map derived from a [`WebCamDescriptor`].
#[derive(Debug, Clone, Copy, PartialEq)]
struct PixelMap {
    origin_pixel: Position,
    origin_robot: Position,
    scale_x: f64,
    scale_y: f64,
}

impl PixelMap {
    fn from_descriptor(d: &WebCamDescriptor) -> Result<Self, NavError> {
        let span = |a: &CalibrationPoint, b: &CalibrationPoint, axis: fn(Position) -> f64| {
            let dp = axis(b.pixel) - axis(a.pixel);
            if dp.abs() < f64::EPSILON {
                return Err(NavError::Config(format!(
                    "calibration points {:?} and {:?} share a pixel coordinate",
                    a.pixel, b.pixel
                )));
            }
            Ok((axis(b.robot) - axis(a.robot)) / dp)
        };
        let x = |p: Position| p.x;
        let y = |p: Position| p.y;

        let scale_x = (span(&d.top_left, &d.top_right, x)? + span(&d.bottom_left, &d.bottom_right, x)?) / 2.0;
        let scale_y = (span(&d.top_left, &d.bottom_left, y)? + span(&d.top_right, &d.bottom_right, y)?) / 2.0;
        if scale_x.abs() < f64::EPSILON || scale_y.abs() < f64::EPSILON {
            return Err(NavError::Config("calibration points collapse onto a line".to_string()));
        }

        Ok(Self {
            origin_pixel: d.top_left.pixel,
            origin_robot: d.top_left.robot,
            scale_x,
            scale_y,
        })
    }

    fn to_robot_tiles(&self, pixel: Position) -> Position {
        let inches_x = self.origin_robot.x + (pixel.x - self.origin_pixel.x) * self.scale_x;
        let inches_y = self.origin_robot.y + (pixel.y - self.origin_pixel.y) * self.scale_y;
        Position::new(
            units::inches(inches_x),
            units::inches(inches_y),
        )
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Solver
// ────────────────────────────────────────────────────────────────────────────

/// Classification tolerances.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// How far (degrees) a projected line may deviate from a tile axis.
    pub angle_tolerance: f64,
    /// Edges further than this (tiles) from the robot centre are rejected.
    pub max_edge_distance: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            angle_tolerance: 20.0,
            max_edge_distance: 1.0,
        }
    }
}

enum Class {
    Front { distance: f64, offset: f64 },
    Right { distance: f64, offset: f64 },
    Bad,
}

/// Geometric solver from image lines to tile-edge distances and heading.
#[derive(Debug, Clone)]
pub struct EdgeSolver {
    map: PixelMap,
    config: SolverConfig,
}

impl EdgeSolver {
    /// # Errors
    ///
    /// Returns [`NavError::Config`] if the calibration points do not span
    /// the image in both directions.
    pub fn new(camera: WebCamDescriptor, config: SolverConfig) -> Result<Self, NavError> {
        Ok(Self {
            map: PixelMap::from_descriptor(&camera)?,
            config,
        })
    }

    pub fn config(&self) -> SolverConfig {
        self.config
    }

    /// Project an image point into the robot frame, tiles.
    pub fn to_robot(&self, pixel: Position) -> Position {
        self.map.to_robot_tiles(pixel)
    }

    /// Solve one frame's lines (most confident first).
    ///
    /// Returns `None` when neither a front nor a right edge was found.
    pub fn solve(&self, lines: &[Line], observed_at: Instant) -> Option<Observation> {
        let mut obs = Observation::empty(observed_at);
        let mut front_offset = None;
        let mut right_offset = None;

        for line in lines {
            match self.classify(line) {
                Class::Front { distance, offset } if obs.observed_front_edge.is_none() => {
                    obs.observed_front_edge = Some(*line);
                    obs.distance_front = Some(distance);
                    front_offset = Some(offset);
                }
                Class::Right { distance, offset } if obs.observed_right_edge.is_none() => {
                    obs.observed_right_edge = Some(*line);
                    obs.distance_right = Some(distance);
                    right_offset = Some(offset);
                }
                Class::Front { .. } | Class::Right { .. } => obs.unused_lines.push(*line),
                Class::Bad => obs.bad_lines.push(*line),
            }
        }

        obs.heading_offset = match (front_offset, right_offset) {
            (Some(f), Some(r)) => Some((f + r) / 2.0),
            (f, r) => f.or(r),
        };

        trace!(
            front = ?obs.distance_front,
            right = ?obs.distance_right,
            heading_offset = ?obs.heading_offset,
            bad = obs.bad_lines.len(),
            unused = obs.unused_lines.len(),
            "solved edge lines"
        );

        if obs.observed_front_edge.is_none() && obs.observed_right_edge.is_none() {
            return None;
        }
        Some(obs)
    }

    fn classify(&self, line: &Line) -> Class {
        let projected = line.map(|p| self.map.to_robot_tiles(p));
        if projected.length() < f64::EPSILON {
            return Class::Bad;
        }

        let angle = projected.angle();
        let foot = projected.foot_of_perpendicular(Position::new(0.0, 0.0));
        let reach = foot.x.hypot(foot.y);
        let tolerance = self.config.angle_tolerance;

        if angle.abs() <= tolerance {
            let distance = reach.copysign(foot.y);
            if self.in_range(distance) {
                return Class::Front {
                    distance,
                    offset: -angle,
                };
            }
        } else if 90.0 - angle.abs() <= tolerance {
            let distance = reach.copysign(foot.x);
            let deviation = if angle > 0.0 { angle - 90.0 } else { angle + 90.0 };
            if self.in_range(distance) {
                return Class::Right {
                    distance,
                    offset: -deviation,
                };
            }
        }
        Class::Bad
    }

    fn in_range(&self, distance: f64) -> bool {
        distance > 0.0 && distance <= self.config.max_edge_distance
    }
}
