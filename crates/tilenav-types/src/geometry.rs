//! Field geometry in tile units.
//!
//! The field frame has +x to the right and +y away from the driver; headings
//! are measured counter-clockwise from +x, so a robot at heading 90° faces +y.
//!
//! # Example
//!
//! ```rust
//! use tilenav_types::geometry::{Heading, Position, Vector2};
//!
//! let p = Position::new(0.5, 0.5).add(Vector2::new(1.2, 0.0));
//! assert!((p.align_to_tile_middle().x - 1.5).abs() < 1e-9);
//!
//! let h = Heading::new(350.0).add(20.0);
//! assert!((h.value() - 10.0).abs() < 1e-9);
//! assert!((h.delta(Heading::new(350.0)) - 20.0).abs() < 1e-9);
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

// ────────────────────────────────────────────────────────────────────────────
// Vector2
// ────────────────────────────────────────────────────────────────────────────

/// A free 2-D vector (displacement, velocity, joystick deflection, …).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector2 {
    pub x: f64,
    pub y: f64,
}

impl Vector2 {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn zero() -> Self {
        Self::new(0.0, 0.0)
    }

    pub fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }

    pub fn multiply(self, factor: f64) -> Self {
        Self::new(self.x * factor, self.y * factor)
    }

    pub fn dot(self, rhs: Self) -> f64 {
        self.x * rhs.x + self.y * rhs.y
    }

    pub fn magnitude(self) -> f64 {
        self.x.hypot(self.y)
    }

    /// Rotate counter-clockwise by `degrees`.
    pub fn rotate(self, degrees: f64) -> Self {
        let (sin, cos) = degrees.to_radians().sin_cos();
        Self::new(self.x * cos - self.y * sin, self.x * sin + self.y * cos)
    }

    /// The direction this vector points in, as a [`Heading`].
    ///
    /// The zero vector points along 0°.
    pub fn to_heading(self) -> Heading {
        Heading::new(self.y.atan2(self.x).to_degrees())
    }
}

impl fmt::Display for Vector2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let p = f.precision().unwrap_or(3);
        write!(f, "<{:.*}, {:.*}>", p, self.x, p, self.y)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Position
// ────────────────────────────────────────────────────────────────────────────

/// A point in the fixed field frame, in tiles.
///
/// Tile centres sit at half-integer coordinates: the robot starts in the
/// middle of the corner tile at `(0.5, 0.5)`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn add(self, offset: Vector2) -> Self {
        Self::new(self.x + offset.x, self.y + offset.y)
    }

    /// The vector pointing from `other` to `self`.
    pub fn minus(self, other: Position) -> Vector2 {
        Vector2::new(self.x - other.x, self.y - other.y)
    }

    /// Euclidean distance to `other`.
    pub fn distance(self, other: Position) -> f64 {
        self.minus(other).magnitude()
    }

    /// Distance from this point to the segment `a`–`b`.
    ///
    /// A degenerate segment (`a == b`) is treated as the single point `a`.
    pub fn distance_to_line(self, a: Position, b: Position) -> f64 {
        let ab = b.minus(a);
        let len_sq = ab.dot(ab);
        if len_sq <= f64::EPSILON {
            return self.distance(a);
        }
        let t = (self.minus(a).dot(ab) / len_sq).clamp(0.0, 1.0);
        self.distance(a.add(ab.multiply(t)))
    }

    /// Snap both coordinates to the centre of the tile containing them.
    pub fn align_to_tile_middle(self) -> Self {
        Self::new(self.x.floor() + 0.5, self.y.floor() + 0.5)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let p = f.precision().unwrap_or(3);
        write!(f, "({:.*}, {:.*})", p, self.x, p, self.y)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Heading
// ────────────────────────────────────────────────────────────────────────────

/// An angle in degrees, always normalised into `[0, 360)`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "f64", into = "f64")]
pub struct Heading(f64);

impl Heading {
    pub fn new(degrees: f64) -> Self {
        Self(normalize_degrees(degrees))
    }

    /// The normalised angle in degrees.
    pub fn value(self) -> f64 {
        self.0
    }

    /// Rotate by `delta` degrees (positive is counter-clockwise).
    pub fn add(self, delta: f64) -> Self {
        Self::new(self.0 + delta)
    }

    /// Signed shortest rotation from `other` to `self`, in `(-180, 180]`.
    pub fn delta(self, other: Heading) -> f64 {
        let d = normalize_degrees(self.0 - other.0);
        if d > 180.0 { d - 360.0 } else { d }
    }

    /// Round to the nearest multiple of 90°; exact halfway values round up
    /// (45° becomes 90°, 135° becomes 180°).
    pub fn align_to_right_angle(self) -> Self {
        Self::new(((self.0 / 90.0) + 0.5).floor() * 90.0)
    }
}

impl From<f64> for Heading {
    fn from(degrees: f64) -> Self {
        Heading::new(degrees)
    }
}

impl From<Heading> for f64 {
    fn from(heading: Heading) -> Self {
        heading.0
    }
}

impl fmt::Display for Heading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let p = f.precision().unwrap_or(1);
        write!(f, "{:.*}°", p, self.0)
    }
}

fn normalize_degrees(degrees: f64) -> f64 {
    let d = degrees.rem_euclid(360.0);
    // rem_euclid can round tiny negative inputs up to exactly 360.
    if d >= 360.0 { 0.0 } else { d }
}

// ────────────────────────────────────────────────────────────────────────────
// Line
// ────────────────────────────────────────────────────────────────────────────

/// A line given by two points on it.
///
/// Used both for image-space lines (pixels) and projected field lines
/// (tiles); the frame is whatever the producer worked in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Line {
    pub p0: Position,
    pub p1: Position,
}

impl Line {
    pub fn new(p0: Position, p1: Position) -> Self {
        Self { p0, p1 }
    }

    pub fn direction(&self) -> Vector2 {
        self.p1.minus(self.p0)
    }

    pub fn length(&self) -> f64 {
        self.direction().magnitude()
    }

    /// Direction angle of the line folded into `(-90, 90]` degrees.
    ///
    /// Lines have no orientation, so `p0→p1` and `p1→p0` give the same value.
    pub fn angle(&self) -> f64 {
        let d = self.direction();
        let mut a = d.y.atan2(d.x).to_degrees();
        if a > 90.0 {
            a -= 180.0;
        } else if a <= -90.0 {
            a += 180.0;
        }
        a
    }

    /// The point on the (infinite) line closest to `point`.
    ///
    /// A degenerate line returns `p0`.
    pub fn foot_of_perpendicular(&self, point: Position) -> Position {
        let d = self.direction();
        let len_sq = d.dot(d);
        if len_sq <= f64::EPSILON {
            return self.p0;
        }
        let t = point.minus(self.p0).dot(d) / len_sq;
        self.p0.add(d.multiply(t))
    }

    /// Apply `f` to both endpoints.
    pub fn map(&self, f: impl Fn(Position) -> Position) -> Line {
        Line::new(f(self.p0), f(self.p1))
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}–{}", self.p0, self.p1)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
