//! Hough line detector restricted to an angular band.
//!
//! Each edge pixel (Sobel gradient magnitude above a threshold) votes into a
//! `(rho, theta)` accumulator with `rho = x·cosθ + y·sinθ`, θ in whole
//! degrees over `[min_theta, max_theta]`.  Cells with at least
//! `pixel_voter_threshold` votes are candidates; near-duplicates (within both
//! the rho and theta thresholds of a stronger line) are suppressed.
//!
//! Image coordinates have y pointing down, so θ = 90° is an image-horizontal
//! line at `y = rho` and θ = 0° an image-vertical line at `x = rho`.
//!
//! # Example
//!
//! ```rust
//! use tilenav_hal::camera::CameraFrame;
//! use tilenav_hal::sim::draw_line;
//! use tilenav_perception::hough::LineDetector;
//! use tilenav_types::HoughParameters;
//!
//! let mut frame = CameraFrame::filled(80, 60, 0);
//! draw_line(&mut frame, (0.0, 30.0), (79.0, 30.0), 255);
//!
//! let detector = LineDetector::new(HoughParameters {
//!     pixel_voter_threshold: 50,
//!     ..HoughParameters::horizontal(4.0)
//! });
//! let lines = detector.detect_lines(&frame);
//! assert_eq!(lines.len(), 1);
//! assert_eq!(lines[0].theta, 90.0);
//! ```

use std::sync::{Arc, RwLock};

use tilenav_hal::camera::CameraFrame;
use tilenav_types::{HoughParameters, Line, Position};

/// Live-tunable parameters shared between a detector and whoever tunes it.
pub type SharedHoughParameters = Arc<RwLock<HoughParameters>>;

/// Default Sobel magnitude above which a pixel counts as an edge.
pub const DEFAULT_GRADIENT_THRESHOLD: u32 = 128;

/// Any 360 consecutive whole degrees already cover every line orientation.
const MAX_BAND_DEGREES: i32 = 360;

const SOBEL_GX: [[i32; 3]; 3] = [[-1, 0, 1], [-2, 0, 2], [-1, 0, 1]];
const SOBEL_GY: [[i32; 3]; 3] = [[-1, -2, -1], [0, 0, 0], [1, 2, 1]];

/// A detected line in polar form.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HoughLine {
    /// Signed distance from the image origin, pixels.
    pub rho: f64,
    /// Angle of the line normal, degrees.
    pub theta: f64,
    /// Accumulator votes behind this line.
    pub votes: u32,
}

impl HoughLine {
    /// Two-point form spanning at least the whole `width × height` image.
    pub fn to_line(&self, width: u32, height: u32) -> Line {
        let (sin, cos) = self.theta.to_radians().sin_cos();
        let foot = Position::new(self.rho * cos, self.rho * sin);
        let reach = (width as f64).hypot(height as f64);
        Line::new(
            Position::new(foot.x + reach * sin, foot.y - reach * cos),
            Position::new(foot.x - reach * sin, foot.y + reach * cos),
        )
    }
}

/// A Hough line detector for one angular band.
#[derive(Debug, Clone)]
pub struct LineDetector {
    parameters: SharedHoughParameters,
    gradient_threshold: u32,
}

impl LineDetector {
    pub fn new(parameters: HoughParameters) -> Self {
        Self::with_shared(Arc::new(RwLock::new(parameters)))
    }

    /// Build a detector reading its parameters from an existing handle.
    pub fn with_shared(parameters: SharedHoughParameters) -> Self {
        Self {
            parameters,
            gradient_threshold: DEFAULT_GRADIENT_THRESHOLD,
        }
    }

    pub fn with_gradient_threshold(mut self, threshold: u32) -> Self {
        self.gradient_threshold = threshold;
        self
    }

    /// A snapshot of the current parameters.
    pub fn parameters(&self) -> HoughParameters {
        *self.parameters.read().unwrap_or_else(|e| e.into_inner())
    }

    /// The shared handle; writes through it apply from the next frame on.
    pub fn parameters_handle(&self) -> SharedHoughParameters {
        Arc::clone(&self.parameters)
    }

    pub fn set_parameters(&self, parameters: HoughParameters) {
        *self.parameters.write().unwrap_or_else(|e| e.into_inner()) = parameters;
    }

    /// Find lines in `frame`, strongest first.
    ///
    /// An empty result is a normal outcome (nothing in band, frame too small,
    /// or an empty theta band).
    pub fn detect_lines(&self, frame: &CameraFrame) -> Vec<HoughLine> {
        let params = self.parameters();
        let thetas = theta_band(&params);
        if thetas.is_empty() || frame.width() < 3 || frame.height() < 3 {
            return Vec::new();
        }

        let edges = edge_pixels(frame, self.gradient_threshold);
        if edges.is_empty() {
            return Vec::new();
        }

        let accumulator = Accumulator::vote(frame, &thetas, &edges);
        let candidates = accumulator.candidates(params.pixel_voter_threshold.max(1));
        suppress_similar(candidates, &params)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Internals
// ────────────────────────────────────────────────────────────────────────────

/// Whole degrees in `[min_theta, max_theta]`, at most one full turn.
fn theta_band(params: &HoughParameters) -> Vec<f64> {
    let lo = params.min_theta.ceil() as i32;
    let hi = (params.max_theta.floor() as i32).min(lo.saturating_add(MAX_BAND_DEGREES - 1));
    (lo..=hi).map(f64::from).collect()
}

fn edge_pixels(frame: &CameraFrame, threshold: u32) -> Vec<(u32, u32)> {
    let (w, h) = (frame.width() as usize, frame.height() as usize);
    let data = frame.data();
    let threshold_sq = threshold as i64 * threshold as i64;
    let mut edges = Vec::new();

    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let mut gx = 0i32;
            let mut gy = 0i32;
            for (ky, (row_x, row_y)) in SOBEL_GX.iter().zip(SOBEL_GY.iter()).enumerate() {
                let base = (y + ky - 1) * w;
                for kx in 0..3 {
                    let v = data[base + x + kx - 1] as i32;
                    gx += v * row_x[kx];
                    gy += v * row_y[kx];
                }
            }
            let mag_sq = gx as i64 * gx as i64 + gy as i64 * gy as i64;
            if mag_sq > threshold_sq {
                edges.push((x as u32, y as u32));
            }
        }
    }
    edges
}

struct Accumulator {
    votes: Vec<u32>,
    thetas: Vec<f64>,
    rho_bins: usize,
    rho_offset: isize,
}

impl Accumulator {
    fn vote(frame: &CameraFrame, thetas: &[f64], edges: &[(u32, u32)]) -> Self {
        let diag = (frame.width() as f64).hypot(frame.height() as f64).ceil() as isize;
        let rho_bins = (2 * diag + 1) as usize;
        let trig: Vec<(f64, f64)> = thetas
            .iter()
            .map(|t| {
                let (sin, cos) = t.to_radians().sin_cos();
                (cos, sin)
            })
            .collect();

        let mut votes = vec![0u32; rho_bins * thetas.len()];
        for &(x, y) in edges {
            let (x, y) = (x as f64, y as f64);
            for (ti, (cos, sin)) in trig.iter().enumerate() {
                let rho = x * cos + y * sin;
                let idx = rho.round() as isize + diag;
                if (0..rho_bins as isize).contains(&idx) {
                    let cell = &mut votes[ti * rho_bins + idx as usize];
                    *cell = cell.saturating_add(1);
                }
            }
        }

        Self {
            votes,
            thetas: thetas.to_vec(),
            rho_bins,
            rho_offset: diag,
        }
    }

    fn candidates(&self, threshold: u32) -> Vec<HoughLine> {
        self.votes
            .iter()
            .enumerate()
            .filter(|&(_, &v)| v >= threshold)
            .map(|(i, &votes)| HoughLine {
                rho: ((i % self.rho_bins) as isize - self.rho_offset) as f64,
                theta: self.thetas[i / self.rho_bins],
                votes,
            })
            .collect()
    }
}

/// Keep the strongest of every group of similar lines.
fn suppress_similar(mut candidates: Vec<HoughLine>, params: &HoughParameters) -> Vec<HoughLine> {
    candidates.sort_by(|a, b| {
        b.votes
            .cmp(&a.votes)
            .then(a.theta.total_cmp(&b.theta))
            .then(a.rho.total_cmp(&b.rho))
    });

    let mut kept: Vec<HoughLine> = Vec::new();
    for c in candidates {
        let similar = kept.iter().any(|k| {
            (k.rho - c.rho).abs() <= params.similar_line_rho_threshold
                && (k.theta - c.theta).abs() <= params.similar_line_theta_threshold
        });
        if !similar {
            kept.push(c);
        }
    }
    kept
}
