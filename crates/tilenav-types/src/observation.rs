//! Line-detection parameters and tile-edge observations.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::geometry::Line;

/// Tunables for one Hough line detector.
///
/// Each detector only searches `theta ∈ [min_theta, max_theta]`, so two
/// instances with complementary bands are used for image-horizontal and
/// image-vertical edges.  A line at theta and at theta ± 180° is the same
/// line, so the default bands together cover each whole-degree orientation
/// exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HoughParameters {
    /// Two lines closer than this in rho (pixels) may be the same line.
    pub similar_line_rho_threshold: f64,
    /// Two lines closer than this in theta (degrees) may be the same line.
    pub similar_line_theta_threshold: f64,
    /// Lower end of the searched theta band, degrees, inclusive.
    pub min_theta: f64,
    /// Upper end of the searched theta band, degrees, inclusive.
    pub max_theta: f64,
    /// Minimum accumulator votes for a cell to count as a line.
    pub pixel_voter_threshold: u32,
}

impl HoughParameters {
    /// Parameters for image-horizontal edges (theta around 90°).
    ///
    /// `pixels_per_inch` is the horizontal image scale; similar lines are
    /// those within 1.2 inches of each other.
    pub fn horizontal(pixels_per_inch: f64) -> Self {
        Self {
            similar_line_rho_threshold: 1.2 * pixels_per_inch,
            similar_line_theta_threshold: 4.0,
            min_theta: 45.0,
            max_theta: 135.0,
            pixel_voter_threshold: 100,
        }
    }

    /// Parameters for image-vertical edges (theta around 0°).
    ///
    /// The band stops one degree short of ±45°; both diagonals belong to the
    /// horizontal band (−45° being the same orientation as 135°).
    pub fn vertical(pixels_per_inch: f64) -> Self {
        Self {
            similar_line_rho_threshold: 1.2 * pixels_per_inch,
            similar_line_theta_threshold: 4.0,
            min_theta: -44.0,
            max_theta: 44.0,
            pixel_voter_threshold: 90,
        }
    }
}

impl Default for HoughParameters {
    fn default() -> Self {
        Self::horizontal(10.0)
    }
}

/// What one camera frame revealed about the nearest tile edges.
///
/// Every scalar is independently optional: `None` means the edge was not
/// confidently identified in this frame, not that it is at distance zero.
/// Distances are in tiles from the robot centre, headings in degrees.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    /// Distance to the tile edge ahead of the robot centre.
    pub distance_front: Option<f64>,
    /// Distance to the tile edge to the right of the robot centre.
    pub distance_right: Option<f64>,
    /// Robot rotation relative to the tile grid, counter-clockwise positive.
    pub heading_offset: Option<f64>,
    /// Image-space line chosen as the front edge.
    pub observed_front_edge: Option<Line>,
    /// Image-space line chosen as the right edge.
    pub observed_right_edge: Option<Line>,
    /// Lines that fit neither edge class.
    pub bad_lines: Vec<Line>,
    /// Valid candidates that lost to a more confident line of their class.
    pub unused_lines: Vec<Line>,
    /// When the frame behind this observation was captured.
    pub observed_at: Instant,
}

impl Observation {
    /// An observation with nothing measured.
    pub fn empty(observed_at: Instant) -> Self {
        Self {
            distance_front: None,
            distance_right: None,
            heading_offset: None,
            observed_front_edge: None,
            observed_right_edge: None,
            bad_lines: Vec::new(),
            unused_lines: Vec::new(),
            observed_at,
        }
    }

    /// `true` when at least one scalar field was measured.
    pub fn has_measurement(&self) -> bool {
        self.distance_front.is_some() || self.distance_right.is_some() || self.heading_offset.is_some()
    }
}
