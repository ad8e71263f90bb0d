//! Annotation primitives for a camera preview.
//!
//! Nothing here renders; callers that stream frames draw the returned
//! [`Overlay`]s however their display allows.

use serde::{Deserialize, Serialize};
use tilenav_types::{Line, Observation, Position, units};

use crate::aggregator::AggregateCounts;

/// Palette used for annotations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Color {
    /// Lines fitting neither edge class.
    Black,
    /// Valid lines that lost to a stronger one.
    White,
    /// The chosen front edge.
    Blue,
    /// The chosen right edge.
    Green,
    /// Status text.
    Orange,
}

/// One drawable annotation in image pixel coordinates.
#[derive(Debug, Clone, PartialEq)]
pub enum Overlay {
    Line { line: Line, color: Color },
    Text { text: String, at: Position, color: Color, scale: f64 },
}

/// Robot footprint in inches, used to turn centre distances into clearances.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotDimensions {
    /// Left-to-right extent.
    pub width: f64,
    /// Back-to-front extent.
    pub length: f64,
}

impl Default for RobotDimensions {
    fn default() -> Self {
        Self {
            width: 18.0,
            length: 18.0,
        }
    }
}

const TEXT_SCALE: f64 = 0.5;
const TEXT_LEFT: f64 = 10.0;
const TEXT_TOP: f64 = 20.0;
const TEXT_STEP: f64 = 20.0;

fn coloured(lines: &[Line], color: Color) -> impl Iterator<Item = Overlay> + '_ {
    lines.iter().map(move |&line| Overlay::Line { line, color })
}

/// Build the annotations for one frame.
///
/// `latest` contributes its classified lines; `aggregate` (with its sample
/// counts) contributes the status text, distances shown as clearance in
/// inches from the robot's side and front.
pub fn annotate(
    latest: Option<&Observation>,
    aggregate: Option<(&Observation, AggregateCounts)>,
    position: Option<Position>,
    robot: RobotDimensions,
) -> Vec<Overlay> {
    let mut out = Vec::new();

    if let Some(obs) = latest {
        out.extend(coloured(&obs.bad_lines, Color::Black));
        out.extend(coloured(&obs.unused_lines, Color::White));
        out.extend(obs.observed_front_edge.map(|line| Overlay::Line {
            line,
            color: Color::Blue,
        }));
        out.extend(obs.observed_right_edge.map(|line| Overlay::Line {
            line,
            color: Color::Green,
        }));
    }

    let mut text = Vec::new();
    if let Some((agg, counts)) = aggregate {
        if let Some(right) = agg.distance_right {
            let clearance = units::tiles_to_inches(right) - robot.width / 2.0;
            text.push(format!("DR {clearance:.2} in, [{} obs]", counts.right));
        }
        if let Some(front) = agg.distance_front {
            let clearance = units::tiles_to_inches(front) - robot.length / 2.0;
            text.push(format!("DF {clearance:.2} in, [{} obs]", counts.front));
        }
        if let Some(heading) = agg.heading_offset {
            text.push(format!("Heading {heading:.2} deg, [{}]", counts.heading));
        }
    }
    if let Some(p) = position {
        text.push(format!("Position {}", p));
    }

    out.extend(text.into_iter().enumerate().map(|(i, text)| Overlay::Text {
        text,
        at: Position::new(TEXT_LEFT, TEXT_TOP + TEXT_STEP * i as f64),
        color: Color::Orange,
        scale: TEXT_SCALE,
    }));
    out
}
