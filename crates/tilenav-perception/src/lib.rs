//! # tilenav-perception
//!
//! Vision side of tilenav: finds tile edges in camera frames and turns them
//! into distance and heading observations.
//!
//! - [`hough`] – band-limited Hough line detection.
//! - [`edge_solver`] – projects lines into the robot frame and classifies
//!   them as front or right tile edges.
//! - [`aggregator`] – running-mean fusion of successive observations.
//! - [`detector`] – the per-frame pipeline, staleness policy and the
//!   [`DetectionState`] shared with the control loop.
//! - [`overlay`] – preview annotation primitives.

pub mod aggregator;
pub mod detector;
pub mod edge_solver;
pub mod hough;
pub mod overlay;

pub use aggregator::{AggregateCounts, ObservationAggregator};
pub use detector::{DetectionConfig, DetectionState, TileEdgeDetector};
pub use edge_solver::{CalibrationPoint, EdgeSolver, SolverConfig, WebCamDescriptor};
pub use hough::{HoughLine, LineDetector, SharedHoughParameters};
pub use overlay::{Color, Overlay, RobotDimensions};
