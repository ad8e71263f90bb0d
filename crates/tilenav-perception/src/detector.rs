//! Per-frame tile-edge pipeline and the state it shares with the control loop.
//!
//! [`TileEdgeDetector::process_frame`] runs both Hough bands over a frame,
//! solves the merged lines into an [`Observation`] and publishes it into a
//! [`DetectionState`].  The control loop only ever reads that state.
//!
//! Frames without a usable edge leave the previous observation in place for
//! a short grace period; once the newest observation is older than that, the
//! latest slot and the aggregator are both cleared so stale edges are never
//! acted on.

use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tilenav_hal::camera::CameraFrame;
use tilenav_hal::clock::{Clock, SystemClock};
use tilenav_types::{Line, NavError, Observation, Position};
use tracing::{debug, trace};

use crate::aggregator::{AggregateCounts, ObservationAggregator};
use crate::edge_solver::{EdgeSolver, SolverConfig, WebCamDescriptor};
use crate::hough::{HoughLine, LineDetector, SharedHoughParameters};
use crate::overlay::{Overlay, RobotDimensions, annotate};

/// How often [`DetectionState::wait_for_detection`] re-checks the slot.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Default age beyond which an observation no longer counts.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_millis(200);

// ────────────────────────────────────────────────────────────────────────────
// DetectionState
// ────────────────────────────────────────────────────────────────────────────

/// Latest observation plus the running aggregate, shared between the frame
/// producer and the control loop.
///
/// Every read first applies the staleness policy against the state's clock:
/// once the latest observation is older than the grace period, the slot and
/// the aggregate are cleared and the state reads as undetected, whether or
/// not frames are still arriving.
#[derive(Debug)]
pub struct DetectionState {
    latest: RwLock<Option<Arc<Observation>>>,
    aggregator: ObservationAggregator,
    grace: Duration,
    clock: Arc<dyn Clock>,
}

impl Default for DetectionState {
    fn default() -> Self {
        Self {
            latest: RwLock::new(None),
            aggregator: ObservationAggregator::new(),
            grace: DEFAULT_GRACE_PERIOD,
            clock: Arc::new(SystemClock),
        }
    }
}

impl DetectionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// How long an observation stays current without a newer one.
    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Time source for staleness checks and [`wait_for_detection`](Self::wait_for_detection).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn grace_period(&self) -> Duration {
        self.grace
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Replace the latest observation and fold it into the aggregate.
    pub fn publish(&self, observation: Arc<Observation>) {
        self.aggregator.add(Some(&observation));
        *self.latest.write().unwrap_or_else(|e| e.into_inner()) = Some(observation);
    }

    /// The current observation; `None` once it has gone stale.
    pub fn latest(&self) -> Option<Arc<Observation>> {
        self.expire(self.clock.now());
        self.slot()
    }

    /// `true` while a current observation is held.
    pub fn is_detected(&self) -> bool {
        self.latest().is_some()
    }

    /// The fused estimate; `None` once the latest observation has gone
    /// stale.
    pub fn aggregate(&self) -> Option<Observation> {
        self.expire(self.clock.now());
        self.aggregator.aggregate()
    }

    pub fn counts(&self) -> AggregateCounts {
        self.aggregator.counts()
    }

    /// Drop the latest observation and the aggregate.
    pub fn clear(&self) {
        *self.latest.write().unwrap_or_else(|e| e.into_inner()) = None;
        self.aggregator.reset();
    }

    /// Clear everything if the latest observation is older than the grace
    /// period at `now`.  Returns `true` when something was cleared.
    pub fn expire(&self, now: Instant) -> bool {
        let stale = self
            .slot()
            .is_some_and(|obs| now.saturating_duration_since(obs.observed_at) > self.grace);
        if stale {
            self.clear();
        }
        stale
    }

    /// Block (through the state's clock) until a current observation is
    /// held or `timeout` elapses.  Returns whether one is held.
    pub fn wait_for_detection(&self, timeout: Duration) -> bool {
        let deadline = self.clock.now() + timeout;
        loop {
            if self.is_detected() {
                return true;
            }
            let now = self.clock.now();
            if now >= deadline {
                return false;
            }
            self.clock.sleep(POLL_INTERVAL.min(deadline - now));
        }
    }

    fn slot(&self) -> Option<Arc<Observation>> {
        self.latest.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// TileEdgeDetector
// ────────────────────────────────────────────────────────────────────────────

/// Frame-pipeline tunables.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// How long an observation stays current without a newer one.  Applied
    /// to the shared state through [`DetectionState::with_grace_period`].
    pub grace_period_ms: u64,
    /// Sobel magnitude above which a pixel votes.
    pub gradient_threshold: u32,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            grace_period_ms: DEFAULT_GRACE_PERIOD.as_millis() as u64,
            gradient_threshold: crate::hough::DEFAULT_GRADIENT_THRESHOLD,
        }
    }
}

impl DetectionConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }
}

/// Runs line detection and solving on camera frames.
#[derive(Debug)]
pub struct TileEdgeDetector {
    horizontal: LineDetector,
    vertical: LineDetector,
    solver: EdgeSolver,
    state: Arc<DetectionState>,
}

impl TileEdgeDetector {
    /// Build a detector whose Hough tunables default from the camera's
    /// resolution and field of view.
    ///
    /// # Errors
    ///
    /// Returns [`NavError::Config`] for unusable camera calibration.
    pub fn new(
        camera: WebCamDescriptor,
        solver: SolverConfig,
        config: DetectionConfig,
        state: Arc<DetectionState>,
    ) -> Result<Self, NavError> {
        let horizontal = LineDetector::new(camera.horizontal_hough_parameters())
            .with_gradient_threshold(config.gradient_threshold);
        let vertical = LineDetector::new(camera.vertical_hough_parameters())
            .with_gradient_threshold(config.gradient_threshold);
        Ok(Self {
            horizontal,
            vertical,
            solver: EdgeSolver::new(camera, solver)?,
            state,
        })
    }

    /// Live-tunable parameters of the image-horizontal band.
    pub fn horizontal_parameters(&self) -> SharedHoughParameters {
        self.horizontal.parameters_handle()
    }

    /// Live-tunable parameters of the image-vertical band.
    pub fn vertical_parameters(&self) -> SharedHoughParameters {
        self.vertical.parameters_handle()
    }

    pub fn state(&self) -> &Arc<DetectionState> {
        &self.state
    }

    /// Detect, solve and publish one frame captured at `captured_at`.
    ///
    /// Returns the new observation, or `None` when the frame showed no
    /// usable edge (in which case the staleness policy is applied).
    pub fn process_frame(&self, frame: &CameraFrame, captured_at: Instant) -> Option<Arc<Observation>> {
        let started = Instant::now();

        let mut found: Vec<HoughLine> = self.horizontal.detect_lines(frame);
        found.extend(self.vertical.detect_lines(frame));
        found.sort_by(|a, b| b.votes.cmp(&a.votes));
        let lines: Vec<Line> = found
            .iter()
            .map(|h| h.to_line(frame.width(), frame.height()))
            .collect();

        let observation = self.solver.solve(&lines, captured_at).map(Arc::new);
        match &observation {
            Some(obs) => {
                self.state.publish(Arc::clone(obs));
                debug!(
                    lines = lines.len(),
                    front = ?obs.distance_front,
                    right = ?obs.distance_right,
                    heading_offset = ?obs.heading_offset,
                    elapsed_us = started.elapsed().as_micros() as u64,
                    "tile edge observed"
                );
            }
            None => {
                if self.state.expire(captured_at) {
                    debug!("tile edge observation expired");
                } else {
                    trace!(lines = lines.len(), "no tile edge in frame");
                }
            }
        }
        observation
    }

    /// Preview annotations for the current state.
    pub fn annotate(&self, position: Option<Position>, robot: RobotDimensions) -> Vec<Overlay> {
        let latest = self.state.latest();
        let aggregate = self.state.aggregate();
        annotate(
            latest.as_deref(),
            aggregate.as_ref().map(|a| (a, self.state.counts())),
            position,
            robot,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tilenav_hal::clock::ManualClock;
    use tilenav_hal::sim::draw_line;

    // 10 px per inch; image covers robot x ∈ [8, 24] in, y ∈ [6, -6] in.
    fn camera() -> WebCamDescriptor {
        WebCamDescriptor::rectangle(160, 120, (8.0, 6.0), (24.0, -6.0))
    }

    fn detector() -> TileEdgeDetector {
        TileEdgeDetector::new(
            camera(),
            SolverConfig::default(),
            DetectionConfig::default(),
            Arc::new(DetectionState::new()),
        )
        .unwrap()
    }

    fn edges_frame() -> CameraFrame {
        let mut frame = CameraFrame::filled(160, 120, 0);
        // x = 80 px → 16 in right; y = 30 px → 3 in forward.
        draw_line(&mut frame, (80.0, 0.0), (80.0, 119.0), 255);
        draw_line(&mut frame, (0.0, 30.0), (159.0, 30.0), 255);
        frame
    }

    #[test]
    fn frame_with_edges_publishes_observation() {
        let det = detector();
        let obs = det.process_frame(&edges_frame(), Instant::now()).unwrap();

        assert!((obs.distance_right.unwrap() - 16.0 / 24.0).abs() < 0.01);
        assert!((obs.distance_front.unwrap() - 3.0 / 24.0).abs() < 0.01);
        assert!(obs.heading_offset.unwrap().abs() < 1e-9);
        assert!(det.state().is_detected());
        assert_eq!(det.state().counts().right, 1);
    }

    #[test]
    fn blank_frame_within_grace_keeps_observation() {
        let det = detector();
        let t0 = Instant::now();
        det.process_frame(&edges_frame(), t0).unwrap();

        let blank = CameraFrame::filled(160, 120, 0);
        assert!(det.process_frame(&blank, t0 + Duration::from_millis(100)).is_none());
        assert!(det.state().is_detected());
        assert!(det.state().aggregate().is_some());
    }

    #[test]
    fn blank_frame_after_grace_clears_state() {
        let det = detector();
        let t0 = Instant::now();
        det.process_frame(&edges_frame(), t0).unwrap();

        let blank = CameraFrame::filled(160, 120, 0);
        assert!(det.process_frame(&blank, t0 + Duration::from_millis(300)).is_none());
        assert!(!det.state().is_detected());
        assert!(det.state().aggregate().is_none());
        assert_eq!(det.state().counts(), AggregateCounts::default());
    }

    #[test]
    fn parameters_are_shared_with_tuner() {
        let det = detector();
        let handle = det.vertical_parameters();
        handle.write().unwrap().pixel_voter_threshold = 10_000;
        det.horizontal_parameters().write().unwrap().pixel_voter_threshold = 10_000;
        assert!(det.process_frame(&edges_frame(), Instant::now()).is_none());
    }

    #[test]
    fn default_hough_parameters_follow_camera_scale() {
        let det = detector();
        let h = *det.horizontal_parameters().read().unwrap();
        assert!((h.similar_line_rho_threshold - 12.0).abs() < 1e-9);
        assert_eq!((h.min_theta, h.max_theta), (45.0, 135.0));
        let v = *det.vertical_parameters().read().unwrap();
        assert_eq!((v.min_theta, v.max_theta), (-44.0, 44.0));
    }

    #[test]
    fn annotate_reflects_state() {
        let det = detector();
        assert!(det.annotate(None, RobotDimensions::default()).is_empty());
        det.process_frame(&edges_frame(), Instant::now()).unwrap();
        let overlays = det.annotate(Some(Position::new(0.5, 0.5)), RobotDimensions::default());
        assert!(overlays.iter().any(|o| matches!(o, Overlay::Text { .. })));
        assert!(overlays.iter().any(|o| matches!(o, Overlay::Line { .. })));
    }

    fn manual_state() -> (Arc<ManualClock>, DetectionState) {
        let clock = Arc::new(ManualClock::new());
        let state = DetectionState::new().with_clock(clock.clone());
        (clock, state)
    }

    fn observed_heading(state: &DetectionState, heading: f64) {
        let mut obs = Observation::empty(state.clock().now());
        obs.heading_offset = Some(heading);
        state.publish(Arc::new(obs));
    }

    #[test]
    fn wait_times_out_without_detection() {
        let (clock, state) = manual_state();
        assert!(!state.wait_for_detection(Duration::from_secs(1)));
        assert_eq!(clock.elapsed(), Duration::from_secs(1));
    }

    #[test]
    fn wait_returns_immediately_when_detected() {
        let (clock, state) = manual_state();
        observed_heading(&state, 2.0);
        assert!(state.wait_for_detection(Duration::from_secs(1)));
        assert_eq!(clock.elapsed(), Duration::ZERO);
    }

    #[test]
    fn wait_sees_publish_from_another_thread() {
        let state = Arc::new(DetectionState::new());
        let producer = {
            let state = Arc::clone(&state);
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                state.publish(Arc::new(Observation::empty(Instant::now())));
            })
        };
        assert!(state.wait_for_detection(Duration::from_secs(5)));
        producer.join().unwrap();
    }

    #[test]
    fn stalled_camera_reads_as_undetected() {
        let (clock, state) = manual_state();
        observed_heading(&state, 7.0);
        clock.advance(Duration::from_secs(10));

        assert!(!state.wait_for_detection(Duration::from_secs(1)));
        assert!(state.latest().is_none());
        assert!(state.aggregate().is_none());
        assert_eq!(state.counts(), AggregateCounts::default());
    }

    #[test]
    fn observation_stays_current_within_grace() {
        let (clock, state) = manual_state();
        observed_heading(&state, 7.0);
        clock.advance(Duration::from_millis(200));
        assert!(state.is_detected());
        assert_eq!(state.aggregate().and_then(|o| o.heading_offset), Some(7.0));

        clock.advance(Duration::from_millis(1));
        assert!(!state.is_detected());
    }

    #[test]
    fn grace_period_is_configurable() {
        let (clock, state) = manual_state();
        let state = state.with_grace_period(Duration::from_secs(2));
        observed_heading(&state, 1.0);
        clock.advance(Duration::from_millis(1500));
        assert!(state.is_detected());
        clock.advance(Duration::from_millis(600));
        assert!(!state.is_detected());
    }

    #[test]
    fn expire_ignores_fresh_and_missing_observations() {
        let state = DetectionState::new();
        let now = Instant::now();
        assert!(!state.expire(now));
        state.publish(Arc::new(Observation::empty(now)));
        assert!(!state.expire(now + Duration::from_millis(200)));
        assert!(state.expire(now + Duration::from_millis(201)));
    }
}
