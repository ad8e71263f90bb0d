//! Running-mean fusion of per-frame observations.
//!
//! Each of the three scalar fields keeps its own mean and sample count, so a
//! frame that saw only the right edge never dilutes the front-edge estimate:
//!
//! ```text
//! mean_n = (x_n + mean_{n-1} · (n − 1)) / n
//! ```
//!
//! All methods take `&self`; one aggregator is shared (behind an `Arc`) by the
//! frame producer and the control loop.
//!
//! # Example
//!
//! ```rust
//! use std::time::Instant;
//! use tilenav_perception::aggregator::ObservationAggregator;
//! use tilenav_types::Observation;
//!
//! let agg = ObservationAggregator::new();
//! let mut obs = Observation::empty(Instant::now());
//! obs.distance_right = Some(0.4);
//! agg.add(Some(&obs));
//! obs.distance_right = Some(0.6);
//! agg.add(Some(&obs));
//!
//! let fused = agg.aggregate().unwrap();
//! assert!((fused.distance_right.unwrap() - 0.5).abs() < 1e-9);
//! assert_eq!(agg.counts().right, 2);
//! ```

use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

use tilenav_types::Observation;

// ────────────────────────────────────────────────────────────────────────────
// Running mean
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Clone, Copy, PartialEq)]
struct RunningMean {
    mean: f64,
    count: u32,
}

impl RunningMean {
    fn add(&mut self, sample: Option<f64>) {
        if let Some(x) = sample {
            self.count += 1;
            let n = self.count as f64;
            self.mean = (x + self.mean * (n - 1.0)) / n;
        }
    }

    fn value(&self) -> Option<f64> {
        (self.count > 0).then_some(self.mean)
    }
}

#[derive(Debug, Default)]
struct AggregateState {
    front: RunningMean,
    right: RunningMean,
    heading: RunningMean,
    latest: Option<Instant>,
}

/// Number of samples behind each aggregated field.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AggregateCounts {
    pub front: u32,
    pub right: u32,
    pub heading: u32,
}

// ────────────────────────────────────────────────────────────────────────────
// ObservationAggregator
// ────────────────────────────────────────────────────────────────────────────

/// Thread-safe accumulator of [`Observation`]s.
#[derive(Debug, Default)]
pub struct ObservationAggregator {
    state: Mutex<AggregateState>,
}

impl ObservationAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, AggregateState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Fold one observation in.  `None` is ignored.
    pub fn add(&self, observation: Option<&Observation>) {
        let Some(obs) = observation else {
            return;
        };
        let mut s = self.lock();
        s.front.add(obs.distance_front);
        s.right.add(obs.distance_right);
        s.heading.add(obs.heading_offset);
        s.latest = Some(match s.latest {
            Some(t) if t > obs.observed_at => t,
            _ => obs.observed_at,
        });
    }

    /// Forget everything accumulated so far.
    pub fn reset(&self) {
        *self.lock() = AggregateState::default();
    }

    /// The fused estimate, or `None` if nothing was added since the last
    /// reset.
    ///
    /// The result carries no lines; `observed_at` is the newest contributing
    /// observation's timestamp.
    pub fn aggregate(&self) -> Option<Observation> {
        let s = self.lock();
        let latest = s.latest?;
        let mut fused = Observation::empty(latest);
        fused.distance_front = s.front.value();
        fused.distance_right = s.right.value();
        fused.heading_offset = s.heading.value();
        Some(fused)
    }

    pub fn counts(&self) -> AggregateCounts {
        let s = self.lock();
        AggregateCounts {
            front: s.front.count,
            right: s.right.count,
            heading: s.heading.count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn obs(front: Option<f64>, right: Option<f64>, heading: Option<f64>) -> Observation {
        let mut o = Observation::empty(Instant::now());
        o.distance_front = front;
        o.distance_right = right;
        o.heading_offset = heading;
        o
    }

    #[test]
    fn empty_aggregator_has_no_estimate() {
        let agg = ObservationAggregator::new();
        assert!(agg.aggregate().is_none());
        assert_eq!(agg.counts(), AggregateCounts::default());
    }

    #[test]
    fn none_is_ignored() {
        let agg = ObservationAggregator::new();
        agg.add(None);
        assert!(agg.aggregate().is_none());
    }

    #[test]
    fn fields_are_averaged_independently() {
        let agg = ObservationAggregator::new();
        agg.add(Some(&obs(Some(0.2), None, Some(2.0))));
        agg.add(Some(&obs(Some(0.4), Some(0.9), None)));
        agg.add(Some(&obs(None, None, Some(4.0))));

        let fused = agg.aggregate().unwrap();
        assert!((fused.distance_front.unwrap() - 0.3).abs() < 1e-9);
        assert!((fused.distance_right.unwrap() - 0.9).abs() < 1e-9);
        assert!((fused.heading_offset.unwrap() - 3.0).abs() < 1e-9);
        assert_eq!(
            agg.counts(),
            AggregateCounts {
                front: 2,
                right: 1,
                heading: 2
            }
        );
    }

    #[test]
    fn running_mean_matches_batch_mean() {
        let agg = ObservationAggregator::new();
        let samples = [0.11, 0.52, 0.37, 0.91, 0.05, 0.66];
        for s in samples {
            agg.add(Some(&obs(Some(s), None, None)));
        }
        let expected = samples.iter().sum::<f64>() / samples.len() as f64;
        assert!((agg.aggregate().unwrap().distance_front.unwrap() - expected).abs() < 1e-12);
    }

    #[test]
    fn empty_observation_still_produces_aggregate() {
        let agg = ObservationAggregator::new();
        agg.add(Some(&obs(None, None, None)));
        let fused = agg.aggregate().unwrap();
        assert!(!fused.has_measurement());
    }

    #[test]
    fn reset_clears_everything() {
        let agg = ObservationAggregator::new();
        agg.add(Some(&obs(Some(0.5), Some(0.5), Some(1.0))));
        agg.reset();
        assert!(agg.aggregate().is_none());
        assert_eq!(agg.counts(), AggregateCounts::default());

        agg.add(Some(&obs(Some(0.1), None, None)));
        let fused = agg.aggregate().unwrap();
        assert!((fused.distance_front.unwrap() - 0.1).abs() < 1e-12);
        assert_eq!(agg.counts().front, 1);
    }

    #[test]
    fn aggregate_keeps_newest_timestamp() {
        let agg = ObservationAggregator::new();
        let newer = obs(Some(0.1), None, None);
        let mut older = obs(Some(0.3), None, None);
        older.observed_at = newer.observed_at - Duration::from_millis(50);
        agg.add(Some(&newer));
        agg.add(Some(&older));
        assert_eq!(agg.aggregate().unwrap().observed_at, newer.observed_at);
    }

    #[test]
    fn concurrent_adds_are_all_counted() {
        let agg = Arc::new(ObservationAggregator::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let agg = Arc::clone(&agg);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        agg.add(Some(&obs(None, Some(0.5), None)));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(agg.counts().right, 400);
        assert!((agg.aggregate().unwrap().distance_right.unwrap() - 0.5).abs() < 1e-9);
    }
}
