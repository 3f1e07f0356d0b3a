//! Time-ranged heuristic indicators: the shared currency between the offline
//! and realtime pipelines.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Numerical indicators computed from extracted features for one time range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct HeuristicIndicators {
    pub video_id: String,
    /// `(start_s, end_s)` with `start_s < end_s`.
    pub time_range: (f64, f64),
    /// Average motion speed in px/s, non-negative.
    pub avg_motion_px_per_s: f64,
    /// Subject area change ratio, `[0, 1]`.
    pub frame_pct_change: f64,
    /// Motion smoothness, `[0, 1]`, higher is smoother.
    pub motion_smoothness: f64,
    /// Average subject area ratio, `[0, 1]`.
    pub subject_occupancy: f64,
    /// Motion-beat synchronization score, `[0, 1]`.
    pub beat_alignment: f64,
}

impl HeuristicIndicators {
    /// Check that every scalar lies in its declared domain.
    pub fn is_valid(&self) -> bool {
        self.avg_motion_px_per_s >= 0.0
            && (0.0..=1.0).contains(&self.frame_pct_change)
            && (0.0..=1.0).contains(&self.motion_smoothness)
            && (0.0..=1.0).contains(&self.subject_occupancy)
            && (0.0..=1.0).contains(&self.beat_alignment)
            && self.time_range.0 >= 0.0
            && self.time_range.0 < self.time_range.1
    }

    pub fn duration_s(&self) -> f64 {
        self.time_range.1 - self.time_range.0
    }
}
