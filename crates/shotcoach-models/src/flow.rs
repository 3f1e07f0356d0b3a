//! Optical-flow and subject-tracking summaries produced by feature extraction.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::bbox::BBox;

/// Summary of optical flow across a frame sequence.
///
/// `primary_direction_deg` is the magnitude-weighted circular mean of the
/// per-frame dominant angles, normalized to `[0, 360)`. Screen convention:
/// 0 = right, 90 = down, 180 = left, 270 = up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct OpticalFlow {
    /// Mean flow magnitude. Offline extraction reports px/s; the realtime
    /// analyzer reports px/frame.
    pub avg_magnitude: f64,
    /// Dominant motion direction in degrees, `[0, 360)`.
    pub primary_direction_deg: f64,
    /// Sampled per-frame flow vectors `(vx, vy)`.
    #[serde(default)]
    pub flow_vectors: Vec<(f64, f64)>,
}

impl OpticalFlow {
    /// A zero-motion flow summary.
    pub fn still() -> Self {
        Self {
            avg_magnitude: 0.0,
            primary_direction_deg: 0.0,
            flow_vectors: Vec::new(),
        }
    }
}

/// Per-frame subject detections as parallel sequences.
///
/// Invariant: the three vectors have equal length and `timestamps_s` is
/// strictly increasing.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct SubjectTracking {
    #[serde(default)]
    pub bboxes: Vec<BBox>,
    /// Detection confidence per frame, each in `[0, 1]`.
    #[serde(default)]
    pub confidences: Vec<f64>,
    #[serde(default)]
    pub timestamps_s: Vec<f64>,
}

impl SubjectTracking {
    /// Check parallel-sequence and monotonicity invariants.
    pub fn is_valid(&self) -> bool {
        if self.bboxes.len() != self.confidences.len()
            || self.bboxes.len() != self.timestamps_s.len()
        {
            return false;
        }
        if self.confidences.iter().any(|c| !(0.0..=1.0).contains(c)) {
            return false;
        }
        self.timestamps_s.windows(2).all(|w| w[0] < w[1])
    }

    pub fn len(&self) -> usize {
        self.bboxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bboxes.is_empty()
    }
}
