//! Three-layer shooting instruction card.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Layer 3: adjustable parameters and professional tips.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AdvancedParams {
    /// Target occupancy band for the suggested scale, e.g. "当前45%，目标40%-60%".
    pub target_occupancy: String,
    pub duration_s: f64,
    /// Speed-curve description text.
    pub speed_curve: String,
    /// Stabilization equipment recommendation.
    pub stabilization: String,
    /// Zero or more professional tips.
    #[serde(default)]
    pub notes: Vec<String>,
}

/// A three-layer instruction card generated from validated metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct InstructionCard {
    pub video_id: String,
    /// Layer 1: 1-4 lines of actionable advice.
    pub primary: Vec<String>,
    /// Layer 2: short paragraph explaining the rationale.
    pub explain: String,
    /// Layer 3: adjustable parameters.
    pub advanced: AdvancedParams,
}

impl InstructionCard {
    /// Completeness invariant: all three layers non-empty, primary has 1-4 lines.
    pub fn is_complete(&self) -> bool {
        !self.primary.is_empty()
            && self.primary.len() <= 4
            && self.primary.iter().all(|line| !line.is_empty())
            && !self.explain.is_empty()
            && !self.advanced.stabilization.is_empty()
            && !self.advanced.target_occupancy.is_empty()
    }
}
