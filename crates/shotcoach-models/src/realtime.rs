//! Realtime analysis results, advice payloads and session telemetry.

use chrono::Utc;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::bbox::BBox;
use crate::motion::MotionType;

/// Current unix timestamp in milliseconds, the wire clock for the realtime stream.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Advice priority for display and haptic feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AdvicePriority {
    /// Severe issues; triggers haptic feedback on the client.
    Critical,
    Warning,
    Info,
    Positive,
}

impl AdvicePriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdvicePriority::Critical => "critical",
            AdvicePriority::Warning => "warning",
            AdvicePriority::Info => "info",
            AdvicePriority::Positive => "positive",
        }
    }
}

/// Category of shooting advice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AdviceCategory {
    Stability,
    Speed,
    Composition,
    Beat,
    Equipment,
}

impl AdviceCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdviceCategory::Stability => "stability",
            AdviceCategory::Speed => "speed",
            AdviceCategory::Composition => "composition",
            AdviceCategory::Beat => "beat",
            AdviceCategory::Equipment => "equipment",
        }
    }
}

/// Dominant lighting classification from the environment features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DominantLight {
    Warm,
    Cool,
    Neutral,
}

/// Result of one realtime frame-buffer analysis cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RealtimeAnalysisResult {
    /// Mean flow magnitude in px/frame.
    pub avg_speed_px_frame: f64,
    pub speed_variance: f64,
    pub motion_smoothness: f64,
    pub primary_direction_deg: f64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_bbox: Option<BBox>,
    pub subject_occupancy: f64,
    pub subject_lost: bool,

    // Environment features from the most recent frame
    pub brightness: f64,
    pub contrast: f64,
    pub sharpness: f64,
    pub saturation: f64,
    pub dominant_light: DominantLight,
    pub composition_score: f64,

    pub analysis_latency_ms: f64,
    pub confidence: f64,
    pub timestamp_ms: i64,
}

impl RealtimeAnalysisResult {
    /// A neutral zero-confidence result, used when too few frames decoded.
    pub fn insufficient(timestamp_ms: i64) -> Self {
        Self {
            avg_speed_px_frame: 0.0,
            speed_variance: 0.0,
            motion_smoothness: 0.5,
            primary_direction_deg: 0.0,
            subject_bbox: None,
            subject_occupancy: 0.0,
            subject_lost: false,
            brightness: 0.5,
            contrast: 0.5,
            sharpness: 0.5,
            saturation: 0.5,
            dominant_light: DominantLight::Neutral,
            composition_score: 0.5,
            analysis_latency_ms: 0.0,
            confidence: 0.0,
            timestamp_ms,
        }
    }
}

/// One piece of prioritized shooting advice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AdvicePayload {
    pub priority: AdvicePriority,
    pub category: AdviceCategory,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advanced_message: Option<String>,
    /// Unix milliseconds; serialized as `timestamp` on the wire.
    #[serde(rename = "timestamp")]
    pub timestamp_ms: i64,
    /// Client-side re-display suppression window.
    pub suppress_duration_ms: i64,
    pub trigger_haptic: bool,
}

impl AdvicePayload {
    pub fn new(
        priority: AdvicePriority,
        category: AdviceCategory,
        message: impl Into<String>,
    ) -> Self {
        Self {
            priority,
            category,
            message: message.into(),
            advanced_message: None,
            timestamp_ms: now_ms(),
            suppress_duration_ms: 3000,
            trigger_haptic: false,
        }
    }

    pub fn with_advanced(mut self, advanced: impl Into<String>) -> Self {
        self.advanced_message = Some(advanced.into());
        self
    }

    pub fn with_suppress_ms(mut self, suppress_duration_ms: i64) -> Self {
        self.suppress_duration_ms = suppress_duration_ms;
        self
    }

    pub fn with_haptic(mut self, trigger_haptic: bool) -> Self {
        self.trigger_haptic = trigger_haptic;
        self
    }

    /// Substitute named `{placeholder}` variables in the message texts and
    /// refresh the emission timestamp.
    pub fn with_substitution(&self, vars: &[(&str, &str)]) -> Self {
        let substitute = |text: &str| {
            let mut out = text.to_string();
            for (name, value) in vars {
                out = out.replace(&format!("{{{name}}}"), value);
            }
            out
        };
        Self {
            priority: self.priority,
            category: self.category,
            message: substitute(&self.message),
            advanced_message: self.advanced_message.as_deref().map(substitute),
            timestamp_ms: now_ms(),
            suppress_duration_ms: self.suppress_duration_ms,
            trigger_haptic: self.trigger_haptic,
        }
    }
}

/// Point-in-time telemetry snapshot for one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub created_at_ms: i64,
    pub motion_state: MotionType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_lost_since_ms: Option<i64>,
    pub total_analyses: u64,
    pub ema_latency_ms: f64,
    pub active_clients: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substitution_replaces_named_placeholders() {
        let advice = AdvicePayload::new(
            AdvicePriority::Warning,
            AdviceCategory::Composition,
            "主体偏移，建议向{direction}调整",
        );
        let substituted = advice.with_substitution(&[("direction", "左")]);
        assert_eq!(substituted.message, "主体偏移，建议向左调整");
        assert_eq!(substituted.category, AdviceCategory::Composition);
    }

    #[test]
    fn test_substitution_applies_to_advanced_message() {
        let advice = AdvicePayload::new(AdvicePriority::Info, AdviceCategory::Beat, "{n}")
            .with_advanced("advanced {n}");
        let substituted = advice.with_substitution(&[("n", "x")]);
        assert_eq!(substituted.advanced_message.as_deref(), Some("advanced x"));
    }

    #[test]
    fn test_priority_serialization() {
        let json = serde_json::to_string(&AdvicePriority::Critical).unwrap();
        assert_eq!(json, "\"critical\"");
    }

    #[test]
    fn test_analysis_result_round_trip() {
        let result = RealtimeAnalysisResult::insufficient(1000);
        let json = serde_json::to_string(&result).unwrap();
        let back: RealtimeAnalysisResult = serde_json::from_str(&json).unwrap();
        assert_eq!(result, back);
    }

    #[test]
    fn test_insufficient_result_is_neutral() {
        let result = RealtimeAnalysisResult::insufficient(0);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.motion_smoothness, 0.5);
        assert!(result.subject_bbox.is_none());
    }
}
