//! Rule-based motion classification from heuristic indicators.

use shotcoach_models::{HeuristicIndicators, MotionType, SpeedProfile, SuggestedScale};

/// Thresholds for the motion inference rules.
#[derive(Debug, Clone)]
pub struct MotionRulesConfig {
    /// Below this px/s the shot is static.
    pub static_threshold: f64,
    /// Below this px/s motion counts as slow.
    pub slow_motion_threshold: f64,
    /// Frame change above this suggests a deliberate dolly.
    pub significant_change_threshold: f64,
    /// Degrees from the horizontal axis still counting as a pan.
    pub horizontal_tolerance: f64,
    /// Degrees from the vertical axis still counting as a tilt.
    pub vertical_tolerance: f64,
    /// Below this smoothness the shot reads as handheld.
    pub handheld_smoothness_threshold: f64,
    // Occupancy bands for scale suggestion
    pub extreme_closeup_threshold: f64,
    pub closeup_threshold: f64,
    pub medium_threshold: f64,
}

impl Default for MotionRulesConfig {
    fn default() -> Self {
        Self {
            static_threshold: 5.0,
            slow_motion_threshold: 50.0,
            significant_change_threshold: 0.15,
            horizontal_tolerance: 30.0,
            vertical_tolerance: 30.0,
            handheld_smoothness_threshold: 0.5,
            extreme_closeup_threshold: 0.5,
            closeup_threshold: 0.25,
            medium_threshold: 0.1,
        }
    }
}

/// Rule-based motion type classifier shared by both pipelines.
#[derive(Debug, Clone, Default)]
pub struct MotionClassifier {
    config: MotionRulesConfig,
}

impl MotionClassifier {
    pub fn new(config: MotionRulesConfig) -> Self {
        Self { config }
    }

    /// Infer the camera motion type. First matching rule wins:
    /// static -> handheld (rough) -> dolly -> pan/tilt -> track -> fallback.
    pub fn infer_motion_type(
        &self,
        indicators: &HeuristicIndicators,
        primary_direction_deg: Option<f64>,
    ) -> MotionType {
        let avg_motion = indicators.avg_motion_px_per_s;
        let smoothness = indicators.motion_smoothness;
        let frame_change = indicators.frame_pct_change;
        let occupancy = indicators.subject_occupancy;

        if avg_motion < self.config.static_threshold {
            return MotionType::Static;
        }

        if smoothness < self.config.handheld_smoothness_threshold {
            return MotionType::Handheld;
        }

        if frame_change > self.config.significant_change_threshold {
            // Significant size change: direction guessed from end occupancy.
            return if occupancy > 0.3 {
                MotionType::DollyIn
            } else {
                MotionType::DollyOut
            };
        }

        if let Some(direction) = primary_direction_deg {
            let direction = direction.rem_euclid(360.0);
            if self.is_horizontal(direction) {
                return MotionType::Pan;
            }
            if self.is_vertical(direction) {
                return MotionType::Tilt;
            }
        }

        if occupancy > 0.1 && avg_motion > self.config.slow_motion_threshold && smoothness > 0.6 {
            return MotionType::Track;
        }

        if avg_motion > self.config.slow_motion_threshold {
            MotionType::Handheld
        } else {
            MotionType::Static
        }
    }

    fn is_horizontal(&self, direction: f64) -> bool {
        let tolerance = self.config.horizontal_tolerance;
        direction < tolerance || direction > 360.0 - tolerance || (direction - 180.0).abs() < tolerance
    }

    fn is_vertical(&self, direction: f64) -> bool {
        let tolerance = self.config.vertical_tolerance;
        (direction - 90.0).abs() < tolerance || (direction - 270.0).abs() < tolerance
    }

    /// Infer the speed profile for a classified motion.
    pub fn infer_speed_profile(
        &self,
        indicators: &HeuristicIndicators,
        motion_type: MotionType,
    ) -> SpeedProfile {
        if matches!(motion_type, MotionType::Static | MotionType::Handheld) {
            return SpeedProfile::Linear;
        }

        let smoothness = indicators.motion_smoothness;
        if smoothness > 0.8 {
            SpeedProfile::EaseInOut
        } else if smoothness > 0.6 {
            if indicators.frame_pct_change > 0.1 {
                SpeedProfile::EaseIn
            } else {
                SpeedProfile::EaseOut
            }
        } else {
            SpeedProfile::Linear
        }
    }

    /// Suggest a framing scale from subject occupancy.
    pub fn infer_suggested_scale(&self, subject_occupancy: f64) -> SuggestedScale {
        if subject_occupancy >= self.config.extreme_closeup_threshold {
            SuggestedScale::ExtremeCloseup
        } else if subject_occupancy >= self.config.closeup_threshold {
            SuggestedScale::Closeup
        } else if subject_occupancy >= self.config.medium_threshold {
            SuggestedScale::Medium
        } else {
            SuggestedScale::Wide
        }
    }

    /// Confidence of the classification: 0.5 baseline, boosted for clear
    /// static/dolly signatures and smooth motion, penalized when erratic.
    pub fn calculate_confidence(
        &self,
        indicators: &HeuristicIndicators,
        motion_type: MotionType,
    ) -> f64 {
        let mut confidence: f64 = 0.5;

        if motion_type == MotionType::Static
            && indicators.avg_motion_px_per_s < self.config.static_threshold
        {
            confidence += 0.3;
        }

        if indicators.motion_smoothness > 0.7 {
            confidence += 0.15;
        } else if indicators.motion_smoothness > 0.5 {
            confidence += 0.1;
        }

        if matches!(motion_type, MotionType::DollyIn | MotionType::DollyOut)
            && indicators.frame_pct_change > self.config.significant_change_threshold
        {
            confidence += 0.2;
        }

        if indicators.motion_smoothness < 0.3 {
            confidence -= 0.1;
        }

        confidence.clamp(0.0, 1.0)
    }

    /// Run the full classification: `(type, profile, scale, confidence)`.
    pub fn classify(
        &self,
        indicators: &HeuristicIndicators,
        primary_direction_deg: Option<f64>,
    ) -> (MotionType, SpeedProfile, SuggestedScale, f64) {
        let motion_type = self.infer_motion_type(indicators, primary_direction_deg);
        let speed_profile = self.infer_speed_profile(indicators, motion_type);
        let scale = self.infer_suggested_scale(indicators.subject_occupancy);
        let confidence = self.calculate_confidence(indicators, motion_type);
        (motion_type, speed_profile, scale, confidence)
    }
}
