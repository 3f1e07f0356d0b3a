//! Motion, speed-profile and framing-scale enums.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Inferred camera motion type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MotionType {
    Static,
    DollyIn,
    DollyOut,
    Pan,
    Tilt,
    Track,
    Handheld,
}

impl MotionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MotionType::Static => "static",
            MotionType::DollyIn => "dolly_in",
            MotionType::DollyOut => "dolly_out",
            MotionType::Pan => "pan",
            MotionType::Tilt => "tilt",
            MotionType::Track => "track",
            MotionType::Handheld => "handheld",
        }
    }

    /// Whether this motion has a meaningful travel direction.
    pub fn is_directional(&self) -> bool {
        !matches!(self, MotionType::Static | MotionType::Handheld)
    }
}

/// Speed curve of a camera movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SpeedProfile {
    Linear,
    EaseIn,
    EaseOut,
    EaseInOut,
}

impl SpeedProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpeedProfile::Linear => "linear",
            SpeedProfile::EaseIn => "ease_in",
            SpeedProfile::EaseOut => "ease_out",
            SpeedProfile::EaseInOut => "ease_in_out",
        }
    }
}

/// Suggested framing scale derived from subject occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SuggestedScale {
    ExtremeCloseup,
    Closeup,
    Medium,
    Wide,
}

impl SuggestedScale {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuggestedScale::ExtremeCloseup => "extreme_closeup",
            SuggestedScale::Closeup => "closeup",
            SuggestedScale::Medium => "medium",
            SuggestedScale::Wide => "wide",
        }
    }
}
