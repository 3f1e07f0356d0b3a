//! Structured shooting metadata: the validated output of metadata synthesis.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::bbox::BBox;
use crate::motion::{MotionType, SpeedProfile, SuggestedScale};

/// Camera EXIF context extracted from an upload.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct ExifData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focal_length_mm: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aperture: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensor_size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iso: Option<u32>,
}

/// Motion parameters attached to a metadata output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct MotionParams {
    #[validate(range(exclusive_min = 0.0))]
    pub duration_s: f64,
    #[validate(range(min = 0.0, max = 1.0))]
    pub frame_pct_change: f64,
    pub speed_profile: SpeedProfile,
    #[validate(range(min = 0.0, max = 1.0))]
    pub motion_smoothness: f64,
}

/// Framing assessment: where the subject sits and how the shot should be scaled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct FramingData {
    #[validate(custom(function = validate_bbox))]
    pub subject_bbox: BBox,
    #[validate(range(min = 0.0, max = 1.0))]
    pub subject_occupancy: f64,
    pub suggested_scale: SuggestedScale,
}

/// The motion section of the metadata JSON: `{ "type": ..., "params": ... }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct MotionSection {
    #[serde(rename = "type")]
    pub motion_type: MotionType,
    #[validate(nested)]
    pub params: MotionParams,
}

/// Validated structured metadata for one analyzed time range.
///
/// The serialized shape matches the model-facing JSON schema:
/// `time_range`, nested `motion.{type,params}`, `framing`, `beat_alignment`,
/// `confidence`, `explainability`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct MetadataOutput {
    #[validate(custom(function = validate_time_range))]
    pub time_range: (f64, f64),
    #[validate(nested)]
    pub motion: MotionSection,
    #[validate(nested)]
    pub framing: FramingData,
    #[validate(range(min = 0.0, max = 1.0))]
    pub beat_alignment: f64,
    #[validate(range(min = 0.0, max = 1.0))]
    pub confidence: f64,
    /// Non-empty human-readable rationale, at most 500 characters.
    #[validate(length(min = 1, max = 500))]
    pub explainability: String,
}

impl MetadataOutput {
    pub fn motion_type(&self) -> MotionType {
        self.motion.motion_type
    }

    pub fn motion_params(&self) -> &MotionParams {
        &self.motion.params
    }

    pub fn duration_s(&self) -> f64 {
        self.time_range.1 - self.time_range.0
    }
}

fn validate_time_range(range: &(f64, f64)) -> Result<(), ValidationError> {
    if range.0 < 0.0 {
        return Err(ValidationError::new("time_range_negative_start")
            .with_message("start must be >= 0".into()));
    }
    if range.0 >= range.1 {
        return Err(ValidationError::new("time_range_not_increasing")
            .with_message("start must be < end".into()));
    }
    Ok(())
}

fn validate_bbox(bbox: &BBox) -> Result<(), ValidationError> {
    if !bbox.is_valid() {
        return Err(ValidationError::new("bbox_out_of_unit_square")
            .with_message("bbox must lie within the unit square".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_metadata() -> MetadataOutput {
        MetadataOutput {
            time_range: (0.0, 4.0),
            motion: MotionSection {
                motion_type: MotionType::DollyIn,
                params: MotionParams {
                    duration_s: 4.0,
                    frame_pct_change: 0.18,
                    speed_profile: SpeedProfile::EaseInOut,
                    motion_smoothness: 0.78,
                },
            },
            framing: FramingData {
                subject_bbox: BBox::new(0.25, 0.2, 0.5, 0.6),
                subject_occupancy: 0.45,
                suggested_scale: SuggestedScale::Closeup,
            },
            beat_alignment: 0.6,
            confidence: 0.85,
            explainability: "画幅变化明显，表明镜头在推进。运动平滑度较高。".to_string(),
        }
    }

    #[test]
    fn test_valid_metadata_passes_validation() {
        assert!(sample_metadata().validate().is_ok());
    }

    #[test]
    fn test_serialized_shape_nests_motion() {
        let json = serde_json::to_value(sample_metadata()).unwrap();
        assert_eq!(json["motion"]["type"], "dolly_in");
        assert_eq!(json["motion"]["params"]["speed_profile"], "ease_in_out");
        assert!(json["framing"]["subject_bbox"]["x"].is_number());
    }

    #[test]
    fn test_invalid_time_range_fails() {
        let mut metadata = sample_metadata();
        metadata.time_range = (4.0, 4.0);
        assert!(metadata.validate().is_err());
    }

    #[test]
    fn test_confidence_out_of_range_fails() {
        let mut metadata = sample_metadata();
        metadata.confidence = 1.5;
        assert!(metadata.validate().is_err());
    }

    #[test]
    fn test_json_round_trip() {
        let metadata = sample_metadata();
        let json = serde_json::to_string(&metadata).unwrap();
        let back: MetadataOutput = serde_json::from_str(&json).unwrap();
        assert_eq!(metadata, back);
    }
}
