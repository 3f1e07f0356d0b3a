//! Schema validation with dotted-path error reporting.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationErrors, ValidationErrorsKind};

use crate::metadata::MetadataOutput;

/// A single validation failure with a dotted field path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ValidationIssue {
    /// Dotted path to the offending field, e.g. `motion.params.duration_s`.
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Validate a metadata output, returning every issue with its dotted path.
pub fn validate_metadata(metadata: &MetadataOutput) -> Result<(), Vec<ValidationIssue>> {
    match metadata.validate() {
        Ok(()) => Ok(()),
        Err(errors) => Err(flatten_errors(&errors, "")),
    }
}

fn flatten_errors(errors: &ValidationErrors, prefix: &str) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    for (field, kind) in errors.errors() {
        let field: &str = field.as_ref();
        let path = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{prefix}.{field}")
        };
        match kind {
            ValidationErrorsKind::Field(field_errors) => {
                for error in field_errors {
                    let message = error
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| error.code.to_string());
                    issues.push(ValidationIssue {
                        path: path.clone(),
                        message,
                    });
                }
            }
            ValidationErrorsKind::Struct(nested) => {
                issues.extend(flatten_errors(nested, &path));
            }
            ValidationErrorsKind::List(entries) => {
                for (index, nested) in entries {
                    issues.extend(flatten_errors(nested, &format!("{path}[{index}]")));
                }
            }
        }
    }
    issues.sort_by(|a, b| a.path.cmp(&b.path));
    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bbox::BBox;
    use crate::metadata::{FramingData, MotionParams, MotionSection};
    use crate::motion::{MotionType, SpeedProfile, SuggestedScale};

    fn sample() -> MetadataOutput {
        MetadataOutput {
            time_range: (0.0, 4.0),
            motion: MotionSection {
                motion_type: MotionType::Static,
                params: MotionParams {
                    duration_s: 4.0,
                    frame_pct_change: 0.01,
                    speed_profile: SpeedProfile::Linear,
                    motion_smoothness: 0.95,
                },
            },
            framing: FramingData {
                subject_bbox: BBox::new(0.3, 0.3, 0.4, 0.4),
                subject_occupancy: 0.4,
                suggested_scale: SuggestedScale::Closeup,
            },
            beat_alignment: 0.5,
            confidence: 0.9,
            explainability: "该镜头为静态镜头，画面稳定无明显运动。".to_string(),
        }
    }

    #[test]
    fn test_valid_metadata_has_no_issues() {
        assert!(validate_metadata(&sample()).is_ok());
    }

    #[test]
    fn test_nested_issue_carries_dotted_path() {
        let mut metadata = sample();
        metadata.motion.params.motion_smoothness = 2.0;
        let issues = validate_metadata(&metadata).unwrap_err();
        assert!(
            issues.iter().any(|i| i.path == "motion.params.motion_smoothness"),
            "issues were: {issues:?}"
        );
    }

    #[test]
    fn test_multiple_issues_are_all_reported() {
        let mut metadata = sample();
        metadata.confidence = -0.5;
        metadata.beat_alignment = 3.0;
        metadata.explainability = String::new();
        let issues = validate_metadata(&metadata).unwrap_err();
        let paths: Vec<&str> = issues.iter().map(|i| i.path.as_str()).collect();
        assert!(paths.contains(&"confidence"));
        assert!(paths.contains(&"beat_alignment"));
        assert!(paths.contains(&"explainability"));
    }

    #[test]
    fn test_invalid_bbox_reports_framing_path() {
        let mut metadata = sample();
        metadata.framing.subject_bbox = BBox::new(0.8, 0.8, 0.5, 0.5);
        let issues = validate_metadata(&metadata).unwrap_err();
        assert!(issues.iter().any(|i| i.path.starts_with("framing")));
    }
}
