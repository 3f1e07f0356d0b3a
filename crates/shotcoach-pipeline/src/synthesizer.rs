//! Metadata synthesis: rule baseline merged with model enhancement, then
//! schema-validated with auto-repair.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use shotcoach_analysis::{MotionClassifier, MotionRulesConfig};
use shotcoach_llm::{
    build_few_shot_prompt, build_simple_prompt, parse_model_response, CompleteText, SYSTEM_PROMPT,
};
use shotcoach_models::{
    validate_metadata, BBox, ExifData, FramingData, HeuristicIndicators, MetadataOutput,
    MotionParams, MotionSection, MotionType, SpeedProfile, SuggestedScale,
};

use crate::error::{PipelineError, StageResult};

/// Configuration for metadata synthesis.
#[derive(Debug, Clone)]
pub struct SynthesizerConfig {
    /// Enable model enhancement on top of the rule baseline.
    pub use_model: bool,
    /// Few-shot prompt when true, compact prompt otherwise.
    pub use_few_shot: bool,
    /// Number of few-shot example pairs (clamped 2-4).
    pub num_examples: usize,
    /// Fall back to the rule baseline after model retries are exhausted.
    pub fallback_to_rules: bool,
    /// Validate the merged output against the metadata schema.
    pub validate_output: bool,
    /// Auto-repair out-of-range values instead of failing validation.
    pub auto_repair: bool,
    pub model_max_retries: u32,
    pub model_base_delay: Duration,
    pub model_max_delay: Duration,
}

impl Default for SynthesizerConfig {
    fn default() -> Self {
        Self {
            use_model: true,
            use_few_shot: true,
            num_examples: 3,
            fallback_to_rules: true,
            validate_output: true,
            auto_repair: true,
            model_max_retries: 3,
            model_base_delay: Duration::from_secs(1),
            model_max_delay: Duration::from_secs(30),
        }
    }
}

/// Fields the model may override in the merged output.
#[derive(Debug, Default)]
struct ModelEnhancement {
    motion_type: Option<MotionType>,
    speed_profile: Option<SpeedProfile>,
    suggested_scale: Option<SuggestedScale>,
    confidence: Option<f64>,
    explainability: Option<String>,
}

/// Synthesizes a validated `MetadataOutput` from heuristic indicators.
pub struct MetadataSynthesizer {
    config: SynthesizerConfig,
    classifier: MotionClassifier,
    model: Option<Arc<dyn CompleteText>>,
}

impl MetadataSynthesizer {
    pub fn new(config: SynthesizerConfig, model: Option<Arc<dyn CompleteText>>) -> Self {
        Self {
            classifier: MotionClassifier::new(MotionRulesConfig::default()),
            config,
            model,
        }
    }

    /// Rule-only synthesizer, used as the model-free fallback configuration.
    pub fn rules_only() -> Self {
        Self::new(
            SynthesizerConfig {
                use_model: false,
                ..Default::default()
            },
            None,
        )
    }

    /// Generate metadata for one indicator record.
    pub async fn process(
        &self,
        indicators: &HeuristicIndicators,
        exif: Option<&ExifData>,
        primary_direction_deg: Option<f64>,
    ) -> StageResult<MetadataOutput> {
        let (rule_type, rule_profile, rule_scale, rule_confidence) =
            self.classifier.classify(indicators, primary_direction_deg);

        let enhancement = if self.config.use_model {
            match self.model.as_ref() {
                Some(model) => match self.enhance_with_model(model.as_ref(), indicators, exif).await
                {
                    Ok(enhancement) => Some(enhancement),
                    Err(e) if self.config.fallback_to_rules => {
                        warn!(error = %e, "model enhancement failed, falling back to rules");
                        None
                    }
                    Err(e) => return Err(e),
                },
                None => None,
            }
        } else {
            None
        };

        let enhancement = enhancement.unwrap_or_default();

        let motion_type = enhancement.motion_type.unwrap_or(rule_type);
        let speed_profile = enhancement.speed_profile.unwrap_or(rule_profile);
        let suggested_scale = enhancement.suggested_scale.unwrap_or(rule_scale);

        let confidence =
            final_confidence(rule_confidence, enhancement.confidence, indicators);
        let explainability =
            self.build_explainability(motion_type, indicators, enhancement.explainability);

        let metadata = MetadataOutput {
            time_range: indicators.time_range,
            motion: MotionSection {
                motion_type,
                params: MotionParams {
                    duration_s: indicators.duration_s(),
                    frame_pct_change: indicators.frame_pct_change,
                    speed_profile,
                    motion_smoothness: indicators.motion_smoothness,
                },
            },
            framing: FramingData {
                subject_bbox: bbox_from_occupancy(indicators.subject_occupancy),
                subject_occupancy: indicators.subject_occupancy,
                suggested_scale,
            },
            beat_alignment: indicators.beat_alignment,
            confidence,
            explainability,
        };

        if self.config.validate_output {
            self.validate_and_repair(metadata)
        } else {
            Ok(metadata)
        }
    }

    async fn enhance_with_model(
        &self,
        model: &dyn CompleteText,
        indicators: &HeuristicIndicators,
        exif: Option<&ExifData>,
    ) -> StageResult<ModelEnhancement> {
        let prompt = if self.config.use_few_shot {
            build_few_shot_prompt(indicators, exif, self.config.num_examples)
        } else {
            build_simple_prompt(indicators, exif)
        };

        // Parse failures are retryable: rebuild the call from scratch.
        let mut last_error = None;
        for attempt in 0..self.config.model_max_retries {
            let response = model
                .complete_with_retry(
                    &prompt,
                    Some(SYSTEM_PROMPT),
                    self.config.model_max_retries,
                    self.config.model_base_delay,
                    self.config.model_max_delay,
                )
                .await
                .map_err(PipelineError::Model)?;

            match parse_model_response(&response) {
                Ok(value) => return Ok(normalize_model_result(&value)),
                Err(e) => {
                    debug!(attempt, error = %e, "model response did not parse");
                    last_error = Some(e);
                }
            }
        }

        Err(PipelineError::Model(last_error.unwrap_or(
            shotcoach_llm::LlmError::MalformedResponse("no attempts made".to_string()),
        )))
    }

    fn build_explainability(
        &self,
        motion_type: MotionType,
        indicators: &HeuristicIndicators,
        model_text: Option<String>,
    ) -> String {
        if let Some(text) = model_text {
            let trimmed = text.trim();
            if trimmed.chars().count() > 10 {
                return truncate_explainability(trimmed);
            }
        }
        default_explainability(motion_type, indicators)
    }

    fn validate_and_repair(
        &self,
        metadata: MetadataOutput,
    ) -> StageResult<MetadataOutput> {
        match validate_metadata(&metadata) {
            Ok(()) => Ok(metadata),
            Err(issues) => {
                warn!(?issues, "metadata failed validation");
                if !self.config.auto_repair {
                    return Err(PipelineError::Validation(issues));
                }
                let repaired = auto_repair(metadata);
                validate_metadata(&repaired)
                    .map_err(PipelineError::Validation)
                    .map(|()| repaired)
            }
        }
    }
}

/// Map a `motion.{type,params}` shaped model result onto override fields,
/// dropping any value that does not parse as its enum.
fn normalize_model_result(value: &Value) -> ModelEnhancement {
    let mut enhancement = ModelEnhancement::default();

    if let Some(type_str) = value.pointer("/motion/type") {
        match serde_json::from_value::<MotionType>(type_str.clone()) {
            Ok(motion_type) => enhancement.motion_type = Some(motion_type),
            Err(_) => warn!(value = %type_str, "invalid motion type from model"),
        }
    }

    if let Some(profile_str) = value.pointer("/motion/params/speed_profile") {
        match serde_json::from_value::<SpeedProfile>(profile_str.clone()) {
            Ok(profile) => enhancement.speed_profile = Some(profile),
            Err(_) => warn!(value = %profile_str, "invalid speed profile from model"),
        }
    }

    if let Some(scale_str) = value.pointer("/framing/suggested_scale") {
        match serde_json::from_value::<SuggestedScale>(scale_str.clone()) {
            Ok(scale) => enhancement.suggested_scale = Some(scale),
            Err(_) => warn!(value = %scale_str, "invalid suggested scale from model"),
        }
    }

    enhancement.confidence = value.get("confidence").and_then(Value::as_f64);
    enhancement.explainability = value
        .get("explainability")
        .and_then(Value::as_str)
        .map(str::to_string);

    enhancement
}

/// Final confidence: weighted rule/model blend adjusted by data quality.
fn final_confidence(
    rule_confidence: f64,
    model_confidence: Option<f64>,
    indicators: &HeuristicIndicators,
) -> f64 {
    let mut confidence = match model_confidence {
        // The model sees more context, so it gets the larger weight.
        Some(model) => 0.4 * rule_confidence + 0.6 * model,
        None => rule_confidence,
    };

    confidence += 0.1 * (indicators.motion_smoothness - 0.5);

    if indicators.frame_pct_change < 0.01 || indicators.frame_pct_change > 0.95 {
        confidence -= 0.05;
    }

    if indicators.beat_alignment > 0.7 {
        confidence += 0.05;
    }

    confidence.clamp(0.0, 1.0)
}

/// Estimate a centered 4:3 subject bbox whose area matches the occupancy.
fn bbox_from_occupancy(occupancy: f64) -> BBox {
    if occupancy <= 0.0 {
        return BBox::new(0.4, 0.4, 0.2, 0.2);
    }
    // w * h = area with w/h = 4/3.
    let h = (3.0 * occupancy / 4.0).sqrt().min(1.0);
    let w = (4.0 * h / 3.0).min(1.0);
    let x = ((1.0 - w) / 2.0).max(0.0);
    let y = ((1.0 - h) / 2.0).max(0.0);
    BBox::new(x, y, w, h)
}

/// Two-sentence Chinese explanation generated from the indicator bands.
fn default_explainability(motion_type: MotionType, indicators: &HeuristicIndicators) -> String {
    let smoothness = indicators.motion_smoothness;
    let occupancy = indicators.subject_occupancy;
    let frame_change = indicators.frame_pct_change;

    let smoothness_desc = if smoothness > 0.7 {
        "平滑"
    } else if smoothness > 0.4 {
        "中等流畅度"
    } else {
        "略有抖动"
    };

    let sentence1 = match motion_type {
        MotionType::Static => "该镜头为静态镜头，画面稳定无明显运动。".to_string(),
        MotionType::DollyIn | MotionType::DollyOut => {
            let direction = if motion_type == MotionType::DollyIn {
                "推进"
            } else {
                "拉远"
            };
            let speed_desc = if frame_change < 0.1 {
                "缓慢"
            } else if frame_change <= 0.25 {
                "中速"
            } else {
                "快速"
            };
            format!("该镜头为{speed_desc}{direction}，运动{smoothness_desc}。")
        }
        MotionType::Pan => {
            format!("该镜头为横向摇移，运动{smoothness_desc}，适合展示宽广场景。")
        }
        MotionType::Tilt => {
            format!("该镜头为纵向摇移，运动{smoothness_desc}，适合展示高度变化。")
        }
        MotionType::Track => {
            format!("该镜头为跟踪运动，运动{smoothness_desc}，持续跟随主体。")
        }
        MotionType::Handheld => "该镜头呈现手持拍摄特征，具有自然的运动感。".to_string(),
    };

    let occupancy_pct = (occupancy * 100.0) as i64;
    let composition = if occupancy >= 0.5 {
        format!("主体占画面约{occupancy_pct}%，构图紧凑")
    } else if occupancy >= 0.25 {
        format!("主体占画面约{occupancy_pct}%，构图适中")
    } else if occupancy >= 0.1 {
        format!("主体占画面约{occupancy_pct}%，留有环境空间")
    } else {
        format!("主体占画面约{occupancy_pct}%，以环境为主")
    };

    let technique = if smoothness > 0.7 {
        "建议使用滑轨或稳定器保持流畅"
    } else if smoothness > 0.4 {
        "可配合云台使用"
    } else {
        "建议增加稳定措施或采用静态拍摄"
    };

    let rhythm = if indicators.beat_alignment > 0.7 {
        "，节奏感强"
    } else {
        ""
    };

    format!("{sentence1}{composition}{rhythm}，{technique}。")
}

fn truncate_explainability(text: &str) -> String {
    if text.chars().count() <= 500 {
        return text.to_string();
    }
    let truncated: String = text.chars().take(497).collect();
    format!("{truncated}...")
}

/// Repair an out-of-range metadata output: clamp numerics, normalize the
/// bbox, restore time-range ordering, truncate overlong explainability.
/// Applying this to an already-valid output is the identity.
pub fn auto_repair(metadata: MetadataOutput) -> MetadataOutput {
    let (start, end) = metadata.time_range;
    let start = start.max(0.0);
    let end = if end > start { end } else { start + 1.0 };

    let explainability = if metadata.explainability.is_empty() {
        "自动生成的拍摄元数据。".to_string()
    } else {
        truncate_explainability(&metadata.explainability)
    };

    MetadataOutput {
        time_range: (start, end),
        motion: MotionSection {
            motion_type: metadata.motion.motion_type,
            params: MotionParams {
                duration_s: metadata.motion.params.duration_s.max(0.001),
                frame_pct_change: metadata.motion.params.frame_pct_change.clamp(0.0, 1.0),
                speed_profile: metadata.motion.params.speed_profile,
                motion_smoothness: metadata.motion.params.motion_smoothness.clamp(0.0, 1.0),
            },
        },
        framing: FramingData {
            subject_bbox: metadata.framing.subject_bbox.normalize(),
            subject_occupancy: metadata.framing.subject_occupancy.clamp(0.0, 1.0),
            suggested_scale: metadata.framing.suggested_scale,
        },
        beat_alignment: metadata.beat_alignment.clamp(0.0, 1.0),
        confidence: metadata.confidence.clamp(0.0, 1.0),
        explainability,
    }
}
