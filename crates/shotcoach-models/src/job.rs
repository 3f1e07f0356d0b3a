//! Offline pipeline stages, collaborator contracts, progress and results.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::flow::{OpticalFlow, SubjectTracking};
use crate::indicators::HeuristicIndicators;
use crate::instruction::InstructionCard;
use crate::metadata::{ExifData, MetadataOutput};

/// Stages of the offline analysis pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Upload,
    FeatureExtraction,
    HeuristicAnalysis,
    MetadataSynthesis,
    InstructionGeneration,
    Completed,
    Failed,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Upload => "upload",
            PipelineStage::FeatureExtraction => "feature_extraction",
            PipelineStage::HeuristicAnalysis => "heuristic_analysis",
            PipelineStage::MetadataSynthesis => "metadata_synthesis",
            PipelineStage::InstructionGeneration => "instruction_generation",
            PipelineStage::Completed => "completed",
            PipelineStage::Failed => "failed",
        }
    }
}

/// Decision of the post-synthesis confidence gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceAction {
    /// confidence > 0.75: no message.
    Proceed,
    /// 0.55 <= confidence <= 0.75.
    Warn,
    /// confidence < 0.55.
    Manual,
}

impl ConfidenceAction {
    /// Localized user-facing message; `None` for `Proceed`.
    pub fn message(&self) -> Option<&'static str> {
        match self {
            ConfidenceAction::Proceed => None,
            ConfidenceAction::Warn => Some("请尝试并拍摄两条版本"),
            ConfidenceAction::Manual => Some("置信度较低，建议人工确认后再执行"),
        }
    }
}

/// Progress report handed to the orchestrator's callback before and after
/// each stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StageProgress {
    pub video_id: String,
    pub stage: PipelineStage,
    /// Percent complete, 0-100, following the 0/20/50/70/85/100 schedule.
    pub pct: f64,
    pub message: String,
}

/// Contract of the external uploader collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct UploadOutput {
    pub video_id: String,
    pub frame_count: u32,
    pub fps: f64,
    pub duration_s: f64,
    /// `(width, height)` of the normalized frames.
    pub resolution: (u32, u32),
    #[serde(default)]
    pub exif: ExifData,
}

/// Contract of the external feature-extractor collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FeatureOutput {
    pub video_id: String,
    pub optical_flow: OpticalFlow,
    pub subject_tracking: SubjectTracking,
    /// Audio beat timestamps in seconds, absent when the clip has no audio.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_beats: Option<Vec<f64>>,
}

/// Complete result of one offline pipeline invocation.
///
/// Every stage output that was produced is retained, including on failure
/// and cancellation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct PipelineResult {
    pub video_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload_output: Option<UploadOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature_output: Option<FeatureOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indicators: Option<HeuristicIndicators>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata_output: Option<MetadataOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instruction_card: Option<InstructionCard>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence_action: Option<ConfidenceAction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PipelineResult {
    pub fn new(video_id: impl Into<String>) -> Self {
        Self {
            video_id: video_id.into(),
            ..Default::default()
        }
    }

    pub fn is_successful(&self) -> bool {
        self.error.is_none() && self.instruction_card.is_some()
    }
}
