//! Pipeline error taxonomy.

use thiserror::Error;

use shotcoach_llm::LlmError;
use shotcoach_models::ValidationIssue;

pub type StageResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("upload failed: {0}")]
    UploadFailed(String),

    #[error("feature extraction failed: {0}")]
    FeatureExtractionFailed(String),

    #[error("analysis failed: {0}")]
    Analysis(#[from] shotcoach_analysis::AnalysisError),

    #[error("model enhancement failed: {0}")]
    Model(#[from] LlmError),

    #[error("metadata failed schema validation: {}", format_issues(.0))]
    Validation(Vec<ValidationIssue>),

    #[error("stage {stage} timed out after {secs}s")]
    StageTimeout { stage: &'static str, secs: u64 },

    #[error("cancelled")]
    Cancelled,

    #[error("configuration error: {0}")]
    Config(String),
}

fn format_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl PipelineError {
    pub fn upload_failed(msg: impl Into<String>) -> Self {
        Self::UploadFailed(msg.into())
    }

    pub fn feature_extraction_failed(msg: impl Into<String>) -> Self {
        Self::FeatureExtractionFailed(msg.into())
    }

    /// Transient failures the retry helper may attempt again.
    pub fn is_retryable(&self) -> bool {
        match self {
            PipelineError::UploadFailed(_)
            | PipelineError::FeatureExtractionFailed(_)
            | PipelineError::StageTimeout { .. } => true,
            PipelineError::Model(inner) => inner.is_retryable(),
            PipelineError::Analysis(_)
            | PipelineError::Validation(_)
            | PipelineError::Cancelled
            | PipelineError::Config(_) => false,
        }
    }
}
