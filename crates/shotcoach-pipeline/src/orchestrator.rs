//! Offline pipeline orchestration.
//!
//! Runs the five stages sequentially within one task, wrapping each in the
//! retry helper and a soft timeout. Partial stage outputs are retained on
//! failure and cancellation; the confidence gate annotates the result but
//! never aborts the pipeline.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{error, info};
use uuid::Uuid;

use shotcoach_analysis::{compute_indicators, IndicatorConfig};
use shotcoach_models::{
    ConfidenceAction, FeatureOutput, PipelineResult, PipelineStage, StageProgress, UploadOutput,
};

use crate::error::{PipelineError, StageResult};
use crate::instruction::InstructionGenerator;
use crate::retry::{retry_with_backoff, RetryConfig};
use crate::synthesizer::MetadataSynthesizer;

/// Contract of the external uploader collaborator: normalize the file and
/// report frame/EXIF facts.
#[async_trait]
pub trait Uploader: Send + Sync {
    async fn process(&self, video_path: &Path, video_id: &str) -> StageResult<UploadOutput>;
}

/// Contract of the external feature extractor: optical flow, subject
/// tracking and audio beats for the normalized upload.
#[async_trait]
pub trait FeatureExtractor: Send + Sync {
    async fn process(&self, upload: &UploadOutput) -> StageResult<FeatureOutput>;
}

/// Callback receiving progress reports before and after each stage.
pub type ProgressCallback = Arc<dyn Fn(StageProgress) + Send + Sync>;

/// Cooperative cancellation handle checked between stages.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Configuration for pipeline execution.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Gate: above this, proceed silently.
    pub high_confidence_threshold: f64,
    /// Gate: below this, request manual confirmation.
    pub medium_confidence_threshold: f64,
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Soft per-stage timeout.
    pub stage_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            high_confidence_threshold: 0.75,
            medium_confidence_threshold: 0.55,
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            stage_timeout: Duration::from_secs(120),
        }
    }
}

impl PipelineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_retries: std::env::var("SHOTCOACH_PIPELINE_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_retries),
            stage_timeout: Duration::from_secs(
                std::env::var("SHOTCOACH_PIPELINE_STAGE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.stage_timeout.as_secs()),
            ),
            ..defaults
        }
    }
}

/// Coordinates the offline analysis pipeline.
pub struct Orchestrator {
    config: PipelineConfig,
    indicator_config: IndicatorConfig,
    uploader: Arc<dyn Uploader>,
    feature_extractor: Arc<dyn FeatureExtractor>,
    synthesizer: MetadataSynthesizer,
    instruction_generator: InstructionGenerator,
    progress_callback: Option<ProgressCallback>,
}

impl Orchestrator {
    pub fn new(
        config: PipelineConfig,
        uploader: Arc<dyn Uploader>,
        feature_extractor: Arc<dyn FeatureExtractor>,
        synthesizer: MetadataSynthesizer,
        instruction_generator: InstructionGenerator,
    ) -> Self {
        Self {
            config,
            indicator_config: IndicatorConfig::default(),
            uploader,
            feature_extractor,
            synthesizer,
            instruction_generator,
            progress_callback: None,
        }
    }

    /// Install a progress callback. A storage adapter can use the reports to
    /// persist intermediate stage outputs.
    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    fn report(&self, video_id: &str, stage: PipelineStage, pct: f64, message: &str) {
        if let Some(callback) = &self.progress_callback {
            callback(StageProgress {
                video_id: video_id.to_string(),
                stage,
                pct,
                message: message.to_string(),
            });
        }
    }

    /// Gate decision from the final metadata confidence.
    pub fn handle_confidence(&self, confidence: f64) -> ConfidenceAction {
        if confidence > self.config.high_confidence_threshold {
            ConfidenceAction::Proceed
        } else if confidence >= self.config.medium_confidence_threshold {
            ConfidenceAction::Warn
        } else {
            ConfidenceAction::Manual
        }
    }

    async fn run_stage<T, F, Fut>(
        &self,
        stage_name: &'static str,
        operation: F,
    ) -> StageResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = StageResult<T>>,
    {
        let retry_config = RetryConfig {
            max_retries: self.config.max_retries,
            base_delay: self.config.base_delay,
            max_delay: self.config.max_delay,
            operation_name: stage_name.to_string(),
            ..Default::default()
        };
        let timeout = self.config.stage_timeout;

        retry_with_backoff(
            &retry_config,
            || async {
                match tokio::time::timeout(timeout, operation()).await {
                    Ok(result) => result,
                    Err(_) => Err(PipelineError::StageTimeout {
                        stage: stage_name,
                        secs: timeout.as_secs(),
                    }),
                }
            },
            PipelineError::is_retryable,
        )
        .await
    }

    /// Execute the complete pipeline for one video.
    pub async fn run_pipeline(
        &self,
        video_path: impl Into<PathBuf>,
        video_id: Option<String>,
        cancel: Option<&CancelToken>,
    ) -> PipelineResult {
        let video_path = video_path.into();
        let video_id = video_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let mut result = PipelineResult::new(video_id.clone());

        info!(video_id = %video_id, path = %video_path.display(), "pipeline started");

        match self.run_stages(&video_path, &video_id, &mut result, cancel).await {
            Ok(()) => {
                self.report(&video_id, PipelineStage::Completed, 100.0, "分析完成");
            }
            Err(PipelineError::Cancelled) => {
                info!(video_id = %video_id, "pipeline cancelled");
                result.error = Some("cancelled".to_string());
            }
            Err(e) => {
                error!(video_id = %video_id, error = %e, "pipeline failed");
                result.error = Some(e.to_string());
                self.report(
                    &video_id,
                    PipelineStage::Failed,
                    0.0,
                    &format!("处理失败: {e}"),
                );
            }
        }

        result
    }

    async fn run_stages(
        &self,
        video_path: &Path,
        video_id: &str,
        result: &mut PipelineResult,
        cancel: Option<&CancelToken>,
    ) -> StageResult<()> {
        let check_cancel = || -> StageResult<()> {
            if cancel.is_some_and(CancelToken::is_cancelled) {
                Err(PipelineError::Cancelled)
            } else {
                Ok(())
            }
        };

        // Stage 1: upload / preprocessing
        check_cancel()?;
        self.report(video_id, PipelineStage::Upload, 0.0, "开始处理视频...");
        let upload = self
            .run_stage("upload", || self.uploader.process(video_path, video_id))
            .await?;
        result.upload_output = Some(upload.clone());
        self.report(video_id, PipelineStage::Upload, 20.0, "视频预处理完成");

        // Stage 2: feature extraction
        check_cancel()?;
        self.report(
            video_id,
            PipelineStage::FeatureExtraction,
            20.0,
            "正在提取特征...",
        );
        let features = self
            .run_stage("feature_extraction", || {
                self.feature_extractor.process(&upload)
            })
            .await?;
        result.feature_output = Some(features.clone());
        self.report(
            video_id,
            PipelineStage::FeatureExtraction,
            50.0,
            "特征提取完成",
        );

        // Stage 3: heuristic analysis
        check_cancel()?;
        self.report(
            video_id,
            PipelineStage::HeuristicAnalysis,
            50.0,
            "正在分析运动特征...",
        );
        let time_range = (0.0, upload.duration_s);
        let indicators = self
            .run_stage("heuristic_analysis", || async {
                compute_indicators(&features, time_range, &self.indicator_config)
                    .map_err(PipelineError::from)
            })
            .await?;
        result.indicators = Some(indicators.clone());
        self.report(
            video_id,
            PipelineStage::HeuristicAnalysis,
            70.0,
            "运动分析完成",
        );

        // Stage 4: metadata synthesis
        check_cancel()?;
        self.report(
            video_id,
            PipelineStage::MetadataSynthesis,
            70.0,
            "正在生成元数据...",
        );
        let primary_direction = features.optical_flow.primary_direction_deg;
        let metadata = self
            .run_stage("metadata_synthesis", || {
                self.synthesizer
                    .process(&indicators, Some(&upload.exif), Some(primary_direction))
            })
            .await?;
        result.metadata_output = Some(metadata.clone());
        self.report(
            video_id,
            PipelineStage::MetadataSynthesis,
            85.0,
            "元数据生成完成",
        );

        // Stage 5: instruction generation
        check_cancel()?;
        self.report(
            video_id,
            PipelineStage::InstructionGeneration,
            85.0,
            "正在生成拍摄指令...",
        );
        let card = self.instruction_generator.generate(&metadata, video_id);
        result.instruction_card = Some(card);

        // Confidence gate: annotates the result, never aborts.
        let action = self.handle_confidence(metadata.confidence);
        result.confidence_action = Some(action);
        result.confidence_message = action.message().map(str::to_string);
        if let Some(message) = action.message() {
            info!(video_id = %video_id, action = ?action, message, "confidence gate");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::sync::Mutex;

    use shotcoach_llm::MockModelClient;
    use shotcoach_models::{BBox, ExifData, OpticalFlow, SubjectTracking};

    use crate::instruction::InstructionGeneratorConfig;
    use crate::synthesizer::{MetadataSynthesizer, SynthesizerConfig};

    struct FakeUploader {
        failures_before_success: AtomicU32,
    }

    impl FakeUploader {
        fn reliable() -> Self {
            Self {
                failures_before_success: AtomicU32::new(0),
            }
        }

        fn flaky(failures: u32) -> Self {
            Self {
                failures_before_success: AtomicU32::new(failures),
            }
        }
    }

    #[async_trait]
    impl Uploader for FakeUploader {
        async fn process(
            &self,
            _video_path: &Path,
            video_id: &str,
        ) -> StageResult<UploadOutput> {
            let remaining = self.failures_before_success.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures_before_success.store(remaining - 1, Ordering::SeqCst);
                return Err(PipelineError::upload_failed("transient I/O error"));
            }
            Ok(UploadOutput {
                video_id: video_id.to_string(),
                frame_count: 120,
                fps: 30.0,
                duration_s: 4.0,
                resolution: (640, 360),
                exif: ExifData {
                    focal_length_mm: Some(35.0),
                    aperture: Some(4.0),
                    ..Default::default()
                },
            })
        }
    }

    struct FakeExtractor {
        flow: OpticalFlow,
        bboxes: Vec<BBox>,
    }

    impl FakeExtractor {
        fn steady(avg_magnitude: f64, bbox: BBox) -> Self {
            Self {
                flow: OpticalFlow {
                    avg_magnitude,
                    primary_direction_deg: 0.0,
                    flow_vectors: vec![(2.0, 1.0); 8],
                },
                bboxes: vec![bbox; 8],
            }
        }
    }

    #[async_trait]
    impl FeatureExtractor for FakeExtractor {
        async fn process(&self, upload: &UploadOutput) -> StageResult<FeatureOutput> {
            Ok(FeatureOutput {
                video_id: upload.video_id.clone(),
                optical_flow: self.flow.clone(),
                subject_tracking: SubjectTracking {
                    bboxes: self.bboxes.clone(),
                    confidences: vec![0.9; self.bboxes.len()],
                    timestamps_s: (0..self.bboxes.len()).map(|i| i as f64 * 0.5).collect(),
                },
                audio_beats: Some(vec![0.5, 1.0, 1.5, 2.0]),
            })
        }
    }

    fn orchestrator_with(
        uploader: FakeUploader,
        extractor: FakeExtractor,
        model_response: Option<String>,
    ) -> Orchestrator {
        let model = model_response
            .map(|r| Arc::new(MockModelClient::returning(r)) as Arc<dyn shotcoach_llm::CompleteText>);
        let synthesizer = match model {
            Some(model) => MetadataSynthesizer::new(SynthesizerConfig::default(), Some(model)),
            None => MetadataSynthesizer::rules_only(),
        };
        Orchestrator::new(
            PipelineConfig {
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
                ..Default::default()
            },
            Arc::new(uploader),
            Arc::new(extractor),
            synthesizer,
            InstructionGenerator::new(InstructionGeneratorConfig::default()),
        )
    }

    fn static_model_response() -> String {
        serde_json::json!({
            "motion": {"type": "static", "params": {"speed_profile": "linear"}},
            "framing": {"suggested_scale": "closeup"},
            "confidence": 0.9,
            "explainability": "该镜头几乎没有运动，属于静态镜头。主体占画面约40%，适合近景构图。"
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_full_pipeline_produces_all_stage_outputs() {
        let orchestrator = orchestrator_with(
            FakeUploader::reliable(),
            FakeExtractor::steady(2.0, BBox::new(0.3, 0.3, 0.6, 0.65)),
            Some(static_model_response()),
        );

        let result = orchestrator
            .run_pipeline("/tmp/video.mp4", Some("vid-1".to_string()), None)
            .await;

        assert!(result.is_successful(), "error: {:?}", result.error);
        assert!(result.upload_output.is_some());
        assert!(result.feature_output.is_some());
        assert!(result.indicators.is_some());
        assert!(result.metadata_output.is_some());
        let card = result.instruction_card.as_ref().unwrap();
        assert!(card.is_complete());
        assert_eq!(card.video_id, "vid-1");
        assert_eq!(result.confidence_action, Some(ConfidenceAction::Proceed));
        assert!(result.confidence_message.is_none());
    }

    #[tokio::test]
    async fn test_progress_schedule() {
        let reports: Arc<Mutex<Vec<(PipelineStage, f64)>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = reports.clone();
        let orchestrator = orchestrator_with(
            FakeUploader::reliable(),
            FakeExtractor::steady(2.0, BBox::new(0.3, 0.3, 0.6, 0.65)),
            Some(static_model_response()),
        )
        .with_progress_callback(Arc::new(move |p: StageProgress| {
            sink.lock().unwrap().push((p.stage, p.pct));
        }));

        orchestrator
            .run_pipeline("/tmp/video.mp4", Some("vid-1".to_string()), None)
            .await;

        let pcts: Vec<f64> = reports.lock().unwrap().iter().map(|(_, pct)| *pct).collect();
        assert_eq!(
            pcts,
            vec![0.0, 20.0, 20.0, 50.0, 50.0, 70.0, 70.0, 85.0, 85.0, 100.0]
        );
    }

    #[tokio::test]
    async fn test_transient_upload_failures_are_retried() {
        let orchestrator = orchestrator_with(
            FakeUploader::flaky(2),
            FakeExtractor::steady(2.0, BBox::new(0.3, 0.3, 0.6, 0.65)),
            Some(static_model_response()),
        );

        let result = orchestrator
            .run_pipeline("/tmp/video.mp4", Some("vid-1".to_string()), None)
            .await;
        assert!(result.is_successful(), "error: {:?}", result.error);
    }

    #[tokio::test]
    async fn test_retries_exhausted_keeps_partial_outputs() {
        let orchestrator = orchestrator_with(
            FakeUploader::flaky(10),
            FakeExtractor::steady(2.0, BBox::new(0.3, 0.3, 0.6, 0.65)),
            None,
        );

        let result = orchestrator
            .run_pipeline("/tmp/video.mp4", Some("vid-1".to_string()), None)
            .await;
        assert!(!result.is_successful());
        assert!(result.error.is_some());
        assert!(result.upload_output.is_none());
        assert!(result.instruction_card.is_none());
    }

    #[tokio::test]
    async fn test_cancellation_preserves_partials() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let orchestrator = orchestrator_with(
            FakeUploader::reliable(),
            FakeExtractor::steady(2.0, BBox::new(0.3, 0.3, 0.6, 0.65)),
            None,
        );

        let result = orchestrator
            .run_pipeline("/tmp/video.mp4", Some("vid-1".to_string()), Some(&cancel))
            .await;
        assert_eq!(result.error.as_deref(), Some("cancelled"));
    }

    #[tokio::test]
    async fn test_confidence_gate_bands() {
        let orchestrator = orchestrator_with(
            FakeUploader::reliable(),
            FakeExtractor::steady(2.0, BBox::new(0.3, 0.3, 0.6, 0.65)),
            None,
        );
        assert_eq!(orchestrator.handle_confidence(0.8), ConfidenceAction::Proceed);
        assert_eq!(orchestrator.handle_confidence(0.75), ConfidenceAction::Warn);
        assert_eq!(orchestrator.handle_confidence(0.55), ConfidenceAction::Warn);
        assert_eq!(orchestrator.handle_confidence(0.54), ConfidenceAction::Manual);
    }

    #[tokio::test]
    async fn test_generated_video_id_when_absent() {
        let orchestrator = orchestrator_with(
            FakeUploader::reliable(),
            FakeExtractor::steady(2.0, BBox::new(0.3, 0.3, 0.6, 0.65)),
            Some(static_model_response()),
        );
        let result = orchestrator.run_pipeline("/tmp/video.mp4", None, None).await;
        assert!(!result.video_id.is_empty());
        assert_eq!(
            result.instruction_card.as_ref().unwrap().video_id,
            result.video_id
        );
    }
}
