//! End-to-end offline scenarios with a fake external model returning fixed
//! JSON: indicators -> metadata synthesis -> instruction card -> gate.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use shotcoach_llm::MockModelClient;
use shotcoach_models::{
    ConfidenceAction, FeatureOutput, HeuristicIndicators, MotionType, SpeedProfile,
    SuggestedScale, UploadOutput,
};
use shotcoach_pipeline::{
    FeatureExtractor, InstructionGenerator, InstructionGeneratorConfig, MetadataSynthesizer,
    Orchestrator, PipelineConfig, PipelineError, SynthesizerConfig, Uploader,
};

struct UnusedUploader;

#[async_trait]
impl Uploader for UnusedUploader {
    async fn process(&self, _: &Path, _: &str) -> Result<UploadOutput, PipelineError> {
        unreachable!("scenario tests start from indicators")
    }
}

struct UnusedExtractor;

#[async_trait]
impl FeatureExtractor for UnusedExtractor {
    async fn process(&self, _: &UploadOutput) -> Result<FeatureOutput, PipelineError> {
        unreachable!("scenario tests start from indicators")
    }
}

fn gate() -> Orchestrator {
    Orchestrator::new(
        PipelineConfig::default(),
        Arc::new(UnusedUploader),
        Arc::new(UnusedExtractor),
        MetadataSynthesizer::rules_only(),
        InstructionGenerator::new(InstructionGeneratorConfig::default()),
    )
}

fn indicators(
    avg_motion: f64,
    frame_change: f64,
    smoothness: f64,
    occupancy: f64,
    beat: f64,
) -> HeuristicIndicators {
    HeuristicIndicators {
        video_id: "scenario".to_string(),
        time_range: (0.0, 4.0),
        avg_motion_px_per_s: avg_motion,
        frame_pct_change: frame_change,
        motion_smoothness: smoothness,
        subject_occupancy: occupancy,
        beat_alignment: beat,
    }
}

fn synthesizer_with(model_json: serde_json::Value) -> MetadataSynthesizer {
    let model = Arc::new(MockModelClient::returning(model_json.to_string()));
    MetadataSynthesizer::new(SynthesizerConfig::default(), Some(model))
}

#[tokio::test]
async fn scenario_static_shot() {
    let synthesizer = synthesizer_with(serde_json::json!({
        "motion": {"type": "static", "params": {"speed_profile": "linear"}},
        "framing": {"suggested_scale": "closeup"},
        "confidence": 0.92,
        "explainability": "该镜头几乎没有运动，属于静态镜头。主体占画面约40%，适合近景构图。"
    }));

    let ind = indicators(2.0, 0.01, 0.95, 0.4, 0.5);
    let metadata = synthesizer.process(&ind, None, None).await.unwrap();

    assert_eq!(metadata.motion_type(), MotionType::Static);
    assert_eq!(metadata.motion.params.speed_profile, SpeedProfile::Linear);
    assert_eq!(metadata.framing.suggested_scale, SuggestedScale::Closeup);
    assert!(metadata.confidence > 0.75, "confidence {}", metadata.confidence);
    assert_eq!(
        gate().handle_confidence(metadata.confidence),
        ConfidenceAction::Proceed
    );

    let card = InstructionGenerator::new(InstructionGeneratorConfig::default())
        .generate(&metadata, "scenario");
    assert!(card.is_complete());
    assert!(card.primary[0].contains("静态镜头"));
}

#[tokio::test]
async fn scenario_dolly_in() {
    let synthesizer = synthesizer_with(serde_json::json!({
        "motion": {"type": "dolly_in", "params": {"speed_profile": "ease_in_out"}},
        "framing": {"suggested_scale": "closeup"},
        "confidence": 0.85,
        "explainability": "画幅变化明显（18%），表明镜头在推进。运动平滑度较高，建议使用渐入渐出的速度曲线。"
    }));

    let ind = indicators(85.0, 0.18, 0.78, 0.45, 0.75);
    let metadata = synthesizer.process(&ind, None, None).await.unwrap();

    assert_eq!(metadata.motion_type(), MotionType::DollyIn);
    assert_eq!(metadata.motion.params.speed_profile, SpeedProfile::EaseInOut);
    assert_eq!(metadata.framing.suggested_scale, SuggestedScale::Closeup);

    let card = InstructionGenerator::new(InstructionGeneratorConfig::default())
        .generate(&metadata, "scenario");
    let equipment = format!("{} {}", card.primary[2], card.advanced.stabilization);
    assert!(
        equipment.contains("滑轨") || equipment.contains("稳定器"),
        "equipment was: {equipment}"
    );
}

#[tokio::test]
async fn scenario_handheld() {
    let synthesizer = synthesizer_with(serde_json::json!({
        "motion": {"type": "handheld", "params": {"speed_profile": "linear"}},
        "framing": {"suggested_scale": "closeup"},
        "confidence": 0.68,
        "explainability": "运动平滑度较低（0.35），呈现手持拍摄特征。建议增加稳定措施。"
    }));

    let ind = indicators(150.0, 0.08, 0.35, 0.25, 0.5);
    let metadata = synthesizer.process(&ind, None, None).await.unwrap();

    assert_eq!(metadata.motion_type(), MotionType::Handheld);

    let card = InstructionGenerator::new(InstructionGeneratorConfig::default())
        .generate(&metadata, "scenario");
    let equipment = format!("{} {}", card.primary[2], card.advanced.stabilization);
    assert!(equipment.contains("三脚架"), "equipment was: {equipment}");
}

#[tokio::test]
async fn scenario_low_confidence_requires_manual_confirmation() {
    let synthesizer = synthesizer_with(serde_json::json!({
        "motion": {"type": "handheld", "params": {"speed_profile": "linear"}},
        "framing": {"suggested_scale": "medium"},
        "confidence": 0.4,
        "explainability": "指标之间存在矛盾，运动类型难以判断，置信度较低。"
    }));

    let ind = indicators(60.0, 0.12, 0.3, 0.2, 0.5);
    let metadata = synthesizer.process(&ind, None, None).await.unwrap();

    assert!(metadata.confidence < 0.55, "confidence {}", metadata.confidence);
    let action = gate().handle_confidence(metadata.confidence);
    assert_eq!(action, ConfidenceAction::Manual);
    assert_eq!(action.message(), Some("置信度较低，建议人工确认后再执行"));

    let card = InstructionGenerator::new(InstructionGeneratorConfig::default())
        .generate(&metadata, "scenario");
    assert!(card.primary[3].contains("人工确认"));
}
