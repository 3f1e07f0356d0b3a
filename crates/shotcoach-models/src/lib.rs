//! Shared data models for the ShotCoach analysis engine.
//!
//! This crate provides Serde-serializable types for:
//! - Normalized bounding boxes and optical-flow summaries
//! - Heuristic indicators (the shared indicator algebra inputs/outputs)
//! - Motion/speed/scale enums
//! - Metadata output with schema validation
//! - Three-layer instruction cards
//! - Realtime analysis results and advice payloads
//! - Wire message envelopes for the realtime stream (ws.rs)
//! - Offline pipeline stages, progress and results

pub mod bbox;
pub mod flow;
pub mod indicators;
pub mod instruction;
pub mod job;
pub mod metadata;
pub mod motion;
pub mod realtime;
pub mod validate;
pub mod ws;

// Re-export common types
pub use bbox::BBox;
pub use flow::{OpticalFlow, SubjectTracking};
pub use indicators::HeuristicIndicators;
pub use instruction::{AdvancedParams, InstructionCard};
pub use job::{
    ConfidenceAction, FeatureOutput, PipelineResult, PipelineStage, StageProgress, UploadOutput,
};
pub use metadata::{ExifData, FramingData, MetadataOutput, MotionParams, MotionSection};
pub use motion::{MotionType, SpeedProfile, SuggestedScale};
pub use realtime::{
    now_ms, AdviceCategory, AdvicePayload, AdvicePriority, DominantLight, RealtimeAnalysisResult,
    SessionSnapshot,
};
pub use validate::{ValidationIssue, validate_metadata};
pub use ws::{ClientMessage, ErrorCode, ServerMessage};
