//! Offline analysis pipeline.
//!
//! Turns an uploaded video into a validated `MetadataOutput` and a
//! three-layer `InstructionCard`:
//!
//! ```text
//! upload -> feature_extraction -> heuristic_analysis
//!        -> metadata_synthesis -> instruction_generation
//! ```
//!
//! Stages run through a retry-with-backoff helper; a progress callback fires
//! before and after each stage and a confidence gate annotates the result.

pub mod error;
pub mod instruction;
pub mod orchestrator;
pub mod retry;
pub mod synthesizer;

pub use error::{PipelineError, StageResult};
pub use instruction::{InstructionGenerator, InstructionGeneratorConfig};
pub use orchestrator::{
    CancelToken, FeatureExtractor, Orchestrator, PipelineConfig, ProgressCallback, Uploader,
};
pub use retry::{retry_with_backoff, RetryConfig};
pub use synthesizer::{MetadataSynthesizer, SynthesizerConfig};
