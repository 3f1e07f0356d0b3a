//! Client for the external text-model service used by metadata synthesis.
//!
//! Exposes a single `CompleteText` interface with an OpenAI-compatible HTTP
//! implementation and a mock for tests. Provider selection is a constructor
//! argument (base URL + model name), not runtime polymorphism.

pub mod client;
pub mod error;
pub mod prompts;

pub use client::{CompleteText, LlmConfig, MockModelClient, OpenAiCompatClient};
pub use error::{LlmError, LlmResult};
pub use prompts::{build_few_shot_prompt, build_simple_prompt, parse_model_response, SYSTEM_PROMPT};
