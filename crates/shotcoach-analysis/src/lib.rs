//! The shared computational core of the twin analysis pipelines.
//!
//! - `indicators`: pure indicator algebra over flow and bbox data (C1)
//! - `classifier`: rule-based motion type inference (C2)
//! - `smoothing`: Kalman / sliding-window filtering with anomaly suppression (C3)
//! - `hysteresis`: dual-threshold level tracking, consistency and cooldown (C4)
//! - `state_machine`: temporally stable motion state with suppression rules (C4)

pub mod classifier;
pub mod error;
pub mod hysteresis;
pub mod indicators;
pub mod smoothing;
pub mod state_machine;

pub use classifier::{MotionClassifier, MotionRulesConfig};
pub use error::AnalysisError;
pub use hysteresis::{HysteresisConfig, HysteresisController, Level};
pub use indicators::{compute_indicators, IndicatorConfig};
pub use smoothing::{IndicatorSample, SmoothingConfig, SmoothingFilter};
pub use state_machine::{MotionStateMachine, StateMachineConfig};
