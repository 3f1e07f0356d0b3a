//! Motion state machine: temporally stable motion type with suppression rules.

use std::collections::VecDeque;

use tracing::debug;

use shotcoach_models::{HeuristicIndicators, MotionType};

use crate::classifier::{MotionClassifier, MotionRulesConfig};

/// Advice categories a motion type suppresses while active.
pub const SUPPRESS_SUBJECT_SIZE_CHANGE: &str = "subject_size_change";
pub const SUPPRESS_HORIZONTAL_DRIFT: &str = "horizontal_drift";
pub const SUPPRESS_VERTICAL_DRIFT: &str = "vertical_drift";

/// Configuration for state machine behavior.
#[derive(Debug, Clone)]
pub struct StateMachineConfig {
    /// Ring size for state/confidence history.
    pub history_size: usize,
    /// Minimum confidence for an inference to count toward a state change.
    pub min_confidence_threshold: f64,
    /// Consecutive identical inferences required before committing a change.
    pub consistency_required: u32,
    /// Confidence decay applied when a low-confidence differing inference arrives.
    pub confidence_decay: f64,
}

impl Default for StateMachineConfig {
    fn default() -> Self {
        Self {
            history_size: 5,
            min_confidence_threshold: 0.4,
            consistency_required: 2,
            confidence_decay: 0.9,
        }
    }
}

/// Wraps the rule-based classifier with temporal stability: a differing
/// inference only commits after `consistency_required` consecutive repeats,
/// while matching inferences reinforce the stored confidence via EMA.
#[derive(Debug)]
pub struct MotionStateMachine {
    config: StateMachineConfig,
    classifier: MotionClassifier,
    current_state: MotionType,
    state_confidence: f64,
    state_history: VecDeque<MotionType>,
    confidence_history: VecDeque<f64>,
    pending_state: Option<MotionType>,
    pending_count: u32,
}

impl Default for MotionStateMachine {
    fn default() -> Self {
        Self::new(StateMachineConfig::default(), MotionRulesConfig::default())
    }
}

impl MotionStateMachine {
    pub fn new(config: StateMachineConfig, rules: MotionRulesConfig) -> Self {
        Self {
            classifier: MotionClassifier::new(rules),
            current_state: MotionType::Static,
            state_confidence: 0.0,
            state_history: VecDeque::with_capacity(config.history_size),
            confidence_history: VecDeque::with_capacity(config.history_size),
            pending_state: None,
            pending_count: 0,
            config,
        }
    }

    pub fn current_state(&self) -> MotionType {
        self.current_state
    }

    pub fn state_confidence(&self) -> f64 {
        self.state_confidence
    }

    /// Recent committed states, oldest first.
    pub fn state_history(&self) -> Vec<MotionType> {
        self.state_history.iter().copied().collect()
    }

    /// Advice categories suppressed while the current motion type is active.
    pub fn suppression_set(&self) -> &'static [&'static str] {
        match self.current_state {
            MotionType::DollyIn | MotionType::DollyOut => &[SUPPRESS_SUBJECT_SIZE_CHANGE],
            MotionType::Pan => &[SUPPRESS_HORIZONTAL_DRIFT],
            MotionType::Tilt => &[SUPPRESS_VERTICAL_DRIFT],
            MotionType::Track => &[SUPPRESS_SUBJECT_SIZE_CHANGE, SUPPRESS_HORIZONTAL_DRIFT],
            MotionType::Handheld | MotionType::Static => &[],
        }
    }

    pub fn should_suppress(&self, category: &str) -> bool {
        self.suppression_set().contains(&category)
    }

    /// Feed new indicators; returns the (possibly unchanged) committed state.
    pub fn update(
        &mut self,
        indicators: &HeuristicIndicators,
        primary_direction_deg: Option<f64>,
    ) -> MotionType {
        let inferred = self
            .classifier
            .infer_motion_type(indicators, primary_direction_deg);
        let confidence = self.classifier.calculate_confidence(indicators, inferred);

        self.process_inference(inferred, confidence);

        if self.state_history.len() == self.config.history_size {
            self.state_history.pop_front();
            self.confidence_history.pop_front();
        }
        self.state_history.push_back(self.current_state);
        self.confidence_history.push_back(self.state_confidence);

        self.current_state
    }

    fn process_inference(&mut self, inferred: MotionType, confidence: f64) {
        if inferred == self.current_state {
            // Reinforce via EMA and drop any pending change.
            self.state_confidence = 0.3 * confidence + 0.7 * self.state_confidence;
            self.pending_state = None;
            self.pending_count = 0;
            return;
        }

        if confidence < self.config.min_confidence_threshold {
            self.state_confidence *= self.config.confidence_decay;
            return;
        }

        if self.pending_state == Some(inferred) {
            self.pending_count += 1;
        } else {
            self.pending_state = Some(inferred);
            self.pending_count = 1;
        }

        if self.pending_count >= self.config.consistency_required {
            debug!(
                from = self.current_state.as_str(),
                to = inferred.as_str(),
                confidence,
                "motion state committed"
            );
            self.current_state = inferred;
            self.state_confidence = confidence;
            self.pending_state = None;
            self.pending_count = 0;
        }
    }

    pub fn reset(&mut self) {
        self.current_state = MotionType::Static;
        self.state_confidence = 0.0;
        self.state_history.clear();
        self.confidence_history.clear();
        self.pending_state = None;
        self.pending_count = 0;
    }

    /// Force a specific state. Test/override hook.
    pub fn force_state(&mut self, state: MotionType, confidence: f64) {
        self.current_state = state;
        self.state_confidence = confidence.clamp(0.0, 1.0);
        self.pending_state = None;
        self.pending_count = 0;
    }
}
