//! Dual-threshold level tracking, consistency counting and cooldowns.
//!
//! A value oscillating strictly between a pair of enter/exit thresholds can
//! never flip the tracked level; advice additionally requires the same
//! pending state for N consecutive cycles and respects a per-category
//! cooldown.

use std::collections::HashMap;

/// Tracked severity level for a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Normal,
    Warning,
    Critical,
}

/// Configuration for hysteresis behavior.
#[derive(Debug, Clone)]
pub struct HysteresisConfig {
    /// Consecutive cycles with the same pending state before advice fires.
    pub consistent_cycles_required: u32,
    /// Seconds before the same category may emit again.
    pub category_cooldown_s: f64,
}

impl Default for HysteresisConfig {
    fn default() -> Self {
        Self {
            consistent_cycles_required: 2,
            category_cooldown_s: 5.0,
        }
    }
}

/// Per-category hysteresis, consistency and cooldown state.
#[derive(Debug, Default)]
struct CategoryState {
    level: Option<Level>,
    pending_trigger: Option<bool>,
    consistency: u32,
    last_advice_time: Option<f64>,
}

/// Controller preventing rapid toggling and repetitive advice.
#[derive(Debug)]
pub struct HysteresisController {
    config: HysteresisConfig,
    categories: HashMap<String, CategoryState>,
}

impl Default for HysteresisController {
    fn default() -> Self {
        Self::new(HysteresisConfig::default())
    }
}

impl HysteresisController {
    pub fn new(config: HysteresisConfig) -> Self {
        Self {
            config,
            categories: HashMap::new(),
        }
    }

    /// Two-level hysteresis. With `lower_is_worse`, the value must drop below
    /// `enter` to trigger and rise above `exit` to clear; in between, the
    /// current level holds. Returns true while in the warning level.
    pub fn check_threshold(
        &mut self,
        category: &str,
        value: f64,
        enter_threshold: f64,
        exit_threshold: f64,
        lower_is_worse: bool,
    ) -> bool {
        let state = self.categories.entry(category.to_string()).or_default();
        let current = state.level.unwrap_or(Level::Normal);

        let new_level = if lower_is_worse {
            match current {
                Level::Normal => {
                    if value < enter_threshold {
                        Level::Warning
                    } else {
                        Level::Normal
                    }
                }
                _ => {
                    if value > exit_threshold {
                        Level::Normal
                    } else {
                        Level::Warning
                    }
                }
            }
        } else {
            match current {
                Level::Normal => {
                    if value > enter_threshold {
                        Level::Warning
                    } else {
                        Level::Normal
                    }
                }
                _ => {
                    if value < exit_threshold {
                        Level::Normal
                    } else {
                        Level::Warning
                    }
                }
            }
        };

        state.level = Some(new_level);
        new_level == Level::Warning
    }

    /// Three-level hysteresis with separate critical and warning enter/exit
    /// pairs. Returns the tracked level after applying this value.
    #[allow(clippy::too_many_arguments)]
    pub fn check_threshold_multi_level(
        &mut self,
        category: &str,
        value: f64,
        critical_enter: f64,
        critical_exit: f64,
        warning_enter: f64,
        warning_exit: f64,
        lower_is_worse: bool,
    ) -> Level {
        let state = self.categories.entry(category.to_string()).or_default();
        let current = state.level.unwrap_or(Level::Normal);

        let new_level = if lower_is_worse {
            match current {
                Level::Critical => {
                    if value > critical_exit {
                        if value < warning_exit {
                            Level::Warning
                        } else {
                            Level::Normal
                        }
                    } else {
                        Level::Critical
                    }
                }
                Level::Warning => {
                    if value < critical_enter {
                        Level::Critical
                    } else if value > warning_exit {
                        Level::Normal
                    } else {
                        Level::Warning
                    }
                }
                Level::Normal => {
                    if value < critical_enter {
                        Level::Critical
                    } else if value < warning_enter {
                        Level::Warning
                    } else {
                        Level::Normal
                    }
                }
            }
        } else {
            match current {
                Level::Critical => {
                    if value < critical_exit {
                        if value > warning_exit {
                            Level::Warning
                        } else {
                            Level::Normal
                        }
                    } else {
                        Level::Critical
                    }
                }
                Level::Warning => {
                    if value > critical_enter {
                        Level::Critical
                    } else if value < warning_exit {
                        Level::Normal
                    } else {
                        Level::Warning
                    }
                }
                Level::Normal => {
                    if value > critical_enter {
                        Level::Critical
                    } else if value > warning_enter {
                        Level::Warning
                    } else {
                        Level::Normal
                    }
                }
            }
        };

        state.level = Some(new_level);
        new_level
    }

    /// Consistency gate: true only once the same trigger state has held for
    /// the configured number of consecutive cycles.
    pub fn is_consistent(&mut self, category: &str, should_trigger: bool) -> bool {
        let required = self.config.consistent_cycles_required;
        let state = self.categories.entry(category.to_string()).or_default();

        if state.pending_trigger == Some(should_trigger) {
            state.consistency += 1;
        } else {
            state.pending_trigger = Some(should_trigger);
            state.consistency = 1;
        }

        should_trigger && state.consistency >= required
    }

    /// Whether this category emitted advice within the cooldown window.
    pub fn is_on_cooldown(&self, category: &str, current_time: f64) -> bool {
        self.categories
            .get(category)
            .and_then(|s| s.last_advice_time)
            .is_some_and(|last| (current_time - last) < self.config.category_cooldown_s)
    }

    /// Record an emission to start the cooldown timer.
    pub fn record_advice(&mut self, category: &str, current_time: f64) {
        self.categories
            .entry(category.to_string())
            .or_default()
            .last_advice_time = Some(current_time);
    }

    /// Current tracked level for a category.
    pub fn level(&self, category: &str) -> Level {
        self.categories
            .get(category)
            .and_then(|s| s.level)
            .unwrap_or(Level::Normal)
    }

    /// Reset one category, or everything when `category` is `None`.
    pub fn reset(&mut self, category: Option<&str>) {
        match category {
            Some(name) => {
                self.categories.remove(name);
            }
            None => self.categories.clear(),
        }
    }
}
