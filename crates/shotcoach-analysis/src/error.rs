//! Analysis error types.

use thiserror::Error;

pub type AnalysisResult<T> = Result<T, AnalysisError>;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("indicator out of domain: {0}")]
    IndicatorOutOfDomain(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl AnalysisError {
    pub fn indicator_out_of_domain(msg: impl Into<String>) -> Self {
        Self::IndicatorOutOfDomain(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}
