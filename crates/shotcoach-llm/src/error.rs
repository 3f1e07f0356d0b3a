//! Model-client error types.

use thiserror::Error;

pub type LlmResult<T> = Result<T, LlmError>;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("API key not configured")]
    MissingApiKey,

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("network error: {0}")]
    Network(String),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("malformed model response: {0}")]
    MalformedResponse(String),

    #[error("all {attempts} attempts failed: {last}")]
    RetriesExhausted { attempts: u32, last: String },
}

impl LlmError {
    /// Transient failures worth retrying: rate limits, timeouts, network
    /// drops, server 5xx and unparseable responses.
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::RateLimited
            | LlmError::Timeout(_)
            | LlmError::Network(_)
            | LlmError::MalformedResponse(_) => true,
            LlmError::Api { status, .. } => *status >= 500,
            LlmError::MissingApiKey | LlmError::RetriesExhausted { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryability() {
        assert!(LlmError::RateLimited.is_retryable());
        assert!(LlmError::Timeout(30).is_retryable());
        assert!(LlmError::MalformedResponse("not json".into()).is_retryable());
        assert!(LlmError::Api { status: 503, body: String::new() }.is_retryable());
        assert!(!LlmError::Api { status: 401, body: String::new() }.is_retryable());
        assert!(!LlmError::MissingApiKey.is_retryable());
    }
}
