//! Text-model clients: OpenAI-compatible HTTP implementation plus a mock.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{LlmError, LlmResult};

/// Configuration for the model client.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub model: String,
    /// Base URL of an OpenAI-compatible endpoint.
    pub base_url: String,
    pub max_retries: u32,
    /// Hard per-request timeout in seconds.
    pub timeout_s: u64,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gpt-4".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            max_retries: 3,
            timeout_s: 30,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            temperature: 0.7,
            max_tokens: 1000,
        }
    }
}

impl LlmConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_key: std::env::var("SHOTCOACH_LLM_API_KEY").ok(),
            model: std::env::var("SHOTCOACH_LLM_MODEL").unwrap_or(defaults.model),
            base_url: std::env::var("SHOTCOACH_LLM_BASE_URL").unwrap_or(defaults.base_url),
            max_retries: std::env::var("SHOTCOACH_LLM_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_retries),
            timeout_s: std::env::var("SHOTCOACH_LLM_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.timeout_s),
            ..defaults
        }
    }

    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.base_delay.saturating_mul(2u32.pow(attempt));
        delay.min(self.max_delay)
    }
}

/// The single seam to the external text model: one completion call.
#[async_trait]
pub trait CompleteText: Send + Sync {
    /// Generate a completion for `prompt` under an optional system prompt.
    async fn complete(&self, prompt: &str, system_prompt: Option<&str>) -> LlmResult<String>;

    /// Completion with exponential-backoff retries on retryable errors.
    async fn complete_with_retry(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        max_retries: u32,
        base_delay: Duration,
        max_delay: Duration,
    ) -> LlmResult<String> {
        let mut last_error: Option<LlmError> = None;

        for attempt in 0..max_retries {
            match self.complete(prompt, system_prompt).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_retryable() => {
                    let delay = base_delay.saturating_mul(2u32.pow(attempt)).min(max_delay);
                    debug!(
                        attempt = attempt + 1,
                        max_retries,
                        ?delay,
                        error = %e,
                        "model call failed, retrying"
                    );
                    last_error = Some(e);
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }

        Err(LlmError::RetriesExhausted {
            attempts: max_retries,
            last: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no attempts made".to_string()),
        })
    }
}

// OpenAI-compatible chat-completions request/response shapes.

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

/// Client for any OpenAI-compatible chat-completions endpoint.
pub struct OpenAiCompatClient {
    config: LlmConfig,
    client: Client,
    api_url: String,
}

impl OpenAiCompatClient {
    pub fn new(config: LlmConfig) -> Self {
        let api_url = format!("{}/chat/completions", config.base_url.trim_end_matches('/'));
        Self {
            client: Client::new(),
            api_url,
            config,
        }
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    /// Convenience wrapper applying this client's own retry settings.
    pub async fn complete_retrying(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
    ) -> LlmResult<String> {
        self.complete_with_retry(
            prompt,
            system_prompt,
            self.config.max_retries,
            self.config.base_delay,
            self.config.max_delay,
        )
        .await
    }
}

#[async_trait]
impl CompleteText for OpenAiCompatClient {
    async fn complete(&self, prompt: &str, system_prompt: Option<&str>) -> LlmResult<String> {
        let api_key = self.config.api_key.as_ref().ok_or(LlmError::MissingApiKey)?;

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system_prompt {
            messages.push(ChatMessage {
                role: "system",
                content: system.to_string(),
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt.to_string(),
        });

        let request = ChatRequest {
            model: self.config.model.clone(),
            messages,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(api_key)
            .json(&request)
            .timeout(Duration::from_secs(self.config.timeout_s))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout(self.config.timeout_s)
                } else {
                    LlmError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if status.as_u16() == 429 {
            warn!(model = %self.config.model, "model endpoint rate limited");
            return Err(LlmError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::MalformedResponse(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| LlmError::MalformedResponse("no choices in response".to_string()))
    }
}

/// Mock client returning canned responses, keyed by prompt substring.
pub struct MockModelClient {
    responses: Vec<(String, String)>,
    default_response: String,
    fail_with: Option<fn() -> LlmError>,
}

impl Default for MockModelClient {
    fn default() -> Self {
        Self {
            responses: Vec::new(),
            default_response: serde_json::json!({
                "motion": {"type": "static", "params": {"speed_profile": "linear"}},
                "framing": {"suggested_scale": "medium"},
                "confidence": 0.75,
                "explainability": "这是一个测试响应。运动分析显示静态镜头特征。"
            })
            .to_string(),
            fail_with: None,
        }
    }
}

impl MockModelClient {
    /// Mock that always returns `response`.
    pub fn returning(response: impl Into<String>) -> Self {
        Self {
            default_response: response.into(),
            ..Default::default()
        }
    }

    /// Mock that always fails with the constructed error.
    pub fn failing(make_error: fn() -> LlmError) -> Self {
        Self {
            fail_with: Some(make_error),
            ..Default::default()
        }
    }

    /// Register a response for prompts containing `pattern`.
    pub fn with_response(mut self, pattern: impl Into<String>, response: impl Into<String>) -> Self {
        self.responses.push((pattern.into(), response.into()));
        self
    }
}

#[async_trait]
impl CompleteText for MockModelClient {
    async fn complete(&self, prompt: &str, _system_prompt: Option<&str>) -> LlmResult<String> {
        if let Some(make_error) = self.fail_with {
            return Err(make_error());
        }
        for (pattern, response) in &self.responses {
            if prompt.contains(pattern.as_str()) {
                return Ok(response.clone());
            }
        }
        Ok(self.default_response.clone())
    }
}
