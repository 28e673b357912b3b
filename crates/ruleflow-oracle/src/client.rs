//! Anthropic Messages API oracle
//!
//! Each oracle call is completely stateless - no conversation history is
//! maintained. Decision context travels inside the prompt, assembled by the
//! decision core from the workflow state.

use crate::auth;
use crate::circuit_breaker::CircuitBreaker;
use crate::oracle::Oracle;
use crate::types::{ApiMessage, ApiRequest, ApiResponse, Model};
use async_trait::async_trait;
use ruleflow_core::{Result, RuleflowError};
use std::sync::OnceLock;
use std::time::Duration;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: usize = 4096;

// Rate limit retry configuration
const MAX_RETRIES: u32 = 5;
const INITIAL_BACKOFF_SECS: u64 = 30;
const MAX_BACKOFF_SECS: u64 = 300;

// Global circuit breaker - shared across all oracle calls in the process
static CIRCUIT_BREAKER: OnceLock<CircuitBreaker> = OnceLock::new();

fn get_circuit_breaker() -> &'static CircuitBreaker {
    CIRCUIT_BREAKER.get_or_init(CircuitBreaker::default)
}

/// Oracle backed by the Anthropic Messages API
#[derive(Debug, Clone)]
pub struct AnthropicOracle {
    model: Model,
    max_tokens: usize,
    api_key_env: String,
}

impl AnthropicOracle {
    pub fn new(model: Model) -> Self {
        Self {
            model,
            max_tokens: DEFAULT_MAX_TOKENS,
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Override the environment variable holding the API key
    pub fn with_api_key_env(mut self, api_key_env: impl Into<String>) -> Self {
        self.api_key_env = api_key_env.into();
        self
    }

    async fn call(&self, prompt: &str) -> Result<String> {
        let circuit_breaker = get_circuit_breaker();

        if !circuit_breaker.can_execute() {
            let wait = circuit_breaker.time_until_retry();
            return Err(RuleflowError::OracleLimit(format!(
                "Circuit breaker is OPEN - too many oracle failures. Wait {} seconds before retry.",
                wait / 1000
            )));
        }

        let auth_token = auth::get_auth_token(&self.api_key_env)?;

        let request = ApiRequest {
            model: self.model.api_name().to_string(),
            max_tokens: self.max_tokens,
            messages: vec![ApiMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        };

        let mut retries = 0;
        let mut backoff_secs = INITIAL_BACKOFF_SECS;

        loop {
            tracing::debug!("Sending oracle request (attempt {})", retries + 1);

            let client = reqwest::Client::new();
            let response = client
                .post(ANTHROPIC_API_URL)
                .header("x-api-key", &auth_token)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .header("content-type", "application/json")
                .json(&request)
                .send()
                .await
                .map_err(|e| RuleflowError::Oracle(format!("Failed to send request: {}", e)))?;

            let status = response.status();

            // 429: honor retry-after, otherwise exponential backoff
            if status.as_u16() == 429 {
                retries += 1;

                if retries > MAX_RETRIES {
                    let error_text = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "Unknown".to_string());
                    return Err(RuleflowError::OracleLimit(format!(
                        "Rate limit exceeded after {} retries. Last error: {}",
                        MAX_RETRIES, error_text
                    )));
                }

                let wait_secs = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(backoff_secs);

                tracing::warn!(
                    "Rate limited (429). Waiting {} seconds before retry {}/{}",
                    wait_secs,
                    retries,
                    MAX_RETRIES
                );

                tokio::time::sleep(Duration::from_secs(wait_secs)).await;
                backoff_secs = (backoff_secs * 2).min(MAX_BACKOFF_SECS);
                continue;
            }

            if !status.is_success() {
                let error_text = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown".to_string());

                // Retry on 5xx errors
                if status.is_server_error() && retries < MAX_RETRIES {
                    retries += 1;
                    tracing::warn!(
                        "Server error ({}). Waiting {} seconds before retry {}/{}",
                        status,
                        backoff_secs,
                        retries,
                        MAX_RETRIES
                    );
                    tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
                    backoff_secs = (backoff_secs * 2).min(MAX_BACKOFF_SECS);
                    continue;
                }

                circuit_breaker.record_failure();
                tracing::error!(
                    "Circuit breaker: recorded failure (count: {})",
                    circuit_breaker.failure_count()
                );

                return Err(RuleflowError::Oracle(format!(
                    "Anthropic API error {}: {}",
                    status, error_text
                )));
            }

            let api_response: ApiResponse = response
                .json()
                .await
                .map_err(|e| RuleflowError::Oracle(format!("Failed to parse response: {}", e)))?;

            let output = api_response
                .content
                .first()
                .ok_or_else(|| RuleflowError::Oracle("No content in response".to_string()))?
                .text
                .clone();

            circuit_breaker.record_success();

            if let Some(usage) = &api_response.usage {
                tracing::info!(
                    "Oracle call complete ({} chars, {} input tokens, {} output tokens)",
                    output.len(),
                    usage.input_tokens,
                    usage.output_tokens
                );
            } else {
                tracing::info!("Oracle call complete ({} chars)", output.len());
            }

            return Ok(output);
        }
    }
}

#[async_trait]
impl Oracle for AnthropicOracle {
    async fn generate_text(&self, prompt: &str) -> Result<String> {
        self.call(prompt).await
    }
}
