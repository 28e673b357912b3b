//! Oracle seam and tolerant response parsing
//!
//! The decision core treats the LLM as a black-box text oracle. Everything it
//! needs is behind the `Oracle` trait so tests and offline runs can substitute
//! scripted responses.

use async_trait::async_trait;
use ruleflow_core::Result;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Black-box text oracle
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Generate free text from a prompt. May fail; callers are expected to
    /// degrade gracefully rather than propagate.
    async fn generate_text(&self, prompt: &str) -> Result<String>;
}

/// Tolerant extraction of a JSON value from oracle output.
///
/// Models wrap JSON in markdown fences or surround it with prose. This tries,
/// in order: direct parse, fenced block, outermost `{..}` slice, outermost
/// `[..]` slice. Returns `None` on unrecoverable parse failure - never errors.
pub fn parse_structured_response(text: &str) -> Option<serde_json::Value> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(value) = serde_json::from_str(trimmed) {
        return Some(value);
    }

    if let Some(block) = extract_fenced_block(trimmed) {
        if let Ok(value) = serde_json::from_str(block.trim()) {
            return Some(value);
        }
    }

    for (open, close) in [('{', '}'), ('[', ']')] {
        if let (Some(start), Some(end)) = (trimmed.find(open), trimmed.rfind(close)) {
            if start < end {
                if let Ok(value) = serde_json::from_str(&trimmed[start..=end]) {
                    return Some(value);
                }
            }
        }
    }

    None
}

/// Extract the body of the first ``` fenced block, skipping a language tag
fn extract_fenced_block(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let after_fence = &text[start + 3..];
    // Skip an optional language tag on the fence line
    let body_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after_fence[body_start..];
    let end = body.find("```")?;
    Some(&body[..end])
}

/// One canned response for a [`ScriptedOracle`]
#[derive(Debug, Clone)]
pub enum ScriptedResponse {
    /// Return this text
    Text(String),
    /// Fail with this message
    Failure(String),
}

/// Oracle returning a scripted queue of responses.
///
/// Used by the CLI offline mode and by tests. Once the queue is drained, every
/// further call returns the fallback response.
pub struct ScriptedOracle {
    queue: Mutex<VecDeque<ScriptedResponse>>,
    fallback: ScriptedResponse,
}

impl ScriptedOracle {
    pub fn new(fallback: ScriptedResponse) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            fallback,
        }
    }

    /// Oracle that fails every call - exercises degradation paths
    pub fn always_failing(message: impl Into<String>) -> Self {
        Self::new(ScriptedResponse::Failure(message.into()))
    }

    /// Oracle that answers every call with the same text
    pub fn always(text: impl Into<String>) -> Self {
        Self::new(ScriptedResponse::Text(text.into()))
    }

    pub fn push(&self, response: ScriptedResponse) {
        self.queue.lock().expect("scripted queue").push_back(response);
    }

    pub fn push_text(&self, text: impl Into<String>) {
        self.push(ScriptedResponse::Text(text.into()));
    }

    pub fn push_failure(&self, message: impl Into<String>) {
        self.push(ScriptedResponse::Failure(message.into()));
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn generate_text(&self, _prompt: &str) -> Result<String> {
        let next = self
            .queue
            .lock()
            .expect("scripted queue")
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        match next {
            ScriptedResponse::Text(text) => Ok(text),
            ScriptedResponse::Failure(message) => {
                Err(ruleflow_core::RuleflowError::Oracle(message))
            }
        }
    }
}
