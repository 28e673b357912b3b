//! Authentication for the Anthropic oracle
//!
//! Supports two authentication methods:
//! 1. Claude Code OAuth token (CLAUDE_CODE_OAUTH_TOKEN) - zero API cost with subscription
//! 2. An API key read from a configurable environment variable

use ruleflow_core::{Result, RuleflowError};
use std::env;

/// Get an authentication token for the Anthropic API.
///
/// The OAuth token takes precedence; `api_key_env` names the fallback
/// environment variable (normally `ANTHROPIC_API_KEY`).
pub fn get_auth_token(api_key_env: &str) -> Result<String> {
    if let Ok(oauth_token) = env::var("CLAUDE_CODE_OAUTH_TOKEN") {
        tracing::info!("Using Claude Code OAuth token (subscription)");
        return Ok(oauth_token);
    }

    if let Ok(api_key) = env::var(api_key_env) {
        tracing::info!("Using {}", api_key_env);
        return Ok(api_key);
    }

    Err(RuleflowError::Auth(format!(
        "No authentication found. Set either:\n\
         - CLAUDE_CODE_OAUTH_TOKEN=sk-ant-oat01-... (for subscription access)\n\
         - {}=sk-ant-api03-...       (for API access)",
        api_key_env
    )))
}
