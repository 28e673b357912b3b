//! # ruleflow-oracle
//!
//! LLM oracle client and agent executor seams for Ruleflow.
//!
//! The decision core never talks to an API directly - it sees two traits:
//!
//! - [`Oracle`]: black-box `prompt -> text` generation, with tolerant JSON
//!   extraction layered on top for structured answers.
//! - [`AgentExecutor`]: carries out a rule's action text and reports a
//!   normalized `WorkflowResult`.
//!
//! The concrete [`AnthropicOracle`] keeps each call stateless (no
//! conversation history) with rate-limit retry and a process-wide circuit
//! breaker. [`ScriptedOracle`] and [`ScriptedExecutor`] drive the engine
//! offline and in tests.

mod auth;
mod circuit_breaker;
mod client;
mod executor;
mod oracle;
mod types;

pub use auth::get_auth_token;
pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use client::AnthropicOracle;
pub use executor::{AgentExecutor, AgentRegistry, ScriptedExecutor};
pub use oracle::{parse_structured_response, Oracle, ScriptedOracle, ScriptedResponse};
pub use types::{ApiContent, ApiMessage, ApiRequest, ApiResponse, Model, Usage};
