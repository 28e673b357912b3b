//! # ruleflow-core
//!
//! Core types for the Ruleflow production-rule workflow engine.
//!
//! Ruleflow pursues a natural-language goal by planning, selecting, executing,
//! and adapting production rules (condition→action pairs). This crate holds
//! the shared vocabulary:
//!
//! - Rules ARE the unit of planning (condition→action with priority and phase)
//! - Rule sets ARE versioned, append-only-logged collections
//! - Decisions ARE closed variants (execute / add / achieved / failed)
//! - Executor results ARE a fixed normalized shape at the boundary

mod config;
mod error;
mod types;

pub use config::{
    LimitsConfig, LoopWeights, OracleConfig, ReplacementWeights, RuleflowConfig,
};
pub use error::{Result, RuleflowError};
pub use types::*;
