//! # ruleflow-decision
//!
//! The decision core for Ruleflow.
//!
//! Each decision cycle reads the workflow state, scores loop risk through two
//! layers (basic indicators and a five-signal weighted heuristic), and either
//! decides locally - loop prevention, rule exhaustion, the idempotent
//! goal-achieved short-circuit - or builds a prompt and asks the oracle.
//!
//! Nothing in this crate throws past its public surface: oracle failures,
//! unparseable responses, and references to rules that do not exist all map
//! to `GoalFailed` decisions with readable reasons.

#![allow(dead_code)]

mod decision;
mod loop_detector;
mod matching;
mod prompt;

pub use decision::DecisionCore;
pub use loop_detector::{AdvancedLoopDetection, LoopContext, RiskLevel};
pub use matching::RuleMatchingService;
pub use prompt::build_decision_prompt;
