//! # ruleflow-generation
//!
//! Rule synthesis for Ruleflow: turning a goal, a failure, or a loop-risk
//! summary into new production rules via the oracle, and the shared
//! construction routine that converts untrusted oracle JSON into validated
//! rules with deterministic ids.

mod construct;
mod generator;
mod templates;

pub use construct::{deterministic_rule_id, parse_phase_lenient, rule_from_raw};
pub use generator::{optimize_priorities, RuleGenerationService};
pub use templates::{adjustment_rules_prompt, initial_rules_prompt, recovery_rules_prompt};
