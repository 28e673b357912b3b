//! # ruleflow-adaptive
//!
//! Situation-aware rule replacement for Ruleflow.
//!
//! When new rules arrive, this crate decides how much of the existing set to
//! keep: a six-dimension situation assessment picks a replacement strategy,
//! semantic-similarity-driven substitution swaps old rules for better new
//! ones, and hard quantity caps keep the rule set from growing without bound.
//!
//! The pipeline degrades toward "do nothing harmful": any internal failure
//! falls back to a conservative merge rather than pruning aggressively.

mod effectiveness;
mod replacement;
mod situation;
mod strategy;

pub use effectiveness::EffectivenessTracker;
pub use replacement::{
    apply_quantity_constraints, conservative_merge, AdaptiveReplacementService,
    ReplacementOutcome,
};
pub use situation::{assess_situation, estimate_goal_complexity, SituationScore};
pub use strategy::{
    select_strategy, validate_strategy, ReplacementStrategy, StrategyKind,
    TRACKER_CONFIDENCE_GATE,
};
