//! Decision core
//!
//! One call to [`DecisionCore::make_decision`] is one decision cycle: it reads
//! the workflow state, runs loop detection, and either decides locally (loop
//! prevention, exhaustion, idempotent goal short-circuit) or asks the oracle.
//!
//! The public entry point never returns an error. Oracle failures, parse
//! failures, and referential inconsistencies all funnel into a `GoalFailed`
//! `DecisionResult` with a human-readable reason.

use crate::loop_detector::{AdvancedLoopDetection, LoopContext};
use crate::prompt::build_decision_prompt;
use ruleflow_core::{DecisionResult, DecisionType, RuleSet, RuleflowConfig};
use ruleflow_generation::rule_from_raw;
use ruleflow_oracle::{parse_structured_response, AgentRegistry, Oracle};
use ruleflow_state::WorkflowState;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Risk score at which the session is forcibly ended
const FORCE_TERMINATE_RISK: f64 = 0.8;
/// Risk score at which strategy-adjustment rules are requested
const FORCE_ADJUST_RISK: f64 = 0.5;

/// Decides, each iteration, whether to execute a rule, add rules, or stop
pub struct DecisionCore {
    oracle: Arc<dyn Oracle>,
    registry: AgentRegistry,
    config: RuleflowConfig,
}

impl DecisionCore {
    pub fn new(oracle: Arc<dyn Oracle>, registry: AgentRegistry, config: RuleflowConfig) -> Self {
        Self {
            oracle,
            registry,
            config,
        }
    }

    /// One decision cycle. Infallible by design: every failure mode maps to a
    /// `DecisionResult`, most of them `GoalFailed` at low confidence.
    pub async fn make_decision(
        &self,
        state: &WorkflowState,
        rule_set: &RuleSet,
    ) -> DecisionResult {
        // Idempotence: once achieved, always achieved, and no oracle call
        if state.goal_achieved {
            return DecisionResult::goal_achieved(1.0, "Goal already achieved");
        }

        let limits = &self.config.limits;
        let available = state.available_rules(rule_set.rules(), limits.max_rule_failures);
        let loop_ctx =
            LoopContext::from_state(state, rule_set.len(), available.len(), limits);
        let advanced = AdvancedLoopDetection::analyze(
            state,
            rule_set.len(),
            available.len(),
            &self.config.loop_weights,
            limits,
        );

        debug!(
            "Decision cycle at iteration {}: {} available rules, {}",
            state.iteration_count,
            available.len(),
            advanced.summary()
        );

        // Graded prevention policy from the heuristic risk score
        if advanced.overall_risk_score >= FORCE_TERMINATE_RISK {
            info!("Forcing termination: {}", advanced.summary());
            return DecisionResult::goal_achieved(
                0.9,
                format!("Loop prevention: {}", advanced.summary()),
            )
            .with_context("loop_risk", json!(advanced.overall_risk_score));
        }
        if advanced.overall_risk_score >= FORCE_ADJUST_RISK {
            info!("Forcing strategy adjustment: {}", advanced.summary());
            return DecisionResult::add_rules(
                Vec::new(),
                0.7,
                format!("Strategy adjustment needed: {}", advanced.summary()),
            )
            .with_context("loop_risk", json!(advanced.overall_risk_score));
        }

        // Hard termination rule from the basic indicators
        if loop_ctx.should_terminate() {
            info!("Terminating on basic loop context: {}", loop_ctx.summary());
            return DecisionResult::goal_achieved(
                0.8,
                format!("Loop prevention: {}", loop_ctx.summary()),
            )
            .with_context("loop_context", json!(loop_ctx.summary()));
        }

        // No candidates: exhaustion ends gracefully, an empty plan asks for rules
        if available.is_empty() {
            if loop_ctx.rules_exhausted {
                return DecisionResult::goal_achieved(
                    0.7,
                    "All rules executed or failed; ending gracefully",
                );
            }
            return DecisionResult::add_rules(
                Vec::new(),
                0.6,
                "No rules available; new rules must be synthesized",
            );
        }

        // Ask the oracle
        let prompt =
            build_decision_prompt(rule_set, state, &available, &loop_ctx, &advanced, &self.registry);
        let response = match self.oracle.generate_text(&prompt).await {
            Ok(text) => text,
            Err(e) => {
                warn!("Decision oracle call failed: {}", e);
                return DecisionResult::goal_failed(0.0, format!("Oracle failure: {}", e));
            }
        };

        let Some(parsed) = parse_structured_response(&response) else {
            warn!("Decision response was not parseable JSON");
            return DecisionResult::goal_failed(
                0.0,
                format!("Unparseable oracle decision: {}", truncate(&response, 120)),
            );
        };

        self.map_decision(&parsed, rule_set, &advanced)
    }

    /// Convert a parsed oracle decision into a `DecisionResult`
    fn map_decision(
        &self,
        parsed: &Value,
        rule_set: &RuleSet,
        advanced: &AdvancedLoopDetection,
    ) -> DecisionResult {
        let decision_str = parsed
            .get("decision_type")
            .and_then(Value::as_str)
            .unwrap_or("");
        let confidence = parsed
            .get("confidence")
            .and_then(Value::as_f64)
            .unwrap_or(0.5);
        let reasoning = parsed
            .get("reasoning")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();

        let result = match DecisionType::parse_or_failed(decision_str) {
            DecisionType::ExecuteSelectedRule => {
                let Some(rule_id) = parsed.get("selected_rule_id").and_then(Value::as_str) else {
                    return DecisionResult::goal_failed(
                        0.3,
                        "Oracle chose EXECUTE_SELECTED_RULE without a rule id",
                    );
                };
                // Never silently substitute a different rule for a missing id
                match rule_set.get_rule(rule_id) {
                    Some(rule) => DecisionResult::execute(rule.clone(), confidence, reasoning),
                    None => DecisionResult::goal_failed(
                        0.3,
                        format!("Selected rule '{}' not present in rule set", rule_id),
                    ),
                }
            }
            DecisionType::AddRule => {
                let raw_rules = parsed
                    .get("new_rules")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                let mut rules = Vec::new();
                for raw in &raw_rules {
                    match rule_from_raw(raw) {
                        Some(rule) => rules.push(rule),
                        None => warn!("Skipping unparseable rule in decision output: {}", raw),
                    }
                }
                DecisionResult::add_rules(rules, confidence, reasoning)
            }
            DecisionType::GoalAchieved => DecisionResult::goal_achieved(confidence, reasoning),
            DecisionType::GoalFailed => {
                let reason = if reasoning.is_empty() {
                    format!("Oracle returned decision '{}'", decision_str)
                } else {
                    reasoning
                };
                DecisionResult::goal_failed(confidence, reason)
            }
        };

        result.with_context("loop_risk", json!(advanced.overall_risk_score))
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}
