//! Rule synthesis via the oracle

use crate::construct::rule_from_raw;
use crate::templates;
use ruleflow_core::{ProductionRule, RulePhase, MIN_PRIORITY};
use ruleflow_oracle::{parse_structured_response, Oracle};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Synthesizes new rules from a goal or a failure context
pub struct RuleGenerationService {
    oracle: Arc<dyn Oracle>,
}

impl RuleGenerationService {
    pub fn new(oracle: Arc<dyn Oracle>) -> Self {
        Self { oracle }
    }

    /// Generate an initial rule set for a goal.
    /// Oracle failure degrades to an empty vec - the caller decides whether
    /// an empty plan is terminal.
    pub async fn generate_initial_rules(
        &self,
        goal: &str,
        max_rules: usize,
    ) -> Vec<ProductionRule> {
        let prompt = templates::initial_rules_prompt(goal, max_rules);
        self.generate(&prompt, max_rules).await
    }

    /// Generate alternative rules after `failed_rule` failed with `error`
    pub async fn generate_recovery_rules(
        &self,
        goal: &str,
        failed_rule: &ProductionRule,
        error: &str,
        max_rules: usize,
    ) -> Vec<ProductionRule> {
        let prompt = templates::recovery_rules_prompt(goal, failed_rule, error, max_rules);
        self.generate(&prompt, max_rules).await
    }

    /// Generate strategy-adjustment rules when loop risk is elevated
    pub async fn generate_adjustment_rules(
        &self,
        goal: &str,
        risk_summary: &str,
        max_rules: usize,
    ) -> Vec<ProductionRule> {
        let prompt = templates::adjustment_rules_prompt(goal, risk_summary, max_rules);
        self.generate(&prompt, max_rules).await
    }

    async fn generate(&self, prompt: &str, max_rules: usize) -> Vec<ProductionRule> {
        let response = match self.oracle.generate_text(prompt).await {
            Ok(text) => text,
            Err(e) => {
                warn!("Rule generation oracle call failed: {}", e);
                return Vec::new();
            }
        };

        let Some(parsed) = parse_structured_response(&response) else {
            warn!("Rule generation produced no parseable JSON");
            return Vec::new();
        };

        let elements: Vec<Value> = match parsed {
            Value::Array(items) => items,
            // Some generations wrap the array in an object
            Value::Object(ref obj) => obj
                .get("rules")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
            _ => Vec::new(),
        };

        let mut rules: Vec<ProductionRule> = Vec::new();
        for element in &elements {
            match rule_from_raw(element) {
                Some(rule) => {
                    // Deterministic ids make duplicates visible here
                    if !rules.iter().any(|r| r.id == rule.id) {
                        rules.push(rule);
                    }
                }
                None => warn!("Skipping unparseable rule element: {}", element),
            }
        }

        rules.truncate(max_rules);
        optimize_priorities(&mut rules);
        debug!("Generated {} rules from {} elements", rules.len(), elements.len());
        rules
    }
}

/// Normalize priorities: already clamped at construction, this spreads exact
/// duplicates within a phase by single-step decrements so the ordering of
/// generated rules is stable.
pub fn optimize_priorities(rules: &mut [ProductionRule]) {
    let mut seen: HashMap<(RulePhase, u32), u32> = HashMap::new();
    for rule in rules.iter_mut() {
        let collisions = seen.entry((rule.phase, rule.priority)).or_insert(0);
        let adjusted = rule.priority.saturating_sub(*collisions).max(MIN_PRIORITY);
        *collisions += 1;
        rule.set_priority(adjusted);
    }
}
