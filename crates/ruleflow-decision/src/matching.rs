//! Semantic rule matching
//!
//! A supporting path to rule selection: score each rule's condition against
//! the current situation via the oracle, boost for context relevance, filter
//! by confidence, and order by priority. The decision core does its own
//! selection; this service backs callers that want a ranked candidate list.

use ruleflow_core::{ProductionRule, RuleSet};
use ruleflow_oracle::{parse_structured_response, Oracle};
use ruleflow_state::WorkflowState;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Minimum adjusted confidence for a rule to be considered applicable
const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.5;
/// Ceiling for the context-relevance boost
const MAX_CONTEXT_BOOST: f64 = 0.2;

/// Scores and filters candidate rules against the current state
pub struct RuleMatchingService {
    oracle: Arc<dyn Oracle>,
    confidence_threshold: f64,
}

impl RuleMatchingService {
    pub fn new(oracle: Arc<dyn Oracle>) -> Self {
        Self {
            oracle,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.confidence_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    /// Applicability-filtered, priority-ordered candidate list
    pub async fn find_applicable_rules(
        &self,
        state: &WorkflowState,
        rule_set: &RuleSet,
    ) -> Vec<ProductionRule> {
        let mut applicable = Vec::new();

        for rule in rule_set.rules() {
            let base = self.semantic_match(&rule.condition, &state.state).await;
            let boost = context_boost(rule, state);
            let adjusted = (base + boost).min(1.0);
            debug!(
                "Rule {} match: base {:.2}, boost {:.2}",
                rule.id, base, boost
            );
            if adjusted >= self.confidence_threshold {
                applicable.push(rule.clone());
            }
        }

        // Priority descending; sort is stable so equal priorities keep
        // rule-set order
        applicable.sort_by(|a, b| b.priority.cmp(&a.priority));
        applicable
    }

    /// Pick one rule among conflicting candidates: maximum priority, ties
    /// broken by lexicographically smallest id. No creation-order signal
    /// exists on rules, so the id tie-break keeps the choice deterministic
    /// across runs.
    pub fn resolve_conflicts<'a>(
        &self,
        conflicting: &'a [ProductionRule],
    ) -> Option<&'a ProductionRule> {
        let max_priority = conflicting.iter().map(|r| r.priority).max()?;
        conflicting
            .iter()
            .filter(|r| r.priority == max_priority)
            .min_by(|a, b| a.id.cmp(&b.id))
    }

    /// Oracle semantic match with a word-overlap fallback on failure
    async fn semantic_match(&self, condition: &str, situation: &str) -> f64 {
        let prompt = format!(
            "# CONDITION MATCH\n\n\
             Condition: {}\n\
             Situation: {}\n\n\
             How well does the condition describe the situation?\n\
             Respond with JSON only: {{\"confidence\": 0.0-1.0}}\n",
            condition, situation
        );

        match self.oracle.generate_text(&prompt).await {
            Ok(response) => parse_structured_response(&response)
                .and_then(|v| v.get("confidence").and_then(|c| c.as_f64()))
                .map(|c| c.clamp(0.0, 1.0))
                .unwrap_or_else(|| word_jaccard(condition, situation)),
            Err(e) => {
                warn!("Semantic match oracle call failed, using word overlap: {}", e);
                word_jaccard(condition, situation)
            }
        }
    }
}

/// Context-relevance boost, capped at [`MAX_CONTEXT_BOOST`]: half for a phase
/// signal in the state text, half for keyword overlap between the rule's
/// condition and the context variables / recent history.
fn context_boost(rule: &ProductionRule, state: &WorkflowState) -> f64 {
    let mut boost = 0.0;

    let phase_stem = match rule.phase {
        ruleflow_core::RulePhase::InformationGathering => "gather",
        ruleflow_core::RulePhase::Execution => "execut",
        ruleflow_core::RulePhase::Verification => "verif",
    };
    if state.state.to_lowercase().contains(phase_stem) {
        boost += MAX_CONTEXT_BOOST / 2.0;
    }

    let condition_words = keywords(&rule.condition);
    let mut context_words: HashSet<String> = HashSet::new();
    for value in state.context_variables.values() {
        context_words.extend(keywords(value));
    }
    for entry in state.execution_history.iter().rev().take(3) {
        context_words.extend(keywords(entry));
    }
    if condition_words.iter().any(|w| context_words.contains(w)) {
        boost += MAX_CONTEXT_BOOST / 2.0;
    }

    boost
}

fn keywords(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() >= 4)
        .map(str::to_string)
        .collect()
}

/// Jaccard overlap of word sets, 0.0 when either side is empty
fn word_jaccard(a: &str, b: &str) -> f64 {
    let a_set = keywords(a);
    let b_set = keywords(b);
    if a_set.is_empty() || b_set.is_empty() {
        return 0.0;
    }
    let intersection = a_set.intersection(&b_set).count() as f64;
    let union = a_set.union(&b_set).count() as f64;
    intersection / union
}

#[cfg(test)]
mod tests {
    use super::*;
    use ruleflow_core::RulePhase;
    use ruleflow_oracle::ScriptedOracle;

    fn rule(id: &str, priority: u32) -> ProductionRule {
        ProductionRule::new(id, id, format!("when {}", id), "act").with_priority(priority)
    }

    #[tokio::test]
    async fn test_filtering_and_priority_order() {
        // One oracle response per rule, in rule-set order
        let oracle = ScriptedOracle::always("{}");
        oracle.push_text(r#"{"confidence": 0.9}"#);
        oracle.push_text(r#"{"confidence": 0.2}"#);
        oracle.push_text(r#"{"confidence": 0.8}"#);

        let service = RuleMatchingService::new(Arc::new(oracle));
        let mut set = RuleSet::new("goal");
        set.add_rule(rule("low", 30), "init");
        set.add_rule(rule("skip", 90), "init");
        set.add_rule(rule("high", 80), "init");

        let state = WorkflowState::new("s1", "a situation");
        let applicable = service.find_applicable_rules(&state, &set).await;

        assert_eq!(applicable.len(), 2);
        // Ordered by priority, not by match confidence
        assert_eq!(applicable[0].id, "high");
        assert_eq!(applicable[1].id, "low");
    }

    #[tokio::test]
    async fn test_jaccard_fallback_on_oracle_failure() {
        let service =
            RuleMatchingService::new(Arc::new(ScriptedOracle::always_failing("api down")))
                .with_threshold(0.3);

        let mut set = RuleSet::new("goal");
        set.add_rule(
            ProductionRule::new("r1", "r1", "archive index missing", "build the index"),
            "init",
        );

        // Strong word overlap with the condition
        let state = WorkflowState::new("s1", "the archive index is missing entirely");
        let applicable = service.find_applicable_rules(&state, &set).await;
        assert_eq!(applicable.len(), 1);

        // No overlap: falls below threshold
        let state = WorkflowState::new("s1", "everything finished");
        let applicable = service.find_applicable_rules(&state, &set).await;
        assert!(applicable.is_empty());
    }

    #[tokio::test]
    async fn test_context_boost_lifts_borderline_rule() {
        let oracle = ScriptedOracle::always(r#"{"confidence": 0.42}"#);
        let service = RuleMatchingService::new(Arc::new(oracle));

        let mut set = RuleSet::new("goal");
        set.add_rule(
            ProductionRule::new("r1", "r1", "report draft exists", "verify the report")
                .with_phase(RulePhase::Verification),
            "init",
        );

        // Phase stem "verif" in the state text plus condition-keyword overlap
        // in history: +0.2 carries 0.42 over the 0.5 bar
        let mut state = WorkflowState::new("s1", "ready for verification");
        state
            .execution_history
            .push("[iter 1] r0: ok - produced report draft".to_string());

        let applicable = service.find_applicable_rules(&state, &set).await;
        assert_eq!(applicable.len(), 1);
    }

    #[test]
    fn test_resolve_conflicts_max_priority() {
        let service = RuleMatchingService::new(Arc::new(ScriptedOracle::always("{}")));
        let rules = vec![rule("a", 50), rule("b", 90), rule("c", 70)];
        assert_eq!(service.resolve_conflicts(&rules).unwrap().id, "b");
    }

    #[test]
    fn test_resolve_conflicts_tie_break_by_id() {
        let service = RuleMatchingService::new(Arc::new(ScriptedOracle::always("{}")));
        let rules = vec![rule("zeta", 90), rule("alpha", 90), rule("mid", 50)];
        assert_eq!(service.resolve_conflicts(&rules).unwrap().id, "alpha");
    }

    #[test]
    fn test_resolve_conflicts_empty() {
        let service = RuleMatchingService::new(Arc::new(ScriptedOracle::always("{}")));
        assert!(service.resolve_conflicts(&[]).is_none());
    }

    #[test]
    fn test_word_jaccard() {
        assert_eq!(word_jaccard("", "anything here"), 0.0);
        assert!((word_jaccard("index the archive", "index the archive") - 1.0).abs() < 1e-9);
        let partial = word_jaccard("archive index missing", "archive index built");
        assert!(partial > 0.0 && partial < 1.0);
    }
}
