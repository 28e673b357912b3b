//! Workflow state snapshots and loop-prevention bookkeeping
//!
//! A `WorkflowState` is never mutated in place by the decision core. Every
//! iteration produces a successor snapshot via [`WorkflowState::update_from_result`];
//! the prior snapshot survives only in the repository's history, keyed by
//! iteration, never as a live back-pointer.
//!
//! Fingerprint recording and cycle checking are separate operations.
//! `record_fingerprint` runs exactly once per iteration (inside
//! `update_from_result`); `in_recent_fingerprints` is a pure read and can be
//! called any number of times. The combined `check_state_cycle` is provided
//! for call sites that want the old single-call shape and must be invoked at
//! most once per iteration.

use ruleflow_core::{ProductionRule, WorkflowResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap};

/// Metadata key whose value replaces the state description on update
pub const STATE_DESCRIPTION_KEY: &str = "state";

/// The mutable "world" seen by the decision core, replaced per iteration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowState {
    /// Snapshot id, chained `{session_id}_iter_{n}`
    pub id: String,
    /// Session this snapshot belongs to
    pub session_id: String,
    /// Free-text description of the current situation
    pub state: String,
    /// Auxiliary key-value data accumulated across iterations
    #[serde(default)]
    pub context_variables: HashMap<String, String>,
    /// One short log entry per iteration, append-only
    #[serde(default)]
    pub execution_history: Vec<String>,
    /// Monotonically increasing iteration counter
    pub iteration_count: u32,
    /// Set exactly once to true, never reset
    pub goal_achieved: bool,
    /// Tasks marked complete by executors
    #[serde(default)]
    pub completed_tasks: Vec<String>,
    /// Rule ids already run (at most one normal execution per rule)
    #[serde(default)]
    pub executed_rules: BTreeSet<String>,
    /// Failure count per rule id
    #[serde(default)]
    pub failed_attempts: HashMap<String, u32>,
    /// Rolling window of state fingerprints for cycle detection
    #[serde(default)]
    pub state_fingerprints: Vec<String>,
    /// Length of the current same-rule execution run
    pub consecutive_same_rule_count: u32,
    /// Rule executed in the most recent iteration
    pub last_executed_rule_id: Option<String>,
}

impl WorkflowState {
    /// Fresh state at iteration 0. The snapshot id starts as the session id;
    /// successors derive `{session_id}_iter_{n}`.
    pub fn new(session_id: impl Into<String>, initial_state: impl Into<String>) -> Self {
        let session_id = session_id.into();
        Self {
            id: session_id.clone(),
            session_id,
            state: initial_state.into(),
            context_variables: HashMap::new(),
            execution_history: Vec::new(),
            iteration_count: 0,
            goal_achieved: false,
            completed_tasks: Vec::new(),
            executed_rules: BTreeSet::new(),
            failed_attempts: HashMap::new(),
            state_fingerprints: Vec::new(),
            consecutive_same_rule_count: 0,
            last_executed_rule_id: None,
        }
    }

    /// Record a rule execution and its outcome
    pub fn mark_rule_executed(&mut self, rule_id: &str, success: bool) {
        self.executed_rules.insert(rule_id.to_string());

        if self.last_executed_rule_id.as_deref() == Some(rule_id) {
            self.consecutive_same_rule_count += 1;
        } else {
            self.consecutive_same_rule_count = 1;
        }
        self.last_executed_rule_id = Some(rule_id.to_string());

        if !success {
            *self.failed_attempts.entry(rule_id.to_string()).or_insert(0) += 1;
        }
    }

    pub fn is_rule_executed(&self, rule_id: &str) -> bool {
        self.executed_rules.contains(rule_id)
    }

    pub fn rule_failure_count(&self, rule_id: &str) -> u32 {
        self.failed_attempts.get(rule_id).copied().unwrap_or(0)
    }

    /// Whether a rule has failed often enough to be skipped
    pub fn should_skip_rule(&self, rule_id: &str, max_failures: u32) -> bool {
        self.rule_failure_count(rule_id) >= max_failures
    }

    /// Immediate-repetition check: the same rule ran `max_consecutive`+ times
    pub fn detect_potential_loop(&self, max_consecutive: u32) -> bool {
        self.consecutive_same_rule_count >= max_consecutive
    }

    /// Deterministic digest of the observable situation.
    ///
    /// Order-independent over the executed-rule set (`executed_rules` is a
    /// sorted set), so two states that ran the same rules in different orders
    /// but otherwise look identical fingerprint the same.
    pub fn generate_fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.state.as_bytes());
        hasher.update(b"\x1f");
        for rule_id in &self.executed_rules {
            hasher.update(rule_id.as_bytes());
            hasher.update(b"\x1f");
        }
        for task in &self.completed_tasks {
            hasher.update(task.as_bytes());
            hasher.update(b"\x1f");
        }
        hasher.update(self.iteration_count.to_le_bytes());
        let digest = hasher.finalize();
        hex::encode(&digest[..16])
    }

    /// Append the current fingerprint to the rolling window, truncating the
    /// window to `2 * lookback` entries. Called once per iteration.
    pub fn record_fingerprint(&mut self, lookback: usize) {
        let fingerprint = self.generate_fingerprint();
        self.state_fingerprints.push(fingerprint);
        let cap = 2 * lookback.max(1);
        if self.state_fingerprints.len() > cap {
            let excess = self.state_fingerprints.len() - cap;
            self.state_fingerprints.drain(..excess);
        }
    }

    /// Pure read: does the current fingerprint appear among the previous
    /// `lookback` recorded entries (excluding this snapshot's own record)?
    pub fn in_recent_fingerprints(&self, lookback: usize) -> bool {
        let current = self.generate_fingerprint();
        let mut prior: &[String] = &self.state_fingerprints;
        // The final entry is this snapshot's own record when record_fingerprint
        // already ran this iteration; never match against it.
        if prior.last().map(String::as_str) == Some(current.as_str()) {
            prior = &prior[..prior.len() - 1];
        }
        prior
            .iter()
            .rev()
            .take(lookback)
            .any(|f| f == &current)
    }

    /// Record-then-check convenience. Stateful: invoke at most once per
    /// iteration or the effective lookback window shrinks.
    pub fn check_state_cycle(&mut self, lookback: usize) -> bool {
        self.record_fingerprint(lookback);
        self.in_recent_fingerprints(lookback)
    }

    /// Filter `all_rules` down to candidates: not yet executed and not past
    /// the failure threshold. Preserves input order.
    pub fn available_rules<'a>(
        &self,
        all_rules: &'a [ProductionRule],
        max_failures: u32,
    ) -> Vec<&'a ProductionRule> {
        all_rules
            .iter()
            .filter(|r| !self.is_rule_executed(&r.id) && !self.should_skip_rule(&r.id, max_failures))
            .collect()
    }

    /// Goal achievement is monotonic: set once, never reset
    pub fn mark_goal_achieved(&mut self) {
        self.goal_achieved = true;
    }

    /// Pure successor computation: a new snapshot with the iteration advanced,
    /// the execution recorded, history appended, context variables merged from
    /// result metadata, and the new fingerprint recorded.
    ///
    /// A `state` metadata entry on the result replaces the state description.
    pub fn update_from_result(
        &self,
        result: &WorkflowResult,
        executed_rule_id: Option<&str>,
        lookback: usize,
    ) -> WorkflowState {
        let mut next = self.clone();
        next.iteration_count = self.iteration_count + 1;
        next.id = format!("{}_iter_{}", self.session_id, next.iteration_count);

        if let Some(rule_id) = executed_rule_id {
            next.mark_rule_executed(rule_id, result.success);
        }

        for (key, value) in &result.metadata {
            if key == STATE_DESCRIPTION_KEY {
                next.state = value.clone();
            } else {
                next.context_variables.insert(key.clone(), value.clone());
            }
        }

        if result.success {
            if let Some(rule_id) = executed_rule_id {
                next.completed_tasks.push(rule_id.to_string());
            }
        }

        next.execution_history.push(format!(
            "[iter {}] {}: {} - {}",
            next.iteration_count,
            executed_rule_id.unwrap_or("-"),
            result.status(),
            result.message
        ));

        next.record_fingerprint(lookback);
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ruleflow_core::ProductionRule;

    fn rule(id: &str) -> ProductionRule {
        ProductionRule::new(id, id, "when", "do")
    }

    #[test]
    fn test_consecutive_rule_counting() {
        let mut state = WorkflowState::new("s1", "start");

        state.mark_rule_executed("r1", true);
        assert_eq!(state.consecutive_same_rule_count, 1);
        state.mark_rule_executed("r1", true);
        state.mark_rule_executed("r1", true);
        assert_eq!(state.consecutive_same_rule_count, 3);
        assert!(state.detect_potential_loop(3));

        // A different rule resets the run to 1
        state.mark_rule_executed("r2", true);
        assert_eq!(state.consecutive_same_rule_count, 1);
        assert!(!state.detect_potential_loop(3));
    }

    #[test]
    fn test_failure_counting_and_skip() {
        let mut state = WorkflowState::new("s1", "start");
        state.mark_rule_executed("r1", false);
        state.mark_rule_executed("r1", false);
        assert_eq!(state.rule_failure_count("r1"), 2);
        assert!(!state.should_skip_rule("r1", 3));
        state.mark_rule_executed("r1", false);
        assert!(state.should_skip_rule("r1", 3));
        assert_eq!(state.rule_failure_count("never-ran"), 0);
    }

    #[test]
    fn test_available_rules_filtering() {
        let mut state = WorkflowState::new("s1", "start");
        state.executed_rules.insert("r1".to_string());
        state.executed_rules.insert("r2".to_string());
        state.failed_attempts.insert("r1".to_string(), 3);

        let all = vec![rule("r1"), rule("r2"), rule("r3")];
        let available = state.available_rules(&all, 3);
        assert_eq!(available.len(), 1);
        assert_eq!(available[0].id, "r3");
    }

    #[test]
    fn test_fingerprint_order_independent() {
        let mut a = WorkflowState::new("s1", "same");
        a.executed_rules.insert("r1".to_string());
        a.executed_rules.insert("r2".to_string());

        let mut b = WorkflowState::new("s1", "same");
        b.executed_rules.insert("r2".to_string());
        b.executed_rules.insert("r1".to_string());

        assert_eq!(a.generate_fingerprint(), b.generate_fingerprint());

        b.state = "different".to_string();
        assert_ne!(a.generate_fingerprint(), b.generate_fingerprint());
    }

    #[test]
    fn test_cycle_detection_on_recurring_tuple() {
        let mut state = WorkflowState::new("s1", "looping");

        // First visit records the fingerprint, no cycle yet
        assert!(!state.check_state_cycle(5));
        // Identical situation recurs within the window
        assert!(state.check_state_cycle(5));
    }

    #[test]
    fn test_no_cycle_for_distinct_tuples() {
        let mut state = WorkflowState::new("s1", "start");
        for i in 0..6 {
            state.state = format!("situation {}", i);
            state.iteration_count = i;
            assert!(!state.check_state_cycle(5), "iteration {} flagged", i);
        }
    }

    #[test]
    fn test_fingerprint_window_bounded() {
        let mut state = WorkflowState::new("s1", "start");
        for i in 0..40 {
            state.iteration_count = i;
            state.record_fingerprint(5);
        }
        assert!(state.state_fingerprints.len() <= 10);
    }

    #[test]
    fn test_update_from_result_is_pure() {
        let state = WorkflowState::new("s1", "initial");
        let result = WorkflowResult::ok("did the thing")
            .with_metadata_entry("found_url", "https://example.com")
            .with_metadata_entry(STATE_DESCRIPTION_KEY, "after first step");

        let next = state.update_from_result(&result, Some("r1"), 5);

        // Parent untouched
        assert_eq!(state.iteration_count, 0);
        assert!(state.execution_history.is_empty());
        assert!(!state.is_rule_executed("r1"));

        // Successor advanced
        assert_eq!(next.iteration_count, 1);
        assert_eq!(next.id, "s1_iter_1");
        assert!(next.is_rule_executed("r1"));
        assert_eq!(next.state, "after first step");
        assert_eq!(
            next.context_variables.get("found_url").map(String::as_str),
            Some("https://example.com")
        );
        assert_eq!(next.execution_history.len(), 1);
        assert!(next.execution_history[0].contains("[iter 1]"));
        assert!(next.execution_history[0].contains("ok"));
        assert_eq!(next.completed_tasks, vec!["r1".to_string()]);
    }

    #[test]
    fn test_executed_rules_monotonic_through_lineage() {
        let state = WorkflowState::new("s1", "initial");
        let next = state.update_from_result(&WorkflowResult::ok("one"), Some("r1"), 5);
        let after = next.update_from_result(&WorkflowResult::failed("two", "err"), Some("r2"), 5);

        assert!(after.is_rule_executed("r1"));
        assert!(after.is_rule_executed("r2"));
        assert_eq!(after.id, "s1_iter_2");
        assert_eq!(after.rule_failure_count("r2"), 1);
    }

    #[test]
    fn test_failed_execution_does_not_complete_task() {
        let state = WorkflowState::new("s1", "initial");
        let next = state.update_from_result(&WorkflowResult::failed("boom", "err"), Some("r1"), 5);
        assert!(next.completed_tasks.is_empty());
        assert!(next.is_rule_executed("r1"));
    }
}
