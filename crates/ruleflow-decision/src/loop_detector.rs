//! Loop risk detection
//!
//! Two layers, computed fresh each decision cycle:
//!
//! - [`LoopContext`]: cheap indicators read straight off the workflow state
//!   (consecutive executions, fingerprint cycle, iteration count). Drives the
//!   hard termination rule.
//! - [`AdvancedLoopDetection`]: five independent heuristics combined into a
//!   weighted risk score. Drives the graded prevention policy.
//!
//! Both degrade toward "no loop detected" on thin history - a false negative
//! costs another iteration, a crash costs the session.

use regex::Regex;
use ruleflow_core::{LimitsConfig, LoopWeights};
use ruleflow_state::WorkflowState;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::OnceLock;

/// Loop risk severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Basic loop indicators read from the workflow state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopContext {
    pub executed_rule_count: usize,
    pub consecutive_same_rule: u32,
    pub state_cycle_detected: bool,
    pub iteration_count: u32,
    /// The rule set is non-empty but every rule is executed or skip-listed
    pub rules_exhausted: bool,
    pub risk_level: RiskLevel,
}

impl LoopContext {
    pub fn from_state(
        state: &WorkflowState,
        total_rules: usize,
        available_count: usize,
        limits: &LimitsConfig,
    ) -> Self {
        let state_cycle_detected = state.in_recent_fingerprints(limits.fingerprint_lookback);
        let consecutive = state.consecutive_same_rule_count;
        let rules_exhausted = total_rules > 0 && available_count == 0;

        let risk_level = if state_cycle_detected || consecutive >= limits.max_consecutive_same_rule
        {
            RiskLevel::Critical
        } else if state.iteration_count > limits.max_iterations {
            RiskLevel::High
        } else if rules_exhausted || consecutive + 1 == limits.max_consecutive_same_rule {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        };

        Self {
            executed_rule_count: state.executed_rules.len(),
            consecutive_same_rule: consecutive,
            state_cycle_detected,
            iteration_count: state.iteration_count,
            rules_exhausted,
            risk_level,
        }
    }

    /// Hard termination rule: high or critical risk ends the session
    pub fn should_terminate(&self) -> bool {
        self.risk_level >= RiskLevel::High
    }

    /// One-line human-readable summary for reasoning strings and prompts
    pub fn summary(&self) -> String {
        let mut parts = vec![format!("risk={}", self.risk_level)];
        if self.consecutive_same_rule >= 2 {
            parts.push(format!(
                "{} consecutive executions of the same rule",
                self.consecutive_same_rule
            ));
        }
        if self.state_cycle_detected {
            parts.push("state cycle detected".to_string());
        }
        if self.rules_exhausted {
            parts.push("all rules exhausted".to_string());
        }
        parts.push(format!("iteration {}", self.iteration_count));
        parts.join("; ")
    }
}

/// Five-signal loop risk analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvancedLoopDetection {
    /// Two consecutive 2-3 step history windows are identical
    pub pattern_repetition: bool,
    /// The state text keeps circling the same keywords
    pub semantic_repetition: bool,
    /// 3+ failures in the last 5 history entries
    pub execution_stagnation: bool,
    /// Non-empty rule set with zero available rules
    pub rule_exhaustion: bool,
    /// Iteration count past the temporal threshold
    pub temporal_loop: bool,
    /// Weighted sum of the fired signals, capped at 1.0
    pub overall_risk_score: f64,
}

impl AdvancedLoopDetection {
    pub fn analyze(
        state: &WorkflowState,
        total_rules: usize,
        available_count: usize,
        weights: &LoopWeights,
        limits: &LimitsConfig,
    ) -> Self {
        let pattern_repetition = detect_pattern_repetition(&state.execution_history);
        let semantic_repetition = detect_semantic_repetition(&state.state);
        let execution_stagnation = detect_stagnation(&state.execution_history);
        let rule_exhaustion = total_rules > 0 && available_count == 0;
        let temporal_loop = state.iteration_count > limits.temporal_loop_iterations;

        let mut score = 0.0;
        if pattern_repetition {
            score += weights.pattern_repetition;
        }
        if semantic_repetition {
            score += weights.semantic_repetition;
        }
        if execution_stagnation {
            score += weights.stagnation;
        }
        if rule_exhaustion {
            score += weights.rule_exhaustion;
        }
        if temporal_loop {
            score += weights.temporal;
        }

        Self {
            pattern_repetition,
            semantic_repetition,
            execution_stagnation,
            rule_exhaustion,
            temporal_loop,
            overall_risk_score: score.min(1.0),
        }
    }

    /// Names of the fired signals plus the score
    pub fn summary(&self) -> String {
        let mut fired = Vec::new();
        if self.pattern_repetition {
            fired.push("pattern repetition");
        }
        if self.semantic_repetition {
            fired.push("semantic repetition");
        }
        if self.execution_stagnation {
            fired.push("execution stagnation");
        }
        if self.rule_exhaustion {
            fired.push("rule exhaustion");
        }
        if self.temporal_loop {
            fired.push("temporal loop");
        }
        if fired.is_empty() {
            format!("score {:.2}, no signals fired", self.overall_risk_score)
        } else {
            format!("score {:.2}: {}", self.overall_risk_score, fired.join(", "))
        }
    }
}

/// Strip the `[iter N]` prefix so the same action matches across iterations
fn normalize_entry(entry: &str) -> &str {
    match entry.find(']') {
        Some(i) => entry[i + 1..].trim(),
        None => entry.trim(),
    }
}

/// Compare the trailing 2-step and 3-step windows of the last 6 history
/// entries against the windows immediately before them.
fn detect_pattern_repetition(history: &[String]) -> bool {
    let recent: Vec<&str> = history
        .iter()
        .rev()
        .take(6)
        .rev()
        .map(|e| normalize_entry(e))
        .collect();

    for window in [2usize, 3] {
        if recent.len() >= window * 2 {
            let tail = &recent[recent.len() - window..];
            let prev = &recent[recent.len() - 2 * window..recent.len() - window];
            if tail == prev {
                return true;
            }
        }
    }
    false
}

fn word_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[a-z_]{5,}").expect("static regex"))
}

/// Keyword-frequency check over the state text: a description that repeats
/// the same substantive word 3+ times reads as circling.
fn detect_semantic_repetition(state_text: &str) -> bool {
    let lowered = state_text.to_lowercase();
    let mut counts: HashMap<&str, u32> = HashMap::new();
    for m in word_regex().find_iter(&lowered) {
        *counts.entry(m.as_str()).or_insert(0) += 1;
    }
    counts.values().any(|&c| c >= 3)
}

/// 3+ failure entries among the last 5 history entries
fn detect_stagnation(history: &[String]) -> bool {
    let failures = history
        .iter()
        .rev()
        .take(5)
        .filter(|e| e.contains(": failed"))
        .count();
    failures >= 3
}
