//! Six-dimension situation assessment
//!
//! Derived fresh on every replacement call from the current rule set and
//! workflow state; never persisted. Each dimension lands in [0, 1].

use ruleflow_core::{ProductionRule, RulePhase};
use ruleflow_state::WorkflowState;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Words in a goal that signal extra complexity
const COMPLEXITY_KEYWORDS: [&str; 10] = [
    "integrate",
    "migrate",
    "refactor",
    "distributed",
    "concurrent",
    "optimize",
    "secure",
    "deploy",
    "analyze",
    "multiple",
];

/// Words in history entries that signal forward progress
const PROGRESS_KEYWORDS: [&str; 8] = [
    "complete", "created", "found", "success", "finished", "done", "built", "resolved",
];

/// Health assessment of the current rule set, each dimension in [0, 1]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SituationScore {
    /// How full the rule set is relative to estimated goal complexity
    pub rule_density: f64,
    /// Success fraction of recent executions
    pub execution_efficiency: f64,
    /// Estimated progress toward the goal
    pub goal_progress: f64,
    /// Failure fraction of recent executions
    pub failure_frequency: f64,
    /// Evenness of the per-agent rule distribution (1.0 = perfectly even)
    pub agent_utilization: f64,
    /// Deviation from an even per-phase rule distribution
    pub phase_imbalance: f64,
}

/// Estimate goal complexity from text length and keyword hits, clamped [2, 8]
pub fn estimate_goal_complexity(goal: &str) -> usize {
    let lowered = goal.to_lowercase();
    let keyword_hits = COMPLEXITY_KEYWORDS
        .iter()
        .filter(|k| lowered.contains(*k))
        .count();
    (goal.len() / 50 + keyword_hits).clamp(2, 8)
}

/// Assess the situation across all six dimensions
pub fn assess_situation(
    rules: &[ProductionRule],
    state: &WorkflowState,
    goal: &str,
    max_iterations: u32,
) -> SituationScore {
    SituationScore {
        rule_density: rule_density(rules, goal),
        execution_efficiency: execution_efficiency(&state.execution_history),
        goal_progress: goal_progress(state, max_iterations),
        failure_frequency: failure_frequency(&state.execution_history),
        agent_utilization: agent_utilization(rules),
        phase_imbalance: phase_imbalance(rules),
    }
}

fn rule_density(rules: &[ProductionRule], goal: &str) -> f64 {
    let complexity = estimate_goal_complexity(goal);
    let capacity = (2 * complexity).max(5) as f64;
    (rules.len() as f64 / capacity).min(1.0)
}

fn execution_efficiency(history: &[String]) -> f64 {
    let recent: Vec<&String> = history.iter().rev().take(5).collect();
    if recent.len() < 2 {
        // Too little signal to judge either way
        return 0.5;
    }
    let successes = recent.iter().filter(|e| e.contains(": ok")).count();
    successes as f64 / recent.len() as f64
}

fn goal_progress(state: &WorkflowState, max_iterations: u32) -> f64 {
    if state.goal_achieved {
        return 1.0;
    }
    let base = (state.iteration_count as f64 / max_iterations.max(1) as f64).min(0.8);
    let keyword_bonus: f64 = state
        .execution_history
        .iter()
        .rev()
        .take(3)
        .filter(|entry| {
            let lowered = entry.to_lowercase();
            PROGRESS_KEYWORDS.iter().any(|k| lowered.contains(k))
        })
        .count() as f64
        * 0.1;
    (base + keyword_bonus).clamp(0.0, 1.0)
}

fn failure_frequency(history: &[String]) -> f64 {
    let recent: Vec<&String> = history.iter().rev().take(10).collect();
    if recent.is_empty() {
        return 0.0;
    }
    let failures = recent.iter().filter(|e| e.contains(": failed")).count();
    failures as f64 / recent.len() as f64
}

/// 1 minus the normalized variance of per-agent rule counts. Rules without a
/// suggested agent pool in an "unassigned" bucket.
fn agent_utilization(rules: &[ProductionRule]) -> f64 {
    if rules.is_empty() {
        return 1.0;
    }

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for rule in rules {
        *counts.entry(rule.suggested_agent().unwrap_or("unassigned")).or_insert(0) += 1;
    }
    if counts.len() <= 1 {
        return 1.0;
    }

    let n = counts.len() as f64;
    let mean = rules.len() as f64 / n;
    let variance = counts
        .values()
        .map(|&c| (c as f64 - mean).powi(2))
        .sum::<f64>()
        / n;
    // Normalize by the squared mean so the score is scale-free
    let normalized = (variance / (mean * mean)).min(1.0);
    1.0 - normalized
}

/// Sum of absolute deviations from an even per-phase split, normalized by
/// `2 * total` and capped at 1.0
fn phase_imbalance(rules: &[ProductionRule]) -> f64 {
    if rules.is_empty() {
        return 0.0;
    }

    let total = rules.len() as f64;
    let even = total / 3.0;
    let deviation: f64 = RulePhase::all()
        .iter()
        .map(|phase| {
            let count = rules.iter().filter(|r| r.phase == *phase).count() as f64;
            (count - even).abs()
        })
        .sum();
    (deviation / (2.0 * total)).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(id: &str, phase: RulePhase, agent: Option<&str>) -> ProductionRule {
        let mut rule = ProductionRule::new(id, id, "cond", "act").with_phase(phase);
        if let Some(agent) = agent {
            rule = rule.with_metadata_entry(ruleflow_core::SUGGESTED_AGENT_KEY, agent);
        }
        rule
    }

    #[test]
    fn test_goal_complexity_bounds() {
        assert_eq!(estimate_goal_complexity("short"), 2);
        let long_goal = "integrate and migrate the distributed concurrent system ".repeat(10);
        assert_eq!(estimate_goal_complexity(&long_goal), 8);
    }

    #[test]
    fn test_rule_density() {
        // Simple goal: capacity max(2*2, 5) = 5
        let rules: Vec<ProductionRule> = (0..5)
            .map(|i| rule(&format!("r{}", i), RulePhase::Execution, None))
            .collect();
        let density = rule_density(&rules, "simple");
        assert!((density - 1.0).abs() < 1e-9);

        let density = rule_density(&rules[..2], "simple");
        assert!((density - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_execution_efficiency_thin_history() {
        assert_eq!(execution_efficiency(&[]), 0.5);
        assert_eq!(execution_efficiency(&["[iter 1] r1: ok - fine".to_string()]), 0.5);
    }

    #[test]
    fn test_execution_efficiency_fraction() {
        let history = vec![
            "[iter 1] r1: ok - fine".to_string(),
            "[iter 2] r2: failed - err".to_string(),
            "[iter 3] r3: ok - fine".to_string(),
            "[iter 4] r4: ok - fine".to_string(),
        ];
        assert!((execution_efficiency(&history) - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_goal_progress() {
        let mut state = WorkflowState::new("s1", "working");
        state.iteration_count = 10;
        // 10/20 = 0.5 base, no keyword bonus
        assert!((goal_progress(&state, 20) - 0.5).abs() < 1e-9);

        state
            .execution_history
            .push("[iter 10] r1: ok - report created".to_string());
        assert!((goal_progress(&state, 20) - 0.6).abs() < 1e-9);

        state.mark_goal_achieved();
        assert_eq!(goal_progress(&state, 20), 1.0);
    }

    #[test]
    fn test_goal_progress_base_capped() {
        let mut state = WorkflowState::new("s1", "overrunning");
        state.iteration_count = 40;
        // Base capped at 0.8 even past the iteration budget
        assert!((goal_progress(&state, 20) - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_failure_frequency() {
        assert_eq!(failure_frequency(&[]), 0.0);
        let history = vec![
            "[iter 1] r1: failed - err".to_string(),
            "[iter 2] r2: ok - fine".to_string(),
        ];
        assert!((failure_frequency(&history) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_agent_utilization_even_vs_skewed() {
        let even = vec![
            rule("a", RulePhase::Execution, Some("alpha")),
            rule("b", RulePhase::Execution, Some("beta")),
            rule("c", RulePhase::Execution, Some("alpha")),
            rule("d", RulePhase::Execution, Some("beta")),
        ];
        assert!((agent_utilization(&even) - 1.0).abs() < 1e-9);

        let skewed = vec![
            rule("a", RulePhase::Execution, Some("alpha")),
            rule("b", RulePhase::Execution, Some("alpha")),
            rule("c", RulePhase::Execution, Some("alpha")),
            rule("d", RulePhase::Execution, Some("alpha")),
            rule("e", RulePhase::Execution, Some("beta")),
        ];
        assert!(agent_utilization(&skewed) < agent_utilization(&even));
    }

    #[test]
    fn test_agent_utilization_trivial_cases() {
        assert_eq!(agent_utilization(&[]), 1.0);
        let single = vec![rule("a", RulePhase::Execution, None)];
        assert_eq!(agent_utilization(&single), 1.0);
    }

    #[test]
    fn test_phase_imbalance() {
        let balanced = vec![
            rule("a", RulePhase::InformationGathering, None),
            rule("b", RulePhase::Execution, None),
            rule("c", RulePhase::Verification, None),
        ];
        assert!(phase_imbalance(&balanced) < 1e-9);

        let lopsided: Vec<ProductionRule> = (0..6)
            .map(|i| rule(&format!("r{}", i), RulePhase::Execution, None))
            .collect();
        // All six in one phase: deviation = 2 + 4 + 2 = 8, over 2*6 = 12
        assert!((phase_imbalance(&lopsided) - 8.0 / 12.0).abs() < 1e-9);
    }

    #[test]
    fn test_assess_situation_all_dimensions_in_range() {
        let rules = vec![
            rule("a", RulePhase::Execution, Some("alpha")),
            rule("b", RulePhase::Verification, None),
        ];
        let mut state = WorkflowState::new("s1", "working");
        state.iteration_count = 3;
        state
            .execution_history
            .push("[iter 1] a: ok - built something".to_string());

        let score = assess_situation(&rules, &state, "refactor the archive pipeline", 20);
        for dim in [
            score.rule_density,
            score.execution_efficiency,
            score.goal_progress,
            score.failure_frequency,
            score.agent_utilization,
            score.phase_imbalance,
        ] {
            assert!((0.0..=1.0).contains(&dim), "dimension out of range: {}", dim);
        }
    }
}
