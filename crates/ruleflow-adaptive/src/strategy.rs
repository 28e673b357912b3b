//! Replacement strategy selection
//!
//! A fixed decision tree over the six situation dimensions picks a strategy
//! kind; each kind maps to a configuration bundle from a lookup table. An
//! optional oracle pass may adjust the numeric knobs, with every suggested
//! value clamped into safe bounds - a failed or ambiguous validation leaves
//! the strategy untouched.

use crate::effectiveness::EffectivenessTracker;
use crate::situation::SituationScore;
use ruleflow_oracle::{parse_structured_response, Oracle};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

/// Minimum tracker confidence to override the decision tree
pub const TRACKER_CONFIDENCE_GATE: f64 = 0.7;

/// Replacement strategy families, ordered by decision-tree priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    EmergencyReplacement,
    AggressiveCleanup,
    StrategicPivot,
    AgentRebalancing,
    PhaseOptimization,
    PerformanceFocused,
    MinimalReplacement,
    IncrementalImprovement,
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmergencyReplacement => write!(f, "emergency_replacement"),
            Self::AggressiveCleanup => write!(f, "aggressive_cleanup"),
            Self::StrategicPivot => write!(f, "strategic_pivot"),
            Self::AgentRebalancing => write!(f, "agent_rebalancing"),
            Self::PhaseOptimization => write!(f, "phase_optimization"),
            Self::PerformanceFocused => write!(f, "performance_focused"),
            Self::MinimalReplacement => write!(f, "minimal_replacement"),
            Self::IncrementalImprovement => write!(f, "incremental_improvement"),
        }
    }
}

/// Configuration bundle for one replacement pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplacementStrategy {
    pub kind: StrategyKind,
    /// Fraction of the existing set eligible for replacement
    pub replacement_ratio: f64,
    /// Minimum similarity for a pair to score its similarity component
    pub similarity_threshold: f64,
    /// Performance bar used by conservative passes
    pub performance_threshold: f64,
    pub max_rules_per_phase: usize,
    pub max_rules_per_agent: usize,
    pub conservative: bool,
}

impl ReplacementStrategy {
    /// Fixed configuration for each strategy kind
    pub fn for_kind(kind: StrategyKind) -> Self {
        let (ratio, similarity, performance, conservative, per_phase, per_agent) = match kind {
            StrategyKind::EmergencyReplacement => (0.8, 0.3, 0.2, false, 4, 5),
            StrategyKind::AggressiveCleanup => (0.6, 0.4, 0.4, false, 3, 4),
            StrategyKind::StrategicPivot => (0.7, 0.3, 0.3, false, 4, 5),
            StrategyKind::AgentRebalancing => (0.4, 0.5, 0.5, true, 4, 3),
            StrategyKind::PhaseOptimization => (0.4, 0.5, 0.5, true, 3, 5),
            StrategyKind::PerformanceFocused => (0.5, 0.4, 0.6, false, 4, 4),
            StrategyKind::MinimalReplacement => (0.1, 0.7, 0.5, true, 6, 6),
            StrategyKind::IncrementalImprovement => (0.2, 0.6, 0.5, true, 5, 5),
        };
        Self {
            kind,
            replacement_ratio: ratio,
            similarity_threshold: similarity,
            performance_threshold: performance,
            max_rules_per_phase: per_phase,
            max_rules_per_agent: per_agent,
            conservative,
        }
    }
}

/// Select a strategy: an effectiveness-tracker recommendation wins when it
/// clears the confidence gate, otherwise the fixed decision tree applies in
/// priority order.
pub fn select_strategy(
    score: &SituationScore,
    rule_count: usize,
    iteration: u32,
    tracker: Option<&EffectivenessTracker>,
) -> ReplacementStrategy {
    if let Some(tracker) = tracker {
        if let Some(kind) = tracker.recommend(TRACKER_CONFIDENCE_GATE) {
            info!("Effectiveness tracker recommends {}", kind);
            return ReplacementStrategy::for_kind(kind);
        }
    }

    let kind = if score.failure_frequency > 0.5 {
        StrategyKind::EmergencyReplacement
    } else if score.rule_density > 0.8 {
        StrategyKind::AggressiveCleanup
    } else if score.goal_progress < 0.3 && iteration > 5 {
        StrategyKind::StrategicPivot
    } else if score.agent_utilization < 0.4 {
        StrategyKind::AgentRebalancing
    } else if score.phase_imbalance > 0.6 {
        StrategyKind::PhaseOptimization
    } else if score.execution_efficiency < 0.4 {
        StrategyKind::PerformanceFocused
    } else if rule_count < 3 {
        StrategyKind::MinimalReplacement
    } else {
        StrategyKind::IncrementalImprovement
    };

    debug!("Decision tree selected {}", kind);
    ReplacementStrategy::for_kind(kind)
}

/// Let the oracle adjust the numeric knobs of a chosen strategy.
///
/// Every suggested override is clamped: ratio into [0.1, 0.8], thresholds
/// into [0, 1], caps into [1, 10]. Any failure leaves the input unchanged.
pub async fn validate_strategy(
    oracle: &dyn Oracle,
    strategy: ReplacementStrategy,
    score: &SituationScore,
) -> ReplacementStrategy {
    let prompt = format!(
        "# STRATEGY VALIDATION\n\n\
         Chosen replacement strategy: {}\n\
         - replacement_ratio: {:.2}\n\
         - similarity_threshold: {:.2}\n\
         - performance_threshold: {:.2}\n\
         - max_rules_per_phase: {}\n\
         - max_rules_per_agent: {}\n\n\
         Situation: density {:.2}, efficiency {:.2}, progress {:.2}, \
         failures {:.2}, agent balance {:.2}, phase imbalance {:.2}\n\n\
         Adjust any knob that looks wrong for this situation. Respond with\n\
         JSON containing only the knobs to change, or {{}} to keep them all.\n",
        strategy.kind,
        strategy.replacement_ratio,
        strategy.similarity_threshold,
        strategy.performance_threshold,
        strategy.max_rules_per_phase,
        strategy.max_rules_per_agent,
        score.rule_density,
        score.execution_efficiency,
        score.goal_progress,
        score.failure_frequency,
        score.agent_utilization,
        score.phase_imbalance,
    );

    let response = match oracle.generate_text(&prompt).await {
        Ok(text) => text,
        Err(e) => {
            warn!("Strategy validation oracle call failed, keeping strategy: {}", e);
            return strategy;
        }
    };

    let Some(parsed) = parse_structured_response(&response) else {
        return strategy;
    };

    apply_overrides(strategy, &parsed)
}

fn apply_overrides(mut strategy: ReplacementStrategy, parsed: &Value) -> ReplacementStrategy {
    if let Some(ratio) = parsed.get("replacement_ratio").and_then(Value::as_f64) {
        strategy.replacement_ratio = ratio.clamp(0.1, 0.8);
    }
    if let Some(threshold) = parsed.get("similarity_threshold").and_then(Value::as_f64) {
        strategy.similarity_threshold = threshold.clamp(0.0, 1.0);
    }
    if let Some(threshold) = parsed.get("performance_threshold").and_then(Value::as_f64) {
        strategy.performance_threshold = threshold.clamp(0.0, 1.0);
    }
    if let Some(cap) = parsed.get("max_rules_per_phase").and_then(Value::as_u64) {
        strategy.max_rules_per_phase = (cap as usize).clamp(1, 10);
    }
    if let Some(cap) = parsed.get("max_rules_per_agent").and_then(Value::as_u64) {
        strategy.max_rules_per_agent = (cap as usize).clamp(1, 10);
    }
    strategy
}

#[cfg(test)]
mod tests {
    use super::*;
    use ruleflow_oracle::ScriptedOracle;

    fn healthy_score() -> SituationScore {
        SituationScore {
            rule_density: 0.5,
            execution_efficiency: 0.7,
            goal_progress: 0.5,
            failure_frequency: 0.1,
            agent_utilization: 0.8,
            phase_imbalance: 0.2,
        }
    }

    #[test]
    fn test_decision_tree_priority_order() {
        let mut score = healthy_score();

        score.failure_frequency = 0.6;
        assert_eq!(
            select_strategy(&score, 5, 3, None).kind,
            StrategyKind::EmergencyReplacement
        );

        score.failure_frequency = 0.1;
        score.rule_density = 0.9;
        assert_eq!(
            select_strategy(&score, 5, 3, None).kind,
            StrategyKind::AggressiveCleanup
        );

        score.rule_density = 0.5;
        score.goal_progress = 0.2;
        assert_eq!(
            select_strategy(&score, 5, 6, None).kind,
            StrategyKind::StrategicPivot
        );
        // Pivot needs iteration > 5
        assert_ne!(
            select_strategy(&score, 5, 3, None).kind,
            StrategyKind::StrategicPivot
        );

        score.goal_progress = 0.5;
        score.agent_utilization = 0.3;
        assert_eq!(
            select_strategy(&score, 5, 3, None).kind,
            StrategyKind::AgentRebalancing
        );

        score.agent_utilization = 0.8;
        score.phase_imbalance = 0.7;
        assert_eq!(
            select_strategy(&score, 5, 3, None).kind,
            StrategyKind::PhaseOptimization
        );

        score.phase_imbalance = 0.2;
        score.execution_efficiency = 0.3;
        assert_eq!(
            select_strategy(&score, 5, 3, None).kind,
            StrategyKind::PerformanceFocused
        );
    }

    #[test]
    fn test_decision_tree_fallthrough() {
        let score = healthy_score();
        assert_eq!(
            select_strategy(&score, 2, 3, None).kind,
            StrategyKind::MinimalReplacement
        );
        assert_eq!(
            select_strategy(&score, 6, 3, None).kind,
            StrategyKind::IncrementalImprovement
        );
    }

    #[test]
    fn test_tracker_recommendation_wins() {
        let mut tracker = EffectivenessTracker::new();
        for _ in 0..40 {
            tracker.record(StrategyKind::PhaseOptimization, true);
        }

        let score = healthy_score();
        let strategy = select_strategy(&score, 6, 3, Some(&tracker));
        assert_eq!(strategy.kind, StrategyKind::PhaseOptimization);
    }

    #[test]
    fn test_lookup_table_bounds() {
        for kind in [
            StrategyKind::EmergencyReplacement,
            StrategyKind::AggressiveCleanup,
            StrategyKind::StrategicPivot,
            StrategyKind::AgentRebalancing,
            StrategyKind::PhaseOptimization,
            StrategyKind::PerformanceFocused,
            StrategyKind::MinimalReplacement,
            StrategyKind::IncrementalImprovement,
        ] {
            let strategy = ReplacementStrategy::for_kind(kind);
            assert!((0.1..=0.8).contains(&strategy.replacement_ratio));
            assert!((0.0..=1.0).contains(&strategy.similarity_threshold));
            assert!((3..=6).contains(&strategy.max_rules_per_phase));
            assert!((3..=6).contains(&strategy.max_rules_per_agent));
        }
    }

    #[tokio::test]
    async fn test_validation_clamps_overrides() {
        let oracle = ScriptedOracle::always(
            r#"{"replacement_ratio": 5.0, "similarity_threshold": -2.0, "max_rules_per_phase": 99}"#,
        );
        let strategy = ReplacementStrategy::for_kind(StrategyKind::IncrementalImprovement);
        let validated = validate_strategy(&oracle, strategy, &healthy_score()).await;

        assert!((validated.replacement_ratio - 0.8).abs() < 1e-9);
        assert_eq!(validated.similarity_threshold, 0.0);
        assert_eq!(validated.max_rules_per_phase, 10);
        // Untouched knobs survive
        assert_eq!(validated.max_rules_per_agent, 5);
    }

    #[tokio::test]
    async fn test_validation_failure_keeps_strategy() {
        let oracle = ScriptedOracle::always_failing("down");
        let strategy = ReplacementStrategy::for_kind(StrategyKind::AggressiveCleanup);
        let validated = validate_strategy(&oracle, strategy.clone(), &healthy_score()).await;
        assert_eq!(validated.kind, strategy.kind);
        assert!((validated.replacement_ratio - strategy.replacement_ratio).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_validation_ambiguous_response_keeps_strategy() {
        let oracle = ScriptedOracle::always("keep everything as is, no JSON from me");
        let strategy = ReplacementStrategy::for_kind(StrategyKind::MinimalReplacement);
        let validated = validate_strategy(&oracle, strategy.clone(), &healthy_score()).await;
        assert!((validated.replacement_ratio - strategy.replacement_ratio).abs() < 1e-9);
    }
}
