//! Adaptive rule replacement
//!
//! Given the existing rule set and a batch of newly proposed rules, decide how
//! much of the old set to keep, bounded by hard quantity caps. The pipeline:
//! assess the situation, select (and optionally oracle-validate) a strategy,
//! score (existing, new) pairs, replace greedily up to the strategy's ratio,
//! then enforce the caps.
//!
//! The public entry point never raises and never returns an empty set when the
//! inputs were non-empty: any internal failure falls back to a conservative
//! merge (concatenate and dedup by id).

use crate::effectiveness::EffectivenessTracker;
use crate::situation::{assess_situation, SituationScore};
use crate::strategy::{select_strategy, validate_strategy, ReplacementStrategy, StrategyKind};
use ruleflow_core::{ProductionRule, ReplacementWeights, Result, RuleflowConfig};
use ruleflow_oracle::{parse_structured_response, Oracle};
use ruleflow_state::WorkflowState;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Everything one replacement pass produced
#[derive(Debug, Clone)]
pub struct ReplacementOutcome {
    /// The successor rule collection
    pub rules: Vec<ProductionRule>,
    /// The strategy that was applied
    pub strategy: ReplacementStrategy,
    /// The situation assessment that drove strategy selection
    pub score: SituationScore,
    /// True when the pipeline degraded to the conservative merge
    pub degraded: bool,
}

/// Situation-aware rule set mutation under quantity constraints
pub struct AdaptiveReplacementService {
    oracle: Arc<dyn Oracle>,
    config: RuleflowConfig,
    tracker: Mutex<EffectivenessTracker>,
    /// Whether to let the oracle adjust strategy knobs
    validate_with_oracle: bool,
}

impl AdaptiveReplacementService {
    pub fn new(oracle: Arc<dyn Oracle>, config: RuleflowConfig) -> Self {
        Self {
            oracle,
            config,
            tracker: Mutex::new(EffectivenessTracker::new()),
            validate_with_oracle: false,
        }
    }

    /// Enable the oracle validation pass on selected strategies
    pub fn with_oracle_validation(mut self) -> Self {
        self.validate_with_oracle = true;
        self
    }

    /// Record how a previously applied strategy worked out
    pub fn record_outcome(&self, kind: StrategyKind, success: bool) {
        self.tracker.lock().expect("tracker lock").record(kind, success);
    }

    /// Run one full replacement pass. Infallible: internal errors degrade to
    /// the conservative merge.
    pub async fn execute_adaptive_replacement(
        &self,
        existing: &[ProductionRule],
        new_rules: Vec<ProductionRule>,
        state: &WorkflowState,
        goal: &str,
    ) -> ReplacementOutcome {
        let score = assess_situation(existing, state, goal, self.config.limits.max_iterations);

        match self
            .try_replace(existing, &new_rules, state, goal, &score)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Replacement pipeline failed, conservative merge: {}", e);
                let merged = conservative_merge(existing, &new_rules);
                ReplacementOutcome {
                    rules: merged,
                    strategy: ReplacementStrategy::for_kind(StrategyKind::MinimalReplacement),
                    score,
                    degraded: true,
                }
            }
        }
    }

    async fn try_replace(
        &self,
        existing: &[ProductionRule],
        new_rules: &[ProductionRule],
        state: &WorkflowState,
        _goal: &str,
        score: &SituationScore,
    ) -> Result<ReplacementOutcome> {
        let tracker = self.tracker.lock().expect("tracker lock").clone();
        let mut strategy = select_strategy(
            score,
            existing.len(),
            state.iteration_count,
            Some(&tracker),
        );

        if self.validate_with_oracle {
            strategy = validate_strategy(self.oracle.as_ref(), strategy, score).await;
        }

        info!(
            "Replacement strategy {} (ratio {:.2}) over {} existing / {} new rules",
            strategy.kind,
            strategy.replacement_ratio,
            existing.len(),
            new_rules.len()
        );

        let rules = self
            .substitute(existing, new_rules, &strategy)
            .await;
        let rules = apply_quantity_constraints(rules, &strategy, self.config.limits.max_total_rules);

        Ok(ReplacementOutcome {
            rules,
            strategy,
            score: score.clone(),
            degraded: false,
        })
    }

    /// Score every (existing, new) pair and greedily replace the best matches
    /// up to `floor(existing * ratio)`, then append the unused new rules.
    async fn substitute(
        &self,
        existing: &[ProductionRule],
        new_rules: &[ProductionRule],
        strategy: &ReplacementStrategy,
    ) -> Vec<ProductionRule> {
        let weights = &self.config.replacement_weights;
        let budget = (existing.len() as f64 * strategy.replacement_ratio).floor() as usize;

        let mut pairs: Vec<(usize, usize, f64)> = Vec::new();
        for (ei, old) in existing.iter().enumerate() {
            for (ni, new) in new_rules.iter().enumerate() {
                let similarity = self.similarity(old, new).await;
                let score = pair_score(old, new, similarity, strategy, weights);
                pairs.push((ei, ni, score));
            }
        }
        pairs.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));

        let mut result: Vec<ProductionRule> = existing.to_vec();
        let mut replaced_existing: HashSet<usize> = HashSet::new();
        let mut consumed_new: HashSet<usize> = HashSet::new();

        for (ei, ni, score) in pairs {
            if replaced_existing.len() >= budget {
                break;
            }
            if replaced_existing.contains(&ei) || consumed_new.contains(&ni) {
                continue;
            }
            debug!(
                "Replacing {} with {} (score {:.2})",
                result[ei].id, new_rules[ni].id, score
            );
            result[ei] = new_rules[ni].clone();
            replaced_existing.insert(ei);
            consumed_new.insert(ni);
        }

        // Unused new rules join the set, dedup by id
        for (ni, new) in new_rules.iter().enumerate() {
            if !consumed_new.contains(&ni) && !result.iter().any(|r| r.id == new.id) {
                result.push(new.clone());
            }
        }

        result
    }

    /// Oracle semantic similarity with a word-overlap fallback averaging the
    /// condition and action texts
    async fn similarity(&self, a: &ProductionRule, b: &ProductionRule) -> f64 {
        let prompt = format!(
            "# RULE SIMILARITY\n\n\
             Rule A: condition \"{}\", action \"{}\"\n\
             Rule B: condition \"{}\", action \"{}\"\n\n\
             How semantically similar are these rules?\n\
             Respond with JSON only: {{\"similarity\": 0.0-1.0}}\n",
            a.condition, a.action, b.condition, b.action
        );

        match self.oracle.generate_text(&prompt).await {
            Ok(response) => parse_structured_response(&response)
                .and_then(|v| v.get("similarity").and_then(|s| s.as_f64()))
                .map(|s| s.clamp(0.0, 1.0))
                .unwrap_or_else(|| jaccard_similarity(a, b)),
            Err(e) => {
                debug!("Similarity oracle call failed, using word overlap: {}", e);
                jaccard_similarity(a, b)
            }
        }
    }
}

/// Replacement score for one (existing, new) pair. The similarity component
/// only counts once it clears the strategy's threshold.
fn pair_score(
    old: &ProductionRule,
    new: &ProductionRule,
    similarity: f64,
    strategy: &ReplacementStrategy,
    weights: &ReplacementWeights,
) -> f64 {
    let mut score = 0.0;
    if similarity >= strategy.similarity_threshold {
        score += weights.similarity * similarity;
    }
    if new.priority > old.priority {
        score += weights.priority;
    }
    if new.phase == old.phase {
        score += weights.phase;
    }
    if new.suggested_agent() == old.suggested_agent() {
        score += weights.agent;
    }
    score
}

/// Word-Jaccard fallback: average of condition overlap and action overlap
fn jaccard_similarity(a: &ProductionRule, b: &ProductionRule) -> f64 {
    (word_jaccard(&a.condition, &b.condition) + word_jaccard(&a.action, &b.action)) / 2.0
}

fn word_jaccard(a: &str, b: &str) -> f64 {
    let a_set: HashSet<String> = words(a);
    let b_set: HashSet<String> = words(b);
    if a_set.is_empty() || b_set.is_empty() {
        return 0.0;
    }
    let intersection = a_set.intersection(&b_set).count() as f64;
    let union = a_set.union(&b_set).count() as f64;
    intersection / union
}

fn words(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

/// Enforce the hard caps: absolute total first, then per phase, then per
/// agent. Within every group the top-priority rules survive; relative order
/// of survivors is preserved.
pub fn apply_quantity_constraints(
    rules: Vec<ProductionRule>,
    strategy: &ReplacementStrategy,
    max_total: usize,
) -> Vec<ProductionRule> {
    let rules = cap_group(rules, max_total, |_| ());
    let rules = cap_group(rules, strategy.max_rules_per_phase, |r| r.phase);
    cap_group(rules, strategy.max_rules_per_agent, |r| {
        r.suggested_agent().map(str::to_string)
    })
}

/// Keep at most `cap` rules per group key, preferring higher priority.
fn cap_group<K: std::hash::Hash + Eq>(
    rules: Vec<ProductionRule>,
    cap: usize,
    key: impl Fn(&ProductionRule) -> K,
) -> Vec<ProductionRule> {
    // Decide survivors per group by priority (descending)
    let mut by_group: HashMap<K, Vec<(usize, u32)>> = HashMap::new();
    for (idx, rule) in rules.iter().enumerate() {
        by_group.entry(key(rule)).or_default().push((idx, rule.priority));
    }

    let mut keep: HashSet<usize> = HashSet::new();
    for entries in by_group.values_mut() {
        entries.sort_by(|a, b| b.1.cmp(&a.1));
        for (idx, _) in entries.iter().take(cap) {
            keep.insert(*idx);
        }
    }

    let dropped = rules.len() - keep.len();
    if dropped > 0 {
        debug!("Quantity constraint dropped {} rule(s)", dropped);
    }

    rules
        .into_iter()
        .enumerate()
        .filter(|(idx, _)| keep.contains(idx))
        .map(|(_, rule)| rule)
        .collect()
}

/// Concatenate existing and new rules, dedup by id. The safety net: never
/// hands back an empty set when the inputs were non-empty.
pub fn conservative_merge(
    existing: &[ProductionRule],
    new_rules: &[ProductionRule],
) -> Vec<ProductionRule> {
    let mut merged: Vec<ProductionRule> = existing.to_vec();
    for rule in new_rules {
        if !merged.iter().any(|r| r.id == rule.id) {
            merged.push(rule.clone());
        }
    }
    merged
}
