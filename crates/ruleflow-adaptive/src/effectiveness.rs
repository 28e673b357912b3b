//! Strategy effectiveness tracking
//!
//! Exponential-moving-average success rate per strategy kind. A strategy is
//! only recommended once it has enough usage history and its rate clears the
//! caller's confidence gate.

use crate::strategy::StrategyKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Usage count below which a strategy is never recommended
const MIN_USAGE_FOR_RECOMMENDATION: u32 = 3;
/// EMA smoothing factor
const ALPHA: f64 = 0.1;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StrategyRecord {
    success_rate: f64,
    usage_count: u32,
}

/// Tracks how well each strategy kind has worked historically
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EffectivenessTracker {
    records: HashMap<StrategyKind, StrategyRecord>,
}

impl EffectivenessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one outcome for a strategy
    pub fn record(&mut self, kind: StrategyKind, success: bool) {
        let record = self.records.entry(kind).or_default();
        record.usage_count += 1;
        let result = if success { 1.0 } else { 0.0 };
        record.success_rate = ALPHA * result + (1.0 - ALPHA) * record.success_rate;
    }

    /// Current success rate for a strategy, 0.0 if never used
    pub fn success_rate(&self, kind: StrategyKind) -> f64 {
        self.records.get(&kind).map(|r| r.success_rate).unwrap_or(0.0)
    }

    pub fn usage_count(&self, kind: StrategyKind) -> u32 {
        self.records.get(&kind).map(|r| r.usage_count).unwrap_or(0)
    }

    /// Best-performing strategy whose rate clears `min_confidence` and whose
    /// usage history is deep enough to trust. Ties resolve to the higher rate;
    /// `None` when no strategy qualifies.
    pub fn recommend(&self, min_confidence: f64) -> Option<StrategyKind> {
        self.records
            .iter()
            .filter(|(_, r)| r.usage_count >= MIN_USAGE_FOR_RECOMMENDATION)
            .filter(|(_, r)| r.success_rate >= min_confidence)
            .max_by(|(_, a), (_, b)| {
                a.success_rate
                    .partial_cmp(&b.success_rate)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(kind, _)| *kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ema_converges_upward() {
        let mut tracker = EffectivenessTracker::new();
        for _ in 0..50 {
            tracker.record(StrategyKind::IncrementalImprovement, true);
        }
        assert!(tracker.success_rate(StrategyKind::IncrementalImprovement) > 0.9);
    }

    #[test]
    fn test_failures_drag_rate_down() {
        let mut tracker = EffectivenessTracker::new();
        for _ in 0..50 {
            tracker.record(StrategyKind::EmergencyReplacement, true);
        }
        let high = tracker.success_rate(StrategyKind::EmergencyReplacement);
        for _ in 0..10 {
            tracker.record(StrategyKind::EmergencyReplacement, false);
        }
        assert!(tracker.success_rate(StrategyKind::EmergencyReplacement) < high);
    }

    #[test]
    fn test_recommendation_needs_usage_depth() {
        let mut tracker = EffectivenessTracker::new();
        tracker.record(StrategyKind::StrategicPivot, true);
        tracker.record(StrategyKind::StrategicPivot, true);
        // Only 2 uses - not enough history regardless of rate
        assert!(tracker.recommend(0.1).is_none());
    }

    #[test]
    fn test_recommendation_needs_confidence() {
        let mut tracker = EffectivenessTracker::new();
        for success in [true, false, false, false, false] {
            tracker.record(StrategyKind::AggressiveCleanup, success);
        }
        assert!(tracker.recommend(0.7).is_none());
    }

    #[test]
    fn test_recommendation_picks_best() {
        let mut tracker = EffectivenessTracker::new();
        for _ in 0..50 {
            tracker.record(StrategyKind::PhaseOptimization, true);
        }
        for i in 0..50 {
            tracker.record(StrategyKind::MinimalReplacement, i % 2 == 0);
        }
        assert_eq!(
            tracker.recommend(0.7),
            Some(StrategyKind::PhaseOptimization)
        );
    }

    #[test]
    fn test_empty_tracker_recommends_nothing() {
        let tracker = EffectivenessTracker::new();
        assert!(tracker.recommend(0.0).is_none());
        assert_eq!(tracker.success_rate(StrategyKind::StrategicPivot), 0.0);
        assert_eq!(tracker.usage_count(StrategyKind::StrategicPivot), 0);
    }
}
