//! Core type definitions for Ruleflow
//!
//! A rule is a natural-language condition→action pair. Rule sets pursue one
//! goal and are mutated only through versioned add/remove operations so every
//! change is attributable after the fact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Lower bound for rule priority
pub const MIN_PRIORITY: u32 = 1;
/// Upper bound for rule priority
pub const MAX_PRIORITY: u32 = 100;
/// Default rule priority (mid-range)
pub const DEFAULT_PRIORITY: u32 = 50;

/// Clamp a priority value into the configured bounds
pub fn clamp_priority(priority: u32) -> u32 {
    priority.clamp(MIN_PRIORITY, MAX_PRIORITY)
}

/// Coarse pipeline stage tag on rules
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RulePhase {
    InformationGathering,
    #[default]
    Execution,
    Verification,
}

impl RulePhase {
    /// All phases in pipeline order
    pub fn all() -> [RulePhase; 3] {
        [
            Self::InformationGathering,
            Self::Execution,
            Self::Verification,
        ]
    }
}

impl std::fmt::Display for RulePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InformationGathering => write!(f, "information_gathering"),
            Self::Execution => write!(f, "execution"),
            Self::Verification => write!(f, "verification"),
        }
    }
}

impl std::str::FromStr for RulePhase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "information_gathering" | "informationgathering" | "information-gathering" => {
                Ok(Self::InformationGathering)
            }
            "execution" => Ok(Self::Execution),
            "verification" => Ok(Self::Verification),
            _ => Err(format!("Invalid rule phase: {}", s)),
        }
    }
}

/// The four possible outcomes of a decision cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionType {
    /// Execute one existing rule from the rule set
    ExecuteSelectedRule,
    /// Synthesize new rules and merge them into the rule set
    AddRule,
    /// Goal reached - terminal
    GoalAchieved,
    /// Goal unreachable - terminal
    GoalFailed,
}

impl DecisionType {
    /// Parse a decision-type string from oracle output.
    ///
    /// Unknown or malformed strings map to `GoalFailed` - the oracle output is
    /// untrusted and must never produce a panic or an open-ended error path.
    pub fn parse_or_failed(s: &str) -> Self {
        s.parse().unwrap_or(Self::GoalFailed)
    }

    /// Whether this decision ends the workflow session
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::GoalAchieved | Self::GoalFailed)
    }
}

impl std::fmt::Display for DecisionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExecuteSelectedRule => write!(f, "EXECUTE_SELECTED_RULE"),
            Self::AddRule => write!(f, "ADD_RULE"),
            Self::GoalAchieved => write!(f, "GOAL_ACHIEVED"),
            Self::GoalFailed => write!(f, "GOAL_FAILED"),
        }
    }
}

impl std::str::FromStr for DecisionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "EXECUTE_SELECTED_RULE" => Ok(Self::ExecuteSelectedRule),
            "ADD_RULE" => Ok(Self::AddRule),
            "GOAL_ACHIEVED" => Ok(Self::GoalAchieved),
            "GOAL_FAILED" => Ok(Self::GoalFailed),
            _ => Err(format!("Invalid decision type: {}", s)),
        }
    }
}

/// Outcome of a single rule execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Success,
    Failure,
    Skipped,
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "ok"),
            Self::Failure => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// Rule set lifecycle status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleSetStatus {
    #[default]
    Draft,
    Active,
    Completed,
}

impl std::fmt::Display for RuleSetStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::Active => write!(f, "active"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

/// Metadata key carrying an executor hint on a rule
pub const SUGGESTED_AGENT_KEY: &str = "suggested_agent";

/// A natural-language condition→action pair, the unit of planning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionRule {
    /// Unique, stable identifier
    pub id: String,
    /// Human-readable rule name
    pub name: String,
    /// Natural-language trigger text
    pub condition: String,
    /// Natural-language instruction text
    pub action: String,
    /// Priority within [MIN_PRIORITY, MAX_PRIORITY]
    pub priority: u32,
    /// Pipeline stage this rule belongs to
    pub phase: RulePhase,
    /// What the rule is expected to produce
    pub expected_outcome: String,
    /// Auxiliary key-value data (may carry a suggested agent)
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl ProductionRule {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        condition: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            condition: condition.into(),
            action: action.into(),
            priority: DEFAULT_PRIORITY,
            phase: RulePhase::default(),
            expected_outcome: String::new(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = clamp_priority(priority);
        self
    }

    pub fn with_phase(mut self, phase: RulePhase) -> Self {
        self.phase = phase;
        self
    }

    pub fn with_expected_outcome(mut self, outcome: impl Into<String>) -> Self {
        self.expected_outcome = outcome.into();
        self
    }

    pub fn with_metadata_entry(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Reassign priority, keeping it within bounds
    pub fn set_priority(&mut self, priority: u32) {
        self.priority = clamp_priority(priority);
    }

    /// Executor hint, if the rule carries one
    pub fn suggested_agent(&self) -> Option<&str> {
        self.metadata.get(SUGGESTED_AGENT_KEY).map(String::as_str)
    }

    /// Advisory validation: a usable rule has non-empty trigger and action
    pub fn is_valid(&self) -> bool {
        !self.condition.trim().is_empty() && !self.action.trim().is_empty()
    }
}

/// Kind of rule set modification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleChangeKind {
    Added,
    Removed,
}

/// One entry in a rule set's append-only modification log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSetChange {
    pub kind: RuleChangeKind,
    pub rule_id: String,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
}

/// The versioned collection of rules pursuing one goal
///
/// Exclusively owned by the workflow session that created it. Every add or
/// remove bumps `version` and appends to `modification_history`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSet {
    rules: Vec<ProductionRule>,
    pub goal: String,
    pub version: u64,
    pub status: RuleSetStatus,
    modification_history: Vec<RuleSetChange>,
}

impl RuleSet {
    pub fn new(goal: impl Into<String>) -> Self {
        Self {
            rules: Vec::new(),
            goal: goal.into(),
            version: 0,
            status: RuleSetStatus::Draft,
            modification_history: Vec::new(),
        }
    }

    /// Rules in insertion order
    pub fn rules(&self) -> &[ProductionRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn get_rule(&self, id: &str) -> Option<&ProductionRule> {
        self.rules.iter().find(|r| r.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get_rule(id).is_some()
    }

    /// Add a rule. Returns false (and changes nothing) if the id is taken.
    pub fn add_rule(&mut self, rule: ProductionRule, reason: impl Into<String>) -> bool {
        if self.contains(&rule.id) {
            return false;
        }
        self.modification_history.push(RuleSetChange {
            kind: RuleChangeKind::Added,
            rule_id: rule.id.clone(),
            timestamp: Utc::now(),
            reason: reason.into(),
        });
        self.rules.push(rule);
        self.version += 1;
        true
    }

    /// Remove a rule by id, if present
    pub fn remove_rule(&mut self, id: &str, reason: impl Into<String>) -> Option<ProductionRule> {
        let pos = self.rules.iter().position(|r| r.id == id)?;
        let removed = self.rules.remove(pos);
        self.modification_history.push(RuleSetChange {
            kind: RuleChangeKind::Removed,
            rule_id: removed.id.clone(),
            timestamp: Utc::now(),
            reason: reason.into(),
        });
        self.version += 1;
        Some(removed)
    }

    /// Replace the entire collection with `new_rules`, logging the diff.
    ///
    /// Used by adaptive replacement, which computes a full successor set.
    /// Rules present in both collections are kept without a log entry.
    pub fn replace_rules(&mut self, new_rules: Vec<ProductionRule>, reason: &str) {
        let removed: Vec<String> = self
            .rules
            .iter()
            .filter(|r| !new_rules.iter().any(|n| n.id == r.id))
            .map(|r| r.id.clone())
            .collect();
        for id in removed {
            self.remove_rule(&id, reason);
        }
        let to_add: Vec<ProductionRule> = new_rules
            .into_iter()
            .filter(|n| !self.contains(&n.id))
            .collect();
        for rule in to_add {
            self.add_rule(rule, reason);
        }
    }

    /// Append-only modification log
    pub fn modification_history(&self) -> &[RuleSetChange] {
        &self.modification_history
    }

    pub fn activate(&mut self) {
        self.status = RuleSetStatus::Active;
    }

    pub fn complete(&mut self) {
        self.status = RuleSetStatus::Completed;
    }
}

/// Normalized result produced at the executor boundary
///
/// Adapters around concrete executors must produce this shape; the core never
/// probes unknown result objects. A `state` metadata entry carries a
/// replacement state description for the next snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub success: bool,
    pub message: String,
    pub data: Option<serde_json::Value>,
    pub error_details: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl WorkflowResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn failed(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            error_details: Some(details.into()),
            ..Default::default()
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_metadata_entry(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn status(&self) -> ExecutionStatus {
        if self.success {
            ExecutionStatus::Success
        } else {
            ExecutionStatus::Failure
        }
    }
}

/// Output of one decision cycle. Immutable once constructed.
///
/// `selected_rule` is populated iff the decision is `ExecuteSelectedRule`;
/// `new_rules` is non-empty only for `AddRule`. The constructors are the only
/// way to build one, so the exclusivity holds everywhere downstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionResult {
    decision_type: DecisionType,
    selected_rule: Option<ProductionRule>,
    new_rules: Vec<ProductionRule>,
    confidence: f64,
    reasoning: String,
    #[serde(default)]
    context: HashMap<String, serde_json::Value>,
}

impl DecisionResult {
    pub fn execute(rule: ProductionRule, confidence: f64, reasoning: impl Into<String>) -> Self {
        Self {
            decision_type: DecisionType::ExecuteSelectedRule,
            selected_rule: Some(rule),
            new_rules: Vec::new(),
            confidence: confidence.clamp(0.0, 1.0),
            reasoning: reasoning.into(),
            context: HashMap::new(),
        }
    }

    pub fn add_rules(
        rules: Vec<ProductionRule>,
        confidence: f64,
        reasoning: impl Into<String>,
    ) -> Self {
        Self {
            decision_type: DecisionType::AddRule,
            selected_rule: None,
            new_rules: rules,
            confidence: confidence.clamp(0.0, 1.0),
            reasoning: reasoning.into(),
            context: HashMap::new(),
        }
    }

    pub fn goal_achieved(confidence: f64, reasoning: impl Into<String>) -> Self {
        Self {
            decision_type: DecisionType::GoalAchieved,
            selected_rule: None,
            new_rules: Vec::new(),
            confidence: confidence.clamp(0.0, 1.0),
            reasoning: reasoning.into(),
            context: HashMap::new(),
        }
    }

    pub fn goal_failed(confidence: f64, reasoning: impl Into<String>) -> Self {
        Self {
            decision_type: DecisionType::GoalFailed,
            selected_rule: None,
            new_rules: Vec::new(),
            confidence: confidence.clamp(0.0, 1.0),
            reasoning: reasoning.into(),
            context: HashMap::new(),
        }
    }

    pub fn with_context(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    pub fn decision_type(&self) -> DecisionType {
        self.decision_type
    }

    pub fn selected_rule(&self) -> Option<&ProductionRule> {
        self.selected_rule.as_ref()
    }

    pub fn new_rules(&self) -> &[ProductionRule] {
        &self.new_rules
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn reasoning(&self) -> &str {
        &self.reasoning
    }

    pub fn context(&self) -> &HashMap<String, serde_json::Value> {
        &self.context
    }

    pub fn is_terminal(&self) -> bool {
        self.decision_type.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_clamping() {
        let rule = ProductionRule::new("r1", "test", "when x", "do y").with_priority(500);
        assert_eq!(rule.priority, MAX_PRIORITY);

        let rule = ProductionRule::new("r1", "test", "when x", "do y").with_priority(0);
        assert_eq!(rule.priority, MIN_PRIORITY);

        let mut rule = ProductionRule::new("r1", "test", "when x", "do y");
        assert_eq!(rule.priority, DEFAULT_PRIORITY);
        rule.set_priority(999);
        assert_eq!(rule.priority, MAX_PRIORITY);
    }

    #[test]
    fn test_rule_validation_advisory() {
        let rule = ProductionRule::new("r1", "named", "", "do y");
        assert!(!rule.is_valid());
        let rule = ProductionRule::new("r1", "named", "when x", "do y");
        assert!(rule.is_valid());
    }

    #[test]
    fn test_phase_parsing() {
        assert_eq!(
            "information_gathering".parse::<RulePhase>().unwrap(),
            RulePhase::InformationGathering
        );
        assert_eq!("EXECUTION".parse::<RulePhase>().unwrap(), RulePhase::Execution);
        assert!("testing".parse::<RulePhase>().is_err());
    }

    #[test]
    fn test_decision_type_fallback() {
        assert_eq!(
            DecisionType::parse_or_failed("EXECUTE_SELECTED_RULE"),
            DecisionType::ExecuteSelectedRule
        );
        assert_eq!(
            DecisionType::parse_or_failed("add_rule"),
            DecisionType::AddRule
        );
        assert_eq!(
            DecisionType::parse_or_failed("DO_SOMETHING_ELSE"),
            DecisionType::GoalFailed
        );
        assert_eq!(DecisionType::parse_or_failed(""), DecisionType::GoalFailed);
    }

    #[test]
    fn test_ruleset_versioning() {
        let mut set = RuleSet::new("test goal");
        assert_eq!(set.version, 0);

        let added = set.add_rule(ProductionRule::new("r1", "a", "c", "x"), "initial");
        assert!(added);
        assert_eq!(set.version, 1);

        // Duplicate id is rejected without a version bump
        let added = set.add_rule(ProductionRule::new("r1", "b", "c", "x"), "dup");
        assert!(!added);
        assert_eq!(set.version, 1);

        set.remove_rule("r1", "cleanup");
        assert_eq!(set.version, 2);
        assert!(set.is_empty());
        assert_eq!(set.modification_history().len(), 2);
    }

    #[test]
    fn test_ruleset_replace_logs_diff() {
        let mut set = RuleSet::new("goal");
        set.add_rule(ProductionRule::new("r1", "a", "c", "x"), "init");
        set.add_rule(ProductionRule::new("r2", "b", "c", "x"), "init");

        set.replace_rules(
            vec![
                ProductionRule::new("r2", "b", "c", "x"),
                ProductionRule::new("r3", "c", "c", "x"),
            ],
            "adaptive replacement",
        );

        assert!(!set.contains("r1"));
        assert!(set.contains("r2"));
        assert!(set.contains("r3"));
        // 2 adds + 1 remove + 1 add
        assert_eq!(set.modification_history().len(), 4);
        assert_eq!(set.version, 4);
    }

    #[test]
    fn test_decision_result_mutual_exclusivity() {
        let rule = ProductionRule::new("r1", "a", "c", "x");
        let exec = DecisionResult::execute(rule.clone(), 0.9, "run it");
        assert_eq!(exec.decision_type(), DecisionType::ExecuteSelectedRule);
        assert!(exec.selected_rule().is_some());
        assert!(exec.new_rules().is_empty());

        let add = DecisionResult::add_rules(vec![rule], 0.7, "need more rules");
        assert_eq!(add.decision_type(), DecisionType::AddRule);
        assert!(add.selected_rule().is_none());
        assert_eq!(add.new_rules().len(), 1);

        let done = DecisionResult::goal_achieved(1.0, "done");
        assert!(done.selected_rule().is_none());
        assert!(done.new_rules().is_empty());
        assert!(done.is_terminal());
    }

    #[test]
    fn test_confidence_clamped() {
        let d = DecisionResult::goal_achieved(1.7, "overconfident");
        assert_eq!(d.confidence(), 1.0);
        let d = DecisionResult::goal_failed(-0.3, "underconfident");
        assert_eq!(d.confidence(), 0.0);
    }

    #[test]
    fn test_workflow_result_status() {
        assert_eq!(WorkflowResult::ok("fine").status(), ExecutionStatus::Success);
        assert_eq!(
            WorkflowResult::failed("broke", "stack trace").status(),
            ExecutionStatus::Failure
        );
    }

    #[test]
    fn test_suggested_agent() {
        let rule = ProductionRule::new("r1", "a", "c", "x")
            .with_metadata_entry(SUGGESTED_AGENT_KEY, "researcher");
        assert_eq!(rule.suggested_agent(), Some("researcher"));
    }
}
