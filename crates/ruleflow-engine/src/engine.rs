//! Workflow session engine
//!
//! Drives the full loop: decide → dispatch (execute a rule / synthesize and
//! merge rules / terminate) → apply the result to state → persist → repeat.
//! Control flow goes through the pure session state machine; this module owns
//! all the I/O around it.
//!
//! Persistence is fail-open infrastructure: a failed save logs a warning and
//! the session continues. Everything on the decision path degrades through
//! `DecisionResult`s instead of raising.

use crate::state_machine::{transition, SessionAction, SessionEvent, SessionState};
use ruleflow_adaptive::{AdaptiveReplacementService, StrategyKind};
use ruleflow_core::{
    DecisionResult, DecisionType, ProductionRule, RuleSet, RuleflowConfig, WorkflowResult,
};
use ruleflow_decision::DecisionCore;
use ruleflow_generation::RuleGenerationService;
use ruleflow_oracle::{AgentRegistry, Oracle};
use ruleflow_state::{StateRepository, StateService, WorkflowState};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// How many rules to request when synthesizing
const INITIAL_RULE_BATCH: usize = 6;
const ADJUSTMENT_RULE_BATCH: usize = 4;

/// Why a session stopped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    GoalAchieved,
    GoalFailed,
    MaxIterations,
}

/// Counters accumulated over one session
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionTelemetry {
    pub decisions: u32,
    pub rules_executed: u32,
    pub executions_failed: u32,
    pub rules_generated: u32,
    pub replacements: u32,
}

/// Result of one complete workflow session
#[derive(Debug, Clone)]
pub struct SessionResult {
    pub session_id: String,
    pub iterations: u32,
    pub success: bool,
    pub stop_reason: StopReason,
    pub reasoning: String,
    pub confidence: f64,
    pub final_state: WorkflowState,
    pub rule_set: RuleSet,
    pub telemetry: SessionTelemetry,
}

/// Runs workflow sessions end to end
pub struct WorkflowEngine {
    decision_core: DecisionCore,
    generation: RuleGenerationService,
    replacement: AdaptiveReplacementService,
    state_service: StateService,
    registry: AgentRegistry,
    repository: Option<Arc<dyn StateRepository>>,
    config: RuleflowConfig,
}

impl WorkflowEngine {
    pub fn new(oracle: Arc<dyn Oracle>, registry: AgentRegistry, config: RuleflowConfig) -> Self {
        Self {
            decision_core: DecisionCore::new(oracle.clone(), registry.clone(), config.clone()),
            generation: RuleGenerationService::new(oracle.clone()),
            replacement: AdaptiveReplacementService::new(oracle.clone(), config.clone()),
            state_service: StateService::new(oracle, config.limits.clone()),
            registry,
            repository: None,
            config,
        }
    }

    /// Persist every state snapshot to `repository`
    pub fn with_repository(mut self, repository: Arc<dyn StateRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    /// Run a session from a bare goal: synthesize an initial rule set, then
    /// drive the loop.
    pub async fn run(&self, goal: &str) -> SessionResult {
        let mut rule_set = RuleSet::new(goal);
        let initial = self
            .generation
            .generate_initial_rules(goal, INITIAL_RULE_BATCH)
            .await;
        for rule in initial {
            rule_set.add_rule(rule, "initial synthesis");
        }
        self.run_with_rule_set(rule_set).await
    }

    /// Run a session over an existing rule set (its `goal` drives the loop)
    pub async fn run_with_rule_set(&self, mut rule_set: RuleSet) -> SessionResult {
        let session_id = format!("wf-{}", &Uuid::new_v4().to_string()[..8]);
        let goal = rule_set.goal.clone();
        rule_set.activate();

        info!(
            "Session {} started: \"{}\" ({} initial rules)",
            session_id,
            goal,
            rule_set.len()
        );

        let mut state = WorkflowState::new(&session_id, format!("Session started: {}", goal));
        let mut telemetry = SessionTelemetry::default();
        let mut pending: Option<DecisionResult> = None;
        let mut last_strategy: Option<StrategyKind> = None;

        let (mut machine, actions) = transition(SessionState::Idle, SessionEvent::Start);
        self.run_actions(&actions, &state);
        self.persist(&state);

        let (stop_reason, reasoning, confidence, success) = loop {
            machine = match machine {
                SessionState::AwaitingDecision { iteration } => {
                    if iteration >= self.config.limits.max_iterations {
                        break (
                            StopReason::MaxIterations,
                            format!("Iteration cap {} reached", self.config.limits.max_iterations),
                            0.5,
                            false,
                        );
                    }

                    let decision = self.decision_core.make_decision(&state, &rule_set).await;
                    telemetry.decisions += 1;

                    let detail = match decision.decision_type() {
                        DecisionType::ExecuteSelectedRule => decision
                            .selected_rule()
                            .map(|r| r.id.clone())
                            .unwrap_or_default(),
                        _ => decision.reasoning().to_string(),
                    };
                    let (next, actions) = transition(
                        SessionState::AwaitingDecision { iteration },
                        SessionEvent::Decided {
                            decision: decision.decision_type(),
                            detail,
                        },
                    );
                    self.run_actions(&actions, &state);
                    pending = Some(decision);
                    next
                }

                SessionState::ExecutingRule { rule_id, iteration } => {
                    let rule = pending
                        .take()
                        .and_then(|d| d.selected_rule().cloned());
                    let result = match rule {
                        Some(rule) => self.execute_rule(&rule).await,
                        None => WorkflowResult::failed(
                            "No rule available for execution",
                            "engine state desync",
                        ),
                    };

                    let succeeded = result.success;
                    telemetry.rules_executed += 1;
                    if !succeeded {
                        telemetry.executions_failed += 1;
                    }
                    // Feed the effectiveness tracker: the previous replacement
                    // strategy is judged by how the next execution went
                    if let Some(kind) = last_strategy.take() {
                        self.replacement.record_outcome(kind, succeeded);
                    }

                    state = self.state_service.apply_result(&state, &result, Some(&rule_id));

                    if succeeded && !state.goal_achieved {
                        let assessment = self.state_service.evaluate_goal(&state, &goal).await;
                        if assessment.achieved {
                            info!(
                                "Goal assessed achieved (confidence {:.2}): {}",
                                assessment.confidence, assessment.reasoning
                            );
                            state.mark_goal_achieved();
                        }
                    }

                    let (next, actions) = transition(
                        SessionState::ExecutingRule {
                            rule_id: rule_id.clone(),
                            iteration,
                        },
                        SessionEvent::ExecutionFinished {
                            rule_id,
                            success: succeeded,
                        },
                    );
                    self.run_actions(&actions, &state);
                    next
                }

                SessionState::GeneratingRules { reason, iteration } => {
                    let mut new_rules: Vec<ProductionRule> = pending
                        .take()
                        .map(|d| d.new_rules().to_vec())
                        .unwrap_or_default();

                    if new_rules.is_empty() {
                        new_rules = if rule_set.is_empty() {
                            self.generation
                                .generate_initial_rules(&goal, INITIAL_RULE_BATCH)
                                .await
                        } else {
                            self.generation
                                .generate_adjustment_rules(&goal, &reason, ADJUSTMENT_RULE_BATCH)
                                .await
                        };
                    }
                    telemetry.rules_generated += new_rules.len() as u32;

                    let outcome = self
                        .replacement
                        .execute_adaptive_replacement(rule_set.rules(), new_rules, &state, &goal)
                        .await;
                    telemetry.replacements += 1;
                    last_strategy = Some(outcome.strategy.kind);

                    let count = outcome.rules.len();
                    rule_set.replace_rules(outcome.rules, "adaptive replacement");

                    let result = WorkflowResult::ok(format!(
                        "rule set now {} rule(s) at version {} via {}",
                        rule_set.len(),
                        rule_set.version,
                        outcome.strategy.kind
                    ));
                    state = self.state_service.apply_result(&state, &result, None);

                    let (next, actions) = transition(
                        SessionState::GeneratingRules { reason, iteration },
                        SessionEvent::RulesIntegrated { count },
                    );
                    self.run_actions(&actions, &state);
                    next
                }

                SessionState::GoalAchieved { reasoning } => {
                    let confidence = pending.take().map(|d| d.confidence()).unwrap_or(1.0);
                    state.mark_goal_achieved();
                    rule_set.complete();
                    break (StopReason::GoalAchieved, reasoning, confidence, true);
                }

                SessionState::GoalFailed { reasoning } => {
                    let confidence = pending.take().map(|d| d.confidence()).unwrap_or(0.0);
                    break (StopReason::GoalFailed, reasoning, confidence, false);
                }

                SessionState::Idle => {
                    break (
                        StopReason::GoalFailed,
                        "Session never started".to_string(),
                        0.0,
                        false,
                    );
                }
            };
        };

        self.persist(&state);

        info!(
            "Session {} stopped after {} iteration(s): {:?}",
            session_id, state.iteration_count, stop_reason
        );

        SessionResult {
            session_id,
            iterations: state.iteration_count,
            success,
            stop_reason,
            reasoning,
            confidence,
            final_state: state,
            rule_set,
            telemetry,
        }
    }

    /// Pick an executor and run the rule's action. Never raises: a missing
    /// executor or an executor error becomes a failed `WorkflowResult`.
    async fn execute_rule(&self, rule: &ProductionRule) -> WorkflowResult {
        let executor = rule
            .suggested_agent()
            .and_then(|name| self.registry.get(name))
            .or_else(|| self.registry.first());

        match executor {
            Some(agent) => {
                debug!("Dispatching rule {} to agent {}", rule.id, agent.name());
                match agent.execute(&rule.action).await {
                    Ok(result) => result,
                    Err(e) => WorkflowResult::failed(
                        format!("Executor {} failed", agent.name()),
                        e.to_string(),
                    ),
                }
            }
            None => WorkflowResult::failed(
                "No executor registered",
                format!("rule {} has no executor to run on", rule.id),
            ),
        }
    }

    /// Execute the log/persist actions of a transition. Dispatch actions
    /// (ExecuteRule, SynthesizeRules) are fulfilled by the loop branches
    /// themselves.
    fn run_actions(&self, actions: &[SessionAction], state: &WorkflowState) {
        for action in actions {
            match action {
                SessionAction::LogActivity { message } => info!("{}", message),
                SessionAction::PersistState => self.persist(state),
                SessionAction::ExecuteRule { .. } | SessionAction::SynthesizeRules { .. } => {}
            }
        }
    }

    fn persist(&self, state: &WorkflowState) {
        if let Some(repository) = &self.repository {
            if let Err(e) = repository.save(state) {
                warn!("State persistence failed (fail-open): {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ruleflow_oracle::{ScriptedExecutor, ScriptedOracle};
    use ruleflow_state::JsonFileRepository;

    fn registry_with_worker() -> AgentRegistry {
        let mut registry = AgentRegistry::new();
        registry.register(Arc::new(ScriptedExecutor::new("worker")));
        registry
    }

    fn seeded_rule_set() -> RuleSet {
        let mut set = RuleSet::new("produce the report");
        set.add_rule(
            ProductionRule::new("r1", "draft report", "no report exists", "write the report"),
            "init",
        );
        set
    }

    #[tokio::test]
    async fn test_execute_then_goal_achieved() {
        let oracle = ScriptedOracle::always("{}");
        // 1: decision, 2: goal evaluation
        oracle.push_text(
            r#"{"decision_type": "EXECUTE_SELECTED_RULE", "selected_rule_id": "r1", "confidence": 0.9, "reasoning": "obvious next step"}"#,
        );
        oracle.push_text(r#"{"achieved": true, "confidence": 0.9, "reasoning": "report exists"}"#);

        let engine = WorkflowEngine::new(
            Arc::new(oracle),
            registry_with_worker(),
            RuleflowConfig::default(),
        );
        let result = engine.run_with_rule_set(seeded_rule_set()).await;

        assert!(result.success);
        assert_eq!(result.stop_reason, StopReason::GoalAchieved);
        assert_eq!(result.iterations, 1);
        assert_eq!(result.telemetry.rules_executed, 1);
        assert_eq!(result.telemetry.executions_failed, 0);
        assert!(result.final_state.goal_achieved);
        assert!(result.final_state.is_rule_executed("r1"));
        // The post-achievement decision is the idempotent short-circuit
        assert_eq!(result.confidence, 1.0);
    }

    #[tokio::test]
    async fn test_unparseable_decision_fails_session() {
        let oracle = ScriptedOracle::always("I would rather write prose than JSON.");
        let engine = WorkflowEngine::new(
            Arc::new(oracle),
            registry_with_worker(),
            RuleflowConfig::default(),
        );
        let result = engine.run_with_rule_set(seeded_rule_set()).await;

        assert!(!result.success);
        assert_eq!(result.stop_reason, StopReason::GoalFailed);
        assert_eq!(result.confidence, 0.0);
        assert!(result.reasoning.contains("Unparseable"));
    }

    #[tokio::test]
    async fn test_empty_rule_set_synthesizes_then_finishes() {
        let oracle = ScriptedOracle::always("{}");
        // The empty-set decision is local (AddRule); first oracle call is the
        // initial synthesis, second is the next decision cycle.
        oracle.push_text(
            r#"[{"rule_name": "probe", "trigger_condition": "nothing known", "action": "survey the task", "execution_phase": "planning"}]"#,
        );
        oracle.push_text(
            r#"{"decision_type": "GOAL_ACHIEVED", "confidence": 0.95, "reasoning": "nothing left to do"}"#,
        );

        let engine = WorkflowEngine::new(
            Arc::new(oracle),
            registry_with_worker(),
            RuleflowConfig::default(),
        );
        let result = engine.run_with_rule_set(RuleSet::new("tiny goal")).await;

        assert!(result.success);
        assert_eq!(result.telemetry.replacements, 1);
        assert_eq!(result.telemetry.rules_generated, 1);
        assert_eq!(result.rule_set.len(), 1);
        assert!(result.rule_set.version >= 1);
        assert!((result.confidence - 0.95).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_max_iterations_cap() {
        // Every decision asks for rules, generation yields nothing usable, so
        // the session spins until the cap
        let oracle = ScriptedOracle::always(
            r#"{"decision_type": "ADD_RULE", "confidence": 0.7, "reasoning": "need more rules"}"#,
        );
        let mut config = RuleflowConfig::default();
        config.limits.max_iterations = 2;

        let engine = WorkflowEngine::new(Arc::new(oracle), registry_with_worker(), config);
        let result = engine.run_with_rule_set(seeded_rule_set()).await;

        assert!(!result.success);
        assert_eq!(result.stop_reason, StopReason::MaxIterations);
        assert_eq!(result.telemetry.decisions, 2);
        assert!(result.reasoning.contains("cap"));
    }

    #[tokio::test]
    async fn test_missing_executor_degrades_to_failed_result() {
        let oracle = ScriptedOracle::always("{}");
        oracle.push_text(
            r#"{"decision_type": "EXECUTE_SELECTED_RULE", "selected_rule_id": "r1", "confidence": 0.9, "reasoning": "run it"}"#,
        );

        let engine = WorkflowEngine::new(
            Arc::new(oracle),
            AgentRegistry::new(),
            RuleflowConfig::default(),
        );
        let result = engine.run_with_rule_set(seeded_rule_set()).await;

        assert_eq!(result.telemetry.executions_failed, 1);
        assert!(result
            .final_state
            .execution_history
            .iter()
            .any(|e| e.contains("No executor registered")));
        // r1 exhausted afterwards: the session still ends gracefully
        assert_eq!(result.stop_reason, StopReason::GoalAchieved);
    }

    #[tokio::test]
    async fn test_suggested_agent_routing() {
        let mut registry = AgentRegistry::new();
        registry.register(Arc::new(ScriptedExecutor::new("generalist")));
        let specialist = Arc::new(ScriptedExecutor::new("specialist"));
        specialist.push_response(WorkflowResult::ok("specialist handled it"));
        registry.register(specialist);

        let mut set = RuleSet::new("specialized goal");
        set.add_rule(
            ProductionRule::new("r1", "special", "cond", "act")
                .with_metadata_entry(ruleflow_core::SUGGESTED_AGENT_KEY, "specialist"),
            "init",
        );

        let oracle = ScriptedOracle::always("{}");
        oracle.push_text(
            r#"{"decision_type": "EXECUTE_SELECTED_RULE", "selected_rule_id": "r1", "confidence": 0.9, "reasoning": "route"}"#,
        );

        let engine =
            WorkflowEngine::new(Arc::new(oracle), registry, RuleflowConfig::default());
        let result = engine.run_with_rule_set(set).await;

        assert!(result
            .final_state
            .execution_history
            .iter()
            .any(|e| e.contains("specialist handled it")));
    }

    #[tokio::test]
    async fn test_snapshots_persisted_per_iteration() {
        let dir = tempfile::tempdir().unwrap();
        let repository = Arc::new(JsonFileRepository::new(dir.path()));

        let oracle = ScriptedOracle::always("{}");
        oracle.push_text(
            r#"{"decision_type": "EXECUTE_SELECTED_RULE", "selected_rule_id": "r1", "confidence": 0.9, "reasoning": "go"}"#,
        );
        oracle.push_text(r#"{"achieved": true, "confidence": 0.9, "reasoning": "done"}"#);

        let engine = WorkflowEngine::new(
            Arc::new(oracle),
            registry_with_worker(),
            RuleflowConfig::default(),
        )
        .with_repository(repository.clone());

        let result = engine.run_with_rule_set(seeded_rule_set()).await;
        assert!(result.success);

        let history = repository.history(&result.session_id).unwrap();
        assert!(history.len() >= 2);
        assert_eq!(history[0].iteration_count, 0);
        assert!(history.last().unwrap().goal_achieved);
    }
}
