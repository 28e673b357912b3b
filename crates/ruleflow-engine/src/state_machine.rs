//! Pure state machine for workflow session control flow
//!
//! This module implements a pure functional state machine with NO I/O.
//! All transitions are deterministic and testable.
//!
//! Key design principles:
//! - Pure function: transition(state, event) -> (state, actions)
//! - No async, no I/O, no dependencies on the engine loop
//! - Invalid transitions go to GoalFailed (never panic)
//! - Rule execution and rule synthesis happen outside; their effects come
//!   back in as events

use ruleflow_core::DecisionType;

/// Session state across decision cycles
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// No session in progress
    Idle,
    /// Ready to run the next decision cycle
    AwaitingDecision { iteration: u32 },
    /// A rule was selected and is being executed externally
    ExecutingRule { rule_id: String, iteration: u32 },
    /// New rules are being synthesized and merged externally
    GeneratingRules { reason: String, iteration: u32 },
    /// Terminal: goal reached
    GoalAchieved { reasoning: String },
    /// Terminal: goal abandoned
    GoalFailed { reasoning: String },
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::GoalAchieved { .. } | Self::GoalFailed { .. })
    }
}

/// Events that trigger session transitions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Start a new session
    Start,
    /// The decision core produced a decision; `detail` is the selected rule id
    /// for ExecuteSelectedRule, the reasoning otherwise
    Decided {
        decision: DecisionType,
        detail: String,
    },
    /// External rule execution finished
    ExecutionFinished { rule_id: String, success: bool },
    /// New rules were merged into the rule set
    RulesIntegrated { count: usize },
    /// Unrecoverable engine fault
    Fault { message: String },
}

/// Side effects the engine executes after a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// Dispatch the selected rule to an executor
    ExecuteRule { rule_id: String },
    /// Synthesize new rules and run adaptive replacement
    SynthesizeRules { reason: String },
    /// Persist the current state snapshot
    PersistState,
    /// Log activity
    LogActivity { message: String },
}

/// Pure session transition function.
///
/// Takes current state and event, returns new state and actions to execute.
/// Completely deterministic, no side effects, never panics: any invalid
/// transition lands in `GoalFailed` with a descriptive reason.
pub fn transition(state: SessionState, event: SessionEvent) -> (SessionState, Vec<SessionAction>) {
    match (state, event) {
        (SessionState::Idle, SessionEvent::Start) => (
            SessionState::AwaitingDecision { iteration: 0 },
            vec![SessionAction::LogActivity {
                message: "Session started".to_string(),
            }],
        ),

        (SessionState::AwaitingDecision { iteration }, SessionEvent::Decided { decision, detail }) => {
            match decision {
                DecisionType::ExecuteSelectedRule => (
                    SessionState::ExecutingRule {
                        rule_id: detail.clone(),
                        iteration,
                    },
                    vec![
                        SessionAction::LogActivity {
                            message: format!("Executing rule {}", detail),
                        },
                        SessionAction::ExecuteRule { rule_id: detail },
                    ],
                ),
                DecisionType::AddRule => (
                    SessionState::GeneratingRules {
                        reason: detail.clone(),
                        iteration,
                    },
                    vec![
                        SessionAction::LogActivity {
                            message: format!("Synthesizing rules: {}", detail),
                        },
                        SessionAction::SynthesizeRules { reason: detail },
                    ],
                ),
                DecisionType::GoalAchieved => (
                    SessionState::GoalAchieved {
                        reasoning: detail.clone(),
                    },
                    vec![SessionAction::LogActivity {
                        message: format!("Goal achieved: {}", detail),
                    }],
                ),
                DecisionType::GoalFailed => (
                    SessionState::GoalFailed {
                        reasoning: detail.clone(),
                    },
                    vec![SessionAction::LogActivity {
                        message: format!("Goal failed: {}", detail),
                    }],
                ),
            }
        }

        (
            SessionState::ExecutingRule { iteration, .. },
            SessionEvent::ExecutionFinished { rule_id, success },
        ) => (
            SessionState::AwaitingDecision {
                iteration: iteration + 1,
            },
            vec![
                SessionAction::LogActivity {
                    message: format!(
                        "Rule {} {}",
                        rule_id,
                        if success { "succeeded" } else { "failed" }
                    ),
                },
                SessionAction::PersistState,
            ],
        ),

        (
            SessionState::GeneratingRules { iteration, .. },
            SessionEvent::RulesIntegrated { count },
        ) => (
            SessionState::AwaitingDecision {
                iteration: iteration + 1,
            },
            vec![
                SessionAction::LogActivity {
                    message: format!("Integrated {} rule(s)", count),
                },
                SessionAction::PersistState,
            ],
        ),

        // Faults from any non-terminal state
        (SessionState::Idle, SessionEvent::Fault { message })
        | (SessionState::AwaitingDecision { .. }, SessionEvent::Fault { message })
        | (SessionState::ExecutingRule { .. }, SessionEvent::Fault { message })
        | (SessionState::GeneratingRules { .. }, SessionEvent::Fault { message }) => (
            SessionState::GoalFailed {
                reasoning: message.clone(),
            },
            vec![SessionAction::LogActivity {
                message: format!("Fault: {}", message),
            }],
        ),

        // Terminal states reject all events
        (SessionState::GoalAchieved { reasoning }, event) => (
            SessionState::GoalFailed {
                reasoning: format!(
                    "Invalid transition from GoalAchieved ({}) on event: {:?}",
                    reasoning, event
                ),
            },
            vec![],
        ),

        (SessionState::GoalFailed { reasoning }, event) => (
            SessionState::GoalFailed {
                reasoning: format!(
                    "Invalid transition from GoalFailed ({}) on event: {:?}",
                    reasoning, event
                ),
            },
            vec![],
        ),

        // All other invalid transitions
        (state, event) => (
            SessionState::GoalFailed {
                reasoning: format!(
                    "Invalid session transition: {:?} cannot handle event {:?}",
                    state, event
                ),
            },
            vec![],
        ),
    }
}
