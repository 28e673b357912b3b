//! # ruleflow-engine
//!
//! Session engine for Ruleflow.
//!
//! Control flow lives in a pure state machine (`transition(state, event) ->
//! (state, actions)`); the engine loop owns all I/O around it: decision
//! cycles, rule dispatch to executors, rule synthesis plus adaptive
//! replacement, state snapshots, and fail-open persistence.

mod engine;
mod state_machine;

pub use engine::{SessionResult, SessionTelemetry, StopReason, WorkflowEngine};
pub use state_machine::{transition, SessionAction, SessionEvent, SessionState};
