//! # ruleflow-state
//!
//! Workflow state for Ruleflow: copy-on-write snapshots with loop-prevention
//! bookkeeping, oracle-backed goal evaluation, and JSON-file persistence.
//!
//! Nothing in this crate mutates a snapshot in place after the decision core
//! has seen it - every iteration derives a successor, and the prior snapshot
//! lives on only in the repository's iteration-keyed history.

mod repository;
mod service;
mod state;

pub use repository::{JsonFileRepository, StateRepository};
pub use service::{GoalAssessment, StateService};
pub use state::{WorkflowState, STATE_DESCRIPTION_KEY};
