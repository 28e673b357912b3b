//! Agent executor seam and registry
//!
//! Executors carry out a rule's action text and report a normalized
//! `WorkflowResult`. The registry is plain data handed into the components
//! that need it - there is no global lookup.

use async_trait::async_trait;
use ruleflow_core::{Result, WorkflowResult};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// An agent that can carry out natural-language instructions
#[async_trait]
pub trait AgentExecutor: Send + Sync {
    /// Stable agent name used for rule hints and registry lookup
    fn name(&self) -> &str;

    /// Short capability descriptions, shown to the oracle when it picks rules
    fn capabilities(&self) -> Vec<String>;

    /// Execute one instruction. Adapters must normalize whatever the
    /// underlying tool produces into a `WorkflowResult`.
    async fn execute(&self, instruction: &str) -> Result<WorkflowResult>;
}

/// Registry of available executors, in registration order.
///
/// Passed by reference into the decision core and the engine (explicit
/// dependency injection - deliberately not a process-wide singleton).
#[derive(Clone, Default)]
pub struct AgentRegistry {
    agents: Vec<Arc<dyn AgentExecutor>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an executor. A duplicate name replaces the earlier entry so
    /// callers can override defaults.
    pub fn register(&mut self, agent: Arc<dyn AgentExecutor>) {
        if let Some(pos) = self.agents.iter().position(|a| a.name() == agent.name()) {
            self.agents[pos] = agent;
        } else {
            self.agents.push(agent);
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn AgentExecutor>> {
        self.agents.iter().find(|a| a.name() == name).cloned()
    }

    /// First registered executor - the fallback when a rule has no hint
    pub fn first(&self) -> Option<Arc<dyn AgentExecutor>> {
        self.agents.first().cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.agents.iter().map(|a| a.name()).collect()
    }

    pub fn agents(&self) -> &[Arc<dyn AgentExecutor>] {
        &self.agents
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

/// Executor answering from a scripted queue, echoing once drained.
///
/// Used by the CLI offline mode and by tests.
pub struct ScriptedExecutor {
    name: String,
    capabilities: Vec<String>,
    responses: Mutex<VecDeque<WorkflowResult>>,
}

impl ScriptedExecutor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            capabilities: vec!["general task execution".to_string()],
            responses: Mutex::new(VecDeque::new()),
        }
    }

    pub fn with_capabilities(mut self, capabilities: Vec<String>) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn push_response(&self, result: WorkflowResult) {
        self.responses
            .lock()
            .expect("scripted responses")
            .push_back(result);
    }
}

#[async_trait]
impl AgentExecutor for ScriptedExecutor {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> Vec<String> {
        self.capabilities.clone()
    }

    async fn execute(&self, instruction: &str) -> Result<WorkflowResult> {
        let scripted = self
            .responses
            .lock()
            .expect("scripted responses")
            .pop_front();
        Ok(scripted.unwrap_or_else(|| {
            WorkflowResult::ok(format!("{} executed: {}", self.name, instruction))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_registry_lookup_and_order() {
        let mut registry = AgentRegistry::new();
        registry.register(Arc::new(ScriptedExecutor::new("researcher")));
        registry.register(Arc::new(ScriptedExecutor::new("builder")));

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.names(), vec!["researcher", "builder"]);
        assert!(registry.get("builder").is_some());
        assert!(registry.get("unknown").is_none());
        assert_eq!(registry.first().unwrap().name(), "researcher");
    }

    #[tokio::test]
    async fn test_registry_replaces_duplicate_name() {
        let mut registry = AgentRegistry::new();
        registry.register(Arc::new(ScriptedExecutor::new("worker")));
        registry.register(Arc::new(
            ScriptedExecutor::new("worker").with_capabilities(vec!["v2".to_string()]),
        ));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("worker").unwrap().capabilities(), vec!["v2"]);
    }

    #[tokio::test]
    async fn test_scripted_executor_queue_then_echo() {
        let executor = ScriptedExecutor::new("worker");
        executor.push_response(WorkflowResult::failed("task failed", "disk full"));

        let first = executor.execute("do thing").await.unwrap();
        assert!(!first.success);

        let second = executor.execute("do thing").await.unwrap();
        assert!(second.success);
        assert!(second.message.contains("do thing"));
    }
}
