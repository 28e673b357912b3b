//! Decision prompt builder
//!
//! Assembles everything the oracle needs to pick the next action: goal,
//! situation, recent history, loop-risk summary, the filtered candidate rules,
//! and the available agents with suitability notes.

use crate::loop_detector::{AdvancedLoopDetection, LoopContext};
use ruleflow_core::{ProductionRule, RuleSet};
use ruleflow_oracle::{AgentExecutor, AgentRegistry};
use ruleflow_state::WorkflowState;
use std::collections::HashSet;

/// Build the prompt for one decision cycle
pub fn build_decision_prompt(
    rule_set: &RuleSet,
    state: &WorkflowState,
    available: &[&ProductionRule],
    loop_ctx: &LoopContext,
    advanced: &AdvancedLoopDetection,
    registry: &AgentRegistry,
) -> String {
    let mut prompt = String::new();

    prompt.push_str("# WORKFLOW DECISION\n\n");

    prompt.push_str("## GOAL\n\n");
    prompt.push_str(&rule_set.goal);
    prompt.push_str("\n\n");

    prompt.push_str("## CURRENT STATE\n\n");
    prompt.push_str(&format!("Iteration: {}\n", state.iteration_count));
    prompt.push_str(&format!("Situation: {}\n\n", state.state));

    let recent: Vec<&str> = state
        .execution_history
        .iter()
        .rev()
        .take(3)
        .rev()
        .map(String::as_str)
        .collect();
    if !recent.is_empty() {
        prompt.push_str("**Recent history:**\n");
        for entry in recent {
            prompt.push_str(&format!("- {}\n", entry));
        }
        prompt.push('\n');
    }

    if !state.context_variables.is_empty() {
        prompt.push_str("**Context variables:**\n");
        let mut keys: Vec<&String> = state.context_variables.keys().collect();
        keys.sort();
        for key in keys {
            prompt.push_str(&format!("- {}: {}\n", key, state.context_variables[key]));
        }
        prompt.push('\n');
    }

    prompt.push_str("## LOOP RISK\n\n");
    prompt.push_str(&format!("- Basic: {}\n", loop_ctx.summary()));
    prompt.push_str(&format!("- Heuristics: {}\n\n", advanced.summary()));

    prompt.push_str("## AVAILABLE RULES\n\n");
    for rule in available {
        prompt.push_str(&format!(
            "- id={} [{}] priority={} \"{}\"\n  condition: {}\n  action: {}\n",
            rule.id, rule.phase, rule.priority, rule.name, rule.condition, rule.action
        ));
        let failures = state.rule_failure_count(&rule.id);
        if failures > 0 {
            prompt.push_str(&format!("  note: failed {} time(s) before\n", failures));
        }
    }
    prompt.push('\n');

    if !registry.is_empty() {
        prompt.push_str("## AVAILABLE AGENTS\n\n");
        for agent in registry.agents() {
            prompt.push_str(&format!(
                "- {}: {} ({})\n",
                agent.name(),
                agent.capabilities().join(", "),
                data_affinity_note(agent.as_ref(), state)
            ));
        }
        prompt.push('\n');
    }

    prompt.push_str("## DECISION\n\n");
    prompt.push_str(
        "Choose exactly one action. Respond with JSON only:\n\
         {\n\
           \"decision_type\": \"EXECUTE_SELECTED_RULE | ADD_RULE | GOAL_ACHIEVED | GOAL_FAILED\",\n\
           \"selected_rule_id\": \"<required for EXECUTE_SELECTED_RULE>\",\n\
           \"new_rules\": [<required for ADD_RULE, same schema as the rules above>],\n\
           \"confidence\": 0.0-1.0,\n\
           \"reasoning\": \"<one short paragraph>\"\n\
         }\n",
    );

    prompt
}

/// Two-dimensional suitability note: capability listing is printed alongside;
/// this infers data affinity from keyword overlap with recent activity.
fn data_affinity_note(agent: &dyn AgentExecutor, state: &WorkflowState) -> &'static str {
    let mut context_words: HashSet<String> = keywords(&state.state);
    for entry in state.execution_history.iter().rev().take(3) {
        context_words.extend(keywords(entry));
    }

    let mut agent_words = keywords(agent.name());
    for capability in agent.capabilities() {
        agent_words.extend(keywords(&capability));
    }

    if agent_words.iter().any(|w| context_words.contains(w)) {
        "matches recent context"
    } else {
        "no recent-context signal"
    }
}

fn keywords(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() >= 4)
        .map(str::to_string)
        .collect()
}
