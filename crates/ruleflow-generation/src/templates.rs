//! Prompt templates for rule synthesis

use ruleflow_core::ProductionRule;

const RULE_SCHEMA: &str = r#"Respond with a JSON array only. Each element:
{
  "rule_name": "<short name>",
  "trigger_condition": "<when this rule applies, natural language>",
  "action": "<what to do, natural language instruction>",
  "execution_phase": "information_gathering | execution | verification",
  "expected_result": "<what success looks like>",
  "priority": <1-100, higher runs sooner>,
  "suggested_agent": "<optional agent name>"
}"#;

/// Prompt asking for an initial rule set covering a goal
pub fn initial_rules_prompt(goal: &str, max_rules: usize) -> String {
    format!(
        "# RULE SYNTHESIS\n\n\
         Goal: {}\n\n\
         Produce up to {} production rules that together pursue this goal.\n\
         Cover all three phases: gather information first, then execute, then verify.\n\
         Conditions and actions must be concrete enough for an agent to act on.\n\n\
         {}\n",
        goal, max_rules, RULE_SCHEMA
    )
}

/// Prompt asking for replacement rules after a rule failed
pub fn recovery_rules_prompt(
    goal: &str,
    failed_rule: &ProductionRule,
    error: &str,
    max_rules: usize,
) -> String {
    format!(
        "# RECOVERY RULE SYNTHESIS\n\n\
         Goal: {}\n\n\
         This rule failed:\n\
         - name: {}\n\
         - condition: {}\n\
         - action: {}\n\
         - error: {}\n\n\
         Produce up to {} alternative rules that route around this failure.\n\
         Do not repeat the failing action verbatim.\n\n\
         {}\n",
        goal, failed_rule.name, failed_rule.condition, failed_rule.action, error, max_rules,
        RULE_SCHEMA
    )
}

/// Prompt asking for strategy-adjustment rules when loop risk is elevated
pub fn adjustment_rules_prompt(goal: &str, risk_summary: &str, max_rules: usize) -> String {
    format!(
        "# STRATEGY ADJUSTMENT\n\n\
         Goal: {}\n\n\
         The workflow is at risk of looping:\n{}\n\n\
         Produce up to {} rules that take a different approach to the goal.\n\
         Favor rules that change what information is gathered or how progress\n\
         is verified, not minor rewordings of earlier actions.\n\n\
         {}\n",
        goal, risk_summary, max_rules, RULE_SCHEMA
    )
}
