//! Rule construction from untyped oracle JSON
//!
//! Oracle output is untrusted: field names drift between generations, phase
//! strings are free-form, and whole elements can be garbage. Construction
//! never raises - an unusable dict yields `None` and the caller skips it.

use ruleflow_core::{ProductionRule, RulePhase, DEFAULT_PRIORITY, SUGGESTED_AGENT_KEY};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Build a rule from a raw oracle dict, or `None` if it cannot be used.
///
/// Accepts both current field names (`rule_name`, `trigger_condition`,
/// `execution_phase`, `expected_result`) and legacy aliases (`name`,
/// `condition`, `phase`, `expected_outcome`); current names win when both are
/// present. The id is a deterministic hash of the name plus the raw dict, so
/// re-parsing identical oracle output yields the same rule id.
pub fn rule_from_raw(raw: &Value) -> Option<ProductionRule> {
    let obj = raw.as_object()?;

    let name = string_field(obj, "rule_name").or_else(|| string_field(obj, "name"))?;
    if name.trim().is_empty() {
        return None;
    }

    let condition = string_field(obj, "trigger_condition")
        .or_else(|| string_field(obj, "condition"))
        .unwrap_or_default();
    let action = string_field(obj, "action").unwrap_or_default();
    let expected = string_field(obj, "expected_result")
        .or_else(|| string_field(obj, "expected_outcome"))
        .unwrap_or_default();

    let phase = string_field(obj, "execution_phase")
        .or_else(|| string_field(obj, "phase"))
        .map(|s| parse_phase_lenient(&s))
        .unwrap_or_default();

    let priority = obj
        .get("priority")
        .and_then(Value::as_u64)
        .map(|p| p.min(u32::MAX as u64) as u32)
        .unwrap_or(DEFAULT_PRIORITY);

    let mut rule = ProductionRule::new(deterministic_rule_id(&name, raw), name, condition, action)
        .with_priority(priority)
        .with_phase(phase)
        .with_expected_outcome(expected);

    if let Some(agent) = string_field(obj, "suggested_agent") {
        rule = rule.with_metadata_entry(SUGGESTED_AGENT_KEY, agent);
    }

    Some(rule)
}

fn string_field(obj: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Map a free-form phase string onto a `RulePhase`.
///
/// A synonym table runs before the direct enum parse; anything unrecognized
/// defaults to Execution rather than failing.
pub fn parse_phase_lenient(s: &str) -> RulePhase {
    let lower = s.trim().to_lowercase();

    const VERIFICATION: [&str; 4] = ["testing", "validation", "review", "check"];
    const EXECUTION: [&str; 3] = ["implement", "development", "coding"];
    const GATHERING: [&str; 3] = ["planning", "init", "gathering"];

    if VERIFICATION.iter().any(|k| lower.contains(k)) {
        return RulePhase::Verification;
    }
    if EXECUTION.iter().any(|k| lower.contains(k)) {
        return RulePhase::Execution;
    }
    if GATHERING.iter().any(|k| lower.contains(k)) {
        return RulePhase::InformationGathering;
    }

    lower.parse().unwrap_or(RulePhase::Execution)
}

/// Deterministic rule id: hash of the name plus the serialized raw dict,
/// formatted as a fixed-width numeric suffix. Not random - identical oracle
/// output re-parses to the same id, which makes dedup by id meaningful.
pub fn deterministic_rule_id(name: &str, raw: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    hasher.update(raw.to_string().as_bytes());
    let digest = hasher.finalize();
    let n = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]) % 100_000_000;
    format!("rule_{:08}", n)
}
