//! Configuration management for Ruleflow
//!
//! Loaded from `ruleflow.toml`. The loop-risk and replacement-score weights
//! live here rather than as constants: they are tunable knobs, not
//! load-bearing parts of the algorithms.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::Result;

/// Top-level Ruleflow configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleflowConfig {
    /// Oracle (LLM) settings
    #[serde(default)]
    pub oracle: OracleConfig,

    /// Session limits and loop-prevention thresholds
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Weights for the five advanced loop-risk signals
    #[serde(default)]
    pub loop_weights: LoopWeights,

    /// Weights for adaptive replacement pair scoring
    #[serde(default)]
    pub replacement_weights: ReplacementWeights,
}

/// Oracle settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Default model name
    #[serde(default = "default_model")]
    pub model: String,

    /// Environment variable containing the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Maximum tokens for oracle responses
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
}

/// Session limits and loop-prevention thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Hard iteration cap for a session
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Failures after which a rule is skipped
    #[serde(default = "default_max_rule_failures")]
    pub max_rule_failures: u32,

    /// Consecutive identical executions treated as a potential loop
    #[serde(default = "default_max_consecutive")]
    pub max_consecutive_same_rule: u32,

    /// Fingerprint lookback window for cycle detection
    #[serde(default = "default_lookback")]
    pub fingerprint_lookback: usize,

    /// Iteration count above which the temporal loop signal fires
    #[serde(default = "default_temporal_iterations")]
    pub temporal_loop_iterations: u32,

    /// Absolute cap on rule set size after replacement
    #[serde(default = "default_max_total_rules")]
    pub max_total_rules: usize,

    /// Confidence needed to declare the goal achieved
    #[serde(default = "default_goal_confidence")]
    pub goal_confidence: f64,

    /// Raised confidence bar when loop indicators are present
    #[serde(default = "default_goal_confidence_under_risk")]
    pub goal_confidence_under_risk: f64,
}

/// Weights for the five advanced loop-risk signals.
///
/// The weighted sum is capped at 1.0; the defaults keep the historical
/// balance between the signals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopWeights {
    #[serde(default = "default_pattern_weight")]
    pub pattern_repetition: f64,
    #[serde(default = "default_semantic_weight")]
    pub semantic_repetition: f64,
    #[serde(default = "default_stagnation_weight")]
    pub stagnation: f64,
    #[serde(default = "default_exhaustion_weight")]
    pub rule_exhaustion: f64,
    #[serde(default = "default_temporal_weight")]
    pub temporal: f64,
}

/// Weights for adaptive replacement pair scoring
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplacementWeights {
    #[serde(default = "default_similarity_weight")]
    pub similarity: f64,
    #[serde(default = "default_priority_weight")]
    pub priority: f64,
    #[serde(default = "default_phase_weight")]
    pub phase: f64,
    #[serde(default = "default_agent_weight")]
    pub agent: f64,
}

// Default value providers
fn default_model() -> String {
    "sonnet".to_string()
}

fn default_api_key_env() -> String {
    "ANTHROPIC_API_KEY".to_string()
}

fn default_max_tokens() -> usize {
    4096
}

fn default_max_iterations() -> u32 {
    20
}

fn default_max_rule_failures() -> u32 {
    3
}

fn default_max_consecutive() -> u32 {
    3
}

fn default_lookback() -> usize {
    5
}

fn default_temporal_iterations() -> u32 {
    15
}

fn default_max_total_rules() -> usize {
    12
}

fn default_goal_confidence() -> f64 {
    0.70
}

fn default_goal_confidence_under_risk() -> f64 {
    0.85
}

fn default_pattern_weight() -> f64 {
    0.30
}

fn default_semantic_weight() -> f64 {
    0.20
}

fn default_stagnation_weight() -> f64 {
    0.25
}

fn default_exhaustion_weight() -> f64 {
    0.15
}

fn default_temporal_weight() -> f64 {
    0.10
}

fn default_similarity_weight() -> f64 {
    0.40
}

fn default_priority_weight() -> f64 {
    0.30
}

fn default_phase_weight() -> f64 {
    0.20
}

fn default_agent_weight() -> f64 {
    0.10
}

impl RuleflowConfig {
    /// Load configuration from `ruleflow.toml` in `dir`, or use defaults
    pub fn load_or_default(dir: &Path) -> Result<Self> {
        let config_path = dir.join("ruleflow.toml");

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)
                .map_err(|e| crate::RuleflowError::Config(format!("Failed to parse config: {}", e)))
        } else {
            Ok(Self::default())
        }
    }

    /// Write default configuration to `ruleflow.toml` in `dir`
    pub fn write_default(dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        let config_path = dir.join("ruleflow.toml");
        let content = toml::to_string_pretty(&Self::default())
            .map_err(|e| crate::RuleflowError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }
}

impl Default for RuleflowConfig {
    fn default() -> Self {
        Self {
            oracle: OracleConfig::default(),
            limits: LimitsConfig::default(),
            loop_weights: LoopWeights::default(),
            replacement_weights: ReplacementWeights::default(),
        }
    }
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            api_key_env: default_api_key_env(),
            max_tokens: default_max_tokens(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_rule_failures: default_max_rule_failures(),
            max_consecutive_same_rule: default_max_consecutive(),
            fingerprint_lookback: default_lookback(),
            temporal_loop_iterations: default_temporal_iterations(),
            max_total_rules: default_max_total_rules(),
            goal_confidence: default_goal_confidence(),
            goal_confidence_under_risk: default_goal_confidence_under_risk(),
        }
    }
}

impl Default for LoopWeights {
    fn default() -> Self {
        Self {
            pattern_repetition: default_pattern_weight(),
            semantic_repetition: default_semantic_weight(),
            stagnation: default_stagnation_weight(),
            rule_exhaustion: default_exhaustion_weight(),
            temporal: default_temporal_weight(),
        }
    }
}

impl Default for ReplacementWeights {
    fn default() -> Self {
        Self {
            similarity: default_similarity_weight(),
            priority: default_priority_weight(),
            phase: default_phase_weight(),
            agent: default_agent_weight(),
        }
    }
}
