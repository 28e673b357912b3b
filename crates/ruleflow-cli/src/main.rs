//! Ruleflow CLI - LLM-driven production-rule workflow engine
//!
//! Usage:
//!   ruleflow init                Write a default ruleflow.toml
//!   ruleflow run --goal <goal>   Run a workflow session
//!   ruleflow history <session>   Show persisted snapshots of a session

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ruleflow_core::{ProductionRule, RulePhase, RuleSet, RuleflowConfig, SUGGESTED_AGENT_KEY};
use ruleflow_engine::WorkflowEngine;
use ruleflow_oracle::{
    AgentRegistry, AnthropicOracle, Model, Oracle, ScriptedExecutor, ScriptedOracle,
};
use ruleflow_state::{JsonFileRepository, StateRepository};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "ruleflow")]
#[command(author, version, about = "LLM-driven production-rule workflow engine")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default ruleflow.toml to a directory
    Init {
        /// Target directory (defaults to current directory)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Run a workflow session toward a goal
    Run {
        /// The goal to pursue
        #[arg(long)]
        goal: String,

        /// Override the configured iteration cap
        #[arg(long)]
        max_iterations: Option<u32>,

        /// Oracle model (opus, sonnet, haiku)
        #[arg(long)]
        model: Option<String>,

        /// Directory for state snapshots
        #[arg(long, default_value = ".ruleflow/state")]
        state_dir: PathBuf,

        /// Use a scripted oracle and demo executor instead of the API
        #[arg(long)]
        offline: bool,
    },

    /// Show the persisted snapshots of a session
    History {
        /// Session id (e.g. wf-1a2b3c4d)
        session: String,

        /// Directory holding state snapshots
        #[arg(long, default_value = ".ruleflow/state")]
        state_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.to_string())),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to initialize logging")?;

    match cli.command {
        Commands::Init { path } => {
            RuleflowConfig::write_default(&path)
                .with_context(|| format!("Failed to write config to {}", path.display()))?;
            println!("Wrote {}", path.join("ruleflow.toml").display());
            Ok(())
        }

        Commands::Run {
            goal,
            max_iterations,
            model,
            state_dir,
            offline,
        } => run_session(goal, max_iterations, model, state_dir, offline).await,

        Commands::History { session, state_dir } => {
            let repository = JsonFileRepository::new(state_dir);
            let history = repository
                .history(&session)
                .with_context(|| format!("Failed to read history for {}", session))?;

            if history.is_empty() {
                println!("No snapshots found for session {}", session);
                return Ok(());
            }

            for snapshot in &history {
                println!(
                    "iter {:>3}  goal_achieved={}  {}",
                    snapshot.iteration_count, snapshot.goal_achieved, snapshot.state
                );
                for entry in &snapshot.execution_history {
                    println!("          {}", entry);
                }
            }
            Ok(())
        }
    }
}

async fn run_session(
    goal: String,
    max_iterations: Option<u32>,
    model: Option<String>,
    state_dir: PathBuf,
    offline: bool,
) -> Result<()> {
    let mut config = RuleflowConfig::load_or_default(&PathBuf::from("."))
        .context("Failed to load ruleflow.toml")?;
    if let Some(cap) = max_iterations {
        config.limits.max_iterations = cap;
    }

    let repository = Arc::new(JsonFileRepository::new(state_dir));

    let result = if offline {
        let (oracle, rule_set) = offline_session(&goal);
        let mut registry = AgentRegistry::new();
        registry.register(Arc::new(ScriptedExecutor::new("demo").with_capabilities(
            vec!["information gathering".to_string(), "task execution".to_string()],
        )));

        let engine = WorkflowEngine::new(Arc::new(oracle), registry, config)
            .with_repository(repository);
        engine.run_with_rule_set(rule_set).await
    } else {
        let model: Model = model
            .as_deref()
            .unwrap_or(&config.oracle.model)
            .parse()
            .map_err(anyhow::Error::msg)?;
        let oracle: Arc<dyn Oracle> = Arc::new(
            AnthropicOracle::new(model)
                .with_max_tokens(config.oracle.max_tokens)
                .with_api_key_env(config.oracle.api_key_env.clone()),
        );

        let mut registry = AgentRegistry::new();
        registry.register(Arc::new(ScriptedExecutor::new("worker").with_capabilities(
            vec!["general task execution".to_string()],
        )));

        let engine = WorkflowEngine::new(oracle, registry, config).with_repository(repository);
        engine.run(&goal).await
    };

    println!();
    println!("Session:    {}", result.session_id);
    println!("Stopped:    {:?}", result.stop_reason);
    println!("Success:    {}", result.success);
    println!("Iterations: {}", result.iterations);
    println!("Confidence: {:.2}", result.confidence);
    println!("Reasoning:  {}", result.reasoning);
    println!(
        "Telemetry:  {} decisions, {} executions ({} failed), {} rules generated, {} replacements",
        result.telemetry.decisions,
        result.telemetry.rules_executed,
        result.telemetry.executions_failed,
        result.telemetry.rules_generated,
        result.telemetry.replacements
    );
    println!(
        "Rule set:   {} rule(s) at version {} ({})",
        result.rule_set.len(),
        result.rule_set.version,
        result.rule_set.status
    );
    if !result.final_state.execution_history.is_empty() {
        println!("History:");
        for entry in &result.final_state.execution_history {
            println!("  {}", entry);
        }
    }

    Ok(())
}

/// Scripted oracle and rule set for `--offline`: a three-rule session that
/// gathers, executes, verifies, then assesses the goal achieved.
fn offline_session(goal: &str) -> (ScriptedOracle, RuleSet) {
    let mut rule_set = RuleSet::new(goal);
    rule_set.add_rule(
        ProductionRule::new("demo-gather", "survey the task", "nothing is known yet", "survey the task and note findings")
            .with_phase(RulePhase::InformationGathering)
            .with_priority(80)
            .with_metadata_entry(SUGGESTED_AGENT_KEY, "demo"),
        "offline seed",
    );
    rule_set.add_rule(
        ProductionRule::new("demo-execute", "do the work", "the task is understood", "carry out the main task")
            .with_phase(RulePhase::Execution)
            .with_priority(60)
            .with_metadata_entry(SUGGESTED_AGENT_KEY, "demo"),
        "offline seed",
    );
    rule_set.add_rule(
        ProductionRule::new("demo-verify", "check the result", "the work is done", "verify the outcome against the goal")
            .with_phase(RulePhase::Verification)
            .with_priority(40)
            .with_metadata_entry(SUGGESTED_AGENT_KEY, "demo"),
        "offline seed",
    );

    let oracle = ScriptedOracle::always("{}");
    oracle.push_text(
        r#"{"decision_type": "EXECUTE_SELECTED_RULE", "selected_rule_id": "demo-gather", "confidence": 0.9, "reasoning": "start by understanding the task"}"#,
    );
    oracle.push_text(r#"{"achieved": false, "confidence": 0.2, "reasoning": "only surveyed so far"}"#);
    oracle.push_text(
        r#"{"decision_type": "EXECUTE_SELECTED_RULE", "selected_rule_id": "demo-execute", "confidence": 0.9, "reasoning": "task is understood, do the work"}"#,
    );
    oracle.push_text(r#"{"achieved": false, "confidence": 0.5, "reasoning": "work done but unverified"}"#);
    oracle.push_text(
        r#"{"decision_type": "EXECUTE_SELECTED_RULE", "selected_rule_id": "demo-verify", "confidence": 0.9, "reasoning": "verify before declaring victory"}"#,
    );
    oracle.push_text(r#"{"achieved": true, "confidence": 0.9, "reasoning": "outcome verified against the goal"}"#);

    (oracle, rule_set)
}
