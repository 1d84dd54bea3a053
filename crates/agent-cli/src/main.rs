//! agent: run goals through the local task-execution loop
//!
//! Starts a run in the background, streams its progress to the terminal and
//! exits non-zero when the run does not succeed.

use agent_core::{AgentEnvironment, AgentResult, RunEvent, RunManager, SemanticMemory};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use llm_core::{ChatOptions, Config, OllamaClient, OllamaGenerator};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

// ANSI color codes
const GREEN: &str = "\x1b[92m";
const RED: &str = "\x1b[91m";
const YELLOW: &str = "\x1b[93m";
const BLUE: &str = "\x1b[94m";
const CYAN: &str = "\x1b[96m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

#[derive(Debug, Parser)]
#[command(name = "agent")]
#[command(about = "Goal-driven task execution with a local model", version)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to agent.toml (defaults to the usual search locations)
    #[arg(short, long, global = true, env = "AGENT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Work through a goal and print progress as it happens
    Run {
        /// The goal to accomplish
        #[arg(required = true)]
        goal: Vec<String>,

        /// Model to use (overrides config)
        #[arg(short, long)]
        model: Option<String>,

        /// Iteration budget (overrides config)
        #[arg(long)]
        max_loops: Option<usize>,

        /// Print only the final result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Search the long-term memory store
    Recall {
        /// Search terms
        #[arg(required = true)]
        query: Vec<String>,

        /// Maximum number of documents
        #[arg(short, long, default_value_t = 5)]
        limit: usize,
    },

    /// Show model provider status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load(cli.config.as_deref()).context("Failed to load agent.toml")?;

    match cli.command {
        Commands::Run {
            goal,
            model,
            max_loops,
            json,
        } => {
            let result = run(config, goal.join(" "), model, max_loops, json).await?;
            if !result.success {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Recall { query, limit } => recall(&config, &query.join(" "), limit),
        Commands::Status => status(&config).await,
    }
}

async fn run(
    mut config: Config,
    goal: String,
    model: Option<String>,
    max_loops: Option<usize>,
    json: bool,
) -> Result<AgentResult> {
    if let Some(model) = model {
        config.provider.model = model;
    }
    if let Some(max_loops) = max_loops {
        config.agent.max_loops = max_loops;
    }

    let client = OllamaClient::new(&config.provider.base_url, config.provider.timeout_secs)?;
    let generator = OllamaGenerator::new(client, &config.provider.model).with_options(ChatOptions {
        temperature: config.provider.temperature,
    });
    let model = generator.model().to_string();
    let env = AgentEnvironment::from_config(&config, Arc::new(generator));
    let manager = RunManager::new(Handle::current(), env);

    let run_id = manager.start(goal);
    info!(
        run_id = %run_id,
        model = %model,
        max_loops = manager.environment().config.max_loops,
        "Run started"
    );

    let Some(mut events) = manager.subscribe(&run_id) else {
        bail!("Event stream for run {} is unavailable", run_id);
    };

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                if !json {
                    if let Some(line) = render_event(&event) {
                        println!("{}", line);
                    }
                }
                if event.is_done() {
                    break;
                }
            }
            _ = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                warn!(run_id = %run_id, "Interrupted, cancelling run");
                manager.cancel(&run_id);
            }
        }
    }

    let Some(result) = manager.remove(&run_id).and_then(|detail| detail.result) else {
        bail!("Run {} finished without a result", run_id);
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    }
    Ok(result)
}

fn recall(config: &Config, query: &str, limit: usize) -> Result<()> {
    let memory = SemanticMemory::open(config.memory_path());
    if let Some(path) = memory.path() {
        println!("{}Memory{} {}({}){}", BOLD, RESET, DIM, path.display(), RESET);
    }
    let documents = memory.retrieve(query, limit);
    if documents.is_empty() {
        println!("  {}Nothing relevant found{}", YELLOW, RESET);
        return Ok(());
    }
    for doc in documents {
        let source = doc
            .metadata
            .get("source")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        println!("  {}{}{} {}[{}]{}", CYAN, doc.id, RESET, DIM, source, RESET);
        println!("    {}", truncate(&doc.content, 200));
    }
    Ok(())
}

async fn status(config: &Config) -> Result<()> {
    let client = OllamaClient::new(&config.provider.base_url, config.provider.timeout_secs)?;

    println!("{}Provider Status{}", BOLD, RESET);
    println!("  Endpoint: {}", client.base_url());
    println!("  Model:    {}", config.provider.model);

    if !client.health_check().await.unwrap_or(false) {
        print_status(false, "Ollama is not reachable");
        println!("\n  Start with: {}ollama serve{}", BLUE, RESET);
        return Ok(());
    }
    print_status(true, "Ollama is running");

    match client.list_models().await {
        Ok(mut models) => {
            models.sort_by(|a, b| a.name.cmp(&b.name));
            let configured = models.iter().any(|m| m.name == config.provider.model);
            print_status(
                configured,
                &format!("Configured model {} installed", config.provider.model),
            );
            println!("\n{}Installed Models ({}){}", BOLD, models.len(), RESET);
            for m in models {
                println!("  - {} ({})", m.name, m.size_human());
            }
        }
        Err(e) => println!("  {}Error listing models: {}{}", RED, e, RESET),
    }
    Ok(())
}

fn print_status(ok: bool, msg: &str) {
    let icon = if ok {
        format!("{}✓{}", GREEN, RESET)
    } else {
        format!("{}✗{}", RED, RESET)
    };
    println!("  {} {}", icon, msg);
}

/// One terminal line per event; `done` prints nothing
fn render_event(event: &RunEvent) -> Option<String> {
    let line = match event {
        RunEvent::Start { goal, .. } => format!("{}Goal:{} {}", BOLD, RESET, goal),
        RunEvent::Step {
            step_id,
            subtask_id,
            subtask,
        } => format!(
            "\n{}[step {}] task {}:{} {}",
            BLUE, step_id, subtask_id, RESET, subtask
        ),
        RunEvent::Thought { thought } => {
            format!("  {}thought:{} {}", DIM, RESET, truncate(thought, 300))
        }
        RunEvent::Action { tool, args } => {
            format!("  {}action:{} {} {}", CYAN, RESET, tool, args)
        }
        RunEvent::Observation {
            success: true,
            result,
            ..
        } => format!(
            "  {}observation:{} {}",
            GREEN,
            RESET,
            truncate(result.as_deref().unwrap_or(""), 300)
        ),
        RunEvent::Observation { error, .. } => format!(
            "  {}observation:{} {}",
            RED,
            RESET,
            error.as_deref().unwrap_or("failed")
        ),
        RunEvent::SubtaskComplete { subtask_id, result } => format!(
            "  {}✓ task {} complete:{} {}",
            GREEN,
            subtask_id,
            RESET,
            truncate(result, 300)
        ),
        RunEvent::Result {
            success: true,
            answer,
            ..
        } => format!(
            "\n{}Answer:{} {}",
            BOLD,
            RESET,
            answer.as_deref().unwrap_or("")
        ),
        RunEvent::Result { error, .. } => format!(
            "\n{}Failed:{} {}",
            RED,
            RESET,
            error.as_deref().unwrap_or("unknown error")
        ),
        RunEvent::Error { message } => format!("\n{}Error:{} {}", RED, RESET, message),
        RunEvent::Done => return None,
    };
    Some(line)
}

fn truncate(s: &str, max_chars: usize) -> String {
    let single_line = s.replace('\n', " ");
    if single_line.chars().count() <= max_chars {
        return single_line;
    }
    let cut: String = single_line.chars().take(max_chars).collect();
    format!("{}...", cut)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cli_parses_run_flags() {
        let cli = Cli::try_parse_from([
            "agent", "-v", "run", "--json", "--max-loops", "3", "What", "is", "2+2",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Run {
                goal,
                max_loops,
                json,
                model,
            } => {
                assert_eq!(goal.join(" "), "What is 2+2");
                assert_eq!(max_loops, Some(3));
                assert!(json);
                assert!(model.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_run_requires_goal() {
        assert!(Cli::try_parse_from(["agent", "run"]).is_err());
    }

    #[test]
    fn test_render_events() {
        let line = render_event(&RunEvent::Action {
            tool: "calculator".to_string(),
            args: json!({"expression": "2+2"}),
        })
        .unwrap();
        assert!(line.contains("calculator"));
        assert!(line.contains("\"expression\":\"2+2\""));

        let line = render_event(&RunEvent::Observation {
            success: false,
            result: None,
            error: Some("Division by zero".to_string()),
        })
        .unwrap();
        assert!(line.contains("Division by zero"));

        assert!(render_event(&RunEvent::Done).is_none());
    }

    #[test]
    fn test_truncate_flattens_and_shortens() {
        assert_eq!(truncate("a\nb", 10), "a b");
        assert_eq!(truncate("abcdef", 3), "abc...");
    }
}
