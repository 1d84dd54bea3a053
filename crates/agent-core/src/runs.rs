//! Concurrent runs and their event streams
//!
//! Each run executes on the runtime handle the manager was built with and
//! owns one ordered event queue. The queue always ends with a single
//! `done`, including when the run panics.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use llm_core::Generator;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, Instrument};
use uuid::Uuid;

use crate::agent::{Agent, AgentConfig, RunProgress};
use crate::error::AgentError;
use crate::events::{self, ChannelSink, DoneGuard, EventSink, RunEvent, RunEventStream};
use crate::memory::SemanticMemory;
use crate::safety::SafetyGuardrails;
use crate::tools::builtin::create_default_registry;
use crate::tools::{ToolContext, ToolRegistry};
use crate::types::{AgentResult, Plan};

/// Lifecycle of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Initializing,
    Running,
    Completed,
    Failed,
    Cancelled,
    Error,
}

impl RunStatus {
    pub fn is_finished(self) -> bool {
        !matches!(self, Self::Initializing | Self::Running)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Initializing => "initializing",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// Everything an agent needs, shared by all runs
#[derive(Clone)]
pub struct AgentEnvironment {
    pub generator: Arc<dyn Generator>,
    pub tools: Arc<ToolRegistry>,
    pub tool_ctx: ToolContext,
    pub semantic: Arc<SemanticMemory>,
    pub safety: SafetyGuardrails,
    pub config: AgentConfig,
}

impl AgentEnvironment {
    /// Default tools, guardrails and memory store as described by `config`
    pub fn from_config(config: &llm_core::Config, generator: Arc<dyn Generator>) -> Self {
        let (registry, tool_ctx) = create_default_registry(config.working_dir());
        Self {
            generator,
            tools: Arc::new(registry),
            tool_ctx: tool_ctx.with_command_timeout(config.agent.command_timeout_secs),
            semantic: Arc::new(SemanticMemory::open(config.memory_path())),
            safety: SafetyGuardrails::from_config(config),
            config: AgentConfig::from_config(config),
        }
    }

    fn agent(&self) -> Agent {
        Agent::new(
            Arc::clone(&self.generator),
            Arc::clone(&self.tools),
            Arc::clone(&self.semantic),
            self.safety.clone(),
        )
        .with_tool_context(self.tool_ctx.clone())
        .with_config(self.config.clone())
    }
}

/// Row in a run listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub id: String,
    pub goal: String,
    pub status: RunStatus,
    pub step_count: usize,
    pub started_at: DateTime<Utc>,
}

/// Full snapshot of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunDetail {
    #[serde(flatten)]
    pub summary: RunSummary,
    pub plan: Option<Plan>,
    pub result: Option<AgentResult>,
}

struct RunRecord {
    goal: String,
    status: RunStatus,
    started_at: DateTime<Utc>,
    progress: Arc<RunProgress>,
    cancel: CancellationToken,
    events: Option<RunEventStream>,
    result: Option<AgentResult>,
}

impl RunRecord {
    fn summary(&self, id: &str) -> RunSummary {
        RunSummary {
            id: id.to_string(),
            goal: self.goal.clone(),
            status: self.status,
            step_count: self.progress.step_count(),
            started_at: self.started_at,
        }
    }
}

type RunTable = Arc<RwLock<HashMap<String, RunRecord>>>;

/// Starts runs in the background and tracks them until the process exits
pub struct RunManager {
    handle: Handle,
    env: AgentEnvironment,
    runs: RunTable,
}

impl RunManager {
    /// Runs are spawned on `handle`
    pub fn new(handle: Handle, env: AgentEnvironment) -> Self {
        Self {
            handle,
            env,
            runs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn environment(&self) -> &AgentEnvironment {
        &self.env
    }

    /// Start a run and return its id without waiting for it
    pub fn start(&self, goal: impl Into<String>) -> String {
        let goal = goal.into();
        let id = Uuid::new_v4().to_string();
        let (sink, stream) = events::channel();
        let cancel = CancellationToken::new();
        let progress = Arc::new(RunProgress::new());

        self.runs.write().insert(
            id.clone(),
            RunRecord {
                goal: goal.clone(),
                status: RunStatus::Initializing,
                started_at: Utc::now(),
                progress: Arc::clone(&progress),
                cancel: cancel.clone(),
                events: Some(stream),
                result: None,
            },
        );

        let agent = self
            .env
            .agent()
            .with_run_id(id.clone())
            .with_cancellation(cancel)
            .with_progress(progress);

        let span = tracing::info_span!("run", run_id = %id);
        self.handle.spawn(
            run_worker(Arc::clone(&self.runs), id.clone(), goal, agent, sink).instrument(span),
        );
        info!(run_id = %id, "Run started");
        id
    }

    /// Take the run's event stream. Each run has exactly one subscriber.
    pub fn subscribe(&self, id: &str) -> Option<RunEventStream> {
        self.runs.write().get_mut(id)?.events.take()
    }

    pub fn status(&self, id: &str) -> Option<RunStatus> {
        self.runs.read().get(id).map(|r| r.status)
    }

    /// Terminal result, once the run has finished
    pub fn result(&self, id: &str) -> Option<AgentResult> {
        self.runs.read().get(id)?.result.clone()
    }

    /// All runs, oldest first
    pub fn list_runs(&self) -> Vec<RunSummary> {
        let runs = self.runs.read();
        let mut summaries: Vec<RunSummary> = runs.iter().map(|(id, r)| r.summary(id)).collect();
        summaries.sort_by(|a, b| a.started_at.cmp(&b.started_at).then_with(|| a.id.cmp(&b.id)));
        summaries
    }

    pub fn get_run(&self, id: &str) -> Option<RunDetail> {
        let runs = self.runs.read();
        let record = runs.get(id)?;
        Some(RunDetail {
            summary: record.summary(id),
            plan: record.progress.plan(),
            result: record.result.clone(),
        })
    }

    /// Forget a finished run, returning its final snapshot. Unsubscribed
    /// events are dropped with it. Running runs are left alone.
    pub fn remove(&self, id: &str) -> Option<RunDetail> {
        let mut runs = self.runs.write();
        if !runs.get(id)?.status.is_finished() {
            return None;
        }
        let record = runs.remove(id)?;
        debug!(run_id = %id, "Run removed");
        Some(RunDetail {
            summary: record.summary(id),
            plan: record.progress.plan(),
            result: record.result,
        })
    }

    /// Forget every finished run. Returns how many were dropped.
    pub fn prune_finished(&self) -> usize {
        let mut runs = self.runs.write();
        let before = runs.len();
        runs.retain(|_, record| !record.status.is_finished());
        let pruned = before - runs.len();
        if pruned > 0 {
            info!(pruned, remaining = runs.len(), "Pruned finished runs");
        }
        pruned
    }

    /// Request cooperative cancellation. False if the run is unknown or already finished.
    pub fn cancel(&self, id: &str) -> bool {
        let runs = self.runs.read();
        match runs.get(id) {
            Some(record) if !record.status.is_finished() => {
                info!(run_id = %id, "Cancelling run");
                record.cancel.cancel();
                true
            }
            _ => false,
        }
    }
}

impl fmt::Debug for RunManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunManager")
            .field("runs", &self.runs.read().len())
            .finish()
    }
}

async fn run_worker(runs: RunTable, id: String, goal: String, agent: Agent, sink: ChannelSink) {
    let guard = DoneGuard::new(sink);
    set_status(&runs, &id, RunStatus::Running);

    let outcome = AssertUnwindSafe(agent.run(&goal, guard.sink()))
        .catch_unwind()
        .await;

    match outcome {
        Ok(result) => {
            let status = if result.success {
                RunStatus::Completed
            } else if result.metadata.get("terminal_state").and_then(|v| v.as_str()) == Some("cancelled") {
                RunStatus::Cancelled
            } else {
                RunStatus::Failed
            };
            let event = RunEvent::Result {
                success: result.success,
                answer: result.answer.clone(),
                error: result.error.clone(),
            };
            finish(&runs, &id, status, result);
            guard.sink().emit(event);
        }
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            error!(run_id = %id, %message, "Run panicked");
            let result = AgentResult::failed(AgentError::RunPanicked(message.clone()).to_string(), Vec::new());
            finish(&runs, &id, RunStatus::Error, result);
            guard.sink().emit(RunEvent::Error { message });
        }
    }
}

fn set_status(runs: &RunTable, id: &str, status: RunStatus) {
    if let Some(record) = runs.write().get_mut(id) {
        record.status = status;
    }
}

fn finish(runs: &RunTable, id: &str, status: RunStatus, result: AgentResult) {
    debug!(run_id = %id, %status, "Storing run result");
    if let Some(record) = runs.write().get_mut(id) {
        record.status = status;
        record.result = Some(result);
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
