//! Error taxonomy for the execution loop
//!
//! Step-local failures (`ToolNotFound`, `InvalidInput`, `ToolExecution`,
//! `Security`) are recorded as failed observations and never abort a run.
//! Terminal failures end the run and populate `AgentResult::error`.

use std::path::PathBuf;
use thiserror::Error;

/// Guardrail rejection
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SecurityError {
    #[error("Access denied: Path '{}' is outside allowed workspace", .path.display())]
    PathOutsideWorkspace { path: PathBuf },

    #[error("Command blocked: '{pattern}' is forbidden")]
    ForbiddenCommand { pattern: String },
}

/// Failures surfaced by the agent
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AgentError {
    #[error("Tool {0} not found")]
    ToolNotFound(String),

    #[error("Invalid input for {tool}: {reason}")]
    InvalidInput { tool: String, reason: String },

    #[error("Execution failed: {0}")]
    ToolExecution(String),

    #[error("SECURITY VIOLATION: {0}")]
    Security(#[from] SecurityError),

    #[error("Max loops exceeded")]
    LoopBudgetExceeded,

    #[error("Plan blocked: no runnable subtasks")]
    BlockedPlan,

    #[error("Run cancelled")]
    Cancelled,

    #[error("Run failed: {0}")]
    RunPanicked(String),
}
