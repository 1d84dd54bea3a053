//! agent-core: single-agent task execution
//!
//! A goal is decomposed into a dependency-ordered plan, then worked through
//! one step at a time: the model proposes an action, the guardrails vet it,
//! a tool runs it, and the observation feeds the next prompt.

pub mod agent;
pub mod error;
pub mod events;
pub mod memory;
pub mod parse;
pub mod planner;
pub mod runs;
pub mod safety;
pub mod tools;
pub mod types;

pub use agent::{Agent, AgentConfig, RunProgress};
pub use error::{AgentError, SecurityError};
pub use events::{EventSink, NoopSink, RunEvent, RunEventStream};
pub use memory::{Document, SemanticMemory, WorkingMemory};
pub use parse::parse_thought;
pub use planner::Planner;
pub use runs::{AgentEnvironment, RunDetail, RunManager, RunStatus, RunSummary};
pub use safety::SafetyGuardrails;
pub use tools::builtin::create_default_registry;
pub use tools::{Tool, ToolContext, ToolRegistry};
pub use types::{Action, AgentResult, Plan, Step, SubTask, TaskId, TaskStatus, Thought, ToolOutput};
