//! Agent framework for autonomous task execution
//!
//! Implements a plan, think, act, observe loop over a small local model.

mod agent_loop;
mod prompts;
mod state;

pub use agent_loop::Agent;
pub use prompts::{semantic_context, THINK_SYSTEM_PROMPT};
pub use state::{AgentConfig, RunProgress};
