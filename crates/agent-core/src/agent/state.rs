//! Agent configuration and progress shared with observers

use parking_lot::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::types::Plan;

/// Configuration for the agent
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Iteration budget per run
    pub max_loops: usize,
    /// Tools whose successful results are written to semantic memory
    pub evidence_tools: Vec<String>,
    /// Documents recalled into the prompt context at run start
    pub retrieve_limit: usize,
    /// Overrides the built-in Think system prompt
    pub system_prompt: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_loops: 15,
            evidence_tools: vec!["web_search".to_string(), "read_file".to_string()],
            retrieve_limit: 3,
            system_prompt: None,
        }
    }
}

impl AgentConfig {
    pub fn from_config(config: &llm_core::Config) -> Self {
        Self {
            max_loops: config.agent.max_loops,
            evidence_tools: config.memory.evidence_tools.clone(),
            retrieve_limit: config.memory.retrieve_limit,
            system_prompt: config.agent.system_prompt.clone(),
        }
    }

    pub fn with_max_loops(mut self, max: usize) -> Self {
        self.max_loops = max;
        self
    }

    pub fn with_evidence_tools(mut self, tools: Vec<String>) -> Self {
        self.evidence_tools = tools;
        self
    }

    pub fn with_retrieve_limit(mut self, limit: usize) -> Self {
        self.retrieve_limit = limit;
        self
    }

    pub fn is_evidence_tool(&self, name: &str) -> bool {
        self.evidence_tools.iter().any(|t| t == name)
    }
}

/// Live view of a run, written by the agent and read by the run manager
#[derive(Debug, Default)]
pub struct RunProgress {
    step_count: AtomicUsize,
    plan: RwLock<Option<Plan>>,
}

impl RunProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step_count(&self) -> usize {
        self.step_count.load(Ordering::Acquire)
    }

    pub(crate) fn set_step_count(&self, count: usize) {
        self.step_count.store(count, Ordering::Release);
    }

    pub fn plan(&self) -> Option<Plan> {
        self.plan.read().clone()
    }

    pub(crate) fn set_plan(&self, plan: &Plan) {
        *self.plan.write() = Some(plan.clone());
    }
}
