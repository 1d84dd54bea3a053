//! Tool registry for managing and dispatching available tools

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use super::{Tool, ToolContext, ToolDefinition};
use crate::error::AgentError;
use crate::types::{Action, ToolOutput};

/// Registry of available tools
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. A later registration under the same name replaces the earlier one.
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        self.register_arc(Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            debug!(tool = %name, "Replaced existing tool registration");
        }
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// List all registered tool names, sorted
    pub fn list_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Get tool definitions, sorted by name
    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self.tools.values().map(|t| t.to_definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// One `name(args): description` line per tool
    pub fn signatures(&self) -> String {
        self.tool_definitions()
            .iter()
            .map(ToolDefinition::signature)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Look up, validate and execute an action. Never fails: every problem
    /// becomes a failed `ToolOutput`.
    #[instrument(skip(self, action, ctx), fields(tool = %action.tool_name))]
    pub async fn execute(&self, action: &Action, ctx: &ToolContext) -> ToolOutput {
        let tool = match self.get(&action.tool_name) {
            Some(t) => t,
            None => {
                warn!(tool = %action.tool_name, "Tool not found");
                return ToolOutput::failure(AgentError::ToolNotFound(action.tool_name.clone()).to_string());
            }
        };

        if let Err(reason) = tool.parameters_schema().validate(&action.tool_args) {
            warn!(tool = %action.tool_name, %reason, "Invalid tool input");
            return ToolOutput::failure(
                AgentError::InvalidInput {
                    tool: action.tool_name.clone(),
                    reason,
                }
                .to_string(),
            );
        }

        info!(tool = %action.tool_name, "Executing tool");
        match tool.execute(&action.tool_args, ctx).await {
            Ok(output) => {
                if output.success {
                    debug!(tool = %action.tool_name, "Tool executed successfully");
                } else {
                    warn!(tool = %action.tool_name, error = ?output.error, "Tool execution failed");
                }
                output
            }
            Err(e) => {
                warn!(tool = %action.tool_name, error = %e, "Tool execution error");
                ToolOutput::failure(AgentError::ToolExecution(format!("{:#}", e)).to_string())
            }
        }
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.list_names())
            .finish()
    }
}
