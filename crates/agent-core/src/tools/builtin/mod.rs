//! Built-in tools for the agent framework

mod calculator;
mod file_read;
mod file_write;
mod run_command;
mod web_search;

pub use calculator::{evaluate, CalculatorTool};
pub use file_read::ReadFileTool;
pub use file_write::WriteFileTool;
pub use run_command::RunCommandTool;
pub use web_search::{SearchResult, WebSearchTool};

use std::path::PathBuf;

use super::registry::ToolRegistry;
use super::ToolContext;

/// Create a registry with all default tools, plus the context they run in
pub fn create_default_registry(working_dir: PathBuf) -> (ToolRegistry, ToolContext) {
    let mut registry = ToolRegistry::new();

    // Pure / read-only
    registry.register(CalculatorTool);
    registry.register(WebSearchTool);
    registry.register(ReadFileTool);

    // Write/execute, gated by the safety guardrails
    registry.register(WriteFileTool);
    registry.register(RunCommandTool);

    (registry, ToolContext::new(working_dir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Action;
    use serde_json::{json, Value};
    use tempfile::TempDir;

    async fn dispatch(registry: &ToolRegistry, ctx: &ToolContext, tool: &str, args: Value) -> crate::types::ToolOutput {
        registry.execute(&Action::new(tool, args, ""), ctx).await
    }

    #[test]
    fn test_default_registry_contents() {
        let (registry, ctx) = create_default_registry(PathBuf::from("/workspace"));
        assert_eq!(
            registry.list_names(),
            vec!["calculator", "read_file", "run_command", "web_search", "write_file"]
        );
        assert_eq!(ctx.working_dir, PathBuf::from("/workspace"));
        assert!(registry.signatures().contains("calculator(expression): "));
    }

    #[tokio::test]
    async fn test_alternate_argument_names_dispatch() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "hello").unwrap();
        let (registry, ctx) = create_default_registry(dir.path().to_path_buf());

        for key in ["path", "file_path", "filepath"] {
            let mut args = serde_json::Map::new();
            args.insert(key.to_string(), json!("notes.txt"));
            let out = dispatch(&registry, &ctx, "read_file", Value::Object(args)).await;
            assert!(out.success, "{}: {:?}", key, out.error);
            assert_eq!(out.result, Some(json!("hello")));
        }

        let out = dispatch(
            &registry,
            &ctx,
            "write_file",
            json!({"filepath": "out.txt", "content": "written"}),
        )
        .await;
        assert!(out.success, "{:?}", out.error);
        assert_eq!(std::fs::read_to_string(dir.path().join("out.txt")).unwrap(), "written");

        let out = dispatch(&registry, &ctx, "web_search", json!({"query": "rust", "limit": 1})).await;
        assert!(out.success);

        let out = dispatch(&registry, &ctx, "read_file", json!({"name": "notes.txt"})).await;
        assert_eq!(
            out.error.as_deref(),
            Some("Invalid input for read_file: missing required parameter 'path'")
        );
    }
}
