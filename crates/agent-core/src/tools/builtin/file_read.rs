//! File read tool

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::tools::{parse_input, ParameterProperty, ParameterSchema, Tool, ToolContext};
use crate::types::ToolOutput;

#[derive(Debug, Deserialize)]
struct ReadFileInput {
    #[serde(alias = "file_path", alias = "filepath")]
    path: String,
}

/// Tool for reading file contents
pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a text file in the workspace."
    }

    fn parameters_schema(&self) -> ParameterSchema {
        ParameterSchema::new().with_required(
            "path",
            ParameterProperty::string("The path to the file to read (absolute or relative to working directory)")
                .with_aliases(&["file_path", "filepath"]),
        )
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<ToolOutput> {
        let input: ReadFileInput = match parse_input(self.name(), args) {
            Ok(i) => i,
            Err(e) => return Ok(ToolOutput::failure(e.to_string())),
        };

        let path = ctx.resolve(&input.path);

        if !path.exists() {
            return Ok(ToolOutput::failure(format!("File not found: {}", path.display())));
        }
        if !path.is_file() {
            return Ok(ToolOutput::failure(format!("Not a file: {}", path.display())));
        }

        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(ToolOutput::success(ctx.truncate(content))),
            Err(e) => Ok(ToolOutput::failure(format!("Failed to read file: {}", e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    #[tokio::test]
    async fn test_read_file() {
        let mut temp = NamedTempFile::new().unwrap();
        writeln!(temp, "line 1").unwrap();
        writeln!(temp, "line 2").unwrap();

        let args = json!({ "path": temp.path().to_str().unwrap() });
        let out = ReadFileTool.execute(&args, &ToolContext::default()).await.unwrap();
        assert!(out.success);
        assert_eq!(out.result, Some(json!("line 1\nline 2\n")));
    }

    #[tokio::test]
    async fn test_read_relative_to_working_dir() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "remember the milk").unwrap();

        let ctx = ToolContext::new(dir.path().to_path_buf());
        let out = ReadFileTool.execute(&json!({"filepath": "notes.txt"}), &ctx).await.unwrap();
        assert_eq!(out.summary(), "remember the milk");
    }

    #[tokio::test]
    async fn test_read_nonexistent_file() {
        let args = json!({ "path": "/nonexistent/path/file.txt" });
        let out = ReadFileTool.execute(&args, &ToolContext::default()).await.unwrap();
        assert!(!out.success);
        assert!(out.error.unwrap().contains("File not found"));
    }

    #[tokio::test]
    async fn test_read_directory_fails() {
        let dir = TempDir::new().unwrap();
        let args = json!({ "path": dir.path().to_str().unwrap() });
        let out = ReadFileTool.execute(&args, &ToolContext::default()).await.unwrap();
        assert!(out.error.unwrap().starts_with("Not a file"));
    }
}
