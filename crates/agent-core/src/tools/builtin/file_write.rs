//! File write tool

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio::io::AsyncWriteExt;

use crate::tools::{parse_input, ParameterProperty, ParameterSchema, Tool, ToolContext};
use crate::types::ToolOutput;

#[derive(Debug, Deserialize)]
struct WriteFileInput {
    #[serde(alias = "file_path", alias = "filepath")]
    path: String,
    content: String,
    #[serde(default)]
    mode: Option<String>,
}

/// Tool for writing or appending file contents
pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write text to a file in the workspace. Creates parent directories as needed."
    }

    fn parameters_schema(&self) -> ParameterSchema {
        ParameterSchema::new()
            .with_required(
                "path",
                ParameterProperty::string("The path to write to (absolute or relative)")
                    .with_aliases(&["file_path", "filepath"]),
            )
            .with_required("content", ParameterProperty::string("The content to write to the file"))
            .with_property(
                "mode",
                ParameterProperty::string("'w' to overwrite, 'a' to append (default: 'w')")
                    .with_enum(vec!["w".to_string(), "a".to_string()])
                    .with_default(Value::String("w".to_string())),
            )
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<ToolOutput> {
        let input: WriteFileInput = match parse_input(self.name(), args) {
            Ok(i) => i,
            Err(e) => return Ok(ToolOutput::failure(e.to_string())),
        };

        let append = input.mode.as_deref() == Some("a");
        let path = ctx.resolve(&input.path);

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                if let Err(e) = tokio::fs::create_dir_all(parent).await {
                    return Ok(ToolOutput::failure(format!("Failed to create directories: {}", e)));
                }
            }
        }

        let result = if append {
            match tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await
            {
                Ok(mut f) => f.write_all(input.content.as_bytes()).await,
                Err(e) => Err(e),
            }
        } else {
            tokio::fs::write(&path, &input.content).await
        };

        match result {
            Ok(()) => {
                let verb = if append { "appended to" } else { "wrote to" };
                Ok(ToolOutput::success(format!(
                    "Successfully {} {} ({} bytes)",
                    verb,
                    path.display(),
                    input.content.len()
                )))
            }
            Err(e) => Ok(ToolOutput::failure(format!("Failed to write file: {}", e))),
        }
    }
}
