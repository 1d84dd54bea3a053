//! Tool framework for agent-based execution
//!
//! Tools are looked up by name at runtime. Every tool validates its own
//! typed input and reports failures through `ToolOutput` instead of
//! raising; the registry catches anything that still slips out.

pub mod builtin;
pub mod registry;

use anyhow::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::AgentError;
use crate::types::ToolOutput;

pub use registry::ToolRegistry;

/// Context provided to tools during execution
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Directory relative paths resolve against
    pub working_dir: PathBuf,
    /// Maximum output length (truncate if exceeded)
    pub max_output_len: usize,
    /// Default timeout for command execution in seconds
    pub command_timeout_secs: u64,
}

impl Default for ToolContext {
    fn default() -> Self {
        Self {
            working_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            max_output_len: 50000,
            command_timeout_secs: 120,
        }
    }
}

impl ToolContext {
    /// Create a new context with the given working directory
    pub fn new(working_dir: PathBuf) -> Self {
        Self {
            working_dir,
            ..Default::default()
        }
    }

    /// Set command timeout
    pub fn with_command_timeout(mut self, secs: u64) -> Self {
        self.command_timeout_secs = secs;
        self
    }

    /// Resolve a tool-supplied path against the working directory
    pub fn resolve(&self, path: &str) -> PathBuf {
        let candidate = Path::new(path);
        if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.working_dir.join(candidate)
        }
    }

    /// Truncate output at a char boundary, noting the cut
    pub fn truncate(&self, output: String) -> String {
        if output.len() <= self.max_output_len {
            return output;
        }
        let safe_end = output
            .char_indices()
            .take_while(|(idx, _)| *idx < self.max_output_len)
            .last()
            .map(|(idx, c)| idx + c.len_utf8())
            .unwrap_or(0);
        format!(
            "{}\n\n[Output truncated at {} characters]",
            &output[..safe_end],
            safe_end
        )
    }
}

/// Schema for a tool parameter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterProperty {
    /// Parameter type (string, number, integer, boolean, array, object)
    #[serde(rename = "type")]
    pub param_type: String,
    /// Parameter description
    pub description: String,
    /// Enum values if applicable
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
    /// Default value if applicable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Alternate argument names accepted in place of this one
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
}

impl ParameterProperty {
    fn typed(param_type: &str, description: impl Into<String>) -> Self {
        Self {
            param_type: param_type.to_string(),
            description: description.into(),
            enum_values: None,
            default: None,
            aliases: Vec::new(),
        }
    }

    pub fn string(description: impl Into<String>) -> Self {
        Self::typed("string", description)
    }

    pub fn integer(description: impl Into<String>) -> Self {
        Self::typed("integer", description)
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn with_enum(mut self, values: Vec<String>) -> Self {
        self.enum_values = Some(values);
        self
    }

    pub fn with_aliases(mut self, aliases: &[&str]) -> Self {
        self.aliases = aliases.iter().map(|a| a.to_string()).collect();
        self
    }

    fn accepts(&self, value: &Value) -> bool {
        let type_ok = match self.param_type.as_str() {
            "string" => value.is_string(),
            "number" => value.is_number(),
            "integer" => value.is_i64() || value.is_u64(),
            "boolean" => value.is_boolean(),
            "array" => value.is_array(),
            "object" => value.is_object(),
            _ => true,
        };
        let enum_ok = match (&self.enum_values, value.as_str()) {
            (Some(allowed), Some(s)) => allowed.iter().any(|a| a == s),
            _ => true,
        };
        type_ok && enum_ok
    }
}

/// Schema describing tool parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterSchema {
    /// Type is always "object"
    #[serde(rename = "type")]
    pub schema_type: String,
    /// Parameter properties, ordered by name
    pub properties: BTreeMap<String, ParameterProperty>,
    /// Required parameter names, in declaration order
    #[serde(default)]
    pub required: Vec<String>,
}

impl ParameterSchema {
    pub fn new() -> Self {
        Self {
            schema_type: "object".to_string(),
            properties: BTreeMap::new(),
            required: Vec::new(),
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, prop: ParameterProperty) -> Self {
        self.properties.insert(name.into(), prop);
        self
    }

    pub fn with_required(mut self, name: impl Into<String>, prop: ParameterProperty) -> Self {
        let name = name.into();
        self.properties.insert(name.clone(), prop);
        self.required.push(name);
        self
    }

    /// Parameter names with required ones first
    pub fn argument_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.required.iter().map(String::as_str).collect();
        names.extend(
            self.properties
                .keys()
                .map(String::as_str)
                .filter(|k| !self.required.iter().any(|r| r == k)),
        );
        names
    }

    /// Property declared under `name` or one of its aliases
    fn property(&self, name: &str) -> Option<&ParameterProperty> {
        self.properties.get(name).or_else(|| {
            self.properties
                .values()
                .find(|p| p.aliases.iter().any(|a| a == name))
        })
    }

    /// Check presence of required arguments and the type of known ones
    pub fn validate(&self, args: &Value) -> std::result::Result<(), String> {
        let obj = args
            .as_object()
            .ok_or_else(|| "arguments must be a JSON object".to_string())?;

        for name in &self.required {
            let aliases = self.properties.get(name).map_or(&[][..], |p| p.aliases.as_slice());
            let present = std::iter::once(name)
                .chain(aliases)
                .any(|key| obj.get(key).is_some_and(|v| !v.is_null()));
            if !present {
                return Err(format!("missing required parameter '{}'", name));
            }
        }

        for (name, value) in obj {
            if value.is_null() {
                continue;
            }
            if let Some(prop) = self.property(name) {
                if !prop.accepts(value) {
                    return Err(format!(
                        "parameter '{}' must be of type {}",
                        name, prop.param_type
                    ));
                }
            }
        }

        Ok(())
    }
}

impl Default for ParameterSchema {
    fn default() -> Self {
        Self::new()
    }
}

/// Exported description of a tool for prompt construction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: ParameterSchema,
}

impl ToolDefinition {
    /// `name(arg1, arg2): description`, the compact form small models follow best
    pub fn signature(&self) -> String {
        format!(
            "{}({}): {}",
            self.name,
            self.parameters.argument_names().join(", "),
            self.description
        )
    }
}

/// Deserialize arguments into a tool's typed input
pub fn parse_input<T: DeserializeOwned>(tool: &str, args: &Value) -> std::result::Result<T, AgentError> {
    serde_json::from_value(args.clone()).map_err(|e| AgentError::InvalidInput {
        tool: tool.to_string(),
        reason: e.to_string(),
    })
}

/// The Tool trait that all tools must implement
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool name
    fn name(&self) -> &str;

    /// Get a description of what the tool does
    fn description(&self) -> &str;

    /// Get the parameter schema
    fn parameters_schema(&self) -> ParameterSchema;

    /// Execute the tool with already validated arguments
    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<ToolOutput>;

    /// Convert to an exported definition
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> ParameterSchema {
        ParameterSchema::new()
            .with_required("query", ParameterProperty::string("Search query"))
            .with_property("max_results", ParameterProperty::integer("Result count"))
            .with_property(
                "mode",
                ParameterProperty::string("Mode").with_enum(vec!["w".into(), "a".into()]),
            )
    }

    #[test]
    fn test_validate_accepts_good_args() {
        assert!(schema().validate(&json!({"query": "rust", "max_results": 2})).is_ok());
        assert!(schema().validate(&json!({"query": "rust", "extra": true})).is_ok());
    }

    #[test]
    fn test_validate_rejects_missing_required() {
        let err = schema().validate(&json!({"max_results": 2})).unwrap_err();
        assert!(err.contains("'query'"));
        assert!(schema().validate(&json!({"query": null})).is_err());
    }

    #[test]
    fn test_validate_rejects_wrong_type_and_enum() {
        assert!(schema().validate(&json!({"query": 5})).is_err());
        assert!(schema().validate(&json!({"query": "x", "max_results": 1.5})).is_err());
        assert!(schema().validate(&json!({"query": "x", "mode": "rw"})).is_err());
        assert!(schema().validate(&json!("query")).is_err());
    }

    #[test]
    fn test_validate_accepts_aliases() {
        let schema = ParameterSchema::new().with_required(
            "path",
            ParameterProperty::string("File").with_aliases(&["file_path", "filepath"]),
        );
        assert!(schema.validate(&json!({"path": "a.txt"})).is_ok());
        assert!(schema.validate(&json!({"file_path": "a.txt"})).is_ok());
        assert!(schema.validate(&json!({"filepath": "a.txt"})).is_ok());
        assert!(schema.validate(&json!({"filepath": 3})).is_err());
        assert!(schema.validate(&json!({"file_path": null})).is_err());
        assert!(schema.validate(&json!({"name": "a.txt"})).is_err());
    }

    #[test]
    fn test_signature_lists_required_first() {
        let def = ToolDefinition {
            name: "web_search".to_string(),
            description: "Search".to_string(),
            parameters: schema(),
        };
        assert_eq!(def.signature(), "web_search(query, max_results, mode): Search");
    }

    #[test]
    fn test_context_resolve_and_truncate() {
        let ctx = ToolContext {
            working_dir: PathBuf::from("/workspace"),
            max_output_len: 5,
            command_timeout_secs: 1,
        };
        assert_eq!(ctx.resolve("notes.txt"), PathBuf::from("/workspace/notes.txt"));
        assert_eq!(ctx.resolve("/etc/hosts"), PathBuf::from("/etc/hosts"));

        let out = ctx.truncate("héllo world".to_string());
        assert!(out.starts_with("héll"));
        assert!(out.contains("[Output truncated"));
        assert_eq!(ctx.truncate("abc".to_string()), "abc");
    }

    #[test]
    fn test_parse_input_reports_invalid_input() {
        #[derive(Debug, Deserialize)]
        struct Input {
            #[allow(dead_code)]
            expression: String,
        }
        let err = parse_input::<Input>("calculator", &json!({"expr": "1"})).unwrap_err();
        assert!(matches!(err, AgentError::InvalidInput { .. }));
    }
}
