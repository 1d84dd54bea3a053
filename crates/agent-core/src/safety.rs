//! Pre-execution safety checks on proposed actions
//!
//! A last line of defense, not a sandbox: paths are checked lexically
//! against the allowed roots and commands against a substring blocklist.

use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

use crate::error::SecurityError;
use crate::types::Action;

/// Argument keys that may carry a filesystem path
const PATH_ARG_KEYS: &[&str] = &["path", "file_path", "filepath"];
const COMMAND_ARG_KEYS: &[&str] = &["command", "cmd"];

/// Stateless policy gate applied before every tool execution
#[derive(Debug, Clone)]
pub struct SafetyGuardrails {
    allowed_roots: Vec<PathBuf>,
    forbidden_commands: Vec<String>,
    working_dir: PathBuf,
    path_tools: Vec<String>,
    command_tools: Vec<String>,
}

impl SafetyGuardrails {
    /// Guardrails rooted at `working_dir` with the default tool sets and blocklist
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        let working_dir = absolute(working_dir.into());
        Self {
            allowed_roots: vec![working_dir.clone()],
            forbidden_commands: ["rm -rf", "sudo", "chmod", "mkfs"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            working_dir,
            path_tools: vec!["read_file".to_string(), "write_file".to_string()],
            command_tools: vec!["run_command".to_string()],
        }
    }

    /// Build from the `[safety]` config section
    pub fn from_config(config: &llm_core::Config) -> Self {
        Self::new(config.working_dir())
            .with_allowed_roots(config.allowed_roots())
            .with_forbidden_commands(config.safety.forbidden_commands.clone())
            .with_path_tools(config.safety.path_tools.clone())
            .with_command_tools(config.safety.command_tools.clone())
    }

    pub fn with_allowed_roots(mut self, roots: Vec<PathBuf>) -> Self {
        let working_dir = self.working_dir.clone();
        self.allowed_roots = roots
            .into_iter()
            .map(|root| normalize(&working_dir, &root))
            .collect();
        self
    }

    pub fn with_forbidden_commands(mut self, patterns: Vec<String>) -> Self {
        self.forbidden_commands = patterns;
        self
    }

    pub fn with_path_tools(mut self, tools: Vec<String>) -> Self {
        self.path_tools = tools;
        self
    }

    pub fn with_command_tools(mut self, tools: Vec<String>) -> Self {
        self.command_tools = tools;
        self
    }

    pub fn allowed_roots(&self) -> &[PathBuf] {
        &self.allowed_roots
    }

    /// Accept or reject an action before it runs
    pub fn validate(&self, action: &Action) -> Result<(), SecurityError> {
        let tool = action.tool_name.as_str();

        if self.path_tools.iter().any(|t| t == tool) {
            if let Some(path) = action.str_arg(PATH_ARG_KEYS) {
                self.check_path(path)?;
            }
        }

        if self.command_tools.iter().any(|t| t == tool) {
            let command = action.str_arg(COMMAND_ARG_KEYS).unwrap_or("");
            self.check_command(command)?;
        }

        debug!(tool, "Action validated");
        Ok(())
    }

    fn check_path(&self, path: &str) -> Result<(), SecurityError> {
        let resolved = normalize(&self.working_dir, Path::new(path));
        if self.allowed_roots.iter().any(|root| resolved.starts_with(root)) {
            return Ok(());
        }
        warn!(path, resolved = %resolved.display(), "Path outside allowed roots");
        Err(SecurityError::PathOutsideWorkspace {
            path: PathBuf::from(path),
        })
    }

    fn check_command(&self, command: &str) -> Result<(), SecurityError> {
        match self
            .forbidden_commands
            .iter()
            .find(|pattern| !pattern.is_empty() && command.contains(pattern.as_str()))
        {
            Some(pattern) => {
                warn!(command, pattern = %pattern, "Forbidden command");
                Err(SecurityError::ForbiddenCommand {
                    pattern: pattern.clone(),
                })
            }
            None => Ok(()),
        }
    }
}

fn absolute(path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        return path;
    }
    match std::env::current_dir() {
        Ok(cwd) => normalize(&cwd, &path),
        Err(_) => path,
    }
}

/// Absolute, lexically normalised form of `path`. `..` never climbs above the root.
fn normalize(base: &Path, path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };

    let mut out = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(part) => out.push(part),
        }
    }
    out
}
