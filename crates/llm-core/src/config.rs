//! Configuration management for agent.toml
//!
//! Lookup order: explicit path, then `agent.toml` in the current directory
//! or one of its parents, then built-in defaults. Environment variables are
//! applied on top of whichever source won.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Name of the configuration file searched for on disk
pub const CONFIG_FILE_NAME: &str = "agent.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub agent: AgentSection,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub safety: SafetyConfig,
}

/// Text-generation provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub temperature: f32,
}

/// Execution loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSection {
    /// Maximum Think/Act iterations per run
    #[serde(default = "default_max_loops")]
    pub max_loops: usize,
    /// Working directory for tools (defaults to the current directory)
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    /// Default `run_command` timeout
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
    /// Replaces the built-in Think system prompt
    #[serde(default)]
    pub system_prompt: Option<String>,
}

/// Durable semantic memory settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Store file; defaults to the platform data directory
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Tools whose successful output is remembered
    #[serde(default = "default_evidence_tools")]
    pub evidence_tools: Vec<String>,
    /// Documents pulled into the prompt at run start
    #[serde(default = "default_retrieve_limit")]
    pub retrieve_limit: usize,
}

/// Pre-execution guardrail policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyConfig {
    /// Roots that path-touching tools must stay inside (defaults to the working directory)
    #[serde(default)]
    pub allowed_roots: Vec<PathBuf>,
    #[serde(default = "default_forbidden_commands")]
    pub forbidden_commands: Vec<String>,
    #[serde(default = "default_path_tools")]
    pub path_tools: Vec<String>,
    #[serde(default = "default_command_tools")]
    pub command_tools: Vec<String>,
}

fn default_model() -> String {
    "llama3.2".to_string()
}

fn default_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_command_timeout_secs() -> u64 {
    120
}

fn default_max_loops() -> usize {
    15
}

fn default_evidence_tools() -> Vec<String> {
    vec!["web_search".to_string(), "read_file".to_string()]
}

fn default_retrieve_limit() -> usize {
    3
}

fn default_forbidden_commands() -> Vec<String> {
    ["rm -rf", "sudo", "chmod", "mkfs"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_path_tools() -> Vec<String> {
    vec!["read_file".to_string(), "write_file".to_string()]
}

fn default_command_tools() -> Vec<String> {
    vec!["run_command".to_string()]
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            temperature: 0.0,
        }
    }
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_loops: default_max_loops(),
            working_dir: None,
            command_timeout_secs: default_command_timeout_secs(),
            system_prompt: None,
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            path: None,
            evidence_tools: default_evidence_tools(),
            retrieve_limit: default_retrieve_limit(),
        }
    }
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            allowed_roots: Vec::new(),
            forbidden_commands: default_forbidden_commands(),
            path_tools: default_path_tools(),
            command_tools: default_command_tools(),
        }
    }
}

impl Config {
    /// Load configuration from the explicit path or by searching, then apply env overrides
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::load_from(path)?,
            None => match Self::find_config_path() {
                Some(path) => Self::load_from(path)?,
                None => {
                    debug!("No {} found, using defaults", CONFIG_FILE_NAME);
                    Self::default()
                }
            },
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read {}", path.as_ref().display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.as_ref().display()))
    }

    /// Find agent.toml by searching current directory and parents
    pub fn find_config_path() -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;

        for _ in 0..10 {
            let candidate = current.join(CONFIG_FILE_NAME);
            if candidate.exists() {
                return Some(candidate);
            }
            if !current.pop() {
                break;
            }
        }

        None
    }

    /// Apply `AGENT_MODEL_NAME`, `OLLAMA_BASE_URL`, `MAX_LOOPS` and `AGENT_MEMORY_PATH`
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(model) = lookup("AGENT_MODEL_NAME") {
            self.provider.model = model;
        }
        if let Some(url) = lookup("OLLAMA_BASE_URL") {
            self.provider.base_url = url;
        }
        if let Some(raw) = lookup("MAX_LOOPS") {
            match raw.parse::<usize>() {
                Ok(n) if n > 0 => self.agent.max_loops = n,
                _ => warn!(value = %raw, "Ignoring invalid MAX_LOOPS"),
            }
        }
        if let Some(path) = lookup("AGENT_MEMORY_PATH") {
            self.memory.path = Some(PathBuf::from(path));
        }
    }

    /// Working directory for tools and guardrail path resolution
    pub fn working_dir(&self) -> PathBuf {
        self.agent
            .working_dir
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Allowed roots for path-touching tools, falling back to the working directory
    pub fn allowed_roots(&self) -> Vec<PathBuf> {
        if self.safety.allowed_roots.is_empty() {
            vec![self.working_dir()]
        } else {
            self.safety.allowed_roots.clone()
        }
    }

    /// Semantic memory store location
    pub fn memory_path(&self) -> PathBuf {
        self.memory.path.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("quant-agent")
                .join("memory.json")
        })
    }
}
