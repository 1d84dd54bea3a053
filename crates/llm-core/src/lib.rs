//! llm-core: Shared library for talking to a local model
//!
//! Provides:
//! - The `Generator` contract used by the agent as its reasoning oracle
//! - Ollama API client
//! - Configuration loading (agent.toml + environment)

pub mod config;
pub mod generator;
pub mod ollama;

pub use config::Config;
pub use generator::{Generator, OllamaGenerator, ScriptedGenerator, DEFAULT_SYSTEM_PROMPT};
pub use ollama::{ChatMessage, ChatOptions, ChatResponse, Model, OllamaClient, Role};
