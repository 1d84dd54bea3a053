//! Text-generation provider contract
//!
//! The agent treats the model as an oracle that always answers with text.
//! Transport failures are folded into an error-describing string so callers
//! never have to handle a missing response.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use tracing::{debug, warn};

use crate::ollama::{ChatMessage, ChatOptions, OllamaClient};

/// Default system prompt when the caller has none
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant.";

/// A text-completion provider
#[async_trait]
pub trait Generator: Send + Sync {
    /// Generate a completion. Must not fail: errors come back as text.
    async fn generate(&self, prompt: &str, system_prompt: &str) -> String;
}

/// Generator backed by a local Ollama server
#[derive(Debug, Clone)]
pub struct OllamaGenerator {
    client: OllamaClient,
    model: String,
    options: ChatOptions,
}

impl OllamaGenerator {
    pub fn new(client: OllamaClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            options: ChatOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ChatOptions) -> Self {
        self.options = options;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    async fn generate(&self, prompt: &str, system_prompt: &str) -> String {
        let messages = [ChatMessage::system(system_prompt), ChatMessage::user(prompt)];

        debug!(model = %self.model, prompt_len = prompt.len(), "Calling model");
        match self.client.chat(&self.model, &messages, &self.options).await {
            Ok(text) => text,
            Err(e) => {
                warn!(model = %self.model, error = %e, "Generation failed");
                format!("Error: {:#}", e)
            }
        }
    }
}

/// Generator that replays queued responses, then repeats a fallback.
///
/// Records every prompt it receives so tests can assert on prompt contents.
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    responses: Mutex<VecDeque<String>>,
    fallback: String,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
            fallback: String::new(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Response returned once the queue is exhausted
    pub fn with_fallback(mut self, fallback: impl Into<String>) -> Self {
        self.fallback = fallback.into();
        self
    }

    /// Always answer with the same text
    pub fn repeating(text: impl Into<String>) -> Self {
        Self::new(Vec::<String>::new()).with_fallback(text)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().len()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, prompt: &str, _system_prompt: &str) -> String {
        self.prompts.lock().push(prompt.to_string());
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}
