//! Offline web search tool
//!
//! Returns a canned result set chosen by query keywords so runs stay
//! deterministic and work without network access or API keys.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::tools::{parse_input, ParameterProperty, ParameterSchema, Tool, ToolContext};
use crate::types::ToolOutput;

const DEFAULT_MAX_RESULTS: usize = 3;

#[derive(Debug, Deserialize)]
struct WebSearchInput {
    query: String,
    #[serde(default, alias = "limit")]
    max_results: Option<usize>,
}

/// A single search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub snippet: String,
    pub link: String,
}

impl SearchResult {
    fn new(title: impl Into<String>, snippet: &str, link: &str) -> Self {
        Self {
            title: title.into(),
            snippet: snippet.to_string(),
            link: link.to_string(),
        }
    }
}

/// Tool for searching the web
pub struct WebSearchTool;

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the internet for up-to-date information. Use this when you need current facts."
    }

    fn parameters_schema(&self) -> ParameterSchema {
        ParameterSchema::new()
            .with_required("query", ParameterProperty::string("The search query"))
            .with_property(
                "max_results",
                ParameterProperty::integer("Number of results to return (default: 3)")
                    .with_default(Value::Number(DEFAULT_MAX_RESULTS.into()))
                    .with_aliases(&["limit"]),
            )
    }

    #[instrument(skip(self, args, _ctx))]
    async fn execute(&self, args: &Value, _ctx: &ToolContext) -> Result<ToolOutput> {
        let input: WebSearchInput = match parse_input(self.name(), args) {
            Ok(i) => i,
            Err(e) => return Ok(ToolOutput::failure(e.to_string())),
        };

        let limit = input.max_results.unwrap_or(DEFAULT_MAX_RESULTS);
        let mut results = canned_results(&input.query);
        results.truncate(limit);
        debug!(count = results.len(), "Search results");

        Ok(ToolOutput::success(serde_json::to_value(results)?))
    }
}

fn canned_results(query: &str) -> Vec<SearchResult> {
    let lower = query.to_lowercase();

    if lower.contains("python") {
        vec![
            SearchResult::new(
                "Python 3.12 Release Notes",
                "Python 3.12 introduces flexible f-strings and better error messages.",
                "https://docs.python.org/3.12/",
            ),
            SearchResult::new(
                "Real Python: What's new in 3.12",
                "Detailed breakdown of the new GIL features and performance boosts.",
                "https://realpython.com/",
            ),
        ]
    } else if lower.contains("agent") {
        vec![
            SearchResult::new(
                "Agentic AI Overview",
                "Autonomous agents are the next frontier of AI.",
                "https://ai-news.com/agents",
            ),
            SearchResult::new(
                "Building ReAct Agents",
                "How to implement reasoning loops with LLMs.",
                "https://arxiv.org/",
            ),
        ]
    } else {
        vec![
            SearchResult::new(
                format!("Results for {}", query),
                "Generic placeholder search result 1.",
                "http://example.com/1",
            ),
            SearchResult::new(
                format!("More on {}", query),
                "Generic placeholder search result 2.",
                "http://example.com/2",
            ),
        ]
    }
}
