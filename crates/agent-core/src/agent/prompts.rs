//! Prompt construction for the Think phase

use crate::memory::Document;

pub const THINK_SYSTEM_PROMPT: &str = r#"You are a helpful AI assistant.
You must complete the current subtask.

FORMAT INSTRUCTIONS:
1. To use a tool:
Thought: <reasoning>
Action: <tool_name>
Action Input: {<json_args>}

2. To answer directly (or when the subtask is done):
Thought: <reasoning>
Final Answer: <your response>

Examples:
Thought: I need to search for python documentation.
Action: web_search
Action Input: {"query": "python documentation"}

Thought: The calculator returned 1000, so the subtask is done.
Final Answer: 50 * 20 = 1000
"#;

pub const NO_CONTEXT: &str = "No relevant past knowledge.";

/// Render recalled documents as a bullet list
pub fn semantic_context(documents: &[Document]) -> String {
    if documents.is_empty() {
        return NO_CONTEXT.to_string();
    }
    documents
        .iter()
        .map(|d| format!("- {}", d.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Inputs to one Think prompt
pub struct ThinkPrompt<'a> {
    pub goal: &'a str,
    pub subtask: &'a str,
    pub context: &'a str,
    pub tools: &'a str,
    pub history: &'a str,
}

impl ThinkPrompt<'_> {
    pub fn render(&self) -> String {
        format!(
            "GOAL: {}\nSUBTASK: {}\nCONTEXT: {}\n\nTOOLS:\n{}\n\nHISTORY:\n{}\n\nWhat is the next step?\n",
            self.goal, self.subtask, self.context, self.tools, self.history
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    #[test]
    fn test_semantic_context() {
        assert_eq!(semantic_context(&[]), "No relevant past knowledge.");

        let docs = vec![
            Document {
                id: "doc_1_0".to_string(),
                content: "Python 3.12 release notes".to_string(),
                metadata: Map::new(),
                embedding: None,
            },
            Document {
                id: "doc_2_0".to_string(),
                content: "Tokio 1.0".to_string(),
                metadata: Map::new(),
                embedding: None,
            },
        ];
        assert_eq!(semantic_context(&docs), "- Python 3.12 release notes\n- Tokio 1.0");
    }

    #[test]
    fn test_think_prompt_layout() {
        let prompt = ThinkPrompt {
            goal: "Calculate 50 * 20",
            subtask: "Calculate 50 * 20",
            context: NO_CONTEXT,
            tools: "calculator(expression): Perform math",
            history: "No previous steps.",
        }
        .render();

        assert!(prompt.starts_with("GOAL: Calculate 50 * 20\nSUBTASK: Calculate 50 * 20\nCONTEXT: No relevant past knowledge.\n"));
        assert!(prompt.contains("TOOLS:\ncalculator(expression): Perform math\n"));
        assert!(prompt.contains("HISTORY:\nNo previous steps.\n"));
        assert!(prompt.trim_end().ends_with("What is the next step?"));
    }
}
