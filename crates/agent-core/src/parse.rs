//! Tolerant parsing of free-form model output
//!
//! Models are asked to answer in one of two shapes:
//!
//! ```text
//! Thought: <reasoning>
//! Action: <tool_name>
//! Action Input: {"arg": "value"}
//! ```
//!
//! ```text
//! Thought: <reasoning>
//! Final Answer: <answer>
//! ```
//!
//! Small local models drift from this constantly, so matching is
//! case-insensitive and the action input is located by brace matching
//! anywhere after the `Action:` marker. Anything unrecognised becomes a
//! plain rationale with no action.

use serde_json::{Map, Value};

use crate::types::Thought;

const FINAL_ANSWER_MARKER: &str = "final answer:";
const ACTION_MARKER: &str = "action:";
const THOUGHT_LABEL: &str = "thought:";

/// Parse a model response into a Thought. Never fails.
pub fn parse_thought(response: &str) -> Thought {
    let text = response.trim();
    // ASCII lowering keeps byte offsets aligned with `text`
    let lower = text.to_ascii_lowercase();

    if let Some(idx) = lower.find(FINAL_ANSWER_MARKER) {
        let rationale = strip_thought_label(&text[..idx]);
        let answer = text[idx + FINAL_ANSWER_MARKER.len()..].trim();
        return Thought::final_answer(rationale, answer);
    }

    if let Some(idx) = lower.find(ACTION_MARKER) {
        let rationale = strip_thought_label(&text[..idx]);
        let rest = &text[idx + ACTION_MARKER.len()..];
        let name = leading_tool_name(rest);

        if !name.is_empty() {
            let input = extract_json_object(rest).unwrap_or_default();
            return Thought::action(rationale, name, input);
        }
    }

    Thought::rationale(strip_thought_label(text))
}

/// First JSON object found in `text` by brace matching
pub fn extract_json_object(text: &str) -> Option<Map<String, Value>> {
    text.match_indices('{').find_map(|(start, _)| {
        let end = balanced_object_end(text, start)?;
        match serde_json::from_str::<Value>(&text[start..end]) {
            Ok(Value::Object(map)) => Some(map),
            _ => None,
        }
    })
}

/// Byte offset just past the `}` closing the object opened at `start`.
/// Braces inside JSON strings are ignored.
fn balanced_object_end(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(start + i + c.len_utf8());
                }
            }
            _ => {}
        }
    }

    None
}

/// First whitespace- or paren-delimited token, stripped of quoting
fn leading_tool_name(rest: &str) -> &str {
    rest.trim_start()
        .split(|c: char| c.is_whitespace() || c == '(')
        .next()
        .unwrap_or("")
        .trim_matches(|c: char| !(c.is_alphanumeric() || c == '_' || c == '-'))
}

fn strip_thought_label(text: &str) -> String {
    let trimmed = text.trim();
    let without = if trimmed.to_ascii_lowercase().starts_with(THOUGHT_LABEL) {
        &trimmed[THOUGHT_LABEL.len()..]
    } else {
        trimmed
    };
    without.trim().to_string()
}
