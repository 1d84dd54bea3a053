//! Per-run step transcript

use crate::types::{render_value, Step};

const SEPARATOR: &str = "--------------------";

/// Append-only record of one run's steps.
///
/// The rendered history feeds every Think prompt, so its layout is stable.
#[derive(Debug, Clone, Default)]
pub struct WorkingMemory {
    goal: String,
    steps: Vec<Step>,
}

impl WorkingMemory {
    pub fn new(goal: impl Into<String>) -> Self {
        Self {
            goal: goal.into(),
            steps: Vec::new(),
        }
    }

    pub fn goal(&self) -> &str {
        &self.goal
    }

    pub fn add_step(&mut self, step: Step) {
        self.steps.push(step);
    }

    pub fn last_step(&self) -> Option<&Step> {
        self.steps.last()
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Id the next appended step should carry
    pub fn next_step_id(&self) -> usize {
        self.steps.len() + 1
    }

    pub fn get_history(&self) -> String {
        if self.steps.is_empty() {
            return "No previous steps.".to_string();
        }

        let mut lines = Vec::new();
        for step in &self.steps {
            lines.push(format!("Step {}:", step.step_id));
            lines.push(format!("  Thought: {}", step.thought.text));
            if let Some(action) = &step.action {
                lines.push(format!("  Action: {}", action.tool_name));
                lines.push(format!("  Input: {}", action.tool_args));
            }
            if let Some(obs) = &step.observation {
                let body = if obs.success {
                    obs.result.as_ref().map(render_value).unwrap_or_default()
                } else {
                    obs.error.clone().unwrap_or_default()
                };
                lines.push(format!("  Observation ({}): {}", obs.status_label(), body));
            }
            lines.push(SEPARATOR.to_string());
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Action, Thought, ToolOutput};
    use serde_json::json;

    #[test]
    fn test_empty_history() {
        let memory = WorkingMemory::new("goal");
        assert_eq!(memory.get_history(), "No previous steps.");
        assert!(memory.last_step().is_none());
        assert_eq!(memory.next_step_id(), 1);
    }

    #[test]
    fn test_history_format() {
        let mut memory = WorkingMemory::new("Calculate 50 * 20");

        let mut step = Step::new(1, Thought::rationale("I should multiply."));
        step.action = Some(Action::new("calculator", json!({"expression": "50 * 20"}), "I should multiply."));
        step.observation = Some(ToolOutput::success("1000"));
        memory.add_step(step);

        let mut step = Step::new(2, Thought::rationale("confused"));
        step.observation = Some(ToolOutput::failure("No tool selected"));
        memory.add_step(step);

        let expected = [
            "Step 1:",
            "  Thought: I should multiply.",
            "  Action: calculator",
            "  Input: {\"expression\":\"50 * 20\"}",
            "  Observation (Success): 1000",
            "--------------------",
            "Step 2:",
            "  Thought: confused",
            "  Observation (Failed): No tool selected",
            "--------------------",
        ]
        .join("\n");
        assert_eq!(memory.get_history(), expected);
        assert_eq!(memory.len(), 2);
        assert_eq!(memory.last_step().unwrap().step_id, 2);
        assert_eq!(memory.goal(), "Calculate 50 * 20");
    }

    #[test]
    fn test_final_answer_step_has_no_action_lines() {
        let mut memory = WorkingMemory::new("g");
        memory.add_step(Step::new(1, Thought::final_answer("done", "42")));
        assert_eq!(memory.get_history(), "Step 1:\n  Thought: done\n--------------------");
    }
}
