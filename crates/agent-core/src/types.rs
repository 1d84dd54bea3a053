//! Value objects shared across the execution loop

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;

/// Identifier of a SubTask, unique within its Plan
pub type TaskId = u32;

/// Structured result of executing an Action.
///
/// `success == false` implies `result` is absent and `error` is non-empty;
/// `success == true` implies `error` is absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub success: bool,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ToolOutput {
    pub fn success(result: impl Into<Value>) -> Self {
        Self {
            success: true,
            result: Some(result.into()),
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        let mut error = error.into();
        if error.trim().is_empty() {
            error = "Unknown error".to_string();
        }
        Self {
            success: false,
            result: None,
            error: Some(error),
            timestamp: Utc::now(),
        }
    }

    /// Result text on success, error text on failure
    pub fn summary(&self) -> String {
        if self.success {
            self.result.as_ref().map(render_value).unwrap_or_default()
        } else {
            self.error.clone().unwrap_or_default()
        }
    }

    pub fn status_label(&self) -> &'static str {
        if self.success {
            "Success"
        } else {
            "Failed"
        }
    }
}

/// Strings render bare, everything else as compact JSON
pub fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// A proposed tool invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub tool_name: String,
    /// Always a JSON object
    pub tool_args: Value,
    /// Rationale that produced this action
    pub thought: String,
}

impl Action {
    pub fn new(tool_name: impl Into<String>, tool_args: Value, thought: impl Into<String>) -> Self {
        let tool_args = match tool_args {
            Value::Object(_) => tool_args,
            _ => Value::Object(Map::new()),
        };
        Self {
            tool_name: tool_name.into(),
            tool_args,
            thought: thought.into(),
        }
    }

    /// First string argument among `keys`
    pub fn str_arg(&self, keys: &[&str]) -> Option<&str> {
        keys.iter()
            .find_map(|key| self.tool_args.get(*key).and_then(Value::as_str))
    }
}

/// Parsed reasoning output. Exactly one branch holds: final answer,
/// proposed action, or neither.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Thought {
    pub text: String,
    #[serde(default)]
    pub is_final_answer: bool,
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub action_name: Option<String>,
    #[serde(default)]
    pub action_input: Option<Value>,
}

impl Thought {
    /// Rationale only: no action, no answer
    pub fn rationale(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn final_answer(text: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final_answer: true,
            answer: Some(answer.into()),
            ..Default::default()
        }
    }

    pub fn action(text: impl Into<String>, name: impl Into<String>, input: Map<String, Value>) -> Self {
        Self {
            text: text.into(),
            action_name: Some(name.into()),
            action_input: Some(Value::Object(input)),
            ..Default::default()
        }
    }

    /// The proposed action, if this is the action branch
    pub fn to_action(&self) -> Option<Action> {
        if self.is_final_answer {
            return None;
        }
        let name = self.action_name.as_deref()?;
        let args = self
            .action_input
            .clone()
            .unwrap_or_else(|| Value::Object(Map::new()));
        Some(Action::new(name, args, self.text.clone()))
    }
}

/// One iteration's record. Immutable once appended to working memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub step_id: usize,
    pub thought: Thought,
    #[serde(default)]
    pub action: Option<Action>,
    #[serde(default)]
    pub observation: Option<ToolOutput>,
    pub timestamp: DateTime<Utc>,
}

impl Step {
    pub fn new(step_id: usize, thought: Thought) -> Self {
        Self {
            step_id,
            thought,
            action: None,
            observation: None,
            timestamp: Utc::now(),
        }
    }
}

/// Final result of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResult {
    pub success: bool,
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl AgentResult {
    pub fn completed(answer: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            success: true,
            answer: Some(answer.into()),
            error: None,
            steps,
            metadata: Map::new(),
        }
    }

    pub fn failed(error: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            success: false,
            answer: None,
            error: Some(error.into()),
            steps,
            metadata: Map::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Lifecycle state of a SubTask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Blocked,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Blocked => "blocked",
        };
        f.write_str(s)
    }
}

/// One unit of a Plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubTask {
    pub id: TaskId,
    pub description: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub dependencies: BTreeSet<TaskId>,
}

impl SubTask {
    pub fn new(id: TaskId, description: impl Into<String>) -> Self {
        Self {
            id,
            description: description.into(),
            status: TaskStatus::Pending,
            result: None,
            dependencies: BTreeSet::new(),
        }
    }

    pub fn with_dependencies(mut self, deps: impl IntoIterator<Item = TaskId>) -> Self {
        self.dependencies = deps.into_iter().collect();
        self
    }
}

/// Ordered SubTasks decomposing a goal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub root_goal: String,
    pub subtasks: Vec<SubTask>,
}

impl Plan {
    pub fn new(root_goal: impl Into<String>, subtasks: Vec<SubTask>) -> Self {
        Self {
            root_goal: root_goal.into(),
            subtasks,
        }
    }

    /// Plan with a single SubTask wrapping the goal verbatim
    pub fn single(goal: impl Into<String>) -> Self {
        let goal = goal.into();
        Self {
            subtasks: vec![SubTask::new(1, goal.clone())],
            root_goal: goal,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.subtasks
            .iter()
            .all(|t| t.status == TaskStatus::Completed)
    }

    pub fn get(&self, id: TaskId) -> Option<&SubTask> {
        self.subtasks.iter().find(|t| t.id == id)
    }

    pub fn get_mut(&mut self, id: TaskId) -> Option<&mut SubTask> {
        self.subtasks.iter_mut().find(|t| t.id == id)
    }

    pub fn count_with_status(&self, status: TaskStatus) -> usize {
        self.subtasks.iter().filter(|t| t.status == status).count()
    }

    /// Whether every dependency of `task` is completed
    pub fn dependencies_met(&self, task: &SubTask) -> bool {
        task.dependencies.iter().all(|dep| {
            self.get(*dep)
                .map_or(false, |t| t.status == TaskStatus::Completed)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_output_invariants() {
        let ok = ToolOutput::success("1000");
        assert!(ok.success);
        assert!(ok.error.is_none());
        assert_eq!(ok.summary(), "1000");

        let failed = ToolOutput::failure("");
        assert!(!failed.success);
        assert!(failed.result.is_none());
        assert!(!failed.error.as_deref().unwrap().is_empty());
    }

    #[test]
    fn test_non_string_results_render_as_json() {
        let out = ToolOutput::success(json!([{"title": "a"}]));
        assert_eq!(out.summary(), r#"[{"title":"a"}]"#);
    }

    #[test]
    fn test_action_args_always_object() {
        let action = Action::new("calculator", json!("50 * 20"), "");
        assert!(action.tool_args.as_object().unwrap().is_empty());

        let action = Action::new("read_file", json!({"file_path": "a.txt"}), "");
        assert_eq!(action.str_arg(&["path", "file_path"]), Some("a.txt"));
    }

    #[test]
    fn test_thought_branches() {
        assert!(Thought::rationale("hmm").to_action().is_none());
        assert!(Thought::final_answer("done", "42").to_action().is_none());

        let mut input = Map::new();
        input.insert("expression".to_string(), json!("1 + 1"));
        let action = Thought::action("add", "calculator", input).to_action().unwrap();
        assert_eq!(action.tool_name, "calculator");
        assert_eq!(action.tool_args["expression"], "1 + 1");
        assert_eq!(action.thought, "add");
    }

    #[test]
    fn test_plan_completion_and_dependencies() {
        let mut plan = Plan::new(
            "goal",
            vec![SubTask::new(1, "a"), SubTask::new(2, "b").with_dependencies([1])],
        );
        assert!(!plan.is_complete());
        assert!(!plan.dependencies_met(&plan.subtasks[1]));

        plan.get_mut(1).unwrap().status = TaskStatus::Completed;
        assert!(plan.dependencies_met(&plan.subtasks[1]));

        plan.get_mut(2).unwrap().status = TaskStatus::Completed;
        assert!(plan.is_complete());
    }

    #[test]
    fn test_unknown_dependency_is_unmet() {
        let plan = Plan::new("goal", vec![SubTask::new(1, "a").with_dependencies([9])]);
        assert!(!plan.dependencies_met(&plan.subtasks[0]));
    }

    #[test]
    fn test_task_status_serialization() {
        assert_eq!(serde_json::to_value(TaskStatus::InProgress).unwrap(), json!("in_progress"));
        assert_eq!(TaskStatus::Completed.to_string(), "completed");
    }
}
