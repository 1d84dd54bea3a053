//! Goal decomposition into a dependency-ordered task graph

use llm_core::Generator;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::parse::extract_json_object;
use crate::types::{Plan, SubTask, TaskId, TaskStatus};

const PLANNER_SYSTEM_PROMPT: &str = "You are a project manager.\n\
Your task is to break down the user's goal into a list of steps.";

const SUBTASK_LIST_KEYS: &[&str] = &["subtasks", "tasks", "steps"];
const DESCRIPTION_KEYS: &[&str] = &["description", "descripion", "desc", "task"];
const DEPENDENCY_KEYS: &[&str] = &["dependencies", "dependancies", "depends_on"];

/// Owns the Plan for one run
pub struct Planner {
    generator: Arc<dyn Generator>,
    plan: Option<Plan>,
}

impl Planner {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self {
            generator,
            plan: None,
        }
    }

    /// Planner resuming an existing Plan
    pub fn with_plan(generator: Arc<dyn Generator>, plan: Plan) -> Self {
        Self {
            generator,
            plan: Some(plan),
        }
    }

    pub fn plan(&self) -> Option<&Plan> {
        self.plan.as_ref()
    }

    /// Ask the model for a plan. Always yields at least one SubTask: any
    /// unusable response falls back to a single task wrapping the goal.
    #[instrument(skip(self))]
    pub async fn create_initial_plan(&mut self, goal: &str) -> &Plan {
        let response = self
            .generator
            .generate(&plan_prompt(goal), PLANNER_SYSTEM_PROMPT)
            .await;

        let plan = match parse_plan(goal, &response) {
            Some(plan) => {
                info!(subtasks = plan.subtasks.len(), "Created plan");
                plan
            }
            None => {
                warn!("No usable plan in model response, defaulting to single step");
                debug!(response = %response, "Raw planner response");
                Plan::single(goal)
            }
        };

        self.plan.insert(plan)
    }

    /// Next SubTask to work on.
    ///
    /// A SubTask already in progress is resumed first. Otherwise the first
    /// pending SubTask whose dependencies are all completed. If pending
    /// SubTasks exist but none is runnable (cyclic or dangling
    /// dependencies), the first pending one is returned anyway.
    pub fn get_next_step(&self) -> Option<&SubTask> {
        let plan = self.plan.as_ref()?;

        if let Some(task) = plan
            .subtasks
            .iter()
            .find(|t| t.status == TaskStatus::InProgress)
        {
            return Some(task);
        }

        let mut pending = plan
            .subtasks
            .iter()
            .filter(|t| t.status == TaskStatus::Pending);

        if let Some(task) = pending.clone().find(|t| plan.dependencies_met(t)) {
            return Some(task);
        }

        let forced = pending.next()?;
        warn!(
            subtask_id = forced.id,
            pending = plan.count_with_status(TaskStatus::Pending),
            "All pending subtasks are blocked by dependencies, forcing execution"
        );
        Some(forced)
    }

    /// Set a SubTask's status, and its result when given. Unknown ids are ignored.
    pub fn update_task_status(&mut self, id: TaskId, status: TaskStatus, result: Option<String>) {
        let Some(task) = self.plan.as_mut().and_then(|p| p.get_mut(id)) else {
            debug!(subtask_id = id, "Status update for unknown subtask ignored");
            return;
        };
        task.status = status;
        if result.is_some() {
            task.result = result;
        }
        debug!(subtask_id = id, %status, "Subtask status updated");
    }
}

impl std::fmt::Debug for Planner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Planner").field("plan", &self.plan).finish()
    }
}

fn plan_prompt(goal: &str) -> String {
    format!(
        r#"GOAL: {goal}

RESPONSE FORMAT:
You MUST return valid JSON only. Do not add markdown or explanations.
{{
  "subtasks": [
    {{ "id": 1, "description": "precise action step", "dependencies": [] }},
    {{ "id": 2, "description": "precise action step", "dependencies": [1] }}
  ]
}}

RESPONSE:"#
    )
}

/// Extract and normalise a Plan from a model response.
/// `None` when no JSON object is found or no SubTask survives normalisation.
pub fn parse_plan(goal: &str, response: &str) -> Option<Plan> {
    let data = extract_json_object(response)?;
    let entries = SUBTASK_LIST_KEYS
        .iter()
        .find_map(|key| data.get(*key).and_then(Value::as_array))?;

    let mut seen = BTreeSet::new();
    let subtasks: Vec<SubTask> = entries
        .iter()
        .filter_map(Value::as_object)
        .filter_map(normalize_subtask)
        .filter(|task| seen.insert(task.id))
        .collect();

    if subtasks.is_empty() {
        return None;
    }
    Some(Plan::new(goal, subtasks))
}

fn normalize_subtask(entry: &Map<String, Value>) -> Option<SubTask> {
    let id = entry.get("id").and_then(coerce_id)?;
    let description = DESCRIPTION_KEYS
        .iter()
        .find_map(|key| entry.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .filter(|d| !d.is_empty())?;

    let dependencies = DEPENDENCY_KEYS
        .iter()
        .find_map(|key| entry.get(*key))
        .map(coerce_dependencies)
        .unwrap_or_default();

    Some(SubTask::new(id, description).with_dependencies(dependencies))
}

/// Integers, numeric strings and `{"id": n}` objects
fn coerce_id(value: &Value) -> Option<TaskId> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| TaskId::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        Value::Object(obj) => obj.get("id").and_then(coerce_id),
        _ => None,
    }
}

fn coerce_dependencies(value: &Value) -> BTreeSet<TaskId> {
    match value {
        Value::Array(items) => items.iter().filter_map(coerce_id).collect(),
        other => coerce_id(other).into_iter().collect(),
    }
}
