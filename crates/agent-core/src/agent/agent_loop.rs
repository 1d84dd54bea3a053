//! Agent loop implementation

use std::sync::Arc;

use chrono::Utc;
use llm_core::Generator;
use serde_json::{json, Map};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::error::AgentError;
use crate::events::{EventSink, RunEvent};
use crate::memory::{Document, SemanticMemory, WorkingMemory};
use crate::parse::parse_thought;
use crate::planner::Planner;
use crate::safety::SafetyGuardrails;
use crate::tools::{ToolContext, ToolRegistry};
use crate::types::{Action, AgentResult, Plan, Step, SubTask, TaskStatus, Thought, ToolOutput};

use super::prompts::{semantic_context, ThinkPrompt, THINK_SYSTEM_PROMPT};
use super::state::{AgentConfig, RunProgress};

const NO_TOOL_SELECTED: &str = "No tool selected";
const ALL_TASKS_COMPLETED: &str = "All planned tasks completed.";

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Terminal {
    Done,
    Blocked,
    MaxLoopsExceeded,
    Cancelled,
}

impl Terminal {
    fn as_str(self) -> &'static str {
        match self {
            Self::Done => "done",
            Self::Blocked => "blocked",
            Self::MaxLoopsExceeded => "max_loops_exceeded",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Per-run state owned by the loop
struct RunState<'a> {
    goal: &'a str,
    context: String,
    tool_signatures: String,
    planner: Planner,
    memory: WorkingMemory,
    iterations: usize,
}

/// Drives one goal through plan, think, act and observe
pub struct Agent {
    generator: Arc<dyn Generator>,
    tools: Arc<ToolRegistry>,
    tool_ctx: ToolContext,
    semantic: Arc<SemanticMemory>,
    safety: SafetyGuardrails,
    config: AgentConfig,
    cancel: CancellationToken,
    progress: Arc<RunProgress>,
    run_id: Option<String>,
}

impl Agent {
    pub fn new(
        generator: Arc<dyn Generator>,
        tools: Arc<ToolRegistry>,
        semantic: Arc<SemanticMemory>,
        safety: SafetyGuardrails,
    ) -> Self {
        Self {
            generator,
            tools,
            tool_ctx: ToolContext::default(),
            semantic,
            safety,
            config: AgentConfig::default(),
            cancel: CancellationToken::new(),
            progress: Arc::new(RunProgress::new()),
            run_id: None,
        }
    }

    pub fn with_config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_tool_context(mut self, ctx: ToolContext) -> Self {
        self.tool_ctx = ctx;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_progress(mut self, progress: Arc<RunProgress>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn progress(&self) -> Arc<RunProgress> {
        Arc::clone(&self.progress)
    }

    /// Run the loop for `goal` until the plan completes, blocks, is
    /// cancelled or the loop budget runs out. Step-local failures are
    /// recorded as observations and never end the run.
    ///
    /// Emits everything up to `subtask_complete`; reporting the returned
    /// result and closing the stream is left to the caller.
    #[instrument(skip(self, goal, events), fields(run_id = ?self.run_id, max_loops = self.config.max_loops))]
    pub async fn run(&self, goal: &str, events: &dyn EventSink) -> AgentResult {
        info!(goal, "Starting run");
        events.emit(RunEvent::Start {
            run_id: self.run_id.clone(),
            goal: goal.to_string(),
        });

        let recalled = self.recall(goal).await;
        debug!(recalled = recalled.len(), "Recalled past knowledge");

        let mut planner = Planner::new(Arc::clone(&self.generator));
        planner.create_initial_plan(goal).await;

        let state = RunState {
            goal,
            context: semantic_context(&recalled),
            tool_signatures: self.tools.signatures(),
            planner,
            memory: WorkingMemory::new(goal),
            iterations: 0,
        };
        self.drive(state, events).await
    }

    async fn drive(&self, mut state: RunState<'_>, events: &dyn EventSink) -> AgentResult {
        self.publish(&state);

        for _ in 0..self.config.max_loops {
            if self.cancel.is_cancelled() {
                return self.finish(state, Terminal::Cancelled);
            }
            if plan_complete(&state) {
                return self.finish(state, Terminal::Done);
            }

            let Some(task) = state.planner.get_next_step().cloned() else {
                return self.finish(state, Terminal::Blocked);
            };

            state.iterations += 1;
            let step_id = state.memory.next_step_id();
            state
                .planner
                .update_task_status(task.id, TaskStatus::InProgress, None);
            debug!(step_id, subtask_id = task.id, "Starting step");
            events.emit(RunEvent::Step {
                step_id,
                subtask_id: task.id,
                subtask: task.description.clone(),
            });

            let thought = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                thought = self.think(&state, &task) => Some(thought),
            };
            let Some(thought) = thought else {
                return self.finish(state, Terminal::Cancelled);
            };
            events.emit(RunEvent::Thought {
                thought: thought.text.clone(),
            });

            let step = self.act_on(&mut state, &task, step_id, thought, events).await;
            state.memory.add_step(step);
            self.publish(&state);
        }

        if plan_complete(&state) {
            return self.finish(state, Terminal::Done);
        }
        self.finish(state, Terminal::MaxLoopsExceeded)
    }

    async fn think(&self, state: &RunState<'_>, task: &SubTask) -> Thought {
        let history = state.memory.get_history();
        let prompt = ThinkPrompt {
            goal: state.goal,
            subtask: &task.description,
            context: &state.context,
            tools: &state.tool_signatures,
            history: &history,
        }
        .render();
        let system_prompt = self
            .config
            .system_prompt
            .as_deref()
            .unwrap_or(THINK_SYSTEM_PROMPT);

        let response = self.generator.generate(&prompt, system_prompt).await;
        debug!(response = %response, "Raw model response");
        parse_thought(&response)
    }

    /// Build the step for `thought`, carrying out whatever it asks for
    async fn act_on(
        &self,
        state: &mut RunState<'_>,
        task: &SubTask,
        step_id: usize,
        thought: Thought,
        events: &dyn EventSink,
    ) -> Step {
        let mut step = Step::new(step_id, thought);

        if step.thought.is_final_answer {
            let answer = step.thought.answer.clone().unwrap_or_default();
            info!(step_id, subtask_id = task.id, "Subtask complete");
            state
                .planner
                .update_task_status(task.id, TaskStatus::Completed, Some(answer.clone()));
            events.emit(RunEvent::SubtaskComplete {
                subtask_id: task.id,
                result: answer,
            });
            return step;
        }

        let output = match step.thought.to_action() {
            Some(action) => {
                events.emit(RunEvent::Action {
                    tool: action.tool_name.clone(),
                    args: action.tool_args.clone(),
                });
                let output = self.execute(&action, task, step_id).await;
                step.action = Some(action);
                output
            }
            None => {
                warn!(step_id, "Model response had no action or final answer");
                ToolOutput::failure(NO_TOOL_SELECTED)
            }
        };

        events.emit(RunEvent::Observation {
            success: output.success,
            result: output.success.then(|| output.summary()),
            error: output.error.clone(),
        });
        step.observation = Some(output);
        step
    }

    /// Guardrail check, then dispatch. Never fails.
    async fn execute(&self, action: &Action, task: &SubTask, step_id: usize) -> ToolOutput {
        if let Err(e) = self.safety.validate(action) {
            warn!(tool = %action.tool_name, error = %e, "Action rejected by guardrails");
            return ToolOutput::failure(AgentError::from(e).to_string());
        }

        let output = self.tools.execute(action, &self.tool_ctx).await;
        if output.success && self.config.is_evidence_tool(&action.tool_name) {
            self.remember(&output, &action.tool_name, task, step_id).await;
        }
        output
    }

    /// Past knowledge relevant to `goal`. The store lock is shared with
    /// writers doing file I/O, so the lookup stays off the async workers.
    async fn recall(&self, goal: &str) -> Vec<Document> {
        let semantic = Arc::clone(&self.semantic);
        let query = goal.to_string();
        let limit = self.config.retrieve_limit;
        match tokio::task::spawn_blocking(move || semantic.retrieve(&query, limit)).await {
            Ok(documents) => documents,
            Err(e) => {
                warn!(error = %e, "Memory recall task failed");
                Vec::new()
            }
        }
    }

    /// Write a successful evidence result to semantic memory
    async fn remember(&self, output: &ToolOutput, tool: &str, task: &SubTask, step_id: usize) {
        let mut metadata = Map::new();
        metadata.insert("source".to_string(), json!(tool));
        metadata.insert("subtask_id".to_string(), json!(task.id));
        metadata.insert("step_id".to_string(), json!(step_id));
        metadata.insert("created_at".to_string(), json!(Utc::now().to_rfc3339()));

        let semantic = Arc::clone(&self.semantic);
        let content = output.summary();
        match tokio::task::spawn_blocking(move || semantic.add(content, metadata)).await {
            Ok(Ok(doc)) => debug!(id = %doc.id, tool, "Stored evidence"),
            Ok(Err(e)) => warn!(error = %format!("{:#}", e), tool, "Failed to store evidence"),
            Err(e) => warn!(error = %e, tool, "Evidence store task failed"),
        }
    }

    fn publish(&self, state: &RunState<'_>) {
        self.progress.set_step_count(state.memory.len());
        if let Some(plan) = state.planner.plan() {
            self.progress.set_plan(plan);
        }
    }

    fn finish(&self, state: RunState<'_>, terminal: Terminal) -> AgentResult {
        self.publish(&state);
        let empty;
        let plan = match state.planner.plan() {
            Some(plan) => plan,
            None => {
                empty = Plan::new(state.goal, Vec::new());
                &empty
            }
        };
        let steps = state.memory.steps().to_vec();

        let result = match terminal {
            Terminal::Done => AgentResult::completed(completion_answer(plan), steps),
            Terminal::Blocked => AgentResult::failed(AgentError::BlockedPlan.to_string(), steps),
            Terminal::MaxLoopsExceeded => {
                AgentResult::failed(AgentError::LoopBudgetExceeded.to_string(), steps)
            }
            Terminal::Cancelled => AgentResult::failed(AgentError::Cancelled.to_string(), steps),
        };

        let completed = plan.count_with_status(TaskStatus::Completed);
        info!(
            terminal_state = terminal.as_str(),
            iterations = state.iterations,
            steps = result.steps.len(),
            "Run finished"
        );

        result
            .with_metadata("iterations", state.iterations)
            .with_metadata("subtasks_total", plan.subtasks.len())
            .with_metadata("subtasks_completed", completed)
            .with_metadata("terminal_state", terminal.as_str())
    }
}

/// A run without a plan can never complete
fn plan_complete(state: &RunState<'_>) -> bool {
    state.planner.plan().map_or(false, Plan::is_complete)
}

/// Single-task plans answer with that task's result; larger plans list every result
fn completion_answer(plan: &Plan) -> String {
    if let [only] = plan.subtasks.as_slice() {
        return only
            .result
            .clone()
            .unwrap_or_else(|| ALL_TASKS_COMPLETED.to_string());
    }

    let mut lines = vec![ALL_TASKS_COMPLETED.to_string()];
    lines.extend(
        plan.subtasks
            .iter()
            .filter_map(|t| t.result.as_ref().map(|r| format!("- [{}] {}", t.id, r))),
    );
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::testing::RecordingSink;
    use crate::events::NoopSink;
    use crate::tools::builtin::create_default_registry;
    use llm_core::ScriptedGenerator;
    use serde_json::Value;
    use tempfile::TempDir;

    const CALCULATE: &str =
        "Thought: I should multiply.\nAction: calculator\nAction Input: {\"expression\": \"50 * 20\"}";

    struct Fixture {
        dir: TempDir,
        generator: Arc<ScriptedGenerator>,
        semantic: Arc<SemanticMemory>,
    }

    impl Fixture {
        fn new(generator: ScriptedGenerator) -> Self {
            Self {
                dir: TempDir::new().unwrap(),
                generator: Arc::new(generator),
                semantic: Arc::new(SemanticMemory::in_memory()),
            }
        }

        fn agent(&self, max_loops: usize) -> Agent {
            let (registry, ctx) = create_default_registry(self.dir.path().to_path_buf());
            Agent::new(
                self.generator.clone(),
                Arc::new(registry),
                Arc::clone(&self.semantic),
                SafetyGuardrails::new(self.dir.path()),
            )
            .with_tool_context(ctx)
            .with_config(AgentConfig::default().with_max_loops(max_loops))
        }
    }

    #[tokio::test]
    async fn test_calculator_goal_completes_in_two_iterations() {
        let fixture = Fixture::new(ScriptedGenerator::new([
            "not a plan",
            CALCULATE,
            "Thought: The tool said 1000.\nFinal Answer: 1000",
        ]));
        let agent = fixture.agent(2);

        let result = agent.run("Calculate 50 * 20", &NoopSink).await;

        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.answer.as_deref(), Some("1000"));
        assert_eq!(result.steps.len(), 2);

        let observation = result.steps[0].observation.as_ref().unwrap();
        assert!(observation.success);
        assert_eq!(observation.result, Some(Value::String("1000".to_string())));
        assert_eq!(result.steps[0].action.as_ref().unwrap().tool_name, "calculator");

        assert_eq!(result.metadata["iterations"], 2);
        assert_eq!(result.metadata["terminal_state"], "done");
        assert_eq!(result.metadata["subtasks_completed"], 1);
        assert_eq!(agent.progress().step_count(), 2);
    }

    #[tokio::test]
    async fn test_unparsable_output_exhausts_budget() {
        let fixture = Fixture::new(ScriptedGenerator::repeating("I am not sure what to do."));
        let result = fixture.agent(5).run("Do something", &NoopSink).await;

        assert!(!result.success);
        assert!(result.error.as_deref().unwrap().contains("Max loops exceeded"));
        assert_eq!(result.steps.len(), 5);
        for (i, step) in result.steps.iter().enumerate() {
            assert_eq!(step.step_id, i + 1);
            assert!(step.action.is_none());
            assert_eq!(
                step.observation.as_ref().unwrap().error.as_deref(),
                Some("No tool selected")
            );
        }
        assert_eq!(result.metadata["terminal_state"], "max_loops_exceeded");
        // one planner call plus one per iteration
        assert_eq!(fixture.generator.call_count(), 6);
    }

    #[tokio::test]
    async fn test_security_violation_is_an_observation() {
        let fixture = Fixture::new(ScriptedGenerator::new([
            "",
            "Thought: peek\nAction: read_file\nAction Input: {\"path\": \"../../etc/passwd\"}",
            "Final Answer: refused",
        ]));
        let result = fixture.agent(5).run("Read passwords", &NoopSink).await;

        assert!(result.success);
        let error = result.steps[0].observation.as_ref().unwrap().error.clone().unwrap();
        assert!(error.starts_with("SECURITY VIOLATION: Access denied"), "{}", error);
        assert!(fixture.generator.prompts()[2].contains("Observation (Failed): SECURITY VIOLATION"));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_an_observation() {
        let fixture = Fixture::new(ScriptedGenerator::new([
            "",
            "Action: nonexistent\nAction Input: {}",
            "Final Answer: gave up",
        ]));
        let result = fixture.agent(5).run("goal", &NoopSink).await;

        assert!(result.success);
        assert_eq!(
            result.steps[0].observation.as_ref().unwrap().error.as_deref(),
            Some("Tool nonexistent not found")
        );
    }

    #[tokio::test]
    async fn test_evidence_written_to_semantic_memory() {
        let fixture = Fixture::new(ScriptedGenerator::new([
            "",
            "Action: web_search\nAction Input: {\"query\": \"python 3.12\"}",
            CALCULATE,
            "Final Answer: done",
        ]));
        let result = fixture.agent(5).run("Research python", &NoopSink).await;
        assert!(result.success);

        // calculator is not an evidence tool
        let docs = fixture.semantic.documents();
        assert_eq!(docs.len(), 1);
        assert!(docs[0].content.contains("Python 3.12 Release Notes"));
        assert_eq!(docs[0].metadata["source"], "web_search");
        assert_eq!(docs[0].metadata["subtask_id"], 1);
        assert_eq!(docs[0].metadata["step_id"], 1);
    }

    #[tokio::test]
    async fn test_recalled_knowledge_in_prompt() {
        let fixture = Fixture::new(ScriptedGenerator::new(["", "Final Answer: ok"]));
        fixture.semantic.add("Python 3.12 release notes", Map::new()).unwrap();
        fixture.semantic.add("Cooking recipes", Map::new()).unwrap();

        fixture.agent(3).run("python features", &NoopSink).await;

        let prompt = &fixture.generator.prompts()[1];
        assert!(prompt.contains("CONTEXT: - Python 3.12 release notes\n"), "{}", prompt);
        assert!(!prompt.contains("Cooking"));
        assert!(prompt.contains("calculator(expression): "));
        assert!(prompt.contains("HISTORY:\nNo previous steps."));
    }

    #[tokio::test]
    async fn test_multi_task_plan_events_and_answer() {
        let fixture = Fixture::new(ScriptedGenerator::new([
            r#"{"subtasks": [
                {"id": 1, "description": "first", "dependencies": []},
                {"id": 2, "description": "second", "dependencies": [1]}
            ]}"#,
            "Final Answer: a",
            "Final Answer: b",
        ]));
        let sink = RecordingSink::default();
        let result = fixture.agent(5).run("two things", &sink).await;

        assert!(result.success);
        assert_eq!(result.answer.as_deref(), Some("All planned tasks completed.\n- [1] a\n- [2] b"));
        assert_eq!(result.metadata["iterations"], 2);
        assert_eq!(
            sink.names(),
            vec!["start", "step", "thought", "subtask_complete", "step", "thought", "subtask_complete"]
        );
        match &sink.events()[4] {
            RunEvent::Step { step_id, subtask_id, subtask } => {
                assert_eq!((*step_id, *subtask_id, subtask.as_str()), (2, 2, "second"));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_action_events_in_order() {
        let fixture = Fixture::new(ScriptedGenerator::new(["", CALCULATE, "Final Answer: 1000"]));
        let sink = RecordingSink::default();
        fixture.agent(5).run("Calculate 50 * 20", &sink).await;

        assert_eq!(
            sink.names(),
            vec![
                "start", "step", "thought", "action", "observation",
                "step", "thought", "subtask_complete"
            ]
        );
        assert_eq!(
            sink.events()[4],
            RunEvent::Observation {
                success: true,
                result: Some("1000".to_string()),
                error: None,
            }
        );
    }

    #[tokio::test]
    async fn test_blocked_plan() {
        let fixture = Fixture::new(ScriptedGenerator::repeating("Final Answer: x"));
        let agent = fixture.agent(5);

        let mut plan = Plan::single("goal");
        plan.subtasks[0].status = TaskStatus::Failed;
        let state = RunState {
            goal: "goal",
            context: String::new(),
            tool_signatures: String::new(),
            planner: Planner::with_plan(fixture.generator.clone(), plan),
            memory: WorkingMemory::new("goal"),
            iterations: 0,
        };

        let result = agent.drive(state, &NoopSink).await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Plan blocked: no runnable subtasks"));
        assert_eq!(result.metadata["terminal_state"], "blocked");
        assert!(result.steps.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_before_first_step() {
        let fixture = Fixture::new(ScriptedGenerator::repeating("Final Answer: x"));
        let token = CancellationToken::new();
        token.cancel();

        let result = fixture
            .agent(5)
            .with_cancellation(token)
            .run("goal", &NoopSink)
            .await;
        assert_eq!(result.error.as_deref(), Some("Run cancelled"));
        assert!(result.steps.is_empty());
        assert_eq!(result.metadata["terminal_state"], "cancelled");
    }

    #[test]
    fn test_completion_answer() {
        let mut plan = Plan::single("goal");
        assert_eq!(completion_answer(&plan), "All planned tasks completed.");
        plan.subtasks[0].result = Some("42".to_string());
        assert_eq!(completion_answer(&plan), "42");
    }
}
