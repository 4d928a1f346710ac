//! Shared scripted collaborators for orchestrator tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use loomline_core::{
    ContextEntry, ReasoningBackend, StepError, ThoughtOutcome, ThoughtResult, ToolDefinition,
    ToolDispatcher,
};

/// Build a final-answer thought result.
pub fn thought_answer(reasoning: &str, text: &str) -> ThoughtResult {
    ThoughtResult {
        reasoning: reasoning.into(),
        outcome: ThoughtOutcome::Answer { text: text.into() },
    }
}

/// Build a tool-action thought result.
pub fn thought_action(reasoning: &str, tool: &str, input: serde_json::Value) -> ThoughtResult {
    ThoughtResult {
        reasoning: reasoning.into(),
        outcome: ThoughtOutcome::Action {
            tool: tool.into(),
            reason: reasoning.into(),
            input,
        },
    }
}

/// A backend that returns a sequence of scripted thought results.
///
/// Each `think` call pops the next script entry. Panics if the script runs
/// dry — a test that thinks more often than scripted is a failing test.
pub struct ScriptedBackend {
    thoughts: Mutex<VecDeque<Result<ThoughtResult, StepError>>>,
    observations: Mutex<VecDeque<String>>,
    summary: String,
    pub think_calls: AtomicUsize,
    pub observe_calls: AtomicUsize,
    pub summarize_calls: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new(script: Vec<Result<ThoughtResult, StepError>>) -> Self {
        Self {
            thoughts: Mutex::new(script.into()),
            observations: Mutex::new(VecDeque::new()),
            summary: "digest of the conversation so far".into(),
            think_calls: AtomicUsize::new(0),
            observe_calls: AtomicUsize::new(0),
            summarize_calls: AtomicUsize::new(0),
        }
    }

    /// A backend whose every think call succeeds with the given results.
    pub fn script(results: Vec<ThoughtResult>) -> Self {
        Self::new(results.into_iter().map(Ok).collect())
    }

    /// A backend that answers once.
    pub fn single_answer(text: &str) -> Self {
        Self::script(vec![thought_answer("thinking it over", text)])
    }

    pub fn with_observation(self, text: &str) -> Self {
        self.observations.lock().unwrap().push_back(text.into());
        self
    }

    pub fn with_summary(mut self, text: &str) -> Self {
        self.summary = text.into();
        self
    }
}

#[async_trait]
impl ReasoningBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn think(
        &self,
        _context: &[ContextEntry],
        _tools: &[ToolDefinition],
    ) -> Result<ThoughtResult, StepError> {
        self.think_calls.fetch_add(1, Ordering::SeqCst);
        self.thoughts
            .lock()
            .unwrap()
            .pop_front()
            .expect("ScriptedBackend: think script exhausted")
    }

    async fn observe(
        &self,
        _context: &[ContextEntry],
        action_result: &str,
    ) -> Result<String, StepError> {
        self.observe_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .observations
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| format!("observed: {action_result}")))
    }

    async fn summarize(&self, _context: &[ContextEntry]) -> Result<String, StepError> {
        self.summarize_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.summary.clone())
    }
}

/// A dispatcher that records calls and returns scripted outputs.
pub struct RecordingDispatcher {
    outputs: Mutex<VecDeque<String>>,
    pub calls: Mutex<Vec<(String, serde_json::Value)>>,
    delay: Duration,
}

impl RecordingDispatcher {
    pub fn new(outputs: Vec<&str>) -> Self {
        Self {
            outputs: Mutex::new(outputs.into_iter().map(String::from).collect()),
            calls: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
        }
    }

    /// Delay every dispatch, for tests that race signals against tool runs.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl ToolDispatcher for RecordingDispatcher {
    fn catalog(&self) -> Vec<ToolDefinition> {
        vec![ToolDefinition {
            name: "calculator".into(),
            description: "Evaluates arithmetic expressions".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": { "expr": { "type": "string" } },
                "required": ["expr"],
            }),
        }]
    }

    async fn dispatch(&self, tool: &str, input: &serde_json::Value) -> String {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.calls
            .lock()
            .unwrap()
            .push((tool.to_string(), input.clone()));
        self.outputs
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| format!("Error: tool '{tool}' not found"))
    }
}
