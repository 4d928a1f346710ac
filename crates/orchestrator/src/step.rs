//! The think / act / observe triad.
//!
//! Each sub-operation is a single blocking call to an external collaborator,
//! wrapped in the retry policy for its step class. Thought and observation
//! can fail (and escalate after retries); action cannot — the tool dispatcher
//! encodes its failures as strings, which keeps the loop alive through tool
//! misbehavior.

use std::sync::Arc;
use tracing::{debug, warn};

use loomline_core::{
    ContextEntry, ReasoningBackend, RetryPolicy, StepError, ThoughtResult, ToolDefinition,
    ToolDispatcher,
};

/// Executes individual reasoning steps against the backend and dispatcher.
pub struct ReasoningStep {
    backend: Arc<dyn ReasoningBackend>,
    dispatcher: Arc<dyn ToolDispatcher>,
    catalog: Vec<ToolDefinition>,
    thought_policy: RetryPolicy,
    observation_policy: RetryPolicy,
}

impl ReasoningStep {
    pub fn new(
        backend: Arc<dyn ReasoningBackend>,
        dispatcher: Arc<dyn ToolDispatcher>,
        thought_policy: RetryPolicy,
        observation_policy: RetryPolicy,
    ) -> Self {
        let catalog = dispatcher.catalog();
        Self {
            backend,
            dispatcher,
            catalog,
            thought_policy,
            observation_policy,
        }
    }

    /// The tool catalog advertised to the backend.
    pub fn catalog(&self) -> &[ToolDefinition] {
        &self.catalog
    }

    /// Run one reasoning step over the context.
    ///
    /// Transient backend failures are retried; a malformed result is a
    /// backend defect and escalates immediately.
    pub async fn thought(&self, context: &[ContextEntry]) -> Result<ThoughtResult, StepError> {
        let backend = self.backend.clone();
        let context: Arc<[ContextEntry]> = context.into();
        let catalog: Arc<[ToolDefinition]> = self.catalog.clone().into();

        self.thought_policy
            .run("thought", move || {
                let backend = backend.clone();
                let context = context.clone();
                let catalog = catalog.clone();
                async move { backend.think(&context, &catalog).await }
            })
            .await
    }

    /// Dispatch a tool action. Infallible by contract: failures come back as
    /// descriptive strings.
    pub async fn action(&self, tool: &str, input: &serde_json::Value) -> String {
        let start = std::time::Instant::now();
        let result = self.dispatcher.dispatch(tool, input).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        if result.starts_with("Error:") {
            warn!(tool, duration_ms, "Tool reported failure");
        } else {
            debug!(tool, duration_ms, "Tool executed");
        }
        result
    }

    /// Summarize an action result in light of the context.
    pub async fn observation(
        &self,
        context: &[ContextEntry],
        action_result: &str,
    ) -> Result<String, StepError> {
        let backend = self.backend.clone();
        let context: Arc<[ContextEntry]> = context.into();
        let action_result = action_result.to_string();

        self.observation_policy
            .run("observation", move || {
                let backend = backend.clone();
                let context = context.clone();
                let action_result = action_result.clone();
                async move { backend.observe(&context, &action_result).await }
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{RecordingDispatcher, ScriptedBackend, thought_answer};
    use loomline_core::ThoughtOutcome;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    fn quick_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            multiplier: 1.0,
            timeout: Duration::from_secs(5),
        }
    }

    fn step_with(backend: ScriptedBackend) -> (ReasoningStep, Arc<ScriptedBackend>) {
        let backend = Arc::new(backend);
        let step = ReasoningStep::new(
            backend.clone(),
            Arc::new(RecordingDispatcher::new(vec!["4"])),
            quick_policy(),
            quick_policy(),
        );
        (step, backend)
    }

    #[tokio::test]
    async fn thought_returns_scripted_result() {
        let (step, _) = step_with(ScriptedBackend::single_answer("4"));
        let result = step.thought(&[]).await.unwrap();
        assert_eq!(result.outcome, ThoughtOutcome::Answer { text: "4".into() });
    }

    #[tokio::test]
    async fn thought_retries_transient_failures() {
        let (step, backend) = step_with(ScriptedBackend::new(vec![
            Err(StepError::Backend("connection reset".into())),
            Ok(thought_answer("recovered", "ok")),
        ]));

        let result = step.thought(&[]).await.unwrap();
        assert_eq!(result.reasoning, "recovered");
        assert_eq!(backend.think_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn malformed_thought_is_fatal_not_retried() {
        let (step, backend) = step_with(ScriptedBackend::new(vec![
            Err(StepError::MalformedOutput("unknown kind 'ponder'".into())),
            Ok(thought_answer("never reached", "x")),
        ]));

        let err = step.thought(&[]).await.unwrap_err();
        assert!(matches!(err, StepError::MalformedOutput(_)));
        assert_eq!(backend.think_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausted_thought_retries_escalate() {
        let (step, _) = step_with(ScriptedBackend::new(vec![
            Err(StepError::Backend("down".into())),
            Err(StepError::Backend("down".into())),
            Err(StepError::Backend("down".into())),
        ]));

        let err = step.thought(&[]).await.unwrap_err();
        assert!(matches!(err, StepError::RetriesExhausted { .. }));
    }

    #[tokio::test]
    async fn action_returns_tool_output() {
        let dispatcher = Arc::new(RecordingDispatcher::new(vec!["42"]));
        let step = ReasoningStep::new(
            Arc::new(ScriptedBackend::script(vec![])),
            dispatcher.clone(),
            quick_policy(),
            quick_policy(),
        );

        let out = step
            .action("calculator", &serde_json::json!({"expr": "6*7"}))
            .await;
        assert_eq!(out, "42");
        assert_eq!(dispatcher.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn action_failure_is_a_string_not_an_error() {
        let dispatcher = Arc::new(RecordingDispatcher::new(vec![]));
        let step = ReasoningStep::new(
            Arc::new(ScriptedBackend::script(vec![])),
            dispatcher,
            quick_policy(),
            quick_policy(),
        );

        let out = step.action("unknown_tool", &serde_json::json!({})).await;
        assert!(out.starts_with("Error:"));
    }

    #[tokio::test]
    async fn observation_summarizes_result() {
        let (step, backend) = step_with(ScriptedBackend::script(vec![]));
        let text = step.observation(&[], "4").await.unwrap();
        assert_eq!(text, "observed: 4");
        assert_eq!(backend.observe_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn catalog_comes_from_dispatcher() {
        let (step, _) = step_with(ScriptedBackend::script(vec![]));
        assert_eq!(step.catalog().len(), 1);
        assert_eq!(step.catalog()[0].name, "calculator");
    }
}
