//! Reasoning backend trait — the abstraction over the model that thinks.
//!
//! The backend sees the full tagged context plus a tool catalog and returns a
//! structured result: either a final answer or a requested tool action. This
//! is the structured-tool-call shape; there is no free-text envelope to parse
//! on our side, so an unrecognizable result is a backend defect and surfaces
//! as the fatal `StepError::MalformedOutput`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::entry::ContextEntry;
use crate::error::StepError;

/// A tool definition sent to the backend so it knows what it can call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// What the backend decided to do, consumed exactly once by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ThoughtOutcome {
    /// The final answer for this turn.
    Answer { text: String },

    /// A requested tool invocation.
    Action {
        tool: String,
        reason: String,
        input: serde_json::Value,
    },
}

/// One reasoning step's output: the visible reasoning text plus the decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThoughtResult {
    /// Reasoning text, appended to the log as a `thought` entry.
    pub reasoning: String,

    /// The decision: answer or act.
    pub outcome: ThoughtOutcome,
}

/// The reasoning backend collaborator.
///
/// All three operations are single blocking calls; retry and timeout policy
/// is applied by the caller's retry wrapper, not here.
#[async_trait]
pub trait ReasoningBackend: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &str;

    /// Run one reasoning step over the context and tool catalog.
    async fn think(
        &self,
        context: &[ContextEntry],
        tools: &[ToolDefinition],
    ) -> Result<ThoughtResult, StepError>;

    /// Summarize a tool result in light of the context, producing the text
    /// for the next `observation` entry.
    async fn observe(
        &self,
        context: &[ContextEntry],
        action_result: &str,
    ) -> Result<String, StepError>;

    /// Produce a compaction digest covering the full context.
    async fn summarize(&self, context: &[ContextEntry]) -> Result<String, StepError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_serializes_tagged() {
        let a = ThoughtOutcome::Answer { text: "4".into() };
        let json = serde_json::to_string(&a).unwrap();
        assert!(json.contains("\"kind\":\"answer\""));

        let act = ThoughtOutcome::Action {
            tool: "calculator".into(),
            reason: "arithmetic".into(),
            input: serde_json::json!({"expr": "2+2"}),
        };
        let json = serde_json::to_string(&act).unwrap();
        assert!(json.contains("\"kind\":\"action\""));
        assert!(json.contains("calculator"));
    }

    #[test]
    fn thought_result_roundtrip() {
        let t = ThoughtResult {
            reasoning: "the user wants arithmetic".into(),
            outcome: ThoughtOutcome::Answer { text: "4".into() },
        };
        let json = serde_json::to_string(&t).unwrap();
        let back: ThoughtResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back, t);
    }
}
