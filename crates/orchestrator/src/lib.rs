//! # Loomline Orchestrator
//!
//! The per-conversation state machine: a serialized signal queue feeding a
//! think→act→observe loop, with token-budget-driven context compaction and
//! generation restarts.
//!
//! Entry point is [`ConversationOrchestrator::spawn`], which returns an
//! [`OrchestratorHandle`] for enqueuing signals and querying the live
//! context.

pub mod budget;
pub mod compact;
pub mod orchestrator;
pub mod step;

#[cfg(test)]
pub(crate) mod test_support;

pub use budget::{TokenBudgetMonitor, estimate_entries_tokens, estimate_tokens};
pub use compact::{CompactionResult, Compactor};
pub use orchestrator::{ContinuationPayload, ConversationOrchestrator, OrchestratorHandle};
pub use step::ReasoningStep;
