//! Tool dispatcher trait — the seam to tool implementations.
//!
//! The dispatcher is contractually infallible: implementations catch their
//! own failures and return a descriptive error string instead of raising.
//! That keeps the reasoning loop alive when a tool misbehaves — the failure
//! text simply becomes the action result the backend observes.

use async_trait::async_trait;

use crate::reasoner::ToolDefinition;

/// The tool dispatcher collaborator.
#[async_trait]
pub trait ToolDispatcher: Send + Sync {
    /// The catalog advertised to the reasoning backend.
    fn catalog(&self) -> Vec<ToolDefinition>;

    /// Execute a tool and return its output.
    ///
    /// Never fails: unknown tools and tool errors come back as descriptive
    /// strings (e.g. `"Error: tool 'foo' not found"`).
    async fn dispatch(&self, tool: &str, input: &serde_json::Value) -> String;
}
