//! # Loomline Core
//!
//! Domain types, collaborator traits, and error definitions for the Loomline
//! conversation orchestrator. This crate defines the model that the
//! orchestrator and routing crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator (reasoning backend, tool dispatcher, message
//! store, session-link store) is defined as a trait here. Implementations —
//! real or mock — live elsewhere. This keeps the dependency graph pointing
//! inward and makes the orchestrator testable with scripted collaborators.

pub mod dispatch;
pub mod entry;
pub mod error;
pub mod identity;
pub mod reasoner;
pub mod retry;
pub mod signal;
pub mod store;

// Re-export key types at crate root for ergonomics
pub use dispatch::ToolDispatcher;
pub use entry::{ContextEntry, ContextLog, EntryKind};
pub use error::{DeliveryError, Error, IdentityError, Result, StepError, StoreError};
pub use identity::{
    InMemorySessionLinkStore, SessionLink, SessionLinkStore, SessionType, UNIFIED_PLATFORM,
    WorkflowId,
};
pub use reasoner::{ReasoningBackend, ThoughtOutcome, ThoughtResult, ToolDefinition};
pub use retry::RetryPolicy;
pub use signal::{PendingMessage, Signal};
pub use store::{InMemoryMessageStore, MessageStore, StoredMessage};
