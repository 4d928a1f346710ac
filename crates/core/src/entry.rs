//! Context entries and the append-only context log.
//!
//! The reasoning context is an ordered sequence of immutable tagged text
//! blocks. Entries are never edited or removed individually; the only way the
//! log shrinks is wholesale replacement at a compaction boundary.
//!
//! Entries render as XML-style tagged blocks (LLM-friendly, same convention
//! the backend prompt uses), e.g.
//! `<user_message author="Alice">What is 2+2?</user_message>`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// The kind of a context entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    UserMessage,
    ExternalContext,
    ExternalArtifact,
    Thought,
    Action,
    Observation,
    Answer,
    Summary,
}

impl EntryKind {
    /// The tag used when rendering this entry.
    pub fn tag(&self) -> &'static str {
        match self {
            EntryKind::UserMessage => "user_message",
            EntryKind::ExternalContext => "external_context",
            EntryKind::ExternalArtifact => "external_artifact",
            EntryKind::Thought => "thought",
            EntryKind::Action => "action",
            EntryKind::Observation => "observation",
            EntryKind::Answer => "answer",
            EntryKind::Summary => "summary",
        }
    }
}

/// One immutable tagged block in the context log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextEntry {
    /// What kind of block this is.
    pub kind: EntryKind,

    /// The text content.
    pub text: String,

    /// Who produced it, where applicable (user messages, external context).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    /// When it entered the log.
    pub timestamp: DateTime<Utc>,
}

impl ContextEntry {
    fn new(kind: EntryKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            author: None,
            timestamp: Utc::now(),
        }
    }

    /// A user message drained from the pending queue.
    pub fn user_message(
        author: impl Into<String>,
        text: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            kind: EntryKind::UserMessage,
            text: text.into(),
            author: Some(author.into()),
            timestamp,
        }
    }

    /// Out-of-band context injected by another system.
    pub fn external_context(
        author: impl Into<String>,
        content: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            kind: EntryKind::ExternalContext,
            text: content.into(),
            author: Some(author.into()),
            timestamp,
        }
    }

    /// A reference to an external artifact (file, media, etc.).
    pub fn external_artifact(
        reference: &str,
        description: &str,
        mimetype: &str,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            kind: EntryKind::ExternalArtifact,
            text: format!("{reference} ({mimetype}): {description}"),
            author: None,
            timestamp,
        }
    }

    /// The backend's reasoning text for one step.
    pub fn thought(text: impl Into<String>) -> Self {
        Self::new(EntryKind::Thought, text)
    }

    /// A requested tool action, serialized as JSON for a machine-readable trail.
    pub fn action(tool: &str, reason: &str, input: &serde_json::Value) -> Self {
        let body = serde_json::json!({
            "tool": tool,
            "reason": reason,
            "input": input,
        });
        Self::new(EntryKind::Action, body.to_string())
    }

    /// The summarized result of a tool action.
    pub fn observation(text: impl Into<String>) -> Self {
        Self::new(EntryKind::Observation, text)
    }

    /// A final answer for the current turn.
    pub fn answer(text: impl Into<String>) -> Self {
        Self::new(EntryKind::Answer, text)
    }

    /// A compaction digest covering everything before it.
    pub fn summary(text: impl Into<String>) -> Self {
        Self::new(EntryKind::Summary, text)
    }

    /// Render as a tagged block.
    pub fn render(&self) -> String {
        let tag = self.kind.tag();
        match &self.author {
            Some(author) => format!("<{tag} author=\"{author}\">{}</{tag}>", self.text),
            None => format!("<{tag}>{}</{tag}>", self.text),
        }
    }
}

/// The append-only context log for one conversation.
///
/// Held behind `Arc` and shared between the orchestrator loop (sole writer)
/// and query callers; `snapshot` is safe to call while a reasoning step is in
/// flight because the loop only holds the write lock for the duration of an
/// append or replace, never across an await on a collaborator.
#[derive(Default)]
pub struct ContextLog {
    entries: RwLock<Vec<ContextEntry>>,
}

impl ContextLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a log from a continuation payload.
    pub fn from_entries(entries: Vec<ContextEntry>) -> Self {
        Self {
            entries: RwLock::new(entries),
        }
    }

    /// Append one entry.
    pub async fn append(&self, entry: ContextEntry) {
        self.entries.write().await.push(entry);
    }

    /// Read-only copy of the current entries.
    pub async fn snapshot(&self) -> Vec<ContextEntry> {
        self.entries.read().await.clone()
    }

    /// Rendered tagged blocks, in order.
    pub async fn rendered(&self) -> Vec<String> {
        self.entries.read().await.iter().map(|e| e.render()).collect()
    }

    /// Wholesale replacement — used only at compaction boundaries and by
    /// explicit context clears.
    pub async fn replace(&self, entries: Vec<ContextEntry>) {
        *self.entries.write().await = entries;
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
