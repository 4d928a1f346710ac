//! Message persistence — the append-only audit log collaborator.
//!
//! Independent of the in-memory context: compaction rewrites the reasoning
//! context, but the audit trail keeps every message and answer verbatim.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::StoreError;
use crate::identity::WorkflowId;

/// One persisted message or answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    /// Unique message id.
    pub id: String,

    /// Who wrote it ("assistant" for answers).
    pub author: String,

    /// The text content.
    pub text: String,

    /// Original receive/produce time.
    pub timestamp: DateTime<Utc>,
}

/// Append-only message store keyed by workflow identity.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Append one message to the audit log.
    async fn persist(
        &self,
        workflow: &WorkflowId,
        author: &str,
        text: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Full history for a workflow, in append order.
    async fn history(&self, workflow: &WorkflowId) -> Result<Vec<StoredMessage>, StoreError>;
}

/// In-memory message store for tests and single-process deployments.
#[derive(Default)]
pub struct InMemoryMessageStore {
    messages: RwLock<HashMap<String, Vec<StoredMessage>>>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn persist(
        &self,
        workflow: &WorkflowId,
        author: &str,
        text: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut messages = self.messages.write().await;
        messages.entry(workflow.encode()).or_default().push(StoredMessage {
            id: Uuid::new_v4().to_string(),
            author: author.to_string(),
            text: text.to_string(),
            timestamp,
        });
        Ok(())
    }

    async fn history(&self, workflow: &WorkflowId) -> Result<Vec<StoredMessage>, StoreError> {
        let messages = self.messages.read().await;
        Ok(messages.get(&workflow.encode()).cloned().unwrap_or_default())
    }
}
