//! Workflow identity — the opaque, round-trippable conversation identifier.
//!
//! A `WorkflowId` names one conversation loop: `{platform, chat_id,
//! session_type}` serialized as JSON (optionally base64-wrapped for
//! deployments whose id fields dislike braces). The encoding is bijective:
//! `parse(id.encode())` always yields the original fields.
//!
//! Cross-platform ("unified") sessions are resolved here too: when a session
//! link exists for `(platform, chat_id)`, the id points at the canonical
//! session under the reserved `unified` platform, and the link's
//! `active_platform` is bumped so replies go to wherever the user last spoke.

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{IdentityError, StoreError};

/// The reserved platform name for merged cross-platform sessions.
pub const UNIFIED_PLATFORM: &str = "unified";

/// Whether a conversation runs the agent loop or a legacy handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionType {
    Agent,
    Legacy,
}

/// Identity of one conversation workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowId {
    /// Source platform (e.g., "telegram", "discord"), or `unified`.
    pub platform: String,

    /// Platform-scoped chat identifier, or the canonical session id for
    /// unified sessions. Kept as a string so negative and very large
    /// numeric ids survive the round trip untouched.
    pub chat_id: String,

    /// Session type tag.
    pub session_type: SessionType,
}

impl WorkflowId {
    /// Create a direct (non-unified) agent identity.
    pub fn direct(platform: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            chat_id: chat_id.into(),
            session_type: SessionType::Agent,
        }
    }

    /// Create an identity referencing a unified canonical session.
    pub fn unified(canonical_id: impl Into<String>) -> Self {
        Self {
            platform: UNIFIED_PLATFORM.into(),
            chat_id: canonical_id.into(),
            session_type: SessionType::Agent,
        }
    }

    /// Resolve the identity for an inbound platform event.
    ///
    /// If a session link exists for `(platform, chat_id)`, the link's active
    /// platform is updated to `platform` and a unified identity referencing
    /// the canonical session is returned. Otherwise a direct identity is
    /// returned.
    pub async fn create(
        platform: &str,
        chat_id: &str,
        links: &dyn SessionLinkStore,
    ) -> Result<Self, StoreError> {
        match links.get(platform, chat_id).await? {
            Some(link) => {
                links
                    .set_active_platform(&link.canonical_session_id, platform)
                    .await?;
                debug!(
                    platform,
                    chat_id,
                    canonical = %link.canonical_session_id,
                    "Resolved unified session"
                );
                Ok(Self::unified(link.canonical_session_id))
            }
            None => Ok(Self::direct(platform, chat_id)),
        }
    }

    /// Whether this identity references a unified canonical session.
    pub fn is_unified(&self) -> bool {
        self.platform == UNIFIED_PLATFORM
    }

    /// Encode as a JSON string. Exact inverse of [`WorkflowId::parse`].
    pub fn encode(&self) -> String {
        // Field order is fixed by the struct; serialization cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Encode as base64-wrapped JSON for id fields that dislike braces.
    pub fn encode_base64(&self) -> String {
        BASE64.encode(self.encode())
    }

    /// Parse an encoded identity, accepting both the plain-JSON and the
    /// base64-wrapped form.
    pub fn parse(encoded: &str) -> Result<Self, IdentityError> {
        let trimmed = encoded.trim();

        if trimmed.starts_with('{') {
            return serde_json::from_str(trimmed)
                .map_err(|e| IdentityError::Malformed(format!("invalid JSON identity: {e}")));
        }

        let decoded = BASE64
            .decode(trimmed)
            .map_err(|e| IdentityError::Malformed(format!("not JSON and not base64: {e}")))?;
        let text = String::from_utf8(decoded)
            .map_err(|e| IdentityError::Malformed(format!("base64 payload not UTF-8: {e}")))?;
        serde_json::from_str(&text)
            .map_err(|e| IdentityError::Malformed(format!("invalid wrapped identity: {e}")))
    }
}

impl std::fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.platform, self.chat_id)
    }
}

/// A link from one platform identity into a canonical unified session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionLink {
    /// The canonical session all linked platform identities share.
    pub canonical_session_id: String,

    /// Which platform the user most recently spoke from. Read by the
    /// response router to pick the reply channel.
    pub active_platform: String,
}

/// Store of session links, keyed by `(platform, chat_id)`.
///
/// Owned externally; the orchestrator and router only read and write through
/// this narrow interface.
#[async_trait]
pub trait SessionLinkStore: Send + Sync {
    /// Look up the link for a platform identity, if any.
    async fn get(&self, platform: &str, chat_id: &str) -> Result<Option<SessionLink>, StoreError>;

    /// Create or replace a link for a platform identity.
    async fn link(
        &self,
        platform: &str,
        chat_id: &str,
        link: SessionLink,
    ) -> Result<(), StoreError>;

    /// Update the active platform for every link into a canonical session.
    async fn set_active_platform(
        &self,
        canonical_id: &str,
        platform: &str,
    ) -> Result<(), StoreError>;

    /// The most recently active platform for a canonical session.
    async fn active_platform(&self, canonical_id: &str) -> Result<Option<String>, StoreError>;
}

/// In-memory session link store for tests and single-process deployments.
#[derive(Default)]
pub struct InMemorySessionLinkStore {
    links: RwLock<HashMap<(String, String), SessionLink>>,
}

impl InMemorySessionLinkStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionLinkStore for InMemorySessionLinkStore {
    async fn get(&self, platform: &str, chat_id: &str) -> Result<Option<SessionLink>, StoreError> {
        let links = self.links.read().await;
        Ok(links.get(&(platform.to_string(), chat_id.to_string())).cloned())
    }

    async fn link(
        &self,
        platform: &str,
        chat_id: &str,
        link: SessionLink,
    ) -> Result<(), StoreError> {
        let mut links = self.links.write().await;
        links.insert((platform.to_string(), chat_id.to_string()), link);
        Ok(())
    }

    async fn set_active_platform(
        &self,
        canonical_id: &str,
        platform: &str,
    ) -> Result<(), StoreError> {
        let mut links = self.links.write().await;
        for link in links.values_mut() {
            if link.canonical_session_id == canonical_id {
                link.active_platform = platform.to_string();
            }
        }
        Ok(())
    }

    async fn active_platform(&self, canonical_id: &str) -> Result<Option<String>, StoreError> {
        let links = self.links.read().await;
        Ok(links
            .values()
            .find(|l| l.canonical_session_id == canonical_id)
            .map(|l| l.active_platform.clone()))
    }
}
