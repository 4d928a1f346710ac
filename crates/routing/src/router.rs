//! Response router — resolves a workflow identity to the platform that
//! should receive the reply, then dispatches.
//!
//! Unified identities are resolved through the session-link store to the most
//! recently active platform. Unresolvable sessions and unregistered platforms
//! are logged and dropped: this path is a live notification, not the durable
//! record.

use std::sync::Arc;
use tracing::{debug, warn};

use loomline_core::{Error, SessionLinkStore, WorkflowId};

use crate::registry::DeliveryRegistry;

/// Routes finished answers and artifacts to delivery callbacks.
pub struct ResponseRouter {
    registry: DeliveryRegistry,
    links: Arc<dyn SessionLinkStore>,
}

impl ResponseRouter {
    /// Create a router over a populated registry and the session-link store.
    pub fn new(registry: DeliveryRegistry, links: Arc<dyn SessionLinkStore>) -> Self {
        Self { registry, links }
    }

    /// Deliver a message for the given encoded workflow identity.
    ///
    /// Fails only on a malformed identity; missing callbacks and unresolved
    /// unified sessions are absorbed after a warning.
    pub async fn handle(&self, encoded_id: &str, message: &str) -> Result<(), Error> {
        let id = WorkflowId::parse(encoded_id)?;
        let Some((platform, chat_id)) = self.resolve(&id).await else {
            return Ok(());
        };

        match self.registry.message_delivery(&platform) {
            Some(delivery) => {
                if let Err(e) = delivery.deliver(message, &chat_id).await {
                    warn!(platform = %platform, chat_id = %chat_id, error = %e, "Message delivery failed");
                } else {
                    debug!(platform = %platform, chat_id = %chat_id, "Delivered message");
                }
            }
            None => {
                warn!(platform = %platform, "No message delivery registered, dropping answer");
            }
        }
        Ok(())
    }

    /// Deliver an artifact for the given encoded workflow identity.
    pub async fn handle_artifact(
        &self,
        encoded_id: &str,
        path: &str,
        description: Option<&str>,
    ) -> Result<(), Error> {
        let id = WorkflowId::parse(encoded_id)?;
        let Some((platform, chat_id)) = self.resolve(&id).await else {
            return Ok(());
        };

        match self.registry.artifact_delivery(&platform) {
            Some(delivery) => {
                if let Err(e) = delivery.deliver_artifact(path, &chat_id, description).await {
                    warn!(platform = %platform, chat_id = %chat_id, error = %e, "Artifact delivery failed");
                }
            }
            None => {
                warn!(platform = %platform, "No artifact delivery registered, dropping artifact");
            }
        }
        Ok(())
    }

    /// Resolve an identity to `(platform, chat_id)` for delivery.
    ///
    /// Returns `None` (after logging) when a unified session has no active
    /// platform on record.
    async fn resolve(&self, id: &WorkflowId) -> Option<(String, String)> {
        if !id.is_unified() {
            return Some((id.platform.clone(), id.chat_id.clone()));
        }

        match self.links.active_platform(&id.chat_id).await {
            Ok(Some(platform)) => Some((platform, id.chat_id.clone())),
            Ok(None) => {
                warn!(canonical = %id.chat_id, "Unified session has no active platform, dropping");
                None
            }
            Err(e) => {
                warn!(canonical = %id.chat_id, error = %e, "Session link lookup failed, dropping");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ArtifactDelivery, MessageDelivery};
    use async_trait::async_trait;
    use loomline_core::{DeliveryError, InMemorySessionLinkStore, SessionLink};
    use tokio::sync::Mutex;

    /// Records every delivery it receives.
    #[derive(Default)]
    struct RecordingDelivery {
        messages: Mutex<Vec<(String, String)>>,
        artifacts: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl MessageDelivery for RecordingDelivery {
        async fn deliver(&self, message: &str, chat_id: &str) -> Result<(), DeliveryError> {
            self.messages
                .lock()
                .await
                .push((message.to_string(), chat_id.to_string()));
            Ok(())
        }
    }

    #[async_trait]
    impl ArtifactDelivery for RecordingDelivery {
        async fn deliver_artifact(
            &self,
            path: &str,
            chat_id: &str,
            _description: Option<&str>,
        ) -> Result<(), DeliveryError> {
            self.artifacts
                .lock()
                .await
                .push((path.to_string(), chat_id.to_string()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn direct_identity_routes_to_its_platform() {
        let delivery = Arc::new(RecordingDelivery::default());
        let mut registry = DeliveryRegistry::new();
        registry.register("telegram", delivery.clone());

        let router = ResponseRouter::new(registry, Arc::new(InMemorySessionLinkStore::new()));
        let id = WorkflowId::direct("telegram", "5");
        router.handle(&id.encode(), "hi").await.unwrap();

        let messages = delivery.messages.lock().await;
        assert_eq!(messages.as_slice(), &[("hi".to_string(), "5".to_string())]);
    }

    #[tokio::test]
    async fn unified_identity_routes_to_active_platform() {
        let telegram = Arc::new(RecordingDelivery::default());
        let discord = Arc::new(RecordingDelivery::default());
        let mut registry = DeliveryRegistry::new();
        registry.register("telegram", telegram.clone());
        registry.register("discord", discord.clone());

        let links = Arc::new(InMemorySessionLinkStore::new());
        links
            .link(
                "telegram",
                "5",
                SessionLink {
                    canonical_session_id: "U".into(),
                    active_platform: "discord".into(),
                },
            )
            .await
            .unwrap();

        let router = ResponseRouter::new(registry, links);
        router
            .handle(&WorkflowId::unified("U").encode(), "hi")
            .await
            .unwrap();

        assert!(telegram.messages.lock().await.is_empty());
        let messages = discord.messages.lock().await;
        assert_eq!(messages.as_slice(), &[("hi".to_string(), "U".to_string())]);
    }

    #[tokio::test]
    async fn unresolved_unified_session_is_dropped_not_failed() {
        let router = ResponseRouter::new(
            DeliveryRegistry::new(),
            Arc::new(InMemorySessionLinkStore::new()),
        );
        // No link exists for canonical id "ghost"
        let result = router.handle(&WorkflowId::unified("ghost").encode(), "hi").await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn missing_callback_is_dropped_not_failed() {
        let router = ResponseRouter::new(
            DeliveryRegistry::new(),
            Arc::new(InMemorySessionLinkStore::new()),
        );
        let id = WorkflowId::direct("telegram", "5");
        assert!(router.handle(&id.encode(), "hi").await.is_ok());
    }

    #[tokio::test]
    async fn malformed_identity_is_fatal() {
        let router = ResponseRouter::new(
            DeliveryRegistry::new(),
            Arc::new(InMemorySessionLinkStore::new()),
        );
        assert!(router.handle("not an id", "hi").await.is_err());
    }

    #[tokio::test]
    async fn artifact_routing() {
        let delivery = Arc::new(RecordingDelivery::default());
        let mut registry = DeliveryRegistry::new();
        registry.register_artifact("discord", delivery.clone());

        let router = ResponseRouter::new(registry, Arc::new(InMemorySessionLinkStore::new()));
        let id = WorkflowId::direct("discord", "d9");
        router
            .handle_artifact(&id.encode(), "/tmp/report.pdf", Some("the report"))
            .await
            .unwrap();

        let artifacts = delivery.artifacts.lock().await;
        assert_eq!(
            artifacts.as_slice(),
            &[("/tmp/report.pdf".to_string(), "d9".to_string())]
        );
    }
}
