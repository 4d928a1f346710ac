//! Delivery registry — per-platform outbound callbacks.
//!
//! An explicit instance populated at startup and injected into the router;
//! deliberately not ambient global state. Message and artifact delivery are
//! registered independently because not every platform can receive files.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use loomline_core::DeliveryError;

/// Outbound text delivery for one platform.
#[async_trait]
pub trait MessageDelivery: Send + Sync {
    /// Send `message` to `chat_id` on this platform.
    async fn deliver(&self, message: &str, chat_id: &str) -> Result<(), DeliveryError>;
}

/// Outbound artifact (file/media) delivery for one platform.
#[async_trait]
pub trait ArtifactDelivery: Send + Sync {
    /// Send the artifact at `path` to `chat_id`, with an optional caption.
    async fn deliver_artifact(
        &self,
        path: &str,
        chat_id: &str,
        description: Option<&str>,
    ) -> Result<(), DeliveryError>;
}

/// Registry of delivery callbacks, keyed by platform name.
#[derive(Default)]
pub struct DeliveryRegistry {
    messages: HashMap<String, Arc<dyn MessageDelivery>>,
    artifacts: HashMap<String, Arc<dyn ArtifactDelivery>>,
}

impl DeliveryRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a message delivery callback for a platform.
    pub fn register(&mut self, platform: impl Into<String>, delivery: Arc<dyn MessageDelivery>) {
        let platform = platform.into();
        info!(platform = %platform, "Registered message delivery");
        self.messages.insert(platform, delivery);
    }

    /// Register an artifact delivery callback for a platform.
    pub fn register_artifact(
        &mut self,
        platform: impl Into<String>,
        delivery: Arc<dyn ArtifactDelivery>,
    ) {
        let platform = platform.into();
        info!(platform = %platform, "Registered artifact delivery");
        self.artifacts.insert(platform, delivery);
    }

    /// Get the message delivery callback for a platform.
    pub fn message_delivery(&self, platform: &str) -> Option<&Arc<dyn MessageDelivery>> {
        self.messages.get(platform)
    }

    /// Get the artifact delivery callback for a platform.
    pub fn artifact_delivery(&self, platform: &str) -> Option<&Arc<dyn ArtifactDelivery>> {
        self.artifacts.get(platform)
    }

    /// List platforms with a registered message delivery.
    pub fn platforms(&self) -> Vec<String> {
        self.messages.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty() && self.artifacts.is_empty()
    }
}
