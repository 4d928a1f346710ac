//! Response routing — delivers finished answers and artifacts back to chat
//! platforms.
//!
//! Delivery is best-effort live notification: the durable message store is
//! the source of truth, so an unroutable answer is logged and dropped rather
//! than retried or requeued.

pub mod registry;
pub mod router;

pub use registry::{ArtifactDelivery, DeliveryRegistry, MessageDelivery};
pub use router::ResponseRouter;
