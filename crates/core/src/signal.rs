//! Signal surface — the typed commands external callers enqueue.
//!
//! Signals are delivered over a single-consumer channel and applied by the
//! orchestrator only at its checkpoints, preserving the single-writer
//! discipline over `pending` and the context log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An inbound message waiting to be drained into the context log.
///
/// FIFO ordering is load-bearing: messages enter the log in arrival order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingMessage {
    pub author: String,
    pub text: String,
    pub received_at: DateTime<Utc>,
}

/// All signals a conversation orchestrator accepts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Signal {
    /// A new user message; queued and drained at the next checkpoint.
    NewMessage {
        author: String,
        text: String,
        timestamp: DateTime<Utc>,
    },

    /// Out-of-band context; appended directly to the log. Does not wake an
    /// idle loop by itself but is visible to the next thought call.
    ExternalContext {
        author: String,
        content: String,
        timestamp: DateTime<Utc>,
    },

    /// An external artifact reference; appended directly to the log.
    ExternalArtifact {
        reference: String,
        description: String,
        mimetype: String,
        timestamp: DateTime<Utc>,
    },

    /// Cooperative shutdown, honored at the next loop-top checkpoint.
    RequestExit,

    /// Force a compaction + generation restart at the next checkpoint.
    RequestContinuation,

    /// Wipe the context log.
    ClearContext,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_serializes_tagged() {
        let s = Signal::NewMessage {
            author: "Alice".into(),
            text: "hi".into(),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&s).unwrap();
        assert!(json.contains("\"type\":\"new_message\""));

        let json = serde_json::to_string(&Signal::RequestExit).unwrap();
        assert!(json.contains("request_exit"));
    }

    #[test]
    fn pending_message_roundtrip() {
        let m = PendingMessage {
            author: "Bob".into(),
            text: "hello".into(),
            received_at: Utc::now(),
        };
        let json = serde_json::to_string(&m).unwrap();
        let back: PendingMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, m);
    }
}
