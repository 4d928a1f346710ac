//! Context compaction — summarizes the log into a bounded digest plus the
//! most recent raw entries.
//!
//! Compaction marks a generation boundary: the result seeds the successor
//! generation's context. The digest covers everything; the trailing raw
//! entries preserve immediate conversational continuity verbatim.

use std::sync::Arc;
use tracing::{debug, info};

use loomline_core::{ContextEntry, ReasoningBackend, RetryPolicy, StepError};

/// The compacted context: one summary entry followed by the literal last
/// `keep_recent` entries of the pre-compaction log, in original order.
#[derive(Debug, Clone)]
pub struct CompactionResult {
    pub entries: Vec<ContextEntry>,
}

/// Compacts a context log via the reasoning backend.
pub struct Compactor {
    backend: Arc<dyn ReasoningBackend>,
    policy: RetryPolicy,
    keep_recent: usize,
}

impl Compactor {
    pub fn new(backend: Arc<dyn ReasoningBackend>, policy: RetryPolicy, keep_recent: usize) -> Self {
        Self {
            backend,
            policy,
            keep_recent,
        }
    }

    /// How many raw entries survive a compaction.
    pub fn keep_recent(&self) -> usize {
        self.keep_recent
    }

    /// Summarize `entries` into a digest plus the trailing raw entries.
    ///
    /// Callers guard against compacting logs that are already at or below
    /// the recency window; if one slips through, the log is returned as-is.
    pub async fn compact(&self, entries: &[ContextEntry]) -> Result<CompactionResult, StepError> {
        if entries.len() <= self.keep_recent {
            debug!(
                len = entries.len(),
                keep_recent = self.keep_recent,
                "Context too small to compact, keeping as-is"
            );
            return Ok(CompactionResult {
                entries: entries.to_vec(),
            });
        }

        let backend = self.backend.clone();
        let owned: Vec<ContextEntry> = entries.to_vec();
        let digest = self
            .policy
            .run("compaction", move || {
                let backend = backend.clone();
                let entries = owned.clone();
                async move { backend.summarize(&entries).await }
            })
            .await?;

        let mut compacted = Vec::with_capacity(self.keep_recent + 1);
        compacted.push(ContextEntry::summary(digest));
        compacted.extend_from_slice(&entries[entries.len() - self.keep_recent..]);

        info!(
            before = entries.len(),
            after = compacted.len(),
            "Compacted context"
        );
        Ok(CompactionResult { entries: compacted })
    }
}
