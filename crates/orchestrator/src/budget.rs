//! Token budget monitoring.
//!
//! Uses a character-based heuristic: ~4 characters per token, accurate within
//! ~10% for BPE tokenizers on English text. The same estimator is used for
//! every check, so limits stay comparable run-to-run.
//!
//! Besides the token count, the monitor carries the substrate's
//! "continuation suggested" hint — an operational signal (history-size based)
//! unrelated to tokens. Either condition alone requires compaction.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use loomline_core::ContextEntry;

/// Per-entry overhead for the tag, author attribute, and delimiters.
const ENTRY_OVERHEAD_TOKENS: usize = 8;

/// Estimate the token count for a string.
///
/// Heuristic: 1 token ≈ 4 characters. Rounds up.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    text.len().div_ceil(4)
}

/// Estimate tokens for a single entry including rendering overhead.
pub fn estimate_entry_tokens(entry: &ContextEntry) -> usize {
    let author = entry.author.as_deref().map_or(0, estimate_tokens);
    ENTRY_OVERHEAD_TOKENS + author + estimate_tokens(&entry.text)
}

/// Estimate tokens for a slice of entries.
pub fn estimate_entries_tokens(entries: &[ContextEntry]) -> usize {
    entries.iter().map(estimate_entry_tokens).sum()
}

/// Signals when the context has outgrown its budget.
pub struct TokenBudgetMonitor {
    limit: usize,
    hint: Arc<AtomicBool>,
}

impl TokenBudgetMonitor {
    /// Create a monitor with the given token limit.
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            hint: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The configured limit.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Shared flag the host sets when the execution substrate suggests a
    /// continuation.
    pub fn hint_handle(&self) -> Arc<AtomicBool> {
        self.hint.clone()
    }

    /// Whether the estimated context size exceeds the limit.
    pub fn exceeds(&self, entries: &[ContextEntry]) -> bool {
        estimate_entries_tokens(entries) > self.limit
    }

    /// Whether the substrate has suggested a continuation.
    pub fn continuation_suggested(&self) -> bool {
        self.hint.load(Ordering::Relaxed)
    }

    /// Whether either condition requires compaction.
    pub fn compaction_required(&self, entries: &[ContextEntry]) -> bool {
        self.continuation_suggested() || self.exceeds(entries)
    }
}

impl Default for TokenBudgetMonitor {
    fn default() -> Self {
        Self::new(16_000)
    }
}
