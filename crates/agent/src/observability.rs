//! Observability writer: best-effort appends to the LLM, tool, and event
//! logs.
//!
//! A failed observability write degrades to local structured logging and
//! never fails the turn that produced it.

use std::sync::Arc;

use pulsebot_core::event::EventRecord;
use pulsebot_core::observability::{LlmLogRecord, ToolLogRecord};
use pulsebot_core::StreamStore;
use sha2::{Digest, Sha256};
use tracing::warn;

/// Preview bound for user/assistant text in the LLM log.
pub const MESSAGE_PREVIEW_MAX: usize = 200;

/// Preview bound for tool results in the tool log.
pub const RESULT_PREVIEW_MAX: usize = 500;

/// Truncate to at most `max` characters, marking the cut with an ellipsis.
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let cut: String = s.chars().take(max.saturating_sub(3)).collect();
    format!("{cut}...")
}

/// Stable digest of the exact text sent to the LLM. Used for bucketing
/// prompts, never for reconstruction.
pub fn sha256_hex(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub struct ObservabilityWriter {
    store: Arc<dyn StreamStore>,
}

impl ObservabilityWriter {
    pub fn new(store: Arc<dyn StreamStore>) -> Self {
        Self { store }
    }

    /// Append an LLM-log row; returns the row id for linking tool logs.
    pub async fn log_llm_call(&self, record: LlmLogRecord) -> String {
        let id = record.id.clone();
        if let Err(e) = self.store.append_llm_log(record).await {
            warn!(error = %e, "Failed to write LLM log record");
        }
        id
    }

    pub async fn log_tool_call(&self, record: ToolLogRecord) {
        if let Err(e) = self.store.append_tool_log(record).await {
            warn!(error = %e, "Failed to write tool log record");
        }
    }

    pub async fn log_event(&self, record: EventRecord) {
        if let Err(e) = self.store.append_event(record).await {
            warn!(error = %e, "Failed to write event record");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_short_strings_untouched() {
        assert_eq!(truncate("hello", 200), "hello");
    }

    #[test]
    fn truncate_respects_bound() {
        let long = "x".repeat(500);
        let cut = truncate(&long, MESSAGE_PREVIEW_MAX);
        assert_eq!(cut.chars().count(), MESSAGE_PREVIEW_MAX);
        assert!(cut.ends_with("..."));
    }

    #[test]
    fn truncate_handles_multibyte() {
        let text = "héllo wörld ".repeat(40);
        let cut = truncate(&text, 50);
        assert_eq!(cut.chars().count(), 50);
    }

    #[test]
    fn digest_is_stable_and_hex() {
        let a = sha256_hex("system prompt text");
        let b = sha256_hex("system prompt text");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));

        let c = sha256_hex("different text");
        assert_ne!(a, c);
    }
}
