//! Event-log row types — system health and audit records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Event severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the `events` stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: String,

    pub timestamp: DateTime<Utc>,

    /// What happened (e.g. "cost_alert", "turn_failed", "stream_reconnect").
    pub event_type: String,

    /// Which component emitted it.
    pub source: String,

    pub severity: Severity,

    /// Structured event data, serialized as JSON text.
    pub payload: String,

    /// Labels for filtering.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl EventRecord {
    pub fn new(
        event_type: impl Into<String>,
        source: impl Into<String>,
        severity: Severity,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.into(),
            source: source.into(),
            severity,
            payload: payload.to_string(),
            tags: Vec::new(),
        }
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_ordering() {
        assert!(Severity::Debug < Severity::Warning);
        assert!(Severity::Error < Severity::Critical);
    }

    #[test]
    fn event_construction() {
        let event = EventRecord::new(
            "cost_alert",
            "llm_monitor",
            Severity::Warning,
            serde_json::json!({"hourly_cost": 6.2}),
        )
        .with_tags(vec!["cost".into(), "llm".into()]);

        assert_eq!(event.severity, Severity::Warning);
        assert!(event.payload.contains("6.2"));
        assert_eq!(event.tags.len(), 2);
    }
}
