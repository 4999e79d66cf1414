//! StreamStore trait — the structured operations the runtime performs
//! against the five append-only logs.
//!
//! Raw SQL stays inside the stream crate; the rest of the runtime (agent
//! loop, memory manager, scheduled producers, gateway) speaks this trait.
//! That seam is what lets end-to-end scenarios run against the in-memory
//! store in tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use crate::error::StreamError;
use crate::event::EventRecord;
use crate::memory::{MemoryFilter, MemoryRecord};
use crate::message::{MessageRecord, MessageType};
use crate::observability::{LlmLogRecord, ToolLogRecord};

/// Where a tail starts reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekTo {
    /// Only rows appended after the tail begins.
    Latest,
    /// The start of the retained log.
    Earliest,
    /// An absolute UTC instant.
    At(DateTime<Utc>),
    /// A relative offset before now ("now minus N seconds").
    AgoSeconds(u64),
}

impl std::fmt::Display for SeekTo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Latest => f.write_str("latest"),
            Self::Earliest => f.write_str("earliest"),
            Self::At(ts) => write!(f, "{}", ts.format("%Y-%m-%d %H:%M:%S%.3f")),
            Self::AgoSeconds(secs) => write!(f, "-{secs}s"),
        }
    }
}

/// Row filter for a message tail.
#[derive(Debug, Clone, Default)]
pub struct TailFilter {
    /// Exact `target` match (e.g. "agent", "channel:cli").
    pub target: Option<String>,

    /// Accepted message types; empty accepts all.
    pub message_types: Vec<MessageType>,
}

impl TailFilter {
    /// The agent loop's inbox: rows targeted at the agent with the consumed
    /// message types.
    pub fn agent_inbox() -> Self {
        Self {
            target: Some("agent".into()),
            message_types: vec![
                MessageType::UserInput,
                MessageType::ToolResult,
                MessageType::Heartbeat,
                MessageType::ScheduledTask,
            ],
        }
    }

    /// Everything routed to one channel.
    pub fn channel(name: &str) -> Self {
        Self {
            target: Some(format!("channel:{name}")),
            message_types: Vec::new(),
        }
    }

    /// Whether a row passes this filter.
    pub fn matches(&self, row: &MessageRecord) -> bool {
        if let Some(target) = &self.target {
            if &row.target != target {
                return false;
            }
        }
        self.message_types.is_empty() || self.message_types.contains(&row.message_type)
    }
}

/// A live, cancelable, single-consumer sequence of message rows.
///
/// Backpressured: the producer does not advance past what the consumer has
/// accepted. Dropping the tail cancels the underlying read.
pub struct MessageTail {
    rx: mpsc::Receiver<std::result::Result<MessageRecord, StreamError>>,
}

impl MessageTail {
    pub fn new(rx: mpsc::Receiver<std::result::Result<MessageRecord, StreamError>>) -> Self {
        Self { rx }
    }

    /// Next row, `Some(Err(_))` on transport loss, `None` when the tail ends.
    pub async fn recv(&mut self) -> Option<std::result::Result<MessageRecord, StreamError>> {
        self.rx.recv().await
    }
}

/// The structured log operations the runtime needs.
///
/// Implementations: the streaming-DB store (SQL over the stream client) and
/// an in-memory double for tests.
#[async_trait]
pub trait StreamStore: Send + Sync {
    /// The backend name (e.g. "timeplus", "in_memory").
    fn name(&self) -> &str;

    /// Append a message row; returns its id.
    async fn append_message(&self, row: MessageRecord)
        -> std::result::Result<String, StreamError>;

    /// Append a memory row; returns its id.
    async fn append_memory(&self, row: MemoryRecord) -> std::result::Result<String, StreamError>;

    /// Append an LLM-log row; returns its id.
    async fn append_llm_log(&self, row: LlmLogRecord)
        -> std::result::Result<String, StreamError>;

    /// Append a tool-log row; returns its id.
    async fn append_tool_log(&self, row: ToolLogRecord)
        -> std::result::Result<String, StreamError>;

    /// Append an event row; returns its id.
    async fn append_event(&self, row: EventRecord) -> std::result::Result<String, StreamError>;

    /// The last `limit` messages of a session restricted to `types`,
    /// returned in chronological order (ties within one millisecond break by
    /// id).
    async fn session_messages(
        &self,
        session_id: &str,
        types: &[MessageType],
        limit: usize,
    ) -> std::result::Result<Vec<MessageRecord>, StreamError>;

    /// Live (non-tombstoned) memory rows matching the filter, newest first.
    /// A record is live only if no row with the same id has
    /// `is_deleted = true`.
    async fn memories(
        &self,
        filter: MemoryFilter,
    ) -> std::result::Result<Vec<MemoryRecord>, StreamError>;

    /// Open a tail over the message log.
    async fn tail_messages(
        &self,
        filter: TailFilter,
        seek: SeekTo,
    ) -> std::result::Result<MessageTail, StreamError>;

    /// Aggregate `estimated_cost` over the trailing hour of the LLM log.
    async fn hourly_cost(&self) -> std::result::Result<f64, StreamError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seek_rendering() {
        assert_eq!(SeekTo::Latest.to_string(), "latest");
        assert_eq!(SeekTo::Earliest.to_string(), "earliest");
        assert_eq!(SeekTo::AgoSeconds(300).to_string(), "-300s");

        let ts = DateTime::parse_from_rfc3339("2026-03-01T12:30:05.250Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(SeekTo::At(ts).to_string(), "2026-03-01 12:30:05.250");
    }

    #[test]
    fn agent_inbox_filter() {
        let filter = TailFilter::agent_inbox();

        let inbox_row = MessageRecord::user_input("cli", "s1", "hi");
        assert!(filter.matches(&inbox_row));

        let response = MessageRecord::agent_response("cli", "s1", "hello");
        assert!(!filter.matches(&response));

        let mut error_to_agent = MessageRecord::user_input("cli", "s1", "x");
        error_to_agent.message_type = MessageType::Error;
        assert!(!filter.matches(&error_to_agent));
    }

    #[test]
    fn channel_filter_accepts_all_types() {
        let filter = TailFilter::channel("cli");
        let response = MessageRecord::agent_response("cli", "s1", "hello");
        assert!(filter.matches(&response));
        let other = MessageRecord::agent_response("webchat", "s1", "hello");
        assert!(!filter.matches(&other));
    }
}
