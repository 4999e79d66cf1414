//! In-memory [`StreamStore`] implementation.
//!
//! Keeps the five logs as plain vectors with a broadcast channel feeding
//! tails. Used by tests (all the end-to-end agent-loop scenarios run on it)
//! and handy for offline development. Semantics match the DB-backed store:
//! append-only, tombstone filtering, chronological session reads.

use std::collections::HashSet;
use std::sync::RwLock;

use async_trait::async_trait;
use pulsebot_core::error::StreamError;
use pulsebot_core::event::EventRecord;
use pulsebot_core::memory::{MemoryFilter, MemoryRecord};
use pulsebot_core::message::{MessageRecord, MessageType};
use pulsebot_core::observability::{LlmLogRecord, ToolLogRecord};
use pulsebot_core::stream::{MessageTail, SeekTo, StreamStore, TailFilter};
use tokio::sync::{broadcast, mpsc};

pub struct InMemoryStore {
    messages: RwLock<Vec<MessageRecord>>,
    memory: RwLock<Vec<MemoryRecord>>,
    llm_logs: RwLock<Vec<LlmLogRecord>>,
    tool_logs: RwLock<Vec<ToolLogRecord>>,
    events: RwLock<Vec<EventRecord>>,
    live: broadcast::Sender<MessageRecord>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        let (live, _) = broadcast::channel(256);
        Self {
            messages: RwLock::new(Vec::new()),
            memory: RwLock::new(Vec::new()),
            llm_logs: RwLock::new(Vec::new()),
            tool_logs: RwLock::new(Vec::new()),
            events: RwLock::new(Vec::new()),
            live,
        }
    }

    // Snapshot accessors for assertions and the chat/offline paths.

    pub fn messages(&self) -> Vec<MessageRecord> {
        self.messages.read().unwrap().clone()
    }

    pub fn memory_rows(&self) -> Vec<MemoryRecord> {
        self.memory.read().unwrap().clone()
    }

    pub fn llm_logs(&self) -> Vec<LlmLogRecord> {
        self.llm_logs.read().unwrap().clone()
    }

    pub fn tool_logs(&self) -> Vec<ToolLogRecord> {
        self.tool_logs.read().unwrap().clone()
    }

    pub fn events(&self) -> Vec<EventRecord> {
        self.events.read().unwrap().clone()
    }

    pub fn messages_of_type(&self, message_type: MessageType) -> Vec<MessageRecord> {
        self.messages()
            .into_iter()
            .filter(|m| m.message_type == message_type)
            .collect()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StreamStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn append_message(&self, row: MessageRecord) -> Result<String, StreamError> {
        let id = row.id.clone();
        self.messages.write().unwrap().push(row.clone());
        // No subscribers is fine.
        let _ = self.live.send(row);
        Ok(id)
    }

    async fn append_memory(&self, row: MemoryRecord) -> Result<String, StreamError> {
        let id = row.id.clone();
        self.memory.write().unwrap().push(row);
        Ok(id)
    }

    async fn append_llm_log(&self, row: LlmLogRecord) -> Result<String, StreamError> {
        let id = row.id.clone();
        self.llm_logs.write().unwrap().push(row);
        Ok(id)
    }

    async fn append_tool_log(&self, row: ToolLogRecord) -> Result<String, StreamError> {
        let id = row.id.clone();
        self.tool_logs.write().unwrap().push(row);
        Ok(id)
    }

    async fn append_event(&self, row: EventRecord) -> Result<String, StreamError> {
        let id = row.id.clone();
        self.events.write().unwrap().push(row);
        Ok(id)
    }

    async fn session_messages(
        &self,
        session_id: &str,
        types: &[MessageType],
        limit: usize,
    ) -> Result<Vec<MessageRecord>, StreamError> {
        let mut matching: Vec<MessageRecord> = self
            .messages
            .read()
            .unwrap()
            .iter()
            .filter(|m| m.session_id == session_id)
            .filter(|m| types.is_empty() || types.contains(&m.message_type))
            .cloned()
            .collect();

        // (timestamp, id) linearizes a session; ties break by id.
        matching.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.id.cmp(&b.id))
        });

        let skip = matching.len().saturating_sub(limit);
        Ok(matching.split_off(skip))
    }

    async fn memories(&self, filter: MemoryFilter) -> Result<Vec<MemoryRecord>, StreamError> {
        let rows = self.memory.read().unwrap();

        let tombstoned: HashSet<String> = rows
            .iter()
            .filter(|r| r.is_deleted)
            .map(|r| r.id.clone())
            .collect();

        let mut live: Vec<MemoryRecord> = rows
            .iter()
            .filter(|r| !r.is_deleted && !tombstoned.contains(&r.id))
            .filter(|r| r.importance >= filter.min_importance)
            .filter(|r| {
                filter
                    .memory_types
                    .as_ref()
                    .map(|types| types.contains(&r.memory_type))
                    .unwrap_or(true)
            })
            .filter(|r| {
                filter
                    .categories
                    .as_ref()
                    .map(|cats| cats.contains(&r.category))
                    .unwrap_or(true)
            })
            .filter(|r| {
                filter
                    .session_id
                    .as_ref()
                    .map(|s| &r.source_session_id == s)
                    .unwrap_or(true)
            })
            .cloned()
            .collect();

        live.sort_by(|a, b| {
            b.timestamp
                .cmp(&a.timestamp)
                .then_with(|| b.id.cmp(&a.id))
        });

        if let Some(limit) = filter.limit {
            live.truncate(limit);
        }
        Ok(live)
    }

    async fn tail_messages(
        &self,
        filter: TailFilter,
        seek: SeekTo,
    ) -> Result<MessageTail, StreamError> {
        let mut live = self.live.subscribe();

        // Only Earliest replays history; the in-memory log has no retention
        // window, so absolute/relative seeks behave as Latest.
        let replay: Vec<MessageRecord> = match seek {
            SeekTo::Earliest => self
                .messages
                .read()
                .unwrap()
                .iter()
                .filter(|m| filter.matches(m))
                .cloned()
                .collect(),
            _ => Vec::new(),
        };

        let replayed_ids: HashSet<String> = replay.iter().map(|m| m.id.clone()).collect();

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            for row in replay {
                if tx.send(Ok(row)).await.is_err() {
                    return;
                }
            }

            loop {
                match live.recv().await {
                    Ok(row) => {
                        if replayed_ids.contains(&row.id) || !filter.matches(&row) {
                            continue;
                        }
                        if tx.send(Ok(row)).await.is_err() {
                            return;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => {
                        let _ = tx
                            .send(Err(StreamError::Transport("tail lagged".into())))
                            .await;
                        return;
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                }
            }
        });

        Ok(MessageTail::new(rx))
    }

    async fn hourly_cost(&self) -> Result<f64, StreamError> {
        let cutoff = chrono::Utc::now() - chrono::Duration::hours(1);
        Ok(self
            .llm_logs
            .read()
            .unwrap()
            .iter()
            .filter(|r| r.timestamp > cutoff)
            .map(|r| r.estimated_cost)
            .sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulsebot_core::memory::{MemoryCategory, MemoryType};

    #[tokio::test]
    async fn session_messages_chronological_with_limit() {
        let store = InMemoryStore::new();
        for i in 0..5 {
            let mut msg = MessageRecord::user_input("cli", "s1", format!("m{i}"));
            msg.timestamp = chrono::Utc::now() + chrono::Duration::milliseconds(i);
            store.append_message(msg).await.unwrap();
        }
        store
            .append_message(MessageRecord::user_input("cli", "other", "x"))
            .await
            .unwrap();

        let history = store
            .session_messages("s1", &[MessageType::UserInput], 3)
            .await
            .unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].text(), "m2");
        assert_eq!(history[2].text(), "m4");
    }

    #[tokio::test]
    async fn tombstone_hides_memory() {
        let store = InMemoryStore::new();
        let record = MemoryRecord::new(
            "fact",
            MemoryType::Fact,
            MemoryCategory::General,
            0.5,
            "s1",
            vec![1.0, 0.0],
        );
        let id = store.append_memory(record).await.unwrap();

        assert_eq!(store.memories(MemoryFilter::all()).await.unwrap().len(), 1);

        store
            .append_memory(MemoryRecord::tombstone(&id))
            .await
            .unwrap();
        assert!(store.memories(MemoryFilter::all()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn memory_filter_pushdown() {
        let store = InMemoryStore::new();
        store
            .append_memory(MemoryRecord::new(
                "low importance",
                MemoryType::Fact,
                MemoryCategory::General,
                0.2,
                "s1",
                vec![1.0],
            ))
            .await
            .unwrap();
        store
            .append_memory(MemoryRecord::new(
                "preference",
                MemoryType::Preference,
                MemoryCategory::UserInfo,
                0.9,
                "s1",
                vec![1.0],
            ))
            .await
            .unwrap();

        let filter = MemoryFilter {
            min_importance: 0.5,
            memory_types: Some(vec![MemoryType::Preference]),
            ..MemoryFilter::default()
        };
        let rows = store.memories(filter).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].content, "preference");
    }

    #[tokio::test]
    async fn tail_receives_live_rows() {
        let store = InMemoryStore::new();
        let mut tail = store
            .tail_messages(TailFilter::agent_inbox(), SeekTo::Latest)
            .await
            .unwrap();

        store
            .append_message(MessageRecord::user_input("cli", "s1", "hello"))
            .await
            .unwrap();
        // A row the filter must drop.
        store
            .append_message(MessageRecord::agent_response("cli", "s1", "hi"))
            .await
            .unwrap();
        store
            .append_message(MessageRecord::user_input("cli", "s1", "second"))
            .await
            .unwrap();

        let first = tail.recv().await.unwrap().unwrap();
        assert_eq!(first.text(), "hello");
        let second = tail.recv().await.unwrap().unwrap();
        assert_eq!(second.text(), "second");
    }

    #[tokio::test]
    async fn earliest_tail_replays_history() {
        let store = InMemoryStore::new();
        store
            .append_message(MessageRecord::user_input("cli", "s1", "old"))
            .await
            .unwrap();

        let mut tail = store
            .tail_messages(TailFilter::agent_inbox(), SeekTo::Earliest)
            .await
            .unwrap();
        let replayed = tail.recv().await.unwrap().unwrap();
        assert_eq!(replayed.text(), "old");
    }

    #[tokio::test]
    async fn dropping_tail_cancels_pump() {
        let store = InMemoryStore::new();
        let tail = store
            .tail_messages(TailFilter::default(), SeekTo::Latest)
            .await
            .unwrap();
        drop(tail);

        // The pump notices the closed receiver on the next send and stops;
        // appending must not error.
        store
            .append_message(MessageRecord::user_input("cli", "s1", "x"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn hourly_cost_sums_recent_rows() {
        let store = InMemoryStore::new();
        let mut recent = LlmLogRecord::new("s1", "m", "p");
        recent.estimated_cost = 1.5;
        store.append_llm_log(recent).await.unwrap();

        let mut old = LlmLogRecord::new("s1", "m", "p");
        old.estimated_cost = 10.0;
        old.timestamp = chrono::Utc::now() - chrono::Duration::hours(2);
        store.append_llm_log(old).await.unwrap();

        let cost = store.hourly_cost().await.unwrap();
        assert!((cost - 1.5).abs() < 1e-9);
    }
}
