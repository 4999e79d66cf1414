//! Streaming-DB implementation of [`StreamStore`].
//!
//! Translates the structured log operations into SQL against the stream
//! client. One `TimeplusStore` owns one client; components that must not
//! contend on a transport (the agent tail, the memory manager) each hold
//! their own store instance.

use async_trait::async_trait;
use pulsebot_core::error::StreamError;
use pulsebot_core::event::EventRecord;
use pulsebot_core::memory::{MemoryFilter, MemoryRecord, MemoryCategory, MemoryType};
use pulsebot_core::message::{MessageRecord, MessageType};
use pulsebot_core::observability::{LlmLogRecord, ToolLogRecord};
use pulsebot_core::stream::{MessageTail, SeekTo, StreamStore, TailFilter};
use tokio::sync::mpsc;
use tracing::warn;

use crate::client::{format_timestamp, sql_quote, Row, StreamClient};
use crate::writer::StreamWriter;

pub struct TimeplusStore {
    client: StreamClient,
    messages: StreamWriter,
    memory: StreamWriter,
    llm_logs: StreamWriter,
    tool_logs: StreamWriter,
    events: StreamWriter,
}

impl TimeplusStore {
    pub fn new(client: StreamClient) -> Self {
        Self {
            messages: StreamWriter::new(client.clone(), "messages"),
            memory: StreamWriter::new(client.clone(), "memory"),
            llm_logs: StreamWriter::new(client.clone(), "llm_logs"),
            tool_logs: StreamWriter::new(client.clone(), "tool_logs"),
            events: StreamWriter::new(client.clone(), "events"),
            client,
        }
    }

    pub fn client(&self) -> &StreamClient {
        &self.client
    }
}

#[async_trait]
impl StreamStore for TimeplusStore {
    fn name(&self) -> &str {
        "timeplus"
    }

    async fn append_message(&self, row: MessageRecord) -> Result<String, StreamError> {
        self.messages.write(message_to_row(&row)).await
    }

    async fn append_memory(&self, row: MemoryRecord) -> Result<String, StreamError> {
        self.memory.write(memory_to_row(&row)).await
    }

    async fn append_llm_log(&self, row: LlmLogRecord) -> Result<String, StreamError> {
        self.llm_logs.write(llm_log_to_row(&row)).await
    }

    async fn append_tool_log(&self, row: ToolLogRecord) -> Result<String, StreamError> {
        self.tool_logs.write(tool_log_to_row(&row)).await
    }

    async fn append_event(&self, row: EventRecord) -> Result<String, StreamError> {
        self.events.write(event_to_row(&row)).await
    }

    async fn session_messages(
        &self,
        session_id: &str,
        types: &[MessageType],
        limit: usize,
    ) -> Result<Vec<MessageRecord>, StreamError> {
        let type_filter = if types.is_empty() {
            String::new()
        } else {
            let list = types
                .iter()
                .map(|t| format!("'{}'", t.as_str()))
                .collect::<Vec<_>>()
                .join(", ");
            format!(" AND message_type IN ({list})")
        };

        let sql = format!(
            "SELECT * FROM table(messages) \
             WHERE session_id = '{}'{type_filter} \
             ORDER BY timestamp DESC, id DESC \
             LIMIT {limit}",
            sql_quote(session_id),
        );

        let mut records: Vec<MessageRecord> = self
            .client
            .query(&sql)
            .await?
            .iter()
            .filter_map(|row| row_to_message(row).ok())
            .collect();

        // Newest-first from the query; callers want chronological order.
        records.reverse();
        Ok(records)
    }

    async fn memories(&self, filter: MemoryFilter) -> Result<Vec<MemoryRecord>, StreamError> {
        let mut conditions = vec![
            "is_deleted = false".to_string(),
            // A later tombstone wins over an earlier live row with the same id.
            "id NOT IN (SELECT id FROM table(memory) WHERE is_deleted = true)".to_string(),
            format!("importance >= {}", filter.min_importance),
        ];

        if let Some(types) = &filter.memory_types {
            let list = types
                .iter()
                .map(|t| format!("'{}'", t.as_str()))
                .collect::<Vec<_>>()
                .join(", ");
            conditions.push(format!("memory_type IN ({list})"));
        }

        if let Some(categories) = &filter.categories {
            let list = categories
                .iter()
                .map(|c| format!("'{}'", c.as_str()))
                .collect::<Vec<_>>()
                .join(", ");
            conditions.push(format!("category IN ({list})"));
        }

        if let Some(session_id) = &filter.session_id {
            conditions.push(format!("source_session_id = '{}'", sql_quote(session_id)));
        }

        let limit_clause = filter
            .limit
            .map(|n| format!(" LIMIT {n}"))
            .unwrap_or_default();

        let sql = format!(
            "SELECT * FROM table(memory) WHERE {} ORDER BY timestamp DESC, id DESC{limit_clause}",
            conditions.join(" AND "),
        );

        Ok(self
            .client
            .query(&sql)
            .await?
            .iter()
            .filter_map(|row| row_to_memory(row).ok())
            .collect())
    }

    async fn tail_messages(
        &self,
        filter: TailFilter,
        seek: SeekTo,
    ) -> Result<MessageTail, StreamError> {
        let mut conditions = Vec::new();
        if let Some(target) = &filter.target {
            conditions.push(format!("target = '{}'", sql_quote(target)));
        }
        if !filter.message_types.is_empty() {
            let list = filter
                .message_types
                .iter()
                .map(|t| format!("'{}'", t.as_str()))
                .collect::<Vec<_>>()
                .join(", ");
            conditions.push(format!("message_type IN ({list})"));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };

        let sql = format!("SELECT * FROM messages{where_clause}");
        let mut raw = self.client.tail(&sql, seek).await?;

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            while let Some(item) = raw.recv().await {
                let forwarded = match item {
                    Ok(row) => match row_to_message(&row) {
                        Ok(record) => Ok(record),
                        Err(e) => {
                            warn!(error = %e, "Skipping undecodable message row");
                            continue;
                        }
                    },
                    Err(e) => Err(e),
                };
                if tx.send(forwarded).await.is_err() {
                    return;
                }
            }
        });

        Ok(MessageTail::new(rx))
    }

    async fn hourly_cost(&self) -> Result<f64, StreamError> {
        let rows = self
            .client
            .query(
                "SELECT coalesce(sum(estimated_cost), 0) AS cost, count() AS calls \
                 FROM table(llm_logs) WHERE timestamp > now() - interval 1 hour",
            )
            .await?;

        Ok(rows.first().map(|r| r.f64_field("cost")).unwrap_or(0.0))
    }
}

// --- Row conversions ---

fn message_to_row(record: &MessageRecord) -> serde_json::Value {
    serde_json::json!({
        "id": record.id,
        "timestamp": format_timestamp(&record.timestamp),
        "source": record.source,
        "target": record.target,
        "session_id": record.session_id,
        "message_type": record.message_type.as_str(),
        "content": record.content,
        "user_id": record.user_id,
        "channel_metadata": record.channel_metadata,
        "priority": record.priority,
    })
}

fn row_to_message(row: &Row) -> Result<MessageRecord, StreamError> {
    let type_raw = row.str_field("message_type");
    let message_type = MessageType::parse(&type_raw)
        .ok_or_else(|| StreamError::Decode(format!("unknown message_type '{type_raw}'")))?;

    Ok(MessageRecord {
        id: row.str_field("id"),
        timestamp: row.timestamp_field("timestamp"),
        source: row.str_field("source"),
        target: row.str_field("target"),
        session_id: row.str_field("session_id"),
        message_type,
        content: row.str_field("content"),
        user_id: row.str_field("user_id"),
        channel_metadata: row.str_field("channel_metadata"),
        priority: row.i64_field("priority") as i8,
    })
}

fn memory_to_row(record: &MemoryRecord) -> serde_json::Value {
    serde_json::json!({
        "id": record.id,
        "timestamp": format_timestamp(&record.timestamp),
        "memory_type": record.memory_type.as_str(),
        "category": record.category.as_str(),
        "content": record.content,
        "source_session_id": record.source_session_id,
        "embedding": record.embedding,
        "importance": record.importance,
        "is_deleted": record.is_deleted,
    })
}

fn row_to_memory(row: &Row) -> Result<MemoryRecord, StreamError> {
    Ok(MemoryRecord {
        id: row.str_field("id"),
        timestamp: row.timestamp_field("timestamp"),
        memory_type: MemoryType::parse_lossy(&row.str_field("memory_type")),
        category: parse_category(&row.str_field("category")),
        content: row.str_field("content"),
        source_session_id: row.str_field("source_session_id"),
        embedding: row.f32_vec_field("embedding"),
        importance: row.f64_field("importance") as f32,
        is_deleted: row.bool_field("is_deleted"),
    })
}

fn parse_category(s: &str) -> MemoryCategory {
    match s {
        "user_info" => MemoryCategory::UserInfo,
        "project" => MemoryCategory::Project,
        "schedule" => MemoryCategory::Schedule,
        _ => MemoryCategory::General,
    }
}

fn llm_log_to_row(record: &LlmLogRecord) -> serde_json::Value {
    serde_json::json!({
        "id": record.id,
        "timestamp": format_timestamp(&record.timestamp),
        "session_id": record.session_id,
        "model": record.model,
        "provider": record.provider,
        "input_tokens": record.input_tokens,
        "output_tokens": record.output_tokens,
        "total_tokens": record.total_tokens,
        "estimated_cost": record.estimated_cost,
        "latency_ms": record.latency_ms,
        "time_to_first_token_ms": record.time_to_first_token_ms,
        "system_prompt_hash": record.system_prompt_hash,
        "user_message_preview": record.user_message_preview,
        "assistant_response_preview": record.assistant_response_preview,
        "tools_called": record.tools_called,
        "tool_call_count": record.tool_call_count,
        "status": record.status.as_str(),
        "error_message": record.error_message,
    })
}

fn tool_log_to_row(record: &ToolLogRecord) -> serde_json::Value {
    serde_json::json!({
        "id": record.id,
        "timestamp": format_timestamp(&record.timestamp),
        "session_id": record.session_id,
        "llm_request_id": record.llm_request_id,
        "tool_name": record.tool_name,
        "skill_name": record.skill_name,
        "arguments": record.arguments,
        "status": record.status.as_str(),
        "result_preview": record.result_preview,
        "error_message": record.error_message,
        "duration_ms": record.duration_ms,
    })
}

fn event_to_row(record: &EventRecord) -> serde_json::Value {
    serde_json::json!({
        "id": record.id,
        "timestamp": format_timestamp(&record.timestamp),
        "event_type": record.event_type,
        "source": record.source,
        "severity": record.severity.as_str(),
        "payload": record.payload,
        "tags": record.tags,
    })
}
