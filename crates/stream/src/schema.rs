//! Stream schema setup: idempotent creation and verification of the five
//! append-only logs.
//!
//! Schema drift is not managed automatically; [`verify_streams`] checks that
//! the required columns exist and fails fast otherwise.

use pulsebot_core::error::StreamError;
use tracing::{debug, info, warn};

use crate::client::StreamClient;

pub const MESSAGES_DDL: &str = "\
CREATE STREAM IF NOT EXISTS messages (
    id string DEFAULT uuid(),
    timestamp datetime64(3) DEFAULT now64(3),
    source string,
    target string,
    session_id string,
    message_type string,
    content string,
    user_id string DEFAULT '',
    channel_metadata string DEFAULT '',
    priority int8 DEFAULT 0
)
SETTINGS event_time_column='timestamp'";

pub const LLM_LOGS_DDL: &str = "\
CREATE STREAM IF NOT EXISTS llm_logs (
    id string DEFAULT uuid(),
    timestamp datetime64(3) DEFAULT now64(3),
    session_id string,
    model string,
    provider string,
    input_tokens int32,
    output_tokens int32,
    total_tokens int32,
    estimated_cost float64,
    latency_ms int32,
    time_to_first_token_ms int32 DEFAULT 0,
    system_prompt_hash string,
    user_message_preview string,
    assistant_response_preview string,
    tools_called array(string),
    tool_call_count int8,
    status string,
    error_message string DEFAULT ''
)
SETTINGS event_time_column='timestamp'";

pub const TOOL_LOGS_DDL: &str = "\
CREATE STREAM IF NOT EXISTS tool_logs (
    id string DEFAULT uuid(),
    timestamp datetime64(3) DEFAULT now64(3),
    session_id string,
    llm_request_id string,
    tool_name string,
    skill_name string,
    arguments string,
    status string,
    result_preview string,
    error_message string DEFAULT '',
    duration_ms int32 DEFAULT 0
)
SETTINGS event_time_column='timestamp'";

pub const MEMORY_DDL: &str = "\
CREATE STREAM IF NOT EXISTS memory (
    id string DEFAULT uuid(),
    timestamp datetime64(3) DEFAULT now64(3),
    memory_type string,
    category string,
    content string,
    source_session_id string,
    embedding array(float32),
    importance float32,
    is_deleted bool DEFAULT false
)
SETTINGS event_time_column='timestamp'";

pub const EVENTS_DDL: &str = "\
CREATE STREAM IF NOT EXISTS events (
    id string DEFAULT uuid(),
    timestamp datetime64(3) DEFAULT now64(3),
    event_type string,
    source string,
    severity string,
    payload string,
    tags array(string)
)
SETTINGS event_time_column='timestamp'";

/// Every stream with its DDL and required columns.
pub fn stream_definitions() -> [(&'static str, &'static str, &'static [&'static str]); 5] {
    [
        (
            "messages",
            MESSAGES_DDL,
            &[
                "id",
                "timestamp",
                "source",
                "target",
                "session_id",
                "message_type",
                "content",
                "user_id",
                "channel_metadata",
                "priority",
            ],
        ),
        (
            "llm_logs",
            LLM_LOGS_DDL,
            &[
                "id",
                "timestamp",
                "session_id",
                "model",
                "provider",
                "input_tokens",
                "output_tokens",
                "total_tokens",
                "estimated_cost",
                "latency_ms",
                "time_to_first_token_ms",
                "system_prompt_hash",
                "user_message_preview",
                "assistant_response_preview",
                "tools_called",
                "tool_call_count",
                "status",
                "error_message",
            ],
        ),
        (
            "tool_logs",
            TOOL_LOGS_DDL,
            &[
                "id",
                "timestamp",
                "session_id",
                "llm_request_id",
                "tool_name",
                "skill_name",
                "arguments",
                "status",
                "result_preview",
                "error_message",
                "duration_ms",
            ],
        ),
        (
            "memory",
            MEMORY_DDL,
            &[
                "id",
                "timestamp",
                "memory_type",
                "category",
                "content",
                "source_session_id",
                "embedding",
                "importance",
                "is_deleted",
            ],
        ),
        (
            "events",
            EVENTS_DDL,
            &["id", "timestamp", "event_type", "source", "severity", "payload", "tags"],
        ),
    ]
}

/// Create all required streams. `CREATE STREAM IF NOT EXISTS` makes re-runs
/// no-ops.
pub async fn create_streams(client: &StreamClient) -> Result<(), StreamError> {
    info!("Creating streams");

    for (name, ddl, _) in stream_definitions() {
        client.execute(ddl).await?;
        debug!(stream = name, "Ensured stream exists");
    }

    info!("Stream setup complete");
    Ok(())
}

/// Verify that every stream exposes its required columns. Fails fast with a
/// descriptive error on the first missing column.
pub async fn verify_streams(client: &StreamClient) -> Result<(), StreamError> {
    for (name, _, required) in stream_definitions() {
        let rows = client.query(&format!("DESCRIBE {name}")).await.map_err(|e| {
            StreamError::SchemaMismatch {
                stream: name.to_string(),
                detail: format!("describe failed: {e}"),
            }
        })?;

        let present: Vec<String> = rows.iter().map(|r| r.str_field("name")).collect();

        for column in required {
            if !present.iter().any(|c| c == column) {
                return Err(StreamError::SchemaMismatch {
                    stream: name.to_string(),
                    detail: format!("missing column '{column}'"),
                });
            }
        }
    }
    Ok(())
}

/// Drop every stream. Destructive; used by `setup --drop`.
pub async fn drop_streams(client: &StreamClient) -> Result<(), StreamError> {
    warn!("Dropping all streams");
    for (name, _, _) in stream_definitions() {
        client.execute(&format!("DROP STREAM IF EXISTS {name}")).await?;
        info!(stream = name, "Dropped stream");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ddl_is_idempotent() {
        for (_, ddl, _) in stream_definitions() {
            assert!(ddl.contains("IF NOT EXISTS"));
            assert!(ddl.contains("event_time_column='timestamp'"));
        }
    }

    #[test]
    fn ddl_declares_required_columns() {
        for (name, ddl, required) in stream_definitions() {
            for column in required {
                assert!(
                    ddl.contains(column),
                    "stream {name} DDL is missing declared column {column}"
                );
            }
        }
    }

    #[test]
    fn memory_defaults_to_live_rows() {
        assert!(MEMORY_DDL.contains("is_deleted bool DEFAULT false"));
    }

    #[test]
    fn five_streams_defined() {
        let names: Vec<_> = stream_definitions().iter().map(|(n, _, _)| *n).collect();
        assert_eq!(names, vec!["messages", "llm_logs", "tool_logs", "memory", "events"]);
    }
}
