//! Per-stream writer.
//!
//! Fills `id` and `timestamp` defaults on the way in and routes every write
//! through the batch insert path, returning the row id.

use pulsebot_core::error::StreamError;
use uuid::Uuid;

use crate::client::{format_timestamp, StreamClient};

pub struct StreamWriter {
    client: StreamClient,
    stream: String,
}

impl StreamWriter {
    pub fn new(client: StreamClient, stream: impl Into<String>) -> Self {
        Self {
            client,
            stream: stream.into(),
        }
    }

    /// Write a single row. Missing `id`/`timestamp` fields are generated.
    pub async fn write(&self, row: serde_json::Value) -> Result<String, StreamError> {
        let ids = self.write_batch(vec![row]).await?;
        Ok(ids.into_iter().next().unwrap_or_default())
    }

    /// Write multiple rows in one insert.
    pub async fn write_batch(
        &self,
        rows: Vec<serde_json::Value>,
    ) -> Result<Vec<String>, StreamError> {
        let mut prepared = Vec::with_capacity(rows.len());
        let mut ids = Vec::with_capacity(rows.len());

        for row in rows {
            let mut map = match row {
                serde_json::Value::Object(map) => map,
                other => {
                    return Err(StreamError::Decode(format!(
                        "expected a JSON object row, got: {other}"
                    )))
                }
            };

            let id = match map.get("id").and_then(|v| v.as_str()) {
                Some(id) if !id.is_empty() => id.to_string(),
                _ => {
                    let id = Uuid::new_v4().to_string();
                    map.insert("id".into(), serde_json::Value::String(id.clone()));
                    id
                }
            };

            if !map.contains_key("timestamp") {
                map.insert(
                    "timestamp".into(),
                    serde_json::Value::String(format_timestamp(&chrono::Utc::now())),
                );
            }

            ids.push(id);
            prepared.push(serde_json::Value::Object(map));
        }

        self.client.insert(&self.stream, &prepared).await?;
        Ok(ids)
    }
}
