//! Raw streaming-DB client.
//!
//! The DB exposes two HTTP endpoints: one request/response endpoint for DDL,
//! bounded queries, and inserts (`query_port`), and one streaming endpoint
//! whose responses never terminate for unbounded queries (`stream_port`).
//! Both authenticate with HTTP basic auth. Query results and inserts use the
//! newline-delimited `JSONEachRow` format.

use futures::StreamExt;
use pulsebot_config::DatabaseConfig;
use pulsebot_core::error::StreamError;
use pulsebot_core::stream::SeekTo;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

/// Capacity of a tail's row buffer. The pump task blocks on a full buffer,
/// which is what backpressures the HTTP read.
const TAIL_BUFFER: usize = 64;

/// One decoded row: field name → JSON value, with typed accessors.
#[derive(Debug, Clone, Default)]
pub struct Row(pub serde_json::Map<String, serde_json::Value>);

impl Row {
    pub fn from_json_line(line: &str) -> Result<Self, StreamError> {
        let value: serde_json::Value =
            serde_json::from_str(line).map_err(|e| StreamError::Decode(e.to_string()))?;
        match value {
            serde_json::Value::Object(map) => Ok(Self(map)),
            other => Err(StreamError::Decode(format!(
                "expected a JSON object row, got: {other}"
            ))),
        }
    }

    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.0.get(name)
    }

    pub fn str_field(&self, name: &str) -> String {
        self.get(name)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    }

    pub fn i64_field(&self, name: &str) -> i64 {
        self.get(name).and_then(|v| v.as_i64()).unwrap_or_default()
    }

    pub fn u64_field(&self, name: &str) -> u64 {
        self.get(name).and_then(|v| v.as_u64()).unwrap_or_default()
    }

    pub fn f64_field(&self, name: &str) -> f64 {
        self.get(name).and_then(|v| v.as_f64()).unwrap_or_default()
    }

    pub fn bool_field(&self, name: &str) -> bool {
        self.get(name).and_then(|v| v.as_bool()).unwrap_or_default()
    }

    pub fn str_list_field(&self, name: &str) -> Vec<String> {
        self.get(name)
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn f32_vec_field(&self, name: &str) -> Vec<f32> {
        self.get(name)
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_f64().map(|f| f as f32))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Parse an event-time column. The DB renders `datetime64(3)` as
    /// `YYYY-MM-DD HH:MM:SS.mmm`; RFC 3339 is accepted as a fallback.
    pub fn timestamp_field(&self, name: &str) -> chrono::DateTime<chrono::Utc> {
        let raw = self.str_field(name);
        parse_timestamp(&raw).unwrap_or_else(chrono::Utc::now)
    }
}

pub(crate) fn parse_timestamp(raw: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    chrono::DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&chrono::Utc))
}

/// Render a `datetime64(3)` literal for inserts and predicates.
pub(crate) fn format_timestamp(ts: &chrono::DateTime<chrono::Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S%.3f").to_string()
}

/// A live, cancelable, single-consumer sequence of raw rows.
///
/// Dropping the tail drops the receiver; the pump task then stops and the
/// underlying HTTP response is released.
pub struct RowTail {
    rx: mpsc::Receiver<Result<Row, StreamError>>,
}

impl RowTail {
    pub async fn recv(&mut self) -> Option<Result<Row, StreamError>> {
        self.rx.recv().await
    }
}

/// Client for the streaming DB.
///
/// The batch path shares one pooled HTTP client. Every tail builds a
/// dedicated client with connection pooling disabled, so concurrent tails
/// never share a transport connection with each other or with batch queries.
#[derive(Clone)]
pub struct StreamClient {
    host: String,
    query_port: u16,
    stream_port: u16,
    username: String,
    password: String,
    http: reqwest::Client,
}

impl StreamClient {
    pub fn new(
        host: impl Into<String>,
        query_port: u16,
        stream_port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        let http = reqwest::Client::builder()
            .build()
            .expect("Failed to create HTTP client");

        Self {
            host: host.into(),
            query_port,
            stream_port,
            username: username.into(),
            password: password.into(),
            http,
        }
    }

    pub fn from_config(config: &DatabaseConfig) -> Self {
        Self::new(
            &config.host,
            config.query_port,
            config.stream_port,
            &config.username,
            &config.password,
        )
    }

    fn query_url(&self) -> String {
        format!(
            "http://{}:{}/?default_format=JSONEachRow",
            self.host, self.query_port
        )
    }

    fn stream_url(&self) -> String {
        format!(
            "http://{}:{}/?default_format=JSONEachRow",
            self.host, self.stream_port
        )
    }

    fn password_opt(&self) -> Option<&str> {
        (!self.password.is_empty()).then_some(self.password.as_str())
    }

    /// Fire-and-forget DDL/DML.
    pub async fn execute(&self, statement: &str) -> Result<(), StreamError> {
        debug!(statement = %truncate_for_log(statement), "Executing statement");

        let response = self
            .http
            .post(self.query_url())
            .basic_auth(&self.username, self.password_opt())
            .body(statement.to_string())
            .send()
            .await
            .map_err(|e| StreamError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StreamError::QueryFailed {
                reason: format!("status {status}: {body}"),
            });
        }
        Ok(())
    }

    /// Bounded historical read; the whole result is materialized.
    pub async fn query(&self, statement: &str) -> Result<Vec<Row>, StreamError> {
        debug!(statement = %truncate_for_log(statement), "Running query");

        let response = self
            .http
            .post(self.query_url())
            .basic_auth(&self.username, self.password_opt())
            .body(statement.to_string())
            .send()
            .await
            .map_err(|e| StreamError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StreamError::QueryFailed {
                reason: format!("status {status}: {body}"),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| StreamError::Transport(e.to_string()))?;

        body.lines()
            .filter(|line| !line.trim().is_empty())
            .map(Row::from_json_line)
            .collect()
    }

    /// Append rows to a stream through the batch path.
    pub async fn insert(
        &self,
        stream: &str,
        rows: &[serde_json::Value],
    ) -> Result<(), StreamError> {
        if rows.is_empty() {
            return Ok(());
        }

        let mut body = format!("INSERT INTO {stream} FORMAT JSONEachRow\n");
        for row in rows {
            body.push_str(&row.to_string());
            body.push('\n');
        }

        trace!(stream, rows = rows.len(), "Inserting rows");
        self.execute(&body).await
    }

    /// Unbounded streaming read with a seek directive.
    ///
    /// The statement must not carry its own SETTINGS clause; the seek
    /// directive is appended here.
    pub async fn tail(&self, statement: &str, seek: SeekTo) -> Result<RowTail, StreamError> {
        let statement = format!("{statement} SETTINGS seek_to='{seek}'");
        debug!(statement = %truncate_for_log(&statement), "Opening tail");

        // One dedicated connection per tail: a fresh client with pooling
        // disabled cannot share a transport with anything else.
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(0)
            .build()
            .map_err(|e| StreamError::Transport(e.to_string()))?;

        let response = client
            .post(self.stream_url())
            .basic_auth(&self.username, self.password_opt())
            .body(statement)
            .send()
            .await
            .map_err(|e| StreamError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StreamError::QueryFailed {
                reason: format!("status {status}: {body}"),
            });
        }

        let (tx, rx) = mpsc::channel(TAIL_BUFFER);

        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut buffer = String::new();

            while let Some(chunk) = byte_stream.next().await {
                let bytes = match chunk {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx.send(Err(StreamError::Transport(e.to_string()))).await;
                        return;
                    }
                };

                buffer.push_str(&String::from_utf8_lossy(&bytes));

                while let Some(line_end) = buffer.find('\n') {
                    let line = buffer[..line_end].trim_end_matches('\r').to_string();
                    buffer = buffer[line_end + 1..].to_string();

                    if line.trim().is_empty() {
                        continue;
                    }

                    match Row::from_json_line(&line) {
                        Ok(row) => {
                            // A closed receiver cancels the tail.
                            if tx.send(Ok(row)).await.is_err() {
                                return;
                            }
                        }
                        Err(e) => {
                            warn!(error = %e, "Skipping undecodable tail row");
                        }
                    }
                }
            }

            // The server never ends an unbounded query voluntarily; EOF
            // means the transport went away.
            let _ = tx
                .send(Err(StreamError::Transport("tail connection closed".into())))
                .await;
        });

        Ok(RowTail { rx })
    }

    /// Liveness probe.
    pub async fn ping(&self) -> bool {
        match self.query("SELECT 1 AS ok").await {
            Ok(rows) => !rows.is_empty(),
            Err(e) => {
                warn!(error = %e, "Ping failed");
                false
            }
        }
    }
}

/// Escape a string literal for interpolation into SQL.
pub(crate) fn sql_quote(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\'', "\\'")
}

fn truncate_for_log(s: &str) -> String {
    s.chars().take(120).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_decoding() {
        let row = Row::from_json_line(
            r#"{"id":"abc","priority":1,"importance":0.9,"is_deleted":false,"tags":["a","b"],"embedding":[0.1,0.2]}"#,
        )
        .unwrap();

        assert_eq!(row.str_field("id"), "abc");
        assert_eq!(row.i64_field("priority"), 1);
        assert!((row.f64_field("importance") - 0.9).abs() < 1e-9);
        assert!(!row.bool_field("is_deleted"));
        assert_eq!(row.str_list_field("tags"), vec!["a", "b"]);
        assert_eq!(row.f32_vec_field("embedding").len(), 2);
    }

    #[test]
    fn row_missing_fields_default() {
        let row = Row::from_json_line(r#"{"id":"x"}"#).unwrap();
        assert_eq!(row.str_field("nope"), "");
        assert_eq!(row.i64_field("nope"), 0);
        assert!(row.str_list_field("nope").is_empty());
    }

    #[test]
    fn non_object_row_rejected() {
        assert!(Row::from_json_line("[1,2,3]").is_err());
        assert!(Row::from_json_line("not json").is_err());
    }

    #[test]
    fn timestamp_parsing_both_formats() {
        let dt = parse_timestamp("2026-03-01 12:30:05.250").unwrap();
        assert_eq!(format_timestamp(&dt), "2026-03-01 12:30:05.250");

        let rfc = parse_timestamp("2026-03-01T12:30:05.250Z").unwrap();
        assert_eq!(rfc, dt);

        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn sql_quoting() {
        assert_eq!(sql_quote("plain"), "plain");
        assert_eq!(sql_quote("it's"), "it\\'s");
        assert_eq!(sql_quote(r"back\slash"), r"back\\slash");
    }
}
