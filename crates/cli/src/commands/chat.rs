//! `pulsebot chat` — interactive terminal client.
//!
//! A plain channel adapter over the message log: stdin lines become
//! `user_input` rows with `source='cli'`, and a tail over `channel:cli`
//! renders tool-call status transitions and responses as they land.

use std::sync::Arc;

use pulsebot_config::Config;
use pulsebot_core::message::{MessageRecord, MessageType};
use pulsebot_core::stream::{SeekTo, TailFilter};
use pulsebot_core::StreamStore;
use pulsebot_stream::{StreamClient, TimeplusStore};
use tokio::io::{AsyncBufReadExt, BufReader};
use uuid::Uuid;

use super::CommandResult;

pub async fn run(config: Config, session: Option<String>) -> CommandResult {
    let client = StreamClient::from_config(&config.database);
    if !client.ping().await {
        return Err(format!(
            "streaming DB unreachable at {}:{}",
            config.database.host, config.database.query_port
        )
        .into());
    }
    let store: Arc<dyn StreamStore> = Arc::new(TimeplusStore::new(client));

    let session_id = session.unwrap_or_else(|| Uuid::new_v4().to_string());
    println!("Session: {session_id} (exit with 'exit', 'quit', or Ctrl+D)");

    // Renderer: everything the agent routes back at the CLI channel. Needs
    // its own tail connection, so a second store handle.
    let render_store: Arc<dyn StreamStore> = Arc::new(TimeplusStore::new(
        StreamClient::from_config(&config.database),
    ));
    let render_session = session_id.clone();
    let renderer = tokio::spawn(async move {
        let mut tail = match render_store
            .tail_messages(TailFilter::channel("cli"), SeekTo::Latest)
            .await
        {
            Ok(tail) => tail,
            Err(e) => {
                eprintln!("Failed to open channel tail: {e}");
                return;
            }
        };

        while let Some(Ok(record)) = tail.recv().await {
            if record.session_id != render_session {
                continue;
            }
            render(&record);
        }
    });

    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    loop {
        match lines.next_line().await? {
            Some(line) => {
                let line = line.trim().to_string();
                if line.is_empty() {
                    continue;
                }
                if matches!(line.as_str(), "exit" | "quit" | "/exit" | "/quit") {
                    break;
                }
                store
                    .append_message(MessageRecord::user_input("cli", &session_id, line))
                    .await?;
            }
            None => break, // EOF (Ctrl+D)
        }
    }

    renderer.abort();
    Ok(())
}

fn render(record: &MessageRecord) {
    let content = record.content_json();
    match record.message_type {
        MessageType::AgentResponse => {
            println!("\n{}", record.text());
        }
        MessageType::ToolCall => {
            let tool = content["tool_name"].as_str().unwrap_or("?");
            let summary = content["args_summary"].as_str().unwrap_or("");
            println!("  [tool] {tool} {summary} ...");
        }
        MessageType::ToolResult => {
            let tool = content["tool_name"].as_str().unwrap_or("?");
            let status = content["status"].as_str().unwrap_or("?");
            let duration = content["duration_ms"].as_u64().unwrap_or(0);
            println!("  [tool] {tool} {status} ({duration}ms)");
        }
        MessageType::Error => {
            eprintln!("  [error] {}", content["message"].as_str().unwrap_or(""));
        }
        _ => {}
    }
}
