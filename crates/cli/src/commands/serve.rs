//! `pulsebot serve` — start the HTTP/WebSocket facade.

use std::sync::Arc;

use pulsebot_config::Config;
use pulsebot_stream::{schema, StreamClient, TimeplusStore};
use tracing::info;

use super::CommandResult;

pub async fn run(config: Config, port_override: Option<u16>) -> CommandResult {
    let client = StreamClient::from_config(&config.database);
    if !client.ping().await {
        return Err(format!(
            "streaming DB unreachable at {}:{}",
            config.database.host, config.database.query_port
        )
        .into());
    }
    schema::create_streams(&client).await?;

    let store = Arc::new(TimeplusStore::new(client));
    let host = config.gateway.host.clone();
    let port = port_override.unwrap_or(config.gateway.port);

    info!(host, port, "Starting gateway facade. Press Ctrl+C to stop.");
    tokio::select! {
        result = pulsebot_gateway::serve(store, &host, port) => result?,
        _ = tokio::signal::ctrl_c() => info!("Shutting down"),
    }
    Ok(())
}
