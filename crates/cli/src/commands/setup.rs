//! `pulsebot setup` — create and verify the streams.

use pulsebot_config::Config;
use pulsebot_stream::{schema, StreamClient};

use super::CommandResult;

pub async fn run(config: Config, drop: bool) -> CommandResult {
    let client = StreamClient::from_config(&config.database);
    if !client.ping().await {
        return Err(format!(
            "streaming DB unreachable at {}:{}",
            config.database.host, config.database.query_port
        )
        .into());
    }

    if drop {
        println!("Dropping existing streams...");
        schema::drop_streams(&client).await?;
    }

    schema::create_streams(&client).await?;
    schema::verify_streams(&client).await?;

    println!("Streams ready:");
    for (name, _, _) in schema::stream_definitions() {
        println!("  - {name}");
    }
    Ok(())
}
