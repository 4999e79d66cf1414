//! `pulsebot run` — wire everything up and run the agent loop.

use std::sync::Arc;

use pulsebot_agent::AgentLoop;
use pulsebot_config::Config;
use pulsebot_embeddings::create_embedding_provider;
use pulsebot_memory::MemoryManager;
use pulsebot_providers::create_provider;
use pulsebot_schedule::ScheduleEngine;
use pulsebot_skills::SkillRegistry;
use pulsebot_stream::{schema, StreamClient, TimeplusStore};
use tracing::{info, warn};

use super::CommandResult;

/// Deadline for draining an in-flight turn on shutdown.
const SHUTDOWN_DRAIN_SECS: u64 = 15;

pub async fn run(config: Config) -> CommandResult {
    info!(
        agent = %config.agent.name,
        provider = %config.agent.provider,
        model = %config.agent.model,
        "Starting PulseBot"
    );

    let client = StreamClient::from_config(&config.database);
    if !client.ping().await {
        return Err(format!(
            "streaming DB unreachable at {}:{}",
            config.database.host, config.database.query_port
        )
        .into());
    }

    schema::create_streams(&client).await?;
    schema::verify_streams(&client).await?;

    let store = Arc::new(TimeplusStore::new(client));
    let provider = create_provider(&config)?;

    // Memory traffic gets its own connection so it never contends with the
    // agent's inbox tail.
    let memory = if config.memory.enabled {
        match create_embedding_provider(&config) {
            Some(embeddings) => {
                let memory_store = Arc::new(TimeplusStore::new(StreamClient::from_config(
                    &config.database,
                )));
                Some(Arc::new(MemoryManager::new(
                    memory_store,
                    Some(embeddings),
                    config.memory.similarity_threshold,
                )))
            }
            None => {
                warn!("Memory enabled but no embedding provider available; memory features disabled");
                None
            }
        }
    } else {
        info!("Memory system disabled in configuration");
        None
    };

    let skills = Arc::new(SkillRegistry::from_config(&config)?);
    info!(tools = ?skills.tool_names(), "Skills loaded");

    let scheduler = ScheduleEngine::new(store.clone(), config.scheduled_tasks.clone());
    scheduler.validate()?;
    let producer_handles = scheduler.start();

    let agent = Arc::new(AgentLoop::new(
        store,
        provider,
        skills,
        memory,
        &config.agent,
    ));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let agent_task = {
        let agent = agent.clone();
        tokio::spawn(async move { agent.run(shutdown_rx).await })
    };

    info!("Agent running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;

    info!("Shutting down");
    let _ = shutdown_tx.send(true);
    if tokio::time::timeout(
        std::time::Duration::from_secs(SHUTDOWN_DRAIN_SECS),
        agent_task,
    )
    .await
    .is_err()
    {
        warn!("In-flight turn did not drain before the deadline");
    }
    for handle in producer_handles {
        handle.abort();
    }

    Ok(())
}
