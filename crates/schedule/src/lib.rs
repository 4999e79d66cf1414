//! # PulseBot Schedule
//!
//! Scheduled producers: periodic tasks that append rows to the logs. They
//! only produce — consumption is the agent loop's and external tooling's
//! business.
//!
//! - Heartbeat: a `heartbeat` message targeted at the agent every N minutes.
//! - Daily summary: a priority-1 `scheduled_task` message at a cron time.
//! - Cost alert: hourly aggregate of the LLM log's `estimated_cost`,
//!   emitting a warning event above the configured threshold.
//!
//! Includes a zero-dependency 5-field cron parser (minute hour dom month
//! dow) supporting `*`, lists, ranges, and steps.

pub mod cron;

pub use cron::CronExpr;

use std::sync::Arc;

use chrono::Utc;
use pulsebot_config::ScheduledTasksConfig;
use pulsebot_core::event::{EventRecord, Severity};
use pulsebot_core::message::{MessageRecord, MessageType, Target};
use pulsebot_core::StreamStore;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Build the heartbeat row: a message the agent loop consumes like any
/// other inbox item.
pub fn heartbeat_message() -> MessageRecord {
    MessageRecord {
        id: Uuid::new_v4().to_string(),
        timestamp: Utc::now(),
        source: "system".into(),
        target: Target::Agent.to_string(),
        session_id: Uuid::new_v4().to_string(),
        message_type: MessageType::Heartbeat,
        content: serde_json::json!({"action": "proactive_check"}).to_string(),
        user_id: "system".into(),
        channel_metadata: String::new(),
        priority: 0,
    }
}

/// Build the daily-summary row.
pub fn daily_summary_message() -> MessageRecord {
    MessageRecord {
        id: Uuid::new_v4().to_string(),
        timestamp: Utc::now(),
        source: "system".into(),
        target: Target::Agent.to_string(),
        session_id: Uuid::new_v4().to_string(),
        message_type: MessageType::ScheduledTask,
        content: serde_json::json!({"action": "generate_daily_briefing"}).to_string(),
        user_id: "system".into(),
        channel_metadata: String::new(),
        priority: 1,
    }
}

/// Build the cost-alert event for an observed hourly spend.
pub fn cost_alert_event(hourly_cost: f64, threshold_usd: f64) -> EventRecord {
    let severity = if hourly_cost > threshold_usd {
        Severity::Warning
    } else {
        Severity::Info
    };
    EventRecord::new(
        "cost_alert",
        "llm_monitor",
        severity,
        serde_json::json!({
            "hourly_cost_usd": hourly_cost,
            "threshold_usd": threshold_usd,
        }),
    )
    .with_tags(vec!["cost".into(), "llm".into()])
}

/// Runs the configured producers as independent tasks.
pub struct ScheduleEngine {
    store: Arc<dyn StreamStore>,
    config: ScheduledTasksConfig,
}

impl ScheduleEngine {
    pub fn new(store: Arc<dyn StreamStore>, config: ScheduledTasksConfig) -> Self {
        Self { store, config }
    }

    /// Validate configured schedules; called at startup so a bad cron
    /// expression fails fast.
    pub fn validate(&self) -> Result<(), String> {
        if self.config.daily_summary.enabled {
            CronExpr::parse(&self.config.daily_summary.cron)?;
        }
        if self.config.heartbeat.enabled && self.config.heartbeat.interval_minutes == 0 {
            return Err("heartbeat interval must be at least 1 minute".into());
        }
        Ok(())
    }

    /// Spawn all enabled producers. The handles run until aborted.
    pub fn start(&self) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        if self.config.heartbeat.enabled {
            let store = self.store.clone();
            let minutes = self.config.heartbeat.interval_minutes;
            info!(interval_minutes = minutes, "Starting heartbeat producer");

            handles.push(tokio::spawn(async move {
                let period = std::time::Duration::from_secs(minutes * 60);
                let mut ticker = tokio::time::interval(period);
                // The immediate first tick would heartbeat at startup.
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    debug!("Heartbeat tick");
                    if let Err(e) = store.append_message(heartbeat_message()).await {
                        warn!(error = %e, "Failed to append heartbeat");
                    }
                }
            }));
        }

        if self.config.daily_summary.enabled {
            match CronExpr::parse(&self.config.daily_summary.cron) {
                Ok(expr) => {
                    let store = self.store.clone();
                    info!(cron = %self.config.daily_summary.cron, "Starting daily-summary producer");

                    handles.push(tokio::spawn(async move {
                        let mut ticker =
                            tokio::time::interval(std::time::Duration::from_secs(60));
                        // Fire at most once per matching wall-clock minute.
                        let mut last_fired: Option<String> = None;
                        loop {
                            ticker.tick().await;
                            let now = Utc::now();
                            let slot = now.format("%Y-%m-%d %H:%M").to_string();
                            if expr.matches(&now) && last_fired.as_deref() != Some(&slot) {
                                last_fired = Some(slot);
                                if let Err(e) =
                                    store.append_message(daily_summary_message()).await
                                {
                                    warn!(error = %e, "Failed to append daily summary");
                                }
                            }
                        }
                    }));
                }
                Err(e) => warn!(error = %e, "Invalid daily-summary cron, producer disabled"),
            }
        }

        if self.config.cost_alert.enabled {
            let store = self.store.clone();
            let threshold = self.config.cost_alert.threshold_usd;
            info!(threshold_usd = threshold, "Starting cost-alert producer");

            handles.push(tokio::spawn(async move {
                let mut ticker =
                    tokio::time::interval(std::time::Duration::from_secs(3600));
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    match store.hourly_cost().await {
                        Ok(cost) => {
                            let event = cost_alert_event(cost, threshold);
                            if event.severity == Severity::Warning {
                                warn!(hourly_cost = cost, threshold, "Hourly cost over threshold");
                            }
                            if let Err(e) = store.append_event(event).await {
                                warn!(error = %e, "Failed to append cost alert");
                            }
                        }
                        Err(e) => warn!(error = %e, "Failed to aggregate hourly cost"),
                    }
                }
            }));
        }

        handles
    }

    /// Human-readable description of the configured producers (for
    /// `pulsebot task list`).
    pub fn describe(&self) -> Vec<(String, bool, String)> {
        describe_tasks(&self.config)
    }
}

/// Name, enabled flag, and schedule of every configured producer.
pub fn describe_tasks(config: &ScheduledTasksConfig) -> Vec<(String, bool, String)> {
    vec![
        (
            "heartbeat".into(),
            config.heartbeat.enabled,
            format!("every {}m", config.heartbeat.interval_minutes),
        ),
        (
            "daily_summary".into(),
            config.daily_summary.enabled,
            format!("cron '{}'", config.daily_summary.cron),
        ),
        (
            "cost_alert".into(),
            config.cost_alert.enabled,
            format!("hourly, threshold ${:.2}", config.cost_alert.threshold_usd),
        ),
    ]
}
