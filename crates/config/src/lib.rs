//! Configuration loading, validation, and management for PulseBot.
//!
//! Loads a hierarchical TOML document with environment-variable substitution
//! (`${VAR}` and `${VAR:-default}`) applied to the raw text before parsing.
//! Validates all settings at startup; configuration problems exit the
//! process, they are never patched over at runtime.

use regex_lite::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub agent: AgentConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    /// Provider-specific configuration, keyed by provider name
    /// ("anthropic", "openai", "ollama", "nvidia", …).
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    /// Channel configuration, keyed by channel name.
    #[serde(default)]
    pub channels: HashMap<String, ChannelConfig>,

    #[serde(default)]
    pub skills: SkillsConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub memory: MemoryConfig,

    #[serde(default)]
    pub scheduled_tasks: ScheduledTasksConfig,

    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("agent", &self.agent)
            .field("database", &self.database)
            .field("providers", &self.providers)
            .field("channels", &self.channels)
            .field("skills", &self.skills)
            .field("search", &self.search)
            .field("memory", &self.memory)
            .field("scheduled_tasks", &self.scheduled_tasks)
            .field("gateway", &self.gateway)
            .field("logging", &self.logging)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_agent_name")]
    pub name: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_provider")]
    pub provider: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Reason/act cycle cap per turn.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Custom persona description for the system prompt.
    #[serde(default)]
    pub custom_identity: String,

    /// Free-form extra instructions appended to the system prompt.
    #[serde(default)]
    pub custom_instructions: String,
}

fn default_agent_name() -> String {
    "PulseBot".into()
}
fn default_model() -> String {
    "claude-sonnet-4-20250514".into()
}
fn default_provider() -> String {
    "anthropic".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_max_iterations() -> u32 {
    10
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            model: default_model(),
            provider: default_provider(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            max_iterations: default_max_iterations(),
            custom_identity: String::new(),
            custom_instructions: String::new(),
        }
    }
}

/// Streaming-DB connection settings. The DB exposes a request/response
/// endpoint for DDL and bounded queries and a streaming endpoint for tails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_host")]
    pub host: String,

    #[serde(default = "default_query_port")]
    pub query_port: u16,

    #[serde(default = "default_stream_port")]
    pub stream_port: u16,

    #[serde(default = "default_db_username")]
    pub username: String,

    #[serde(default)]
    pub password: String,
}

fn default_db_host() -> String {
    "localhost".into()
}
fn default_query_port() -> u16 {
    3218
}
fn default_stream_port() -> u16 {
    8463
}
fn default_db_username() -> String {
    "default".into()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: default_db_host(),
            query_port: default_query_port(),
            stream_port: default_stream_port(),
            username: default_db_username(),
            password: String::new(),
        }
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,

    /// Base URL for local or OpenAI-compatible endpoints.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_model", &self.default_model)
            .field("host", &self.host)
            .field("enabled", &self.enabled)
            .finish()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Allowlist of sender IDs. Empty = allow all.
    #[serde(default)]
    pub allowed_users: Vec<String>,

    /// Channel-specific settings (tokens, ports, …).
    #[serde(flatten)]
    pub settings: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillsConfig {
    #[serde(default = "default_builtin_skills")]
    pub builtin: Vec<String>,

    /// Additional coded skills, by registration name.
    #[serde(default)]
    pub custom: Vec<String>,

    /// Directories scanned for instruction-skill packages.
    #[serde(default)]
    pub skill_dirs: Vec<String>,

    #[serde(default)]
    pub disabled_skills: Vec<String>,

    #[serde(default = "default_shell_timeout")]
    pub shell_timeout_seconds: u64,

    #[serde(default = "default_shell_max_output")]
    pub shell_max_output: usize,

    /// Base path for file-operation tools.
    #[serde(default = "default_file_base_path")]
    pub file_base_path: String,

    /// Extension allow-list enforced on writes. Empty = all extensions.
    #[serde(default)]
    pub allowed_extensions: Vec<String>,
}

fn default_builtin_skills() -> Vec<String> {
    vec!["web_search".into(), "file_ops".into(), "shell".into()]
}
fn default_shell_timeout() -> u64 {
    30
}
fn default_shell_max_output() -> usize {
    10_000
}
fn default_file_base_path() -> String {
    ".".into()
}

impl Default for SkillsConfig {
    fn default() -> Self {
        Self {
            builtin: default_builtin_skills(),
            custom: Vec::new(),
            skill_dirs: Vec::new(),
            disabled_skills: Vec::new(),
            shell_timeout_seconds: default_shell_timeout(),
            shell_max_output: default_shell_max_output(),
            file_base_path: default_file_base_path(),
            allowed_extensions: Vec::new(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// "brave" or "searxng".
    #[serde(default = "default_search_provider")]
    pub provider: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_searxng_url")]
    pub url: String,
}

fn default_search_provider() -> String {
    "brave".into()
}
fn default_searxng_url() -> String {
    "http://localhost:8080".into()
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            provider: default_search_provider(),
            api_key: None,
            url: default_searxng_url(),
        }
    }
}

impl std::fmt::Debug for SearchConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchConfig")
            .field("provider", &self.provider)
            .field("api_key", &redact(&self.api_key))
            .field("url", &self.url)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Duplicate-detection threshold on pure cosine similarity.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,

    /// "openai" or "ollama".
    #[serde(default = "default_embedding_provider")]
    pub embedding_provider: String,

    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Falls back to `providers.openai.api_key` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_api_key: Option<String>,

    /// Falls back to `providers.ollama.host` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_host: Option<String>,

    /// Auto-discovered from the first embedding when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_dimensions: Option<usize>,

    #[serde(default = "default_embedding_timeout")]
    pub embedding_timeout_seconds: u64,
}

fn default_true() -> bool {
    true
}
fn default_similarity_threshold() -> f32 {
    0.95
}
fn default_embedding_provider() -> String {
    "openai".into()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}
fn default_embedding_timeout() -> u64 {
    30
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            similarity_threshold: default_similarity_threshold(),
            embedding_provider: default_embedding_provider(),
            embedding_model: default_embedding_model(),
            embedding_api_key: None,
            embedding_host: None,
            embedding_dimensions: None,
            embedding_timeout_seconds: default_embedding_timeout(),
        }
    }
}

impl std::fmt::Debug for MemoryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryConfig")
            .field("enabled", &self.enabled)
            .field("similarity_threshold", &self.similarity_threshold)
            .field("embedding_provider", &self.embedding_provider)
            .field("embedding_model", &self.embedding_model)
            .field("embedding_api_key", &redact(&self.embedding_api_key))
            .field("embedding_host", &self.embedding_host)
            .field("embedding_dimensions", &self.embedding_dimensions)
            .field("embedding_timeout_seconds", &self.embedding_timeout_seconds)
            .finish()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScheduledTasksConfig {
    #[serde(default)]
    pub heartbeat: HeartbeatTaskConfig,

    #[serde(default)]
    pub daily_summary: DailySummaryTaskConfig,

    #[serde(default)]
    pub cost_alert: CostAlertTaskConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatTaskConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_heartbeat_interval")]
    pub interval_minutes: u64,
}

fn default_heartbeat_interval() -> u64 {
    30
}

impl Default for HeartbeatTaskConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_minutes: default_heartbeat_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailySummaryTaskConfig {
    #[serde(default)]
    pub enabled: bool,

    /// 5-field cron expression (minute hour dom month dow).
    #[serde(default = "default_daily_summary_cron")]
    pub cron: String,
}

fn default_daily_summary_cron() -> String {
    "0 9 * * *".into()
}

impl Default for DailySummaryTaskConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cron: default_daily_summary_cron(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostAlertTaskConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Hourly spend threshold in USD above which a warning event is emitted.
    #[serde(default = "default_cost_threshold")]
    pub threshold_usd: f64,
}

fn default_cost_threshold() -> f64 {
    5.0
}

impl Default for CostAlertTaskConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold_usd: default_cost_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_host")]
    pub host: String,

    #[serde(default = "default_gateway_port")]
    pub port: u16,
}

fn default_gateway_host() -> String {
    "127.0.0.1".into()
}
fn default_gateway_port() -> u16 {
    8000
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_gateway_host(),
            port: default_gateway_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// "json" or "text".
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "text".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Substitute `${VAR}` and `${VAR:-default}` in the raw document text.
fn substitute_env_vars(raw: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let pattern = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}").expect("static regex");
    pattern
        .replace_all(raw, |caps: &Captures<'_>| {
            let name = &caps[1];
            let default = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            lookup(name).unwrap_or_else(|| default.to_string())
        })
        .into_owned()
}

impl Config {
    /// Load configuration from a file, applying environment substitution.
    /// A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        Self::parse(&content, path)
    }

    /// Parse a raw TOML document (environment substitution included).
    pub fn parse(raw: &str, path: &Path) -> Result<Self, ConfigError> {
        let substituted = substitute_env_vars(raw, |name| std::env::var(name).ok());

        let config: Self =
            toml::from_str(&substituted).map_err(|e| ConfigError::ParseError {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agent.temperature < 0.0 || self.agent.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "agent.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.agent.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_iterations must be at least 1".into(),
            ));
        }

        let threshold = self.memory.similarity_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(ConfigError::ValidationError(
                "memory.similarity_threshold must be in (0.0, 1.0]".into(),
            ));
        }

        if self.database.query_port == self.database.stream_port {
            return Err(ConfigError::ValidationError(
                "database.query_port and database.stream_port must differ".into(),
            ));
        }

        if !matches!(self.logging.format.as_str(), "json" | "text") {
            return Err(ConfigError::ValidationError(format!(
                "logging.format must be 'json' or 'text', got '{}'",
                self.logging.format
            )));
        }

        Ok(())
    }

    /// Provider configuration by name, or an empty default.
    pub fn provider(&self, name: &str) -> ProviderConfig {
        self.providers.get(name).cloned().unwrap_or_default()
    }

    /// The embedding API key: `memory.embedding_api_key`, falling back to
    /// `providers.openai.api_key`.
    pub fn embedding_api_key(&self) -> Option<String> {
        self.memory
            .embedding_api_key
            .clone()
            .or_else(|| self.provider("openai").api_key)
    }

    /// The embedding host: `memory.embedding_host`, falling back to
    /// `providers.ollama.host`.
    pub fn embedding_host(&self) -> String {
        self.memory
            .embedding_host
            .clone()
            .or_else(|| self.provider("ollama").host)
            .unwrap_or_else(|| "http://localhost:11434".into())
    }

    /// The commented default document written by `pulsebot init`.
    pub fn default_toml() -> &'static str {
        DEFAULT_CONFIG_TOML
    }
}

const DEFAULT_CONFIG_TOML: &str = r#"# PulseBot configuration
# Environment variables are substituted with ${VAR} or ${VAR:-default} syntax.

[agent]
name = "PulseBot"
model = "claude-sonnet-4-20250514"
provider = "anthropic"
temperature = 0.7
max_tokens = 4096
max_iterations = 10

[database]
host = "${PULSEBOT_DB_HOST:-localhost}"
query_port = 3218
stream_port = 8463
username = "${PULSEBOT_DB_USER:-default}"
password = "${PULSEBOT_DB_PASSWORD:-}"

[providers.anthropic]
api_key = "${ANTHROPIC_API_KEY:-}"
default_model = "claude-sonnet-4-20250514"

[providers.openai]
api_key = "${OPENAI_API_KEY:-}"
default_model = "gpt-4o"

[providers.ollama]
enabled = false
host = "${OLLAMA_HOST:-http://localhost:11434}"
default_model = "llama3"

[channels.webchat]
enabled = true

[channels.cli]
enabled = true

[skills]
builtin = ["web_search", "file_ops", "shell"]
custom = []
skill_dirs = []
disabled_skills = []
shell_timeout_seconds = 30
file_base_path = "."

[search]
provider = "brave"
api_key = "${BRAVE_API_KEY:-}"
url = "http://localhost:8080"

[memory]
enabled = true
similarity_threshold = 0.95
embedding_provider = "openai"
embedding_model = "text-embedding-3-small"
embedding_timeout_seconds = 30
# embedding_dimensions = 1536   # auto-discovered when unset

[scheduled_tasks.heartbeat]
enabled = true
interval_minutes = 30

[scheduled_tasks.daily_summary]
enabled = false
cron = "0 9 * * *"

[scheduled_tasks.cost_alert]
enabled = false
threshold_usd = 5.0

[gateway]
host = "127.0.0.1"
port = 8000

[logging]
level = "info"
format = "text"
"#;

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
