//! PulseBot CLI — the main entry point.
//!
//! Commands:
//! - `run`   — Start the agent loop and scheduled producers
//! - `serve` — Start the HTTP/WebSocket facade
//! - `chat`  — Interactive local client over the message log
//! - `setup` — Create and verify the streams
//! - `init`  — Write a default configuration file
//! - `task`  — Inspect scheduled producers
//!
//! Exit code 0 on success, 1 on any unrecoverable startup error.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use pulsebot_config::Config;

mod commands;

#[derive(Parser)]
#[command(
    name = "pulsebot",
    about = "PulseBot — stream-native conversational agent runtime",
    version
)]
struct Cli {
    /// Config file path
    #[arg(short, long, global = true, default_value = "pulsebot.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the agent loop
    Run,

    /// Start the HTTP/WebSocket facade
    Serve {
        /// Override the configured port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Chat with the agent from this terminal
    Chat {
        /// Resume an existing session instead of starting a new one
        #[arg(short, long)]
        session: Option<String>,
    },

    /// Initialize the streams on the streaming DB
    Setup {
        /// Drop and recreate all streams (destroys data)
        #[arg(long)]
        drop: bool,
    },

    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Scheduled task inspection
    Task {
        #[command(subcommand)]
        command: TaskCommands,
    },
}

#[derive(Subcommand)]
enum TaskCommands {
    /// List configured scheduled producers
    List,
}

fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.logging.level.clone()));

    if config.logging.format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        // `init` must work before any config exists.
        Commands::Init { force } => commands::init::run(&cli.config, force),
        command => {
            let config = match Config::load_from(&cli.config) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("Error: {e}");
                    std::process::exit(1);
                }
            };
            init_tracing(&config);

            match command {
                Commands::Run => commands::run::run(config).await,
                Commands::Serve { port } => commands::serve::run(config, port).await,
                Commands::Chat { session } => commands::chat::run(config, session).await,
                Commands::Setup { drop } => commands::setup::run(config, drop).await,
                Commands::Task {
                    command: TaskCommands::List,
                } => commands::task::list(&config),
                Commands::Init { .. } => unreachable!("handled above"),
            }
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
