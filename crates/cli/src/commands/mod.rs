pub mod chat;
pub mod init;
pub mod run;
pub mod serve;
pub mod setup;
pub mod task;

/// Shared result type for command handlers.
pub type CommandResult = Result<(), Box<dyn std::error::Error>>;
