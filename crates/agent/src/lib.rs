//! # PulseBot Agent
//!
//! The stream-mediated orchestrator core: context assembly, the bounded
//! reason/act cycle, observability records, and post-turn memory
//! extraction. The loop's only I/O surface is the [`StreamStore`] it tails
//! and appends to — everything a UI renders comes off the logs.

pub mod context;
pub mod extract;
pub mod loop_runner;
pub mod observability;
pub mod prompts;

pub use context::{Context, ContextBuilder};
pub use loop_runner::AgentLoop;
pub use observability::ObservabilityWriter;
