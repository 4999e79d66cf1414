//! # PulseBot Core
//!
//! Domain types, traits, and error definitions for the PulseBot stream-native
//! agent runtime. This crate has **zero framework dependencies** — it defines
//! the domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every subsystem is defined as a trait here. Implementations live in their
//! respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)
//!
//! The one structural commitment this crate makes is that *all* persistent
//! state lives on append-only logs reached through [`stream::StreamStore`].

pub mod embedding;
pub mod error;
pub mod event;
pub mod memory;
pub mod message;
pub mod observability;
pub mod provider;
pub mod skill;
pub mod stream;

// Re-export key types at crate root for ergonomics
pub use embedding::EmbeddingProvider;
pub use error::{
    EmbeddingError, Error, MemoryError, ProviderError, Result, SkillError, StreamError,
};
pub use event::{EventRecord, Severity};
pub use memory::{MemoryCategory, MemoryFilter, MemoryHit, MemoryRecord, MemoryType};
pub use message::{MessageRecord, MessageType, Target};
pub use observability::{LlmCallStatus, LlmLogRecord, ToolCallStatus, ToolLogRecord};
pub use provider::{ChatMessage, ChatRequest, ChatResponse, LlmProvider, Role, ToolCallRequest, Usage};
pub use skill::{Skill, ToolDefinition, ToolResult};
pub use stream::{MessageTail, SeekTo, StreamStore, TailFilter};
