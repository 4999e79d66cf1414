//! # PulseBot Stream
//!
//! The stream substrate: everything that talks to the streaming DB.
//!
//! - [`client::StreamClient`] — raw SQL access over the DB's two HTTP
//!   endpoints: request/response for DDL, bounded queries, and inserts;
//!   streaming for tails. Each tail gets a dedicated connection so a slow
//!   consumer never head-of-line-blocks batch traffic.
//! - [`schema`] — idempotent creation and verification of the five logs.
//! - [`writer::StreamWriter`] — per-stream writer that fills `id` and
//!   `timestamp` defaults on the way in.
//! - [`store::TimeplusStore`] — the [`pulsebot_core::StreamStore`]
//!   implementation backed by the DB.
//! - [`in_memory::InMemoryStore`] — an in-process implementation for tests
//!   and offline development.

pub mod client;
pub mod in_memory;
pub mod schema;
pub mod store;
pub mod writer;

pub use client::{Row, RowTail, StreamClient};
pub use in_memory::InMemoryStore;
pub use store::TimeplusStore;
pub use writer::StreamWriter;
