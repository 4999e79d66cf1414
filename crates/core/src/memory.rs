//! Memory-log row types.
//!
//! Memories are rows of the append-only `memory` stream. Logical deletion is
//! a later row with the same `id` and `is_deleted = true`; every read filters
//! tombstoned ids.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Classification of a memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    Fact,
    Preference,
    ConversationSummary,
    SkillLearned,
}

impl MemoryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fact => "fact",
            Self::Preference => "preference",
            Self::ConversationSummary => "conversation_summary",
            Self::SkillLearned => "skill_learned",
        }
    }

    /// Lenient parse used on LLM extraction output; unknown labels fall back
    /// to `Fact`.
    pub fn parse_lossy(s: &str) -> Self {
        match s {
            "preference" => Self::Preference,
            "conversation_summary" | "summary" => Self::ConversationSummary,
            "skill_learned" => Self::SkillLearned,
            _ => Self::Fact,
        }
    }
}

impl std::fmt::Display for MemoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse grouping of memories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryCategory {
    UserInfo,
    Project,
    Schedule,
    General,
}

impl MemoryCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UserInfo => "user_info",
            Self::Project => "project",
            Self::Schedule => "schedule",
            Self::General => "general",
        }
    }
}

impl std::fmt::Display for MemoryCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the `memory` stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: String,

    pub timestamp: DateTime<Utc>,

    pub memory_type: MemoryType,

    pub category: MemoryCategory,

    pub content: String,

    /// Session this memory originated from.
    #[serde(default)]
    pub source_session_id: String,

    /// Fixed-length embedding vector. Empty on tombstone rows.
    #[serde(default)]
    pub embedding: Vec<f32>,

    /// Retrieval weight in [0, 1].
    pub importance: f32,

    #[serde(default)]
    pub is_deleted: bool,
}

impl MemoryRecord {
    pub fn new(
        content: impl Into<String>,
        memory_type: MemoryType,
        category: MemoryCategory,
        importance: f32,
        source_session_id: impl Into<String>,
        embedding: Vec<f32>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            memory_type,
            category,
            content: content.into(),
            source_session_id: source_session_id.into(),
            embedding,
            importance: importance.clamp(0.0, 1.0),
            is_deleted: false,
        }
    }

    /// A tombstone marking the memory with this `id` as deleted.
    pub fn tombstone(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            timestamp: Utc::now(),
            memory_type: MemoryType::Fact,
            category: MemoryCategory::General,
            content: String::new(),
            source_session_id: String::new(),
            embedding: Vec::new(),
            importance: 0.0,
            is_deleted: true,
        }
    }
}

/// A search hit: the record plus its retrieval scores.
#[derive(Debug, Clone)]
pub struct MemoryHit {
    pub record: MemoryRecord,

    /// Pure cosine similarity to the query, in [-1, 1].
    pub similarity: f32,

    /// Hybrid retrieval score: `(1 - cosine_distance) * importance`.
    pub score: f32,
}

/// Filter pushed down to the store when fetching memory candidates.
///
/// Implementations must exclude tombstoned ids: a record is visible only if
/// no row with the same `id` and `is_deleted = true` exists.
#[derive(Debug, Clone, Default)]
pub struct MemoryFilter {
    pub min_importance: f32,

    pub memory_types: Option<Vec<MemoryType>>,

    pub categories: Option<Vec<MemoryCategory>>,

    pub session_id: Option<String>,

    /// Bound for ordered reads; `None` fetches all candidates (scoring and
    /// limiting then happen in the caller).
    pub limit: Option<usize>,
}

impl MemoryFilter {
    /// Matches every live record; used by the dedupe pass, which must scan
    /// across all types and categories.
    pub fn all() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn importance_is_clamped() {
        let record = MemoryRecord::new(
            "x",
            MemoryType::Fact,
            MemoryCategory::General,
            1.7,
            "",
            vec![],
        );
        assert_eq!(record.importance, 1.0);
    }

    #[test]
    fn tombstone_preserves_id() {
        let tomb = MemoryRecord::tombstone("mem-1");
        assert_eq!(tomb.id, "mem-1");
        assert!(tomb.is_deleted);
        assert!(tomb.embedding.is_empty());
    }

    #[test]
    fn lossy_type_parse_defaults_to_fact() {
        assert_eq!(MemoryType::parse_lossy("preference"), MemoryType::Preference);
        assert_eq!(MemoryType::parse_lossy("reminder"), MemoryType::Fact);
        assert_eq!(
            MemoryType::parse_lossy("summary"),
            MemoryType::ConversationSummary
        );
    }

    #[test]
    fn type_and_category_labels() {
        assert_eq!(MemoryType::ConversationSummary.as_str(), "conversation_summary");
        assert_eq!(MemoryCategory::UserInfo.as_str(), "user_info");
    }
}
