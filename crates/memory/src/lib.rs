//! # PulseBot Memory
//!
//! The semantic memory manager: embedding-indexed storage on the append-only
//! `memory` stream with deduplication, hybrid ranking, and soft deletion.
//!
//! Deduplication uses *pure* cosine similarity (no importance weighting) so
//! content identity, not salience, drives merging. Retrieval uses the hybrid
//! score so important but slightly off-topic memories can still surface.
//!
//! The manager owns its own [`StreamStore`] handle; in the streaming-DB
//! deployment that is a dedicated connection, keeping memory traffic off the
//! agent loop's tail.

pub mod vector;

use std::sync::{Arc, RwLock};

use pulsebot_core::error::MemoryError;
use pulsebot_core::memory::{MemoryCategory, MemoryFilter, MemoryHit, MemoryRecord, MemoryType};
use pulsebot_core::{EmbeddingProvider, StreamStore};
use tracing::{debug, info};

/// Near-duplicate band: similarity in `[NEAR_DUPLICATE_RATIO * threshold,
/// threshold)` is logged but stored anyway.
const NEAR_DUPLICATE_RATIO: f32 = 0.8;

pub struct MemoryManager {
    store: Arc<dyn StreamStore>,
    embeddings: Option<Arc<dyn EmbeddingProvider>>,
    similarity_threshold: f32,
    /// Pinned at first use; all later embeddings must agree.
    expected_dimensions: RwLock<Option<usize>>,
}

impl MemoryManager {
    pub fn new(
        store: Arc<dyn StreamStore>,
        embeddings: Option<Arc<dyn EmbeddingProvider>>,
        similarity_threshold: f32,
    ) -> Self {
        let expected = embeddings.as_ref().and_then(|e| e.dimensions());
        Self {
            store,
            embeddings,
            similarity_threshold,
            expected_dimensions: RwLock::new(expected),
        }
    }

    /// False when no embedding provider is configured; callers skip memory
    /// retrieval and extraction.
    pub fn is_available(&self) -> bool {
        self.embeddings.is_some()
    }

    fn check_dimensions(&self, actual: usize) -> Result<(), MemoryError> {
        let mut expected = self.expected_dimensions.write().unwrap();
        match *expected {
            Some(dims) if dims != actual => Err(MemoryError::DimensionMismatch {
                expected: dims,
                actual,
            }),
            Some(_) => Ok(()),
            None => {
                debug!(dimensions = actual, "Pinned embedding dimensionality");
                *expected = Some(actual);
                Ok(())
            }
        }
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, MemoryError> {
        let provider = self.embeddings.as_ref().ok_or(MemoryError::Unavailable)?;
        let embedding = provider
            .embed(text)
            .await
            .map_err(|e| MemoryError::EmbeddingFailed(e.to_string()))?;
        self.check_dimensions(embedding.len())?;
        Ok(embedding)
    }

    /// Validate stored candidates against the pinned dimensionality.
    fn check_candidates(&self, candidates: &[MemoryRecord]) -> Result<(), MemoryError> {
        for record in candidates {
            if !record.embedding.is_empty() {
                self.check_dimensions(record.embedding.len())?;
            }
        }
        Ok(())
    }

    /// Store a memory, deduplicating against existing content when asked.
    ///
    /// Returns the id of the stored row, or of the existing duplicate when
    /// `check_duplicates` finds one at or above the similarity threshold.
    pub async fn store(
        &self,
        content: &str,
        memory_type: MemoryType,
        category: MemoryCategory,
        importance: f32,
        source_session_id: &str,
        check_duplicates: bool,
    ) -> Result<String, MemoryError> {
        let embedding = self.embed(content).await?;

        if check_duplicates {
            // Pure cosine, across all types and categories.
            let candidates = self.store.memories(MemoryFilter::all()).await?;
            self.check_candidates(&candidates)?;

            let mut best: Option<(f32, &MemoryRecord)> = None;
            for candidate in &candidates {
                if candidate.embedding.is_empty() {
                    continue;
                }
                let similarity = vector::cosine_similarity(&candidate.embedding, &embedding);
                if best.map(|(s, _)| similarity > s).unwrap_or(true) {
                    best = Some((similarity, candidate));
                }
            }

            if let Some((similarity, existing)) = best {
                if similarity >= self.similarity_threshold {
                    info!(
                        id = %existing.id,
                        similarity,
                        "Duplicate memory detected, returning existing id"
                    );
                    return Ok(existing.id.clone());
                }
                if similarity >= NEAR_DUPLICATE_RATIO * self.similarity_threshold {
                    debug!(
                        id = %existing.id,
                        similarity,
                        threshold = self.similarity_threshold,
                        "Near-duplicate memory stored anyway"
                    );
                }
            }
        }

        let record = MemoryRecord::new(
            content,
            memory_type,
            category,
            importance,
            source_session_id,
            embedding,
        );
        let id = self.store.append_memory(record).await?;

        info!(
            id = %id,
            memory_type = %memory_type,
            category = %category,
            importance,
            "Stored memory"
        );
        Ok(id)
    }

    /// Semantic search ranked by `(1 - cosine_distance) * importance`.
    pub async fn search(
        &self,
        query: &str,
        limit: usize,
        min_importance: f32,
        memory_types: Option<Vec<MemoryType>>,
        categories: Option<Vec<MemoryCategory>>,
    ) -> Result<Vec<MemoryHit>, MemoryError> {
        let query_embedding = self.embed(query).await?;

        let candidates = self
            .store
            .memories(MemoryFilter {
                min_importance,
                memory_types,
                categories,
                session_id: None,
                limit: None,
            })
            .await?;
        self.check_candidates(&candidates)?;

        let hits = vector::rank_hybrid(&candidates, &query_embedding, limit);
        let preview: String = query.chars().take(50).collect();
        debug!(query = %preview, results = hits.len(), "Memory search");
        Ok(hits)
    }

    /// Memories originating from one session, newest first.
    pub async fn get_by_session(
        &self,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>, MemoryError> {
        Ok(self
            .store
            .memories(MemoryFilter {
                session_id: Some(session_id.to_string()),
                limit: Some(limit),
                ..MemoryFilter::default()
            })
            .await?)
    }

    /// Most recent memories, optionally restricted by type.
    pub async fn get_recent(
        &self,
        limit: usize,
        memory_types: Option<Vec<MemoryType>>,
    ) -> Result<Vec<MemoryRecord>, MemoryError> {
        Ok(self
            .store
            .memories(MemoryFilter {
                memory_types,
                limit: Some(limit),
                ..MemoryFilter::default()
            })
            .await?)
    }

    /// Soft-delete: append a tombstone with the same id. Reads filter it
    /// from then on.
    pub async fn mark_deleted(&self, memory_id: &str) -> Result<(), MemoryError> {
        self.store
            .append_memory(MemoryRecord::tombstone(memory_id))
            .await?;
        info!(id = %memory_id, "Marked memory deleted");
        Ok(())
    }
}
