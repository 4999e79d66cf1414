//! Vector similarity and hybrid ranking.
//!
//! Scoring runs in-process over candidate rows the store already filtered,
//! so the DB-backed store and the in-memory test double rank identically.

use pulsebot_core::memory::{MemoryHit, MemoryRecord};

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 = identical, 0 = orthogonal, -1 =
/// opposite. Returns 0.0 if either vector is zero-length or empty.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }

    (dot / denom) as f32
}

/// The hybrid retrieval score: `(1 - cosine_distance) * importance`.
///
/// Cosine distance is `1 - similarity`, so this is `similarity * importance`.
pub fn hybrid_score(similarity: f32, importance: f32) -> f32 {
    similarity * importance
}

/// Rank candidate records against a query embedding by hybrid score.
///
/// Ordering: score descending, ties broken by recency (newest first), then
/// by id. The result with limit N is always a prefix of the result with
/// limit N + K.
pub fn rank_hybrid(records: &[MemoryRecord], query: &[f32], limit: usize) -> Vec<MemoryHit> {
    let mut hits: Vec<MemoryHit> = records
        .iter()
        .filter(|r| !r.embedding.is_empty())
        .map(|r| {
            let similarity = cosine_similarity(&r.embedding, query);
            MemoryHit {
                record: r.clone(),
                similarity,
                score: hybrid_score(similarity, r.importance),
            }
        })
        .collect();

    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.record.timestamp.cmp(&a.record.timestamp))
            .then_with(|| a.record.id.cmp(&b.record.id))
    });
    hits.truncate(limit);
    hits
}
