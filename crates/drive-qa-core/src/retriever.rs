//! Similarity scoring, ranking, and threshold selection.
//!
//! # Algorithm
//!
//! 1. Score every record in the generation by cosine similarity to the
//!    query vector.
//! 2. Sort descending by score. The sort is stable, so equal scores keep
//!    index order and answers are reproducible.
//! 3. Drop records with `score <= min_score`.
//! 4. Keep the first `max_count`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::embedding::cosine_similarity;
use crate::index::Generation;
use crate::models::{DocumentRecord, ScoredDocument};

pub const DEFAULT_MIN_SCORE: f32 = 0.1;
pub const DEFAULT_MAX_COUNT: usize = 5;
pub const DEFAULT_MAX_COUNT_CAP: usize = 10;

/// Retrieval tuning parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetrievalParams {
    /// Records scoring at or below this are not used as context.
    pub min_score: f32,
    /// Default number of records to keep.
    pub max_count: usize,
    /// Upper bound for per-call overrides of `max_count`.
    pub max_count_cap: usize,
}

impl Default for RetrievalParams {
    fn default() -> Self {
        Self {
            min_score: DEFAULT_MIN_SCORE,
            max_count: DEFAULT_MAX_COUNT,
            max_count_cap: DEFAULT_MAX_COUNT_CAP,
        }
    }
}

impl RetrievalParams {
    /// Resolve a per-call count, falling back to `max_count` and never
    /// exceeding `max_count_cap`.
    pub fn resolve_count(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.max_count)
            .min(self.max_count_cap)
    }
}

/// Similarity of a record to a query vector. Non-finite results are `0.0`.
pub fn score(query: &[f32], record: &DocumentRecord) -> f32 {
    let s = cosine_similarity(query, &record.embedding);
    if s.is_finite() {
        s
    } else {
        0.0
    }
}

/// Score and sort records, highest first, ties in input order.
pub fn rank(query: &[f32], records: &[Arc<DocumentRecord>]) -> Vec<ScoredDocument> {
    let mut scored: Vec<ScoredDocument> = records
        .iter()
        .map(|r| ScoredDocument {
            score: score(query, r),
            record: Arc::clone(r),
        })
        .collect();
    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored
}

/// Keep ranked records above `min_score`, at most `max_count` of them.
pub fn select(
    ranked: &[ScoredDocument],
    min_score: f32,
    max_count: usize,
) -> Vec<Arc<DocumentRecord>> {
    ranked
        .iter()
        .filter(|s| s.score > min_score)
        .take(max_count)
        .map(|s| Arc::clone(&s.record))
        .collect()
}

/// Ranks a generation against a query vector using fixed parameters.
#[derive(Debug, Clone, Default)]
pub struct Retriever {
    params: RetrievalParams,
}

impl Retriever {
    pub fn new(params: RetrievalParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &RetrievalParams {
        &self.params
    }

    /// Context documents for a question: ranked, thresholded, capped.
    /// An empty result means nothing relevant was found.
    pub fn retrieve(&self, query: &[f32], generation: &Generation) -> Vec<Arc<DocumentRecord>> {
        let ranked = rank(query, generation.records());
        select(&ranked, self.params.min_score, self.params.max_count)
    }

    /// The `limit` best matches regardless of threshold.
    pub fn top(&self, query: &[f32], generation: &Generation, limit: usize) -> Vec<ScoredDocument> {
        let mut ranked = rank(query, generation.records());
        ranked.truncate(limit);
        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(id: &str, embedding: Vec<f32>) -> Arc<DocumentRecord> {
        Arc::new(DocumentRecord {
            id: id.to_string(),
            name: id.to_uppercase(),
            content: format!("content of {}", id),
            embedding,
        })
    }

    fn scored(id: &str, score: f32) -> ScoredDocument {
        ScoredDocument {
            score,
            record: rec(id, vec![1.0]),
        }
    }

    #[test]
    fn test_rank_sorted_descending() {
        let records = vec![
            rec("low", vec![0.0, 1.0]),
            rec("high", vec![1.0, 0.0]),
            rec("mid", vec![1.0, 1.0]),
        ];
        let ranked = rank(&[1.0, 0.0], &records);
        let ids: Vec<&str> = ranked.iter().map(|s| s.record.id.as_str()).collect();
        assert_eq!(ids, vec!["high", "mid", "low"]);
        assert!(ranked.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn test_rank_stable_for_ties() {
        let records = vec![
            rec("first", vec![1.0, 1.0]),
            rec("other", vec![0.0, 1.0]),
            rec("second", vec![1.0, 1.0]),
            rec("third", vec![1.0, 1.0]),
        ];
        let ranked = rank(&[1.0, 1.0], &records);
        let ids: Vec<&str> = ranked.iter().map(|s| s.record.id.as_str()).collect();
        assert_eq!(ids, vec!["first", "second", "third", "other"]);
    }

    #[test]
    fn test_rank_zero_vector_scores_zero() {
        let records = vec![rec("zero", vec![0.0, 0.0])];
        let ranked = rank(&[1.0, 0.0], &records);
        assert_eq!(ranked[0].score, 0.0);
    }

    #[test]
    fn test_select_respects_threshold_and_count() {
        let ranked: Vec<ScoredDocument> = vec![
            scored("a", 0.9),
            scored("b", 0.8),
            scored("c", 0.7),
            scored("d", 0.6),
            scored("e", 0.5),
            scored("f", 0.4),
            scored("g", 0.1),
            scored("h", 0.05),
        ];
        let picked = select(&ranked, 0.1, 5);
        assert_eq!(picked.len(), 5);
        let ids: Vec<&str> = picked.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c", "d", "e"]);

        let picked = select(&ranked, 0.1, 50);
        assert_eq!(picked.len(), 6);
        assert!(picked.iter().all(|r| r.id != "g" && r.id != "h"));
    }

    #[test]
    fn test_select_nothing_above_threshold() {
        let ranked = vec![scored("a", 0.1), scored("b", -0.4)];
        assert!(select(&ranked, 0.1, 5).is_empty());
        assert!(select(&[], 0.1, 5).is_empty());
    }

    #[test]
    fn test_resolve_count_clamps_to_cap() {
        let params = RetrievalParams::default();
        assert_eq!(params.resolve_count(None), 5);
        assert_eq!(params.resolve_count(Some(8)), 8);
        assert_eq!(params.resolve_count(Some(50)), 10);
    }

    #[test]
    fn test_retriever_on_empty_generation() {
        let retriever = Retriever::default();
        let generation = Generation::default();
        assert!(retriever.retrieve(&[1.0, 0.0], &generation).is_empty());
        assert!(retriever.top(&[1.0, 0.0], &generation, 5).is_empty());
    }
}
