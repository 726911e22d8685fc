//! §4.6 Deep Reranker — QA-style (query, snippet) scoring.
//!
//! Same trait-object-with-deterministic-fallback shape as `embed::EmbeddingProvider`/
//! `HashEmbedder`: a real QA model is swapped in behind `DeepReranker` without the
//! orchestrator ever depending on model weights being present.

use async_trait::async_trait;

use crate::config::FusionWeights;
use crate::error::Result;

#[async_trait]
pub trait DeepReranker: Send + Sync {
    fn kind(&self) -> &'static str;

    /// Score how "answerable" `query` appears to be over `snippet`'s markup. Higher is
    /// better; the score is not used to extract an answer span.
    async fn score(&self, query: &str, snippet: &str) -> Result<f32>;

    fn is_ready(&self) -> bool {
        true
    }

    async fn init(&mut self) -> Result<()> {
        Ok(())
    }
}

/// `fused = w1*cosine + w2*rerank + w3*promotion_prior` (§4.6).
pub fn fuse(cosine: f32, rerank: f32, promotion_prior: f32, weights: &FusionWeights) -> f32 {
    weights.cosine * cosine + weights.rerank * rerank + weights.promotion * promotion_prior
}

/// Deterministic lexical-overlap reranker: the fraction of query tokens that appear
/// (case-insensitively, whole-token) in the snippet. Stands in for a real QA model
/// the same way `embed::HashEmbedder` stands in for a real embedding model.
pub struct HeuristicReranker;

#[async_trait]
impl DeepReranker for HeuristicReranker {
    fn kind(&self) -> &'static str {
        "heuristic-lexical-overlap"
    }

    async fn score(&self, query: &str, snippet: &str) -> Result<f32> {
        let query_tokens: Vec<String> = query.split_whitespace().map(|t| t.to_lowercase()).collect();
        if query_tokens.is_empty() {
            return Ok(0.0);
        }
        let snippet_lower = snippet.to_lowercase();
        let hits = query_tokens.iter().filter(|t| snippet_lower.contains(t.as_str())).count();
        Ok(hits as f32 / query_tokens.len() as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn full_overlap_scores_one() {
        let reranker = HeuristicReranker;
        let score = reranker.score("apple filter", "<button>Apple filter</button>").await.unwrap();
        assert_eq!(score, 1.0);
    }

    #[tokio::test]
    async fn no_overlap_scores_zero() {
        let reranker = HeuristicReranker;
        let score = reranker.score("banana", "<button>Apple</button>").await.unwrap();
        assert_eq!(score, 0.0);
    }

    #[tokio::test]
    async fn partial_overlap_is_fractional() {
        let reranker = HeuristicReranker;
        let score = reranker.score("apple banana", "<button>Apple</button>").await.unwrap();
        assert_eq!(score, 0.5);
    }

    #[test]
    fn fuse_uses_default_weights() {
        let weights = FusionWeights::default();
        let fused = fuse(1.0, 1.0, 1.0, &weights);
        assert!((fused - 1.0).abs() < 1e-6);
    }

    #[test]
    fn fuse_weighs_rerank_more_than_cosine_by_default() {
        let weights = FusionWeights::default();
        let cosine_only = fuse(1.0, 0.0, 0.0, &weights);
        let rerank_only = fuse(0.0, 1.0, 0.0, &weights);
        assert!(rerank_only > cosine_only);
    }
}
