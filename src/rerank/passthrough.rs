//! Identity reranking strategy.

use async_trait::async_trait;
use tracing::debug;

use super::contract::{apply_top_k, passthrough_results, validate_candidates};
use super::{RerankCandidate, RerankError, RerankResult, Reranker};

/// Reranker that preserves input order and scores.
///
/// Candidates come back with `new_rank == original_rank == input position`
/// and their own retrieval-time score (0.0 when absent). This deliberately
/// bypasses the shared sort-by-score assembly used by the other strategies:
/// passthrough means "no reordering", even when the input scores are not
/// monotonically decreasing.
///
/// Useful as a safe default, for benchmarking against a real strategy, and as
/// the shape every fallback path degrades to.
#[derive(Clone, Copy, Debug, Default)]
pub struct PassthroughReranker;

impl PassthroughReranker {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Reranker for PassthroughReranker {
    fn backend(&self) -> &'static str {
        "none"
    }

    async fn rerank(
        &self,
        _query: &str,
        candidates: &[RerankCandidate],
        top_k: Option<usize>,
    ) -> Result<Vec<RerankResult>, RerankError> {
        validate_candidates(candidates)?;
        debug!(candidates = candidates.len(), "passthrough rerank");
        Ok(apply_top_k(passthrough_results(candidates), top_k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn preserves_order_even_when_scores_are_unsorted() {
        let candidates = vec![
            RerankCandidate::new("1", "first").with_score(0.1),
            RerankCandidate::new("2", "second").with_score(0.9),
        ];
        let results = PassthroughReranker::new()
            .rerank("query", &candidates, None)
            .await
            .unwrap();

        // Input order wins over score order.
        assert_eq!(results[0].id, "1");
        assert_eq!(results[0].score, 0.1);
        assert_eq!(results[1].id, "2");
    }

    #[tokio::test]
    async fn validates_before_returning() {
        let err = PassthroughReranker::new()
            .rerank("query", &[], None)
            .await
            .unwrap_err();
        assert!(matches!(err, RerankError::EmptyCandidates));
    }

    #[tokio::test]
    async fn applies_top_k() {
        let candidates: Vec<_> = (0..5)
            .map(|i| RerankCandidate::new(format!("{i}"), format!("text {i}")))
            .collect();
        let results = PassthroughReranker::new()
            .rerank("query", &candidates, Some(3))
            .await
            .unwrap();
        assert_eq!(results.len(), 3);
    }
}
