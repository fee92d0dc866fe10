//! Shared validation and result assembly used by every reranking strategy.
//!
//! These are free functions rather than provided trait methods so each
//! strategy composes exactly the pieces it needs: the scored and generative
//! strategies assemble through [`assemble_results`] (which sorts by score
//! descending), while the passthrough strategy and the fallback paths use
//! [`passthrough_results`] to deliberately keep input order.

use super::{RerankCandidate, RerankError, RerankResult};

/// Validates a candidate batch.
///
/// Fails when the batch is empty, when a candidate has a blank id or blank
/// text, or when two candidates share an id.
pub fn validate_candidates(candidates: &[RerankCandidate]) -> Result<(), RerankError> {
    if candidates.is_empty() {
        return Err(RerankError::EmptyCandidates);
    }

    let mut seen = std::collections::HashSet::with_capacity(candidates.len());
    for (position, candidate) in candidates.iter().enumerate() {
        if candidate.id.trim().is_empty() {
            return Err(RerankError::InvalidCandidate {
                position,
                reason: "id must not be empty".to_string(),
            });
        }
        if candidate.text.trim().is_empty() {
            return Err(RerankError::InvalidCandidate {
                position,
                reason: "text must not be empty".to_string(),
            });
        }
        if !seen.insert(candidate.id.as_str()) {
            return Err(RerankError::DuplicateId(candidate.id.clone()));
        }
    }
    Ok(())
}

/// Builds results from fresh scores and sorts them by score descending.
///
/// `original_ranks` defaults to input position when not supplied. `new_rank`
/// is assigned from the final (sorted) position. The sort is stable, so
/// candidates with equal scores keep their input order.
pub fn assemble_results(
    candidates: &[RerankCandidate],
    scores: &[f32],
    original_ranks: Option<&[usize]>,
) -> Result<Vec<RerankResult>, RerankError> {
    if scores.len() != candidates.len() {
        return Err(RerankError::ScoreCountMismatch {
            scores: scores.len(),
            candidates: candidates.len(),
        });
    }

    let mut results: Vec<RerankResult> = candidates
        .iter()
        .zip(scores)
        .enumerate()
        .map(|(i, (candidate, &score))| RerankResult {
            id: candidate.id.clone(),
            text: candidate.text.clone(),
            score,
            original_rank: original_ranks.map_or(i, |ranks| ranks[i]),
            new_rank: 0,
            metadata: candidate.metadata.clone(),
        })
        .collect();

    results.sort_by(|a, b| b.score.total_cmp(&a.score));
    for (new_rank, result) in results.iter_mut().enumerate() {
        result.new_rank = new_rank;
    }
    Ok(results)
}

/// Builds results that preserve input order.
///
/// Each candidate keeps its own retrieval-time score (0.0 when absent) and
/// `new_rank == original_rank == input position`. Used by the passthrough
/// strategy and by the scored strategy's fallback path.
pub fn passthrough_results(candidates: &[RerankCandidate]) -> Vec<RerankResult> {
    candidates
        .iter()
        .enumerate()
        .map(|(i, candidate)| RerankResult {
            id: candidate.id.clone(),
            text: candidate.text.clone(),
            score: candidate.score.unwrap_or(0.0),
            original_rank: i,
            new_rank: i,
            metadata: candidate.metadata.clone(),
        })
        .collect()
}

/// Truncates `results` to the first `top_k` entries when `top_k` is positive.
pub fn apply_top_k(mut results: Vec<RerankResult>, top_k: Option<usize>) -> Vec<RerankResult> {
    if let Some(k) = top_k
        && k > 0
        && results.len() > k
    {
        results.truncate(k);
    }
    results
}
