//! Reranking driven by an injected scoring function.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::contract::{apply_top_k, assemble_results, passthrough_results, validate_candidates};
use super::{RerankCandidate, RerankError, RerankResult, Reranker};

/// Error raised by a [`Scorer`] implementation.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct ScorerError(pub String);

impl ScorerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// A scoring function over a query and a batch of texts.
///
/// Implementations must return exactly one score per input text, in input
/// order. Typical backends are cross-encoder models or scoring APIs; the
/// shipped [`LexicalOverlapScorer`] is a deterministic heuristic for tests
/// and degraded-mode operation.
#[async_trait]
pub trait Scorer: Send + Sync {
    async fn score(&self, query: &str, texts: &[String]) -> Result<Vec<f32>, ScorerError>;
}

/// Deterministic lexical-overlap scorer.
///
/// Scores each text by word overlap with the query (weight 0.7) blended with
/// a length factor that slightly favors shorter texts (weight 0.3). No model
/// calls, no randomness.
#[derive(Clone, Copy, Debug, Default)]
pub struct LexicalOverlapScorer;

impl LexicalOverlapScorer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Scorer for LexicalOverlapScorer {
    async fn score(&self, query: &str, texts: &[String]) -> Result<Vec<f32>, ScorerError> {
        let query_lower = query.to_lowercase();
        let query_words: std::collections::HashSet<&str> =
            query_lower.split_whitespace().collect();

        Ok(texts
            .iter()
            .map(|text| {
                let text_lower = text.to_lowercase();
                let text_words: std::collections::HashSet<&str> =
                    text_lower.split_whitespace().collect();

                let overlap = if query_words.is_empty() || text_words.is_empty() {
                    0.0
                } else {
                    let common = query_words.intersection(&text_words).count();
                    common as f32 / query_words.len().max(text_words.len()) as f32
                };

                let length_factor = 1.0 / (1.0 + text.len() as f32 / 1000.0);
                overlap * 0.7 + length_factor * 0.3
            })
            .collect())
    }
}

/// Reranker that scores candidate batches through a [`Scorer`].
///
/// Candidate texts are partitioned into batches of `batch_size`; each batch
/// is scored under a `timeout` deadline (the scorer call is cancelled when
/// the deadline passes). On any scoring failure — scorer error, score-count
/// mismatch, or timeout — the strategy either degrades to original input
/// order with each candidate's own retrieval-time score
/// (`fallback_on_error`, the default) or propagates the failure.
///
/// The last error and a timeout flag are kept on the instance for post-hoc
/// inspection via [`last_error`](Self::last_error) and
/// [`timed_out`](Self::timed_out); they are reset at the start of every
/// `rerank` call and never drive control flow. Under concurrent calls on one
/// instance the diagnostics reflect whichever call finished last.
pub struct ScoredReranker {
    scorer: Arc<dyn Scorer>,
    model_name: String,
    timeout: Duration,
    batch_size: usize,
    fallback_on_error: bool,
    diagnostics: Mutex<Diagnostics>,
}

#[derive(Debug, Default)]
struct Diagnostics {
    last_error: Option<String>,
    timed_out: bool,
}

impl ScoredReranker {
    /// Creates a builder with default configuration.
    pub fn builder() -> ScoredRerankerBuilder {
        ScoredRerankerBuilder::default()
    }

    /// Diagnostic model label.
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Error text from the most recent `rerank` call, if it failed.
    pub fn last_error(&self) -> Option<String> {
        self.diagnostics.lock().last_error.clone()
    }

    /// Whether the most recent `rerank` call hit the scoring deadline.
    pub fn timed_out(&self) -> bool {
        self.diagnostics.lock().timed_out
    }

    async fn score_batch(&self, query: &str, texts: &[String]) -> Result<Vec<f32>, RerankError> {
        let start = Instant::now();
        let outcome = tokio::time::timeout(self.timeout, self.scorer.score(query, texts)).await;

        let scores = match outcome {
            Err(_) => {
                self.diagnostics.lock().timed_out = true;
                return Err(RerankError::ScoringTimeout {
                    timeout_ms: self.timeout.as_millis(),
                });
            }
            Ok(Err(err)) => {
                return Err(RerankError::ScoringFailed {
                    elapsed_ms: start.elapsed().as_millis(),
                    reason: err.to_string(),
                });
            }
            Ok(Ok(scores)) => scores,
        };

        if scores.len() != texts.len() {
            return Err(RerankError::ScoreCountMismatch {
                scores: scores.len(),
                candidates: texts.len(),
            });
        }

        debug!(
            batch = texts.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "batch scored"
        );
        Ok(scores)
    }

    async fn score_all(
        &self,
        query: &str,
        candidates: &[RerankCandidate],
    ) -> Result<Vec<f32>, RerankError> {
        let texts: Vec<String> = candidates.iter().map(|c| c.text.clone()).collect();
        let mut all_scores = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.batch_size) {
            all_scores.extend(self.score_batch(query, batch).await?);
        }
        Ok(all_scores)
    }
}

#[async_trait]
impl Reranker for ScoredReranker {
    fn backend(&self) -> &'static str {
        "scored"
    }

    async fn rerank(
        &self,
        query: &str,
        candidates: &[RerankCandidate],
        top_k: Option<usize>,
    ) -> Result<Vec<RerankResult>, RerankError> {
        validate_candidates(candidates)?;
        *self.diagnostics.lock() = Diagnostics::default();

        let start = Instant::now();
        match self.score_all(query, candidates).await {
            Ok(scores) => {
                let results = assemble_results(candidates, &scores, None)?;
                info!(
                    model = %self.model_name,
                    candidates = candidates.len(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "rerank complete"
                );
                Ok(apply_top_k(results, top_k))
            }
            Err(err) => {
                self.diagnostics.lock().last_error = Some(err.to_string());
                if self.fallback_on_error {
                    warn!(
                        model = %self.model_name,
                        error = %err,
                        "scoring failed; falling back to original order"
                    );
                    Ok(apply_top_k(passthrough_results(candidates), top_k))
                } else {
                    Err(err)
                }
            }
        }
    }
}

/// Builder for [`ScoredReranker`].
pub struct ScoredRerankerBuilder {
    scorer: Option<Arc<dyn Scorer>>,
    model_name: String,
    timeout: Duration,
    batch_size: usize,
    fallback_on_error: bool,
}

impl Default for ScoredRerankerBuilder {
    fn default() -> Self {
        Self {
            scorer: None,
            model_name: "lexical-overlap".to_string(),
            timeout: Duration::from_secs(30),
            batch_size: 32,
            fallback_on_error: true,
        }
    }
}

impl ScoredRerankerBuilder {
    /// The scoring backend. Defaults to [`LexicalOverlapScorer`].
    #[must_use]
    pub fn scorer(mut self, scorer: Arc<dyn Scorer>) -> Self {
        self.scorer = Some(scorer);
        self
    }

    /// Diagnostic model label. Appears in logs only.
    #[must_use]
    pub fn model_name(mut self, name: impl Into<String>) -> Self {
        self.model_name = name.into();
        self
    }

    /// Deadline per scorer invocation. Defaults to 30 seconds.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Texts per scorer invocation. Defaults to 32; clamped to at least 1.
    #[must_use]
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Degrade to original order on scoring failure. Defaults to true.
    #[must_use]
    pub fn fallback_on_error(mut self, fallback: bool) -> Self {
        self.fallback_on_error = fallback;
        self
    }

    /// Builds the reranker.
    pub fn build(self) -> ScoredReranker {
        ScoredReranker {
            scorer: self
                .scorer
                .unwrap_or_else(|| Arc::new(LexicalOverlapScorer::new())),
            model_name: self.model_name,
            timeout: self.timeout,
            batch_size: self.batch_size,
            fallback_on_error: self.fallback_on_error,
            diagnostics: Mutex::new(Diagnostics::default()),
        }
    }
}
