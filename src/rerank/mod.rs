//! Candidate re-ordering strategies for retrieval results.
//!
//! A [`Reranker`] takes a query and a batch of retrieved candidates and
//! returns them re-scored and re-ordered. Three strategies ship with the
//! crate:
//!
//! - [`PassthroughReranker`] — preserves input order; safe default and the
//!   shape every fallback path degrades to.
//! - [`ScoredReranker`] — drives an injected [`Scorer`] over candidate
//!   batches, with a deadline per invocation and optional degrade-to-original
//!   ordering on failure.
//! - [`GenerativeReranker`] — prompts a [`ChatModel`] collaborator for one
//!   score per candidate and retries the whole call on malformed output.
//!
//! Shared validation and result assembly live in [`contract`]; strategies
//! compose those helpers rather than inheriting them. Strategies are
//! pluggable through [`RerankerRegistry`].
//!
//! Reranking is per-call stateless: the only instance state is the scored
//! strategy's diagnostic fields, which exist purely for post-hoc inspection.
//!
//! [`ChatModel`]: crate::llm::ChatModel

pub mod contract;
mod generative;
mod passthrough;
mod registry;
mod scored;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use generative::{GenerativeReranker, GenerativeRerankerBuilder};
pub use passthrough::PassthroughReranker;
pub use registry::{RerankerContext, RerankerCtor, RerankerRegistry};
pub use scored::{LexicalOverlapScorer, ScoredReranker, ScoredRerankerBuilder, Scorer, ScorerError};

/// Error raised during reranker construction or a `rerank` call.
#[derive(Debug, thiserror::Error)]
pub enum RerankError {
    /// The candidate list is empty.
    #[error("candidate list cannot be empty")]
    EmptyCandidates,

    /// Two candidates share an id.
    #[error("candidate ids must be unique; '{0}' appears more than once")]
    DuplicateId(String),

    /// A candidate is malformed (blank id or text).
    #[error("candidate at position {position} is invalid: {reason}")]
    InvalidCandidate { position: usize, reason: String },

    /// Score count does not match candidate count.
    #[error("got {scores} scores for {candidates} candidates")]
    ScoreCountMismatch { scores: usize, candidates: usize },

    /// The injected scorer failed or misbehaved.
    #[error("scoring failed after {elapsed_ms}ms: {reason}")]
    ScoringFailed { elapsed_ms: u128, reason: String },

    /// The scorer exceeded its deadline.
    #[error("scoring timed out after {timeout_ms}ms")]
    ScoringTimeout { timeout_ms: u128 },

    /// The chat collaborator failed.
    #[error("chat collaborator failed: {0}")]
    ChatFailed(String),

    /// The prompt template resource could not be loaded.
    #[error("prompt template '{path}' could not be loaded: {reason}")]
    TemplateUnavailable { path: String, reason: String },

    /// The collaborator's response did not yield one score per candidate.
    #[error("parsed {scores} scores for {candidates} candidates from response: {snippet}")]
    ParseFailure {
        scores: usize,
        candidates: usize,
        snippet: String,
    },

    /// All generative attempts failed.
    #[error("rerank failed after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    /// No strategy is registered under the requested name.
    #[error("unknown reranker backend '{requested}'; available: {available}")]
    UnknownBackend {
        requested: String,
        available: String,
    },

    /// A backend name was registered twice.
    #[error("reranker backend '{0}' is already registered")]
    AlreadyRegistered(String),

    /// The registry context is missing a collaborator the strategy needs.
    #[error("backend '{backend}' requires {missing}")]
    MissingCollaborator {
        backend: &'static str,
        missing: &'static str,
    },
}

/// A retrieved item awaiting re-scoring.
///
/// Supplied by the caller per `rerank` invocation and never mutated; `score`
/// is the retrieval-time score, used only by fallback paths.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RerankCandidate {
    /// Unique id within one `rerank` call.
    pub id: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

impl RerankCandidate {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            score: None,
            metadata: None,
        }
    }

    /// Sets the retrieval-time score.
    #[must_use]
    pub fn with_score(mut self, score: f32) -> Self {
        self.score = Some(score);
        self
    }

    /// Attaches metadata carried through to the result.
    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Map<String, serde_json::Value>) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// A re-scored candidate with its position before and after reordering.
///
/// `original_rank` is the candidate's input position, `new_rank` its output
/// position; both are 0-based.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RerankResult {
    pub id: String,
    pub text: String,
    pub score: f32,
    pub original_rank: usize,
    pub new_rank: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

/// A reranking strategy.
///
/// Every implementation must validate its input (via
/// [`contract::validate_candidates`]) before doing any work, and must return
/// exactly the input's candidate ids, neither dropping nor duplicating any.
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Registry key / diagnostic label of this strategy.
    fn backend(&self) -> &'static str;

    /// Re-scores and re-orders `candidates` for `query`.
    ///
    /// When `top_k` is `Some(k)` with `k > 0`, the output is truncated to its
    /// first `k` entries after ordering.
    async fn rerank(
        &self,
        query: &str,
        candidates: &[RerankCandidate],
        top_k: Option<usize>,
    ) -> Result<Vec<RerankResult>, RerankError>;
}

impl std::fmt::Debug for dyn Reranker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reranker")
            .field("backend", &self.backend())
            .finish_non_exhaustive()
    }
}
