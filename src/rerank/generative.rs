//! Reranking through a chat-capable language model.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::llm::{ChatMessage, ChatModel};

use super::contract::{apply_top_k, assemble_results, validate_candidates};
use super::{RerankCandidate, RerankError, RerankResult, Reranker};

/// Placeholder in the template replaced by the query text.
const QUERY_PLACEHOLDER: &str = "{query}";
/// Placeholder in the template replaced by the enumerated candidate list.
const PASSAGES_PLACEHOLDER: &str = "{passages}";

static FIRST_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+\.?\d*)").unwrap_or_else(|err| panic!("score regex: {err}"))
});

/// Reranker that asks a [`ChatModel`] to score every candidate.
///
/// The prompt is built from a template loaded once at construction time: the
/// query and a newline-joined, 1-indexed enumeration of candidate texts are
/// substituted into `{query}` and `{passages}`, and the whole prompt is sent
/// as a single user message. The response is expected to carry one score per
/// line; the first numeric token on each non-blank line is taken as that
/// line's score and lines without a number are skipped.
///
/// On collaborator failure or a malformed response the whole call is retried
/// (fresh generation, fresh parse) up to `max_retries` times. Retry is
/// full-call rather than per-candidate: a malformed response usually means a
/// systemic formatting problem that only a fresh generation can fix. When
/// retries are exhausted the error carries the last underlying failure.
pub struct GenerativeReranker {
    chat: Arc<dyn ChatModel>,
    template: String,
    temperature: f32,
    max_retries: u32,
}

impl std::fmt::Debug for GenerativeReranker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerativeReranker")
            .field("template", &self.template)
            .field("temperature", &self.temperature)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

impl GenerativeReranker {
    /// Creates a builder with default configuration.
    pub fn builder() -> GenerativeRerankerBuilder {
        GenerativeRerankerBuilder::default()
    }

    /// The loaded prompt template.
    pub fn template(&self) -> &str {
        &self.template
    }

    fn format_prompt(&self, query: &str, candidates: &[RerankCandidate]) -> String {
        let passages = candidates
            .iter()
            .enumerate()
            .map(|(i, candidate)| format!("{}. {}", i + 1, candidate.text))
            .collect::<Vec<_>>()
            .join("\n");

        self.template
            .replace(QUERY_PLACEHOLDER, query)
            .replace(PASSAGES_PLACEHOLDER, &passages)
    }

    async fn attempt(
        &self,
        prompt: &str,
        expected: usize,
    ) -> Result<Vec<f32>, RerankError> {
        let messages = [ChatMessage::user(prompt)];
        let response = self
            .chat
            .chat(&messages, self.temperature)
            .await
            .map_err(|err| RerankError::ChatFailed(err.to_string()))?;

        debug!(model = %response.model, "scoring response received");
        parse_scores(&response.content, expected)
    }
}

#[async_trait]
impl Reranker for GenerativeReranker {
    fn backend(&self) -> &'static str {
        "generative"
    }

    async fn rerank(
        &self,
        query: &str,
        candidates: &[RerankCandidate],
        top_k: Option<usize>,
    ) -> Result<Vec<RerankResult>, RerankError> {
        validate_candidates(candidates)?;

        let prompt = self.format_prompt(query, candidates);
        let attempts = self.max_retries + 1;
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self.attempt(&prompt, candidates.len()).await {
                Ok(scores) => {
                    info!(
                        candidates = candidates.len(),
                        attempt, "generative rerank complete"
                    );
                    let results = assemble_results(candidates, &scores, None)?;
                    return Ok(apply_top_k(results, top_k));
                }
                Err(err) => {
                    warn!(attempt, error = %err, "generative rerank attempt failed");
                    last_error = err.to_string();
                }
            }
        }

        Err(RerankError::RetriesExhausted {
            attempts,
            last_error,
        })
    }
}

/// Extracts one score per non-blank response line.
///
/// Takes the first integer or decimal token on each line; lines without a
/// number are ignored. A line like `"Score: 3 out of 5"` therefore parses as
/// 3 — the first number wins.
fn parse_scores(output: &str, expected: usize) -> Result<Vec<f32>, RerankError> {
    let scores: Vec<f32> = output
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() {
                return None;
            }
            FIRST_NUMBER
                .find(line)
                .and_then(|m| m.as_str().parse::<f32>().ok())
        })
        .collect();

    if scores.len() != expected {
        return Err(RerankError::ParseFailure {
            scores: scores.len(),
            candidates: expected,
            snippet: snippet(output, 200),
        });
    }
    Ok(scores)
}

fn snippet(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Builder for [`GenerativeReranker`].
///
/// [`build`](Self::build) resolves and reads the prompt template, so
/// construction fails fast when the resource is missing.
pub struct GenerativeRerankerBuilder {
    chat: Option<Arc<dyn ChatModel>>,
    prompt_path: PathBuf,
    template_root: Option<PathBuf>,
    temperature: f32,
    max_retries: u32,
}

impl Default for GenerativeRerankerBuilder {
    fn default() -> Self {
        Self {
            chat: None,
            prompt_path: PathBuf::from("config/prompts/rerank.txt"),
            template_root: None,
            temperature: 0.0,
            max_retries: 2,
        }
    }
}

impl GenerativeRerankerBuilder {
    /// The chat collaborator. Required.
    #[must_use]
    pub fn chat(mut self, chat: Arc<dyn ChatModel>) -> Self {
        self.chat = Some(chat);
        self
    }

    /// Path to the prompt template. Absolute paths are used as-is; relative
    /// paths resolve against [`template_root`](Self::template_root).
    /// Defaults to `config/prompts/rerank.txt`.
    #[must_use]
    pub fn prompt_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.prompt_path = path.into();
        self
    }

    /// Root directory for resolving a relative prompt path. Defaults to the
    /// process working directory.
    #[must_use]
    pub fn template_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.template_root = Some(root.into());
        self
    }

    /// Generation temperature. Defaults to 0.0 for determinism.
    #[must_use]
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Full-call retries after the first attempt. Defaults to 2.
    #[must_use]
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    fn resolve_path(&self) -> PathBuf {
        if self.prompt_path.is_absolute() {
            return self.prompt_path.clone();
        }
        match &self.template_root {
            Some(root) => root.join(&self.prompt_path),
            None => self.prompt_path.clone(),
        }
    }

    /// Loads the template and builds the reranker.
    pub fn build(self) -> Result<GenerativeReranker, RerankError> {
        let path = self.resolve_path();
        let chat = self.chat.ok_or(RerankError::MissingCollaborator {
            backend: "generative",
            missing: "a chat collaborator",
        })?;
        let template = read_template(&path)?;

        Ok(GenerativeReranker {
            chat,
            template,
            temperature: self.temperature,
            max_retries: self.max_retries,
        })
    }
}

fn read_template(path: &Path) -> Result<String, RerankError> {
    std::fs::read_to_string(path).map_err(|err| RerankError::TemplateUnavailable {
        path: path.display().to_string(),
        reason: err.to_string(),
    })
}
