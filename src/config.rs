//! Configuration for chunking and reranking.
//!
//! Settings are plain serde structs with per-field defaults so a partial JSON
//! document (or `Default::default()`) always yields a usable configuration.
//! Validation is separate from deserialization: call [`Settings::validate`]
//! (or the per-section `validate` methods) before handing settings to the
//! registries.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Error raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// The configuration document could not be parsed.
    #[error("failed to parse settings: {0}")]
    Parse(#[from] serde_json::Error),

    /// A field (or combination of fields) holds an invalid value.
    #[error("invalid setting `{field}`: {reason}")]
    Invalid {
        field: &'static str,
        reason: String,
    },
}

/// Ingestion-time chunking parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionSettings {
    /// Target chunk size in characters.
    pub chunk_size: usize,
    /// Overlap between adjacent chunks in characters.
    pub chunk_overlap: usize,
}

impl Default for IngestionSettings {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

impl IngestionSettings {
    /// Checks the chunk-size/overlap relationship.
    ///
    /// `chunk_size` must be positive and `chunk_overlap` strictly smaller,
    /// otherwise greedy coalescing could never close a chunk.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.chunk_size == 0 {
            return Err(SettingsError::Invalid {
                field: "ingestion.chunk_size",
                reason: "must be positive".into(),
            });
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(SettingsError::Invalid {
                field: "ingestion.chunk_overlap",
                reason: format!(
                    "overlap ({}) must be less than chunk_size ({})",
                    self.chunk_overlap, self.chunk_size
                ),
            });
        }
        Ok(())
    }
}

/// Query-time reranking parameters.
///
/// `backend` selects a strategy from the [`RerankerRegistry`]; the remaining
/// fields are consumed by whichever strategy is constructed (strategies ignore
/// fields they have no use for).
///
/// [`RerankerRegistry`]: crate::rerank::RerankerRegistry
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankSettings {
    /// Registry key of the strategy to construct (`"none"`, `"scored"`,
    /// `"generative"`, or a custom registration).
    pub backend: String,
    /// Model label, surfaced in diagnostics and logs only.
    pub model: Option<String>,
    /// Truncate rerank output to the first `top_k` results.
    pub top_k: Option<usize>,
    /// Deadline for a single scorer invocation, in seconds.
    pub timeout_secs: u64,
    /// How many candidate texts are sent to the scorer per invocation.
    pub batch_size: usize,
    /// Degrade to original ordering on scoring failure instead of raising.
    pub fallback_on_error: bool,
    /// Prompt template for the generative strategy. Relative paths are
    /// resolved against `template_root`.
    pub prompt_path: PathBuf,
    /// Root directory for resolving a relative `prompt_path`. Defaults to the
    /// process working directory when unset.
    pub template_root: Option<PathBuf>,
    /// Generation temperature for the generative strategy.
    pub temperature: f32,
    /// Full-call retries for the generative strategy after the first attempt.
    pub max_retries: u32,
}

impl Default for RerankSettings {
    fn default() -> Self {
        Self {
            backend: "none".to_string(),
            model: None,
            top_k: Some(5),
            timeout_secs: 30,
            batch_size: 32,
            fallback_on_error: true,
            prompt_path: PathBuf::from("config/prompts/rerank.txt"),
            template_root: None,
            temperature: 0.0,
            max_retries: 2,
        }
    }
}

impl RerankSettings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.backend.trim().is_empty() {
            return Err(SettingsError::Invalid {
                field: "rerank.backend",
                reason: "must not be empty".into(),
            });
        }
        if self.batch_size == 0 {
            return Err(SettingsError::Invalid {
                field: "rerank.batch_size",
                reason: "must be positive".into(),
            });
        }
        if self.timeout_secs == 0 {
            return Err(SettingsError::Invalid {
                field: "rerank.timeout_secs",
                reason: "must be positive".into(),
            });
        }
        Ok(())
    }
}

/// Top-level settings container for the sections this crate owns.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub ingestion: IngestionSettings,
    pub rerank: RerankSettings,
}

impl Settings {
    /// Parses settings from a JSON document.
    pub fn from_json_str(raw: &str) -> Result<Self, SettingsError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Parses settings from an already-decoded JSON value.
    pub fn from_json_value(value: serde_json::Value) -> Result<Self, SettingsError> {
        Ok(serde_json::from_value(value)?)
    }

    /// Validates every section.
    pub fn validate(&self) -> Result<(), SettingsError> {
        self.ingestion.validate()?;
        self.rerank.validate()?;
        Ok(())
    }
}
