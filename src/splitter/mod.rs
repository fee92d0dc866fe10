//! Document chunking for ingestion pipelines.
//!
//! A [`Splitter`] turns one document into an ordered list of bounded-size
//! chunks. The shipped implementation is [`RecursiveSplitter`], which prefers
//! semantically meaningful boundaries (paragraphs, lines, sentences) over
//! arbitrary cuts and protects fenced code blocks from being split mid-block.
//!
//! Strategies are pluggable through [`SplitterRegistry`], an explicit table
//! from strategy name to constructor. Splitting is synchronous and pure:
//! no I/O, no shared state, deterministic output for a given input.

mod recursive;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::config::IngestionSettings;

pub use recursive::{RecursiveSplitter, RecursiveSplitterBuilder, DEFAULT_SEPARATORS};

/// Error raised during splitter construction or text splitting.
#[derive(Debug, thiserror::Error)]
pub enum SplitterError {
    /// chunk_size/chunk_overlap violate their preconditions.
    #[error("invalid splitter configuration: {0}")]
    InvalidConfig(String),

    /// The input document is empty or whitespace-only.
    #[error("text cannot be empty")]
    EmptyInput,

    /// No strategy is registered under the requested name.
    #[error("unknown splitter strategy '{requested}'; available: {available}")]
    UnknownStrategy {
        requested: String,
        available: String,
    },

    /// A strategy name was registered twice.
    #[error("splitter strategy '{0}' is already registered")]
    AlreadyRegistered(String),
}

/// A chunk of text paired with its metadata.
///
/// Produced by [`Splitter::split_text_with_metadata`]; `metadata` carries the
/// caller-supplied base fields plus `chunk_index` and `total_chunks`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TextChunk {
    pub text: String,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// A text-splitting strategy.
///
/// `split_text` is the required operation; the metadata and counting helpers
/// have default bodies built on top of it.
pub trait Splitter: Send + Sync {
    /// Splits `text` into an ordered list of chunk strings.
    fn split_text(&self, text: &str) -> Result<Vec<String>, SplitterError>;

    /// Splits `text` and attaches metadata to every chunk.
    ///
    /// Each chunk receives a copy of `base_metadata` (when provided) with
    /// `chunk_index` and `total_chunks` merged in.
    fn split_text_with_metadata(
        &self,
        text: &str,
        base_metadata: Option<&serde_json::Map<String, serde_json::Value>>,
    ) -> Result<Vec<TextChunk>, SplitterError> {
        let chunks = self.split_text(text)?;
        let total = chunks.len();

        Ok(chunks
            .into_iter()
            .enumerate()
            .map(|(index, text)| {
                let mut metadata = base_metadata.cloned().unwrap_or_default();
                metadata.insert("chunk_index".to_string(), index.into());
                metadata.insert("total_chunks".to_string(), total.into());
                TextChunk { text, metadata }
            })
            .collect())
    }

    /// Number of chunks `text` would split into.
    fn num_chunks(&self, text: &str) -> Result<usize, SplitterError> {
        Ok(self.split_text(text)?.len())
    }
}

impl std::fmt::Debug for dyn Splitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Splitter").finish_non_exhaustive()
    }
}

/// Constructor for a registered splitter strategy.
pub type SplitterCtor =
    Box<dyn Fn(&IngestionSettings) -> Result<Box<dyn Splitter>, SplitterError> + Send + Sync>;

/// Explicit registration table mapping strategy names to constructors.
///
/// Lookup is exact-match on the lowercased key. [`with_defaults`] registers
/// the built-in `"recursive"` strategy; callers can add their own via
/// [`register`].
///
/// [`with_defaults`]: Self::with_defaults
/// [`register`]: Self::register
#[derive(Default)]
pub struct SplitterRegistry {
    table: HashMap<String, SplitterCtor>,
}

impl SplitterRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with the built-in strategies registered.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry
            .register("recursive", |settings| {
                Ok(Box::new(
                    RecursiveSplitter::builder()
                        .chunk_size(settings.chunk_size)
                        .chunk_overlap(settings.chunk_overlap)
                        .build()?,
                ))
            })
            .unwrap_or_else(|_| unreachable!("empty registry cannot hold duplicates"));
        registry
    }

    /// Registers a strategy under `name`.
    pub fn register<F>(&mut self, name: &str, ctor: F) -> Result<(), SplitterError>
    where
        F: Fn(&IngestionSettings) -> Result<Box<dyn Splitter>, SplitterError>
            + Send
            + Sync
            + 'static,
    {
        let key = name.to_lowercase();
        if self.table.contains_key(&key) {
            return Err(SplitterError::AlreadyRegistered(key));
        }
        self.table.insert(key, Box::new(ctor));
        Ok(())
    }

    /// Whether a strategy is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.table.contains_key(&name.to_lowercase())
    }

    /// Registered strategy names, sorted.
    pub fn strategies(&self) -> Vec<String> {
        let mut names: Vec<_> = self.table.keys().cloned().collect();
        names.sort();
        names
    }

    /// Constructs the strategy registered under `name` from `settings`.
    pub fn create(
        &self,
        name: &str,
        settings: &IngestionSettings,
    ) -> Result<Box<dyn Splitter>, SplitterError> {
        let key = name.to_lowercase();
        let ctor = self
            .table
            .get(&key)
            .ok_or_else(|| SplitterError::UnknownStrategy {
                requested: name.to_string(),
                available: self.strategies().join(", "),
            })?;
        ctor(settings)
    }
}
