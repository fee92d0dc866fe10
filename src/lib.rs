//! Text preparation and candidate re-ordering utilities for RAG pipelines.
//!
//! `ragsift` covers the two ends of a retrieval pipeline that sit on either
//! side of the vector store: turning raw documents into bounded, boundary-aware
//! chunks before indexing, and re-scoring retrieved candidates before they are
//! handed to a language model.
//!
//! ```text
//! Raw document ──► splitter::RecursiveSplitter ──► ordered chunks
//!                                 │
//!                                 └─► TextChunk { text, metadata }
//!                                        └─► downstream embedding / indexing
//!
//! Retrieved candidates ──► rerank::Reranker ──► ordered RerankResult list
//!                             │
//!                             ├─► PassthroughReranker   (identity)
//!                             ├─► ScoredReranker        (injected Scorer)
//!                             └─► GenerativeReranker    (ChatModel collaborator)
//! ```
//!
//! The two subsystems never call each other: documents enter only the
//! splitter at ingestion time, candidate sets enter only the reranking
//! strategies at query time.
//!
//! Embedding providers, vector stores, and concrete chat clients are external
//! collaborators. The narrow seams to them are the [`llm::ChatModel`] and
//! [`rerank::Scorer`] traits; everything else in this crate is self-contained.

pub mod config;
pub mod llm;
pub mod rerank;
pub mod splitter;

pub use config::{IngestionSettings, RerankSettings, Settings, SettingsError};
pub use llm::{ChatError, ChatMessage, ChatModel, ChatResponse, Role};
pub use rerank::{
    GenerativeReranker, PassthroughReranker, RerankCandidate, RerankError, RerankResult, Reranker,
    RerankerContext, RerankerRegistry, ScoredReranker, Scorer,
};
pub use splitter::{RecursiveSplitter, Splitter, SplitterError, SplitterRegistry, TextChunk};
