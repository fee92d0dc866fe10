//! Integration tests for the reranking strategies.
//!
//! Collaborators are mocked: a scripted chat model with a call counter for
//! the generative strategy, and purpose-built scorers (failing, slow,
//! counting) for the scored strategy.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use ragsift::config::RerankSettings;
use ragsift::llm::{ChatError, ChatMessage, ChatModel, ChatResponse, Role};
use ragsift::rerank::{
    GenerativeReranker, PassthroughReranker, RerankCandidate, RerankError, Reranker,
    RerankerContext, RerankerRegistry, ScoredReranker, Scorer, ScorerError,
};

fn candidates() -> Vec<RerankCandidate> {
    vec![
        RerankCandidate::new("1", "Python is a programming language").with_score(0.9),
        RerankCandidate::new("2", "Java is also a programming language").with_score(0.8),
        RerankCandidate::new("3", "Machine learning uses algorithms").with_score(0.7),
    ]
}

fn ids(results: &[ragsift::rerank::RerankResult]) -> Vec<&str> {
    results.iter().map(|r| r.id.as_str()).collect()
}

/// Chat model that replays a scripted sequence of responses.
struct ScriptedChat {
    script: Mutex<VecDeque<Result<String, ChatError>>>,
    calls: AtomicU32,
    last_prompt: Mutex<Option<String>>,
}

impl ScriptedChat {
    fn new(script: Vec<Result<String, ChatError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            calls: AtomicU32::new(0),
            last_prompt: Mutex::new(None),
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatModel for ScriptedChat {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        _temperature: f32,
    ) -> Result<ChatResponse, ChatError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_prompt.lock() = messages.first().map(|m| m.content.clone());

        let next = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(ChatError::Request("script exhausted".to_string())));
        next.map(|content| ChatResponse {
            content,
            model: "scripted".to_string(),
        })
    }
}

fn template_dir() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("rerank.txt"),
        "Query: {query}\n\nPassages:\n{passages}\n\nOne score per line.\n",
    )
    .unwrap();
    dir
}

fn generative(chat: Arc<ScriptedChat>, max_retries: u32) -> (GenerativeReranker, tempfile::TempDir) {
    let dir = template_dir();
    let reranker = GenerativeReranker::builder()
        .chat(chat)
        .prompt_path("rerank.txt")
        .template_root(dir.path())
        .max_retries(max_retries)
        .build()
        .unwrap();
    (reranker, dir)
}

// ---------------------------------------------------------------------------
// Passthrough
// ---------------------------------------------------------------------------

#[tokio::test]
async fn passthrough_preserves_order_scores_and_ranks() {
    let results = PassthroughReranker::new()
        .rerank("query", &candidates(), None)
        .await
        .unwrap();

    assert_eq!(ids(&results), vec!["1", "2", "3"]);
    assert_eq!(
        results.iter().map(|r| r.score).collect::<Vec<_>>(),
        vec![0.9, 0.8, 0.7]
    );
    assert_eq!(
        results.iter().map(|r| r.new_rank).collect::<Vec<_>>(),
        vec![0, 1, 2]
    );
    assert!(
        results
            .iter()
            .all(|r| r.new_rank == r.original_rank)
    );
}

// ---------------------------------------------------------------------------
// Scored
// ---------------------------------------------------------------------------

struct FailingScorer;

#[async_trait]
impl Scorer for FailingScorer {
    async fn score(&self, _query: &str, _texts: &[String]) -> Result<Vec<f32>, ScorerError> {
        Err(ScorerError::new("model exploded"))
    }
}

struct SlowScorer;

#[async_trait]
impl Scorer for SlowScorer {
    async fn score(&self, _query: &str, texts: &[String]) -> Result<Vec<f32>, ScorerError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(vec![1.0; texts.len()])
    }
}

/// Scores each text by its position across all calls and counts invocations.
struct CountingScorer {
    calls: AtomicU32,
}

#[async_trait]
impl Scorer for CountingScorer {
    async fn score(&self, _query: &str, texts: &[String]) -> Result<Vec<f32>, ScorerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| t.len() as f32).collect())
    }
}

#[tokio::test]
async fn scored_orders_by_descending_score() {
    let reranker = ScoredReranker::builder()
        .scorer(Arc::new(CountingScorer {
            calls: AtomicU32::new(0),
        }))
        .build();

    let batch = vec![
        RerankCandidate::new("short", "ab"),
        RerankCandidate::new("long", "abcdefghij"),
        RerankCandidate::new("mid", "abcde"),
    ];
    let results = reranker.rerank("query", &batch, None).await.unwrap();

    assert_eq!(ids(&results), vec!["long", "mid", "short"]);
    assert_eq!(
        results.iter().map(|r| r.new_rank).collect::<Vec<_>>(),
        vec![0, 1, 2]
    );
    assert_eq!(results[0].original_rank, 1);
    assert!(reranker.last_error().is_none());
}

#[tokio::test]
async fn scored_fallback_returns_original_order_and_records_error() {
    let reranker = ScoredReranker::builder()
        .scorer(Arc::new(FailingScorer))
        .fallback_on_error(true)
        .build();

    let results = reranker.rerank("query", &candidates(), None).await.unwrap();

    assert_eq!(ids(&results), vec!["1", "2", "3"]);
    assert_eq!(
        results.iter().map(|r| r.score).collect::<Vec<_>>(),
        vec![0.9, 0.8, 0.7]
    );
    let error = reranker.last_error().expect("last error should be recorded");
    assert!(error.contains("model exploded"));
    assert!(!reranker.timed_out());
}

#[tokio::test]
async fn scored_without_fallback_propagates_the_failure() {
    let reranker = ScoredReranker::builder()
        .scorer(Arc::new(FailingScorer))
        .fallback_on_error(false)
        .build();

    let err = reranker
        .rerank("query", &candidates(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, RerankError::ScoringFailed { .. }));
}

#[tokio::test]
async fn scored_timeout_is_reported_and_falls_back() {
    // The deadline cancels the scorer, so the 5s sleep never completes.
    let reranker = ScoredReranker::builder()
        .scorer(Arc::new(SlowScorer))
        .timeout(Duration::from_millis(50))
        .fallback_on_error(true)
        .build();

    let results = reranker.rerank("query", &candidates(), None).await.unwrap();

    assert_eq!(ids(&results), vec!["1", "2", "3"]);
    assert!(reranker.timed_out());
    assert!(
        reranker
            .last_error()
            .is_some_and(|e| e.contains("timed out"))
    );
}

#[tokio::test]
async fn scored_diagnostics_reset_between_calls() {
    struct FlakyScorer {
        calls: AtomicU32,
    }

    #[async_trait]
    impl Scorer for FlakyScorer {
        async fn score(&self, _query: &str, texts: &[String]) -> Result<Vec<f32>, ScorerError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(ScorerError::new("first call fails"))
            } else {
                Ok(vec![1.0; texts.len()])
            }
        }
    }

    let reranker = ScoredReranker::builder()
        .scorer(Arc::new(FlakyScorer {
            calls: AtomicU32::new(0),
        }))
        .build();

    reranker.rerank("query", &candidates(), None).await.unwrap();
    assert!(reranker.last_error().is_some());

    reranker.rerank("query", &candidates(), None).await.unwrap();
    assert!(reranker.last_error().is_none());
}

#[tokio::test]
async fn scored_batches_by_configured_size() {
    let scorer = Arc::new(CountingScorer {
        calls: AtomicU32::new(0),
    });
    let reranker = ScoredReranker::builder()
        .scorer(Arc::clone(&scorer) as Arc<dyn Scorer>)
        .batch_size(2)
        .build();

    let batch: Vec<_> = (0..5)
        .map(|i| RerankCandidate::new(format!("{i}"), format!("candidate number {i}")))
        .collect();
    let results = reranker.rerank("query", &batch, None).await.unwrap();

    assert_eq!(results.len(), 5);
    assert_eq!(scorer.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn scored_top_k_truncates_after_ordering() {
    let reranker = ScoredReranker::builder().build();
    let results = reranker
        .rerank("programming language", &candidates(), Some(2))
        .await
        .unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[1].new_rank, 1);
}

// ---------------------------------------------------------------------------
// Generative
// ---------------------------------------------------------------------------

#[tokio::test]
async fn generative_reorders_by_parsed_scores() {
    let chat = ScriptedChat::new(vec![Ok("3\n1\n2".to_string())]);
    let (reranker, _dir) = generative(Arc::clone(&chat), 2);

    let results = reranker.rerank("query", &candidates(), None).await.unwrap();

    // Scores 3, 1, 2 by input position, reordered descending.
    assert_eq!(ids(&results), vec!["1", "3", "2"]);
    assert_eq!(
        results.iter().map(|r| r.score).collect::<Vec<_>>(),
        vec![3.0, 2.0, 1.0]
    );
    assert_eq!(results[1].original_rank, 2);
    assert_eq!(chat.calls(), 1);
}

#[tokio::test]
async fn generative_prompt_enumerates_candidates() {
    let chat = ScriptedChat::new(vec![Ok("1\n2\n3".to_string())]);
    let (reranker, _dir) = generative(Arc::clone(&chat), 0);

    reranker
        .rerank("which language?", &candidates(), None)
        .await
        .unwrap();

    let prompt = chat.last_prompt.lock().clone().unwrap();
    assert!(prompt.contains("Query: which language?"));
    assert!(prompt.contains("1. Python is a programming language"));
    assert!(prompt.contains("3. Machine learning uses algorithms"));
    assert!(!prompt.contains("{query}"));
    assert!(!prompt.contains("{passages}"));
}

#[tokio::test]
async fn generative_retries_after_one_failure() {
    let chat = ScriptedChat::new(vec![
        Err(ChatError::Request("provider hiccup".to_string())),
        Ok("3\n2\n1".to_string()),
    ]);
    let (reranker, _dir) = generative(Arc::clone(&chat), 1);

    let results = reranker.rerank("query", &candidates(), None).await.unwrap();

    assert_eq!(chat.calls(), 2);
    assert_eq!(ids(&results), vec!["1", "2", "3"]);
}

#[tokio::test]
async fn generative_retries_on_malformed_response_then_succeeds() {
    let chat = ScriptedChat::new(vec![
        Ok("not scores at all".to_string()),
        Ok("1\n3\n2".to_string()),
    ]);
    let (reranker, _dir) = generative(Arc::clone(&chat), 2);

    let results = reranker.rerank("query", &candidates(), None).await.unwrap();

    assert_eq!(chat.calls(), 2);
    assert_eq!(ids(&results), vec!["2", "3", "1"]);
}

#[tokio::test]
async fn generative_exhausts_retries_then_raises_with_cause() {
    let chat = ScriptedChat::new(vec![
        Err(ChatError::Request("down".to_string())),
        Err(ChatError::Request("still down".to_string())),
        Err(ChatError::Request("dead".to_string())),
    ]);
    let (reranker, _dir) = generative(Arc::clone(&chat), 2);

    let err = reranker
        .rerank("query", &candidates(), None)
        .await
        .unwrap_err();

    // max_retries = 2 means exactly 3 collaborator calls.
    assert_eq!(chat.calls(), 3);
    match err {
        RerankError::RetriesExhausted {
            attempts,
            last_error,
        } => {
            assert_eq!(attempts, 3);
            assert!(last_error.contains("dead"));
        }
        other => panic!("expected RetriesExhausted, got {other}"),
    }
}

#[tokio::test]
async fn generative_validates_before_calling_the_model() {
    let chat = ScriptedChat::new(vec![Ok("1".to_string())]);
    let (reranker, _dir) = generative(Arc::clone(&chat), 0);

    let duplicate = vec![
        RerankCandidate::new("x", "one"),
        RerankCandidate::new("x", "two"),
    ];
    let err = reranker.rerank("query", &duplicate, None).await.unwrap_err();

    assert!(matches!(err, RerankError::DuplicateId(_)));
    assert_eq!(chat.calls(), 0);
}

// ---------------------------------------------------------------------------
// Cross-strategy invariants and the registry
// ---------------------------------------------------------------------------

#[tokio::test]
async fn every_strategy_returns_exactly_the_input_ids() {
    let chat = ScriptedChat::new(vec![Ok("1\n2\n3".to_string())]);
    let (generative, _dir) = generative(Arc::clone(&chat), 0);
    let strategies: Vec<Box<dyn Reranker>> = vec![
        Box::new(PassthroughReranker::new()),
        Box::new(ScoredReranker::builder().build()),
        Box::new(generative),
    ];

    for strategy in &strategies {
        let results = strategy
            .rerank("query", &candidates(), None)
            .await
            .unwrap();
        let mut got: Vec<_> = results.iter().map(|r| r.id.clone()).collect();
        got.sort();
        assert_eq!(got, vec!["1", "2", "3"], "backend {}", strategy.backend());
    }
}

#[tokio::test]
async fn registry_builds_generative_backend_end_to_end() {
    let dir = template_dir();
    let chat = ScriptedChat::new(vec![Ok("2\n3\n1".to_string())]);

    let settings = RerankSettings {
        backend: "generative".to_string(),
        prompt_path: "rerank.txt".into(),
        template_root: Some(dir.path().to_path_buf()),
        ..Default::default()
    };
    let ctx = RerankerContext::new(settings).with_chat(chat.clone());
    let reranker = RerankerRegistry::with_defaults().create(&ctx).unwrap();

    let results = reranker.rerank("query", &candidates(), None).await.unwrap();
    assert_eq!(ids(&results), vec!["2", "1", "3"]);
}

#[tokio::test]
async fn registry_alias_resolves_to_scored_backend() {
    let settings = RerankSettings {
        backend: "cross_encoder".to_string(),
        ..Default::default()
    };
    let ctx = RerankerContext::new(settings);
    let reranker = RerankerRegistry::with_defaults().create(&ctx).unwrap();

    assert_eq!(reranker.backend(), "scored");
    let results = reranker.rerank("query", &candidates(), None).await.unwrap();
    assert_eq!(results.len(), 3);
}

#[tokio::test]
async fn top_k_from_settings_applies_through_registry() {
    let settings = RerankSettings {
        backend: "none".to_string(),
        ..Default::default()
    };
    let top_k = settings.top_k;
    let ctx = RerankerContext::new(settings);
    let reranker = RerankerRegistry::with_defaults().create(&ctx).unwrap();

    let batch: Vec<_> = (0..10)
        .map(|i| RerankCandidate::new(format!("{i}"), format!("text {i}")))
        .collect();
    let results = reranker.rerank("query", &batch, top_k).await.unwrap();
    assert_eq!(results.len(), 5);
}

#[test]
fn chat_message_roles_round_trip_through_serde() {
    let message = ChatMessage::user("prompt");
    let value = serde_json::to_value(&message).unwrap();
    let back: ChatMessage = serde_json::from_value(value).unwrap();
    assert_eq!(back.role, Role::User);
}
