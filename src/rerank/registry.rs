//! Explicit registration table for reranking backends.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::RerankSettings;
use crate::llm::ChatModel;

use super::{
    GenerativeReranker, PassthroughReranker, RerankError, Reranker, ScoredReranker, Scorer,
};

/// Everything a registered constructor may draw on.
///
/// Settings select and parameterize the strategy; the optional collaborators
/// are injected by the caller because they cannot be conjured from
/// configuration alone. Constructing `"generative"` without a chat
/// collaborator fails; `"scored"` without a scorer falls back to the built-in
/// lexical-overlap heuristic.
#[derive(Clone)]
pub struct RerankerContext {
    pub settings: RerankSettings,
    pub chat: Option<Arc<dyn ChatModel>>,
    pub scorer: Option<Arc<dyn Scorer>>,
}

impl RerankerContext {
    pub fn new(settings: RerankSettings) -> Self {
        Self {
            settings,
            chat: None,
            scorer: None,
        }
    }

    /// Injects the chat collaborator for the generative backend.
    #[must_use]
    pub fn with_chat(mut self, chat: Arc<dyn ChatModel>) -> Self {
        self.chat = Some(chat);
        self
    }

    /// Injects the scoring backend for the scored strategy.
    #[must_use]
    pub fn with_scorer(mut self, scorer: Arc<dyn Scorer>) -> Self {
        self.scorer = Some(scorer);
        self
    }
}

/// Constructor for a registered reranking backend.
pub type RerankerCtor =
    Box<dyn Fn(&RerankerContext) -> Result<Box<dyn Reranker>, RerankError> + Send + Sync>;

/// Registration table mapping backend names to constructors.
///
/// Lookup is exact-match on the lowercased key. [`with_defaults`] registers
/// the built-in strategies under `"none"`, `"scored"`, and `"generative"`,
/// plus the legacy aliases `"cross_encoder"` and `"llm"` for configurations
/// written against older naming.
///
/// [`with_defaults`]: Self::with_defaults
#[derive(Default)]
pub struct RerankerRegistry {
    table: HashMap<String, RerankerCtor>,
}

impl RerankerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with the built-in backends registered.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        let defaults: [(&str, fn(&RerankerContext) -> Result<Box<dyn Reranker>, RerankError>); 5] = [
            ("none", make_passthrough),
            ("scored", make_scored),
            ("generative", make_generative),
            // Aliases kept for configurations written against the older names.
            ("cross_encoder", make_scored),
            ("llm", make_generative),
        ];
        for (name, ctor) in defaults {
            registry
                .register(name, ctor)
                .unwrap_or_else(|_| unreachable!("default names cannot collide"));
        }
        registry
    }

    /// Registers a backend under `name`.
    pub fn register<F>(&mut self, name: &str, ctor: F) -> Result<(), RerankError>
    where
        F: Fn(&RerankerContext) -> Result<Box<dyn Reranker>, RerankError> + Send + Sync + 'static,
    {
        let key = name.to_lowercase();
        if self.table.contains_key(&key) {
            return Err(RerankError::AlreadyRegistered(key));
        }
        self.table.insert(key, Box::new(ctor));
        Ok(())
    }

    /// Whether a backend is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.table.contains_key(&name.to_lowercase())
    }

    /// Registered backend names, sorted.
    pub fn backends(&self) -> Vec<String> {
        let mut names: Vec<_> = self.table.keys().cloned().collect();
        names.sort();
        names
    }

    /// Constructs the backend named by `ctx.settings.backend`.
    pub fn create(&self, ctx: &RerankerContext) -> Result<Box<dyn Reranker>, RerankError> {
        self.create_named(&ctx.settings.backend, ctx)
    }

    /// Constructs the backend registered under `name`, ignoring
    /// `ctx.settings.backend`.
    pub fn create_named(
        &self,
        name: &str,
        ctx: &RerankerContext,
    ) -> Result<Box<dyn Reranker>, RerankError> {
        let key = name.to_lowercase();
        let ctor = self
            .table
            .get(&key)
            .ok_or_else(|| RerankError::UnknownBackend {
                requested: name.to_string(),
                available: self.backends().join(", "),
            })?;
        ctor(ctx)
    }
}

fn make_passthrough(_ctx: &RerankerContext) -> Result<Box<dyn Reranker>, RerankError> {
    Ok(Box::new(PassthroughReranker::new()))
}

fn make_scored(ctx: &RerankerContext) -> Result<Box<dyn Reranker>, RerankError> {
    let mut builder = ScoredReranker::builder()
        .timeout(Duration::from_secs(ctx.settings.timeout_secs))
        .batch_size(ctx.settings.batch_size)
        .fallback_on_error(ctx.settings.fallback_on_error);

    if let Some(model) = &ctx.settings.model {
        builder = builder.model_name(model.clone());
    }
    if let Some(scorer) = &ctx.scorer {
        builder = builder.scorer(Arc::clone(scorer));
    }
    Ok(Box::new(builder.build()))
}

fn make_generative(ctx: &RerankerContext) -> Result<Box<dyn Reranker>, RerankError> {
    let chat = ctx
        .chat
        .as_ref()
        .ok_or(RerankError::MissingCollaborator {
            backend: "generative",
            missing: "a chat collaborator",
        })?;

    let mut builder = GenerativeReranker::builder()
        .chat(Arc::clone(chat))
        .prompt_path(ctx.settings.prompt_path.clone())
        .temperature(ctx.settings.temperature)
        .max_retries(ctx.settings.max_retries);

    if let Some(root) = &ctx.settings.template_root {
        builder = builder.template_root(root.clone());
    }
    Ok(Box::new(builder.build()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_include_builtins_and_aliases() {
        let registry = RerankerRegistry::with_defaults();
        for name in ["none", "scored", "generative", "cross_encoder", "llm"] {
            assert!(registry.contains(name), "missing backend {name}");
        }
    }

    #[test]
    fn unknown_backend_lists_available() {
        let registry = RerankerRegistry::with_defaults();
        let ctx = RerankerContext::new(RerankSettings {
            backend: "colbert".to_string(),
            ..Default::default()
        });
        let err = registry.create(&ctx).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("colbert"));
        assert!(message.contains("scored"));
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let registry = RerankerRegistry::with_defaults();
        let ctx = RerankerContext::new(RerankSettings {
            backend: "NONE".to_string(),
            ..Default::default()
        });
        let reranker = registry.create(&ctx).unwrap();
        assert_eq!(reranker.backend(), "none");
    }

    #[test]
    fn generative_without_chat_is_rejected() {
        let registry = RerankerRegistry::with_defaults();
        let ctx = RerankerContext::new(RerankSettings {
            backend: "generative".to_string(),
            ..Default::default()
        });
        assert!(matches!(
            registry.create(&ctx),
            Err(RerankError::MissingCollaborator { .. })
        ));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = RerankerRegistry::with_defaults();
        let err = registry.register("Scored", make_passthrough).unwrap_err();
        assert!(matches!(err, RerankError::AlreadyRegistered(_)));
    }

    #[test]
    fn scored_backend_builds_with_default_scorer() {
        let registry = RerankerRegistry::with_defaults();
        let ctx = RerankerContext::new(RerankSettings {
            backend: "scored".to_string(),
            ..Default::default()
        });
        let reranker = registry.create(&ctx).unwrap();
        assert_eq!(reranker.backend(), "scored");
    }
}
