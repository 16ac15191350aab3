//! Application-level assistant: owns memory, the router and the corpus retriever.

use std::sync::Arc;
use std::time::Duration;

use ka_core::config::AppConfig;
use ka_core::domain::AgentResult;
use ka_core::error::AppError;
use ka_core::memory::ConversationMemory;

use crate::client::HttpEndpoint;
use crate::dictionary::{DefinitionOracle, DictionarySource, OxfordDictionary};
use crate::documents::DocumentStore;
use crate::embeddings::openai_embed::OpenAiEmbedder;
use crate::embeddings::Embedder;
use crate::index::{build_or_load_index, IndexManifest, VectorIndex};
use crate::llm::openai_chat::OpenAiChatLlm;
use crate::llm::{Llm, RetryPolicy};
use crate::retrieve::{build_index_from_raw_text, get_retriever, Retriever};
use crate::router::{Router, RouterSettings};

/// The oracles an assistant talks to. Production wiring comes from
/// `Oracles::from_config`; tests hand in mocks.
#[derive(Clone)]
pub struct Oracles {
    pub llm: Arc<dyn Llm>,
    pub embedder: Arc<dyn Embedder>,
    pub dictionary: Arc<dyn DictionarySource>,
}

impl Oracles {
    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        let llm_base = config.llm.base_url.as_deref().unwrap_or_default();
        let llm_endpoint = endpoint("llm.base_url", llm_base, config.llm.timeout_secs)?;
        let llm = OpenAiChatLlm::new(llm_endpoint, config.llm.api_key.clone().unwrap_or_default());

        let embed_base = config.embeddings_base_url().unwrap_or_default();
        let embed_endpoint = endpoint(
            "embeddings.base_url",
            embed_base,
            config.embeddings.timeout_secs,
        )?;
        let embedder = OpenAiEmbedder::new(
            embed_endpoint,
            config.embeddings_api_key().map(str::to_string),
        );

        let dict_endpoint = endpoint(
            "dictionary.base_url",
            &config.dictionary.base_url,
            config.dictionary.timeout_secs,
        )?;
        let dictionary = OxfordDictionary::new(
            dict_endpoint,
            config.dictionary.app_id.clone().unwrap_or_default(),
            config.dictionary.app_key.clone().unwrap_or_default(),
        );

        Ok(Self {
            llm: Arc::new(llm),
            embedder: Arc::new(embedder),
            dictionary: Arc::new(dictionary),
        })
    }
}

fn endpoint(field: &str, base_url: &str, timeout_secs: u64) -> Result<HttpEndpoint, AppError> {
    HttpEndpoint::new(base_url, Duration::from_secs(timeout_secs)).map_err(|e| {
        AppError::new("CONFIG_INVALID", "Configured endpoint is not a valid base URL")
            .with_details(format!("field={field}; {}", e.details.unwrap_or(e.message)))
    })
}

pub struct Assistant {
    config: AppConfig,
    oracles: Oracles,
    documents: DocumentStore,
    router: Router,
    retriever: Option<Retriever>,
}

impl Assistant {
    /// Validate configuration, wire the HTTP oracles and load (or build) the index.
    pub fn bootstrap(config: AppConfig) -> Result<Self, AppError> {
        config.validate()?;
        let oracles = Oracles::from_config(&config)?;
        Self::assemble(config, oracles, false)
    }

    /// Only configuration errors fail here. An index that cannot be built
    /// leaves the assistant without a retriever, and retrieval-eligible queries
    /// fall through to a direct answer.
    pub fn with_oracles(
        config: AppConfig,
        oracles: Oracles,
        force_rebuild: bool,
    ) -> Result<Self, AppError> {
        config.validate()?;
        Self::assemble(config, oracles, force_rebuild)
    }

    /// Expects a validated `config`.
    fn assemble(
        config: AppConfig,
        oracles: Oracles,
        force_rebuild: bool,
    ) -> Result<Self, AppError> {
        let documents = DocumentStore::open(
            config.documents.path.clone(),
            config.documents.structured_sources.clone(),
        );

        let opened = open_index(&config, &documents, oracles.embedder.as_ref(), force_rebuild);
        let retriever = match opened {
            Ok(index) => Some(get_retriever(
                Arc::new(index),
                Arc::clone(&oracles.embedder),
                config.index.k,
                config.index.fetch_k,
            )?),
            Err(e) if e.is_config() => return Err(e),
            Err(e) => {
                tracing::warn!(error = %e, "document index unavailable; retrieval disabled");
                None
            }
        };

        let settings = RouterSettings {
            model: config.llm.model.clone(),
            history_window: config.memory.history_window,
            retry: retry_policy(&config),
        };
        let dictionary = Arc::new(DefinitionOracle::new(
            Arc::clone(&oracles.dictionary),
            config.dictionary.cache_capacity,
        ));
        let router = Router::new(
            Arc::clone(&oracles.llm),
            dictionary,
            Arc::new(ConversationMemory::new()),
            settings,
        );

        tracing::info!(
            retrieval = retriever.is_some(),
            documents = retriever.as_ref().map(|r| r.index().len()).unwrap_or(0),
            "assistant ready"
        );
        Ok(Self {
            config,
            oracles,
            documents,
            router,
            retriever,
        })
    }

    /// Caller-facing entry point over the configured corpus.
    pub fn answer(&self, query: &str, session_id: &str, use_retrieval: bool) -> AgentResult {
        self.router
            .answer(query, session_id, self.retriever.as_ref(), use_retrieval)
    }

    /// Answer against an ad hoc retriever (e.g. one built from an uploaded file).
    pub fn answer_with(&self, query: &str, session_id: &str, retriever: &Retriever) -> AgentResult {
        self.router.answer(query, session_id, Some(retriever), true)
    }

    /// Transient retriever over uploaded text, windowed per the upload settings.
    pub fn retriever_for_text(&self, text: &str) -> Result<Retriever, AppError> {
        build_index_from_raw_text(
            text,
            Arc::clone(&self.oracles.embedder),
            &self.config.embeddings.model,
            self.config.upload.chunk_size,
            self.config.upload.chunk_overlap,
            self.config.index.k,
            self.config.index.fetch_k,
        )
    }

    pub fn memory(&self) -> &ConversationMemory {
        self.router.memory()
    }

    pub fn documents(&self) -> &DocumentStore {
        &self.documents
    }

    pub fn retriever(&self) -> Option<&Retriever> {
        self.retriever.as_ref()
    }

    pub fn index_manifest(&self) -> Option<&IndexManifest> {
        self.retriever.as_ref().map(|r| r.index().manifest())
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}

/// Retry policy shared by model calls and corpus embedding.
pub fn retry_policy(config: &AppConfig) -> RetryPolicy {
    RetryPolicy::new(
        config.llm.max_attempts,
        Duration::from_millis(config.llm.retry_backoff_ms),
    )
}

/// Load the persisted index for `config`, rebuilding it from the corpus when it
/// is missing or stale. `force_rebuild` always rebuilds.
pub fn open_index(
    config: &AppConfig,
    documents: &DocumentStore,
    embedder: &dyn Embedder,
    force_rebuild: bool,
) -> Result<VectorIndex, AppError> {
    build_or_load_index(
        documents,
        &config.index.path,
        embedder,
        &config.embeddings.model,
        &retry_policy(config),
        force_rebuild,
    )
}
