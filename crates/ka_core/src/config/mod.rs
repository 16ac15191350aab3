//! Application configuration.
//!
//! Loaded from an optional TOML file (every non-secret field has a default), then
//! overridden by environment variables, then validated once at startup. A
//! validation failure is a `CONFIG_*` error and must stop the process before any
//! query is served.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::memory::DEFAULT_HISTORY_WINDOW;

pub const DEFAULT_EMBED_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";
pub const DEFAULT_LLM_MODEL: &str = "meta-llama/Llama-3.3-70B-Instruct-Turbo-Free";
pub const DEFAULT_DICTIONARY_BASE_URL: &str = "https://od-api.oxforddictionaries.com/api/v2";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StructuredSourceRule {
    /// File stem the rule applies to.
    pub label: String,
    /// Token that begins every record; each chunk starts with it.
    pub marker: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DocumentsConfig {
    pub path: PathBuf,
    pub structured_sources: Vec<StructuredSourceRule>,
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        // Both spellings exist across corpus revisions.
        let rule = |label: &str| StructuredSourceRule {
            label: label.to_string(),
            marker: "Product Name".to_string(),
        };
        Self {
            path: PathBuf::from("docs"),
            structured_sources: vec![rule("product_specs"), rule("products_specs")],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct IndexConfig {
    pub path: PathBuf,
    pub k: usize,
    pub fetch_k: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/documents_index"),
            k: 3,
            fetch_k: 70,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EmbeddingsConfig {
    pub model: String,
    /// Falls back to `llm.base_url` when unset.
    pub base_url: Option<String>,
    /// Falls back to `llm.api_key` when unset.
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_EMBED_MODEL.to_string(),
            base_url: None,
            api_key: None,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LlmConfig {
    pub model: String,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_LLM_MODEL.to_string(),
            base_url: None,
            api_key: None,
            timeout_secs: 60,
            max_attempts: 3,
            retry_backoff_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DictionaryConfig {
    pub base_url: String,
    pub app_id: Option<String>,
    pub app_key: Option<String>,
    pub timeout_secs: u64,
    pub cache_capacity: usize,
}

impl Default for DictionaryConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_DICTIONARY_BASE_URL.to_string(),
            app_id: None,
            app_key: None,
            timeout_secs: 10,
            cache_capacity: 512,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MemoryConfig {
    pub history_window: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            history_window: DEFAULT_HISTORY_WINDOW,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct UploadConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 100,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    pub documents: DocumentsConfig,
    pub index: IndexConfig,
    pub embeddings: EmbeddingsConfig,
    pub llm: LlmConfig,
    pub dictionary: DictionaryConfig,
    pub memory: MemoryConfig,
    pub upload: UploadConfig,
}

impl AppConfig {
    /// Load from `path` (if given), apply process environment overrides, validate.
    pub fn load(path: Option<&Path>) -> Result<Self, AppError> {
        let mut cfg = match path {
            Some(p) => Self::from_toml_file(p)?,
            None => Self::default(),
        };
        cfg.apply_env_overrides(|key| std::env::var(key).ok());
        cfg.validate()?;
        tracing::info!(
            docs = %cfg.documents.path.display(),
            index = %cfg.index.path.display(),
            llm_model = %cfg.llm.model,
            embed_model = %cfg.embeddings.model,
            "configuration loaded"
        );
        Ok(cfg)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, AppError> {
        let raw = fs::read_to_string(path).map_err(|e| {
            AppError::new("CONFIG_READ_FAILED", "Failed to read configuration file")
                .with_details(format!("path={}; err={}", path.display(), e))
        })?;
        Self::from_toml_str(&raw).map_err(|e| e.with_details(format!("path={}", path.display())))
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, AppError> {
        toml::from_str(raw).map_err(|e| {
            AppError::new("CONFIG_INVALID", "Failed to parse configuration TOML")
                .with_details(e.to_string())
        })
    }

    /// Environment wins over file values. `lookup` is injectable so tests do not
    /// have to mutate the process environment.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = get("OPENAI_API_KEY") {
            self.llm.api_key = Some(v);
        }
        if let Some(v) = get("OPENAI_API_BASE") {
            self.llm.base_url = Some(v);
        }
        if let Some(v) = get("OXFORD_APP_ID") {
            self.dictionary.app_id = Some(v);
        }
        if let Some(v) = get("OXFORD_APP_KEY") {
            self.dictionary.app_key = Some(v);
        }
        if let Some(v) = get("KA_DOCS_PATH") {
            self.documents.path = PathBuf::from(v);
        }
        if let Some(v) = get("KA_INDEX_PATH") {
            self.index.path = PathBuf::from(v);
        }
        if let Some(v) = get("KA_LLM_MODEL") {
            self.llm.model = v;
        }
        if let Some(v) = get("KA_EMBED_MODEL") {
            self.embeddings.model = v;
        }
        if let Some(v) = get("KA_EMBED_API_BASE") {
            self.embeddings.base_url = Some(v);
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        require("llm.api_key (OPENAI_API_KEY)", self.llm.api_key.as_deref())?;
        require("llm.base_url (OPENAI_API_BASE)", self.llm.base_url.as_deref())?;
        require("llm.model", Some(self.llm.model.as_str()))?;
        require("embeddings.model", Some(self.embeddings.model.as_str()))?;
        require("dictionary.base_url", Some(self.dictionary.base_url.as_str()))?;
        require("dictionary.app_id (OXFORD_APP_ID)", self.dictionary.app_id.as_deref())?;
        require("dictionary.app_key (OXFORD_APP_KEY)", self.dictionary.app_key.as_deref())?;
        if self.documents.path.as_os_str().is_empty() {
            return Err(missing("documents.path"));
        }
        if self.index.path.as_os_str().is_empty() {
            return Err(missing("index.path"));
        }

        check_retrieval_bounds(self.index.k, self.index.fetch_k)?;
        if self.upload.chunk_size == 0 || self.upload.chunk_overlap >= self.upload.chunk_size {
            return Err(invalid(
                "upload.chunk_overlap must be smaller than a non-zero upload.chunk_size",
                format!(
                    "chunk_size={}; chunk_overlap={}",
                    self.upload.chunk_size, self.upload.chunk_overlap
                ),
            ));
        }
        if self.memory.history_window == 0 {
            return Err(invalid("memory.history_window must be at least 1", "history_window=0"));
        }
        if self.dictionary.cache_capacity == 0 {
            return Err(invalid("dictionary.cache_capacity must be at least 1", "cache_capacity=0"));
        }
        if self.llm.max_attempts == 0 {
            return Err(invalid("llm.max_attempts must be at least 1", "max_attempts=0"));
        }
        for rule in &self.documents.structured_sources {
            if rule.label.trim().is_empty() || rule.marker.is_empty() {
                return Err(invalid(
                    "documents.structured_sources entries need a label and a marker",
                    format!("label={:?}; marker={:?}", rule.label, rule.marker),
                ));
            }
        }
        Ok(())
    }

    pub fn embeddings_base_url(&self) -> Option<&str> {
        self.embeddings.base_url.as_deref().or(self.llm.base_url.as_deref())
    }

    pub fn embeddings_api_key(&self) -> Option<&str> {
        self.embeddings.api_key.as_deref().or(self.llm.api_key.as_deref())
    }
}

/// `k` must be at least 1 and never exceed the candidate pool.
pub fn check_retrieval_bounds(k: usize, fetch_k: usize) -> Result<(), AppError> {
    if k == 0 || k > fetch_k {
        return Err(invalid(
            "Retrieval requires 1 <= k <= fetch_k",
            format!("k={k}; fetch_k={fetch_k}"),
        ));
    }
    Ok(())
}

fn require(field: &str, value: Option<&str>) -> Result<(), AppError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(()),
        _ => Err(missing(field)),
    }
}

fn missing(field: &str) -> AppError {
    AppError::new("CONFIG_MISSING", "Required configuration value is missing")
        .with_details(format!("field={field}"))
}

fn invalid(message: &str, details: impl Into<String>) -> AppError {
    AppError::new("CONFIG_INVALID", message).with_details(details)
}
