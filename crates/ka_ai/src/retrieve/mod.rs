use std::sync::Arc;

use ka_core::config::check_retrieval_bounds;
use ka_core::domain::Document;
use ka_core::error::AppError;
use serde::{Deserialize, Serialize};

use crate::documents::split_windows;
use crate::embeddings::Embedder;
use crate::index::{build_index, VectorIndex};

/// Source label given to windows cut from uploaded text.
pub const UPLOADED_SOURCE: &str = "uploaded";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievedDocument {
    pub document: Document,
    pub score: f32,
}

/// Read-only top-k view over a shared index.
///
/// The query is embedded with the index's own model, the `fetch_k` nearest
/// candidates are collected, and the best `k` are kept.
#[derive(Clone)]
pub struct Retriever {
    index: Arc<VectorIndex>,
    embedder: Arc<dyn Embedder>,
    k: usize,
    fetch_k: usize,
}

impl std::fmt::Debug for Retriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retriever")
            .field("documents", &self.index.len())
            .field("model", &self.index.embed_model())
            .field("k", &self.k)
            .field("fetch_k", &self.fetch_k)
            .finish()
    }
}

pub fn get_retriever(
    index: Arc<VectorIndex>,
    embedder: Arc<dyn Embedder>,
    k: usize,
    fetch_k: usize,
) -> Result<Retriever, AppError> {
    check_retrieval_bounds(k, fetch_k)?;
    Ok(Retriever {
        index,
        embedder,
        k,
        fetch_k,
    })
}

impl Retriever {
    pub fn k(&self) -> usize {
        self.k
    }

    pub fn fetch_k(&self) -> usize {
        self.fetch_k
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn retrieve(&self, query: &str) -> Result<Vec<RetrievedDocument>, AppError> {
        let q = query.trim();
        if q.is_empty() {
            return Err(AppError::new("AI_RETRIEVAL_FAILED", "Query must not be empty"));
        }
        if self.index.is_empty() {
            return Ok(Vec::new());
        }

        let qv = self.embedder.embed(self.index.embed_model(), q)?;
        if qv.len() != self.index.dims() {
            return Err(AppError::new(
                "AI_RETRIEVAL_FAILED",
                "Query embedding dims do not match index dims",
            )
            .with_details(format!("index_dims={}; query_dims={}", self.index.dims(), qv.len())));
        }

        let mut candidates = self.index.nearest(&qv, self.fetch_k);
        candidates.truncate(self.k);

        let hits = candidates
            .into_iter()
            .filter_map(|(pos, score)| {
                self.index.document(pos).map(|doc| RetrievedDocument {
                    document: doc.clone(),
                    score,
                })
            })
            .collect::<Vec<_>>();
        tracing::debug!(
            hits = hits.len(),
            k = self.k,
            fetch_k = self.fetch_k,
            "retrieved documents"
        );
        Ok(hits)
    }
}

/// Transient retriever over ad hoc text (e.g. an uploaded file). Nothing is persisted.
pub fn build_index_from_raw_text(
    text: &str,
    embedder: Arc<dyn Embedder>,
    model: &str,
    chunk_size: usize,
    chunk_overlap: usize,
    k: usize,
    fetch_k: usize,
) -> Result<Retriever, AppError> {
    check_retrieval_bounds(k, fetch_k)?;
    let documents = split_windows(text, chunk_size, chunk_overlap)?
        .into_iter()
        .map(|w| Document::new(UPLOADED_SOURCE, w))
        .collect::<Vec<_>>();
    let index = build_index(documents, embedder.as_ref(), model)?;
    get_retriever(Arc::new(index), embedder, k, fetch_k)
}
