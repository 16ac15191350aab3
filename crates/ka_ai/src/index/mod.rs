//! Exact nearest-neighbour index over embedded documents, persisted as JSON.
//!
//! On-disk layout (one directory):
//! - `index_manifest.json`: format version, embedding model id, dims, count, fingerprint
//! - `index_documents.json`: documents in index order
//! - `index_vectors.json`: one vector per document, same order
//!
//! The manifest is written last, so a directory without one is never treated as
//! a usable index. Loading checks the embedding model id so vectors from two
//! different models are never compared.

use std::fs;
use std::path::Path;

use ka_core::domain::Document;
use ka_core::error::AppError;
use ka_core::normalize::now_rfc3339_utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::documents::DocumentStore;
use crate::embeddings::Embedder;
use crate::llm::RetryPolicy;

pub mod similarity;

pub const INDEX_FORMAT_VERSION: u32 = 1;

const MANIFEST_FILE: &str = "index_manifest.json";
const DOCUMENTS_FILE: &str = "index_documents.json";
const VECTORS_FILE: &str = "index_vectors.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexManifest {
    pub format_version: u32,
    pub embed_model: String,
    pub dims: u32,
    pub document_count: u32,
    /// SHA-256 over every document's source and content, in index order.
    pub fingerprint: String,
    pub built_at: String, // RFC3339
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    manifest: IndexManifest,
    documents: Vec<Document>,
    vectors: Vec<Vec<f32>>,
    norms: Vec<f32>,
}

impl VectorIndex {
    fn from_parts(
        manifest: IndexManifest,
        documents: Vec<Document>,
        vectors: Vec<Vec<f32>>,
    ) -> Self {
        let norms = vectors.iter().map(|v| similarity::l2_norm(v)).collect();
        Self {
            manifest,
            documents,
            vectors,
            norms,
        }
    }

    pub fn manifest(&self) -> &IndexManifest {
        &self.manifest
    }

    pub fn embed_model(&self) -> &str {
        &self.manifest.embed_model
    }

    pub fn dims(&self) -> usize {
        self.manifest.dims as usize
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn document(&self, pos: usize) -> Option<&Document> {
        self.documents.get(pos)
    }

    /// Up to `limit` `(position, score)` pairs by descending cosine similarity.
    /// Equal scores keep index order. Zero-norm vectors are never returned.
    pub fn nearest(&self, query: &[f32], limit: usize) -> Vec<(usize, f32)> {
        let qnorm = similarity::l2_norm(query);
        if qnorm == 0.0 || limit == 0 {
            return Vec::new();
        }
        let mut hits: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .zip(self.norms.iter())
            .enumerate()
            .filter(|(_, (_, norm))| **norm > 0.0)
            .map(|(pos, (v, norm))| (pos, similarity::cosine_similarity(query, v, qnorm, *norm)))
            .collect();
        // Stable sort: ties stay in index order. NaN scores rank last.
        hits.sort_by(|a, b| rank_key(b.1).total_cmp(&rank_key(a.1)));
        hits.truncate(limit);
        hits
    }
}

fn rank_key(score: f32) -> f32 {
    if score.is_nan() {
        f32::NEG_INFINITY
    } else {
        score
    }
}

/// Embed every document with `model` and build an in-memory index, using the
/// default retry policy for transient embedding failures.
pub fn build_index(
    documents: Vec<Document>,
    embedder: &dyn Embedder,
    model: &str,
) -> Result<VectorIndex, AppError> {
    build_index_with_retry(documents, embedder, model, &RetryPolicy::default())
}

/// Like `build_index`, retrying each document's embedding call under `retry`.
pub fn build_index_with_retry(
    documents: Vec<Document>,
    embedder: &dyn Embedder,
    model: &str,
    retry: &RetryPolicy,
) -> Result<VectorIndex, AppError> {
    if documents.is_empty() {
        return Err(AppError::new(
            "AI_INDEX_NOT_READY",
            "No documents available; nothing to index",
        ));
    }

    let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(documents.len());
    let mut dims: Option<usize> = None;
    for (pos, doc) in documents.iter().enumerate() {
        let v = retry.run("embed_document", || embedder.embed(model, &doc.content)).map_err(|e| {
            AppError::new("AI_EMBEDDINGS_FAILED", "Failed to compute embeddings")
                .with_details(format!("position={pos}; source={}; err={e}", doc.source()))
                .with_retryable(e.retryable)
        })?;
        match dims {
            Some(d) if d != v.len() => {
                return Err(AppError::new(
                    "AI_INDEX_BUILD_FAILED",
                    "Embedding dimension mismatch across documents",
                )
                .with_details(format!("expected={d}; got={}; position={pos}", v.len())));
            }
            Some(_) => {}
            None => dims = Some(v.len()),
        }
        vectors.push(v);
    }

    let manifest = IndexManifest {
        format_version: INDEX_FORMAT_VERSION,
        embed_model: model.to_string(),
        dims: dims.unwrap_or(0) as u32,
        document_count: documents.len() as u32,
        fingerprint: fingerprint(&documents),
        built_at: now_rfc3339_utc(),
    };
    tracing::info!(
        documents = manifest.document_count,
        dims = manifest.dims,
        model,
        "built vector index"
    );
    Ok(VectorIndex::from_parts(manifest, documents, vectors))
}

pub fn save_index(index: &VectorIndex, dir: &Path) -> Result<(), AppError> {
    fs::create_dir_all(dir).map_err(|e| {
        AppError::new("AI_INDEX_BUILD_FAILED", "Failed to create index directory")
            .with_details(format!("path={}; err={}", dir.display(), e))
    })?;
    // A stale manifest must not vouch for half-written data files.
    let manifest_path = dir.join(MANIFEST_FILE);
    if manifest_path.exists() {
        fs::remove_file(&manifest_path).map_err(|e| {
            AppError::new("AI_INDEX_BUILD_FAILED", "Failed to remove previous index manifest")
                .with_details(format!("path={}; err={}", manifest_path.display(), e))
        })?;
    }
    write_json_atomic(&dir.join(DOCUMENTS_FILE), &index.documents)?;
    write_json_atomic(&dir.join(VECTORS_FILE), &index.vectors)?;
    write_json_atomic(&manifest_path, &index.manifest)?;
    tracing::info!(path = %dir.display(), documents = index.len(), "saved vector index");
    Ok(())
}

/// Manifest of a persisted index, or `None` when the directory holds no index.
pub fn read_manifest(dir: &Path) -> Result<Option<IndexManifest>, AppError> {
    let path = dir.join(MANIFEST_FILE);
    if !path.exists() {
        return Ok(None);
    }
    read_json(&path).map(Some)
}

/// Load a persisted index, refusing one built with a different embedding model.
pub fn load_index(dir: &Path, expected_model: &str) -> Result<VectorIndex, AppError> {
    let manifest = read_manifest(dir)?.ok_or_else(|| {
        AppError::new("AI_INDEX_NOT_READY", "No persisted index found")
            .with_details(format!("path={}", dir.display()))
    })?;
    if manifest.format_version != INDEX_FORMAT_VERSION {
        return Err(AppError::new("AI_INDEX_CORRUPT", "Unsupported index format version")
            .with_details(format!(
                "found={}; expected={INDEX_FORMAT_VERSION}",
                manifest.format_version
            )));
    }
    if manifest.embed_model != expected_model {
        return Err(AppError::new(
            "AI_INDEX_MODEL_MISMATCH",
            "Persisted index was built with a different embedding model",
        )
        .with_details(format!(
            "index_model={}; configured_model={expected_model}",
            manifest.embed_model
        )));
    }

    let documents: Vec<Document> = read_json(&dir.join(DOCUMENTS_FILE))?;
    let vectors: Vec<Vec<f32>> = read_json(&dir.join(VECTORS_FILE))?;
    let expected = manifest.document_count as usize;
    if documents.len() != expected || vectors.len() != expected {
        return Err(AppError::new("AI_INDEX_CORRUPT", "Index files disagree on document count")
            .with_details(format!(
                "manifest={expected}; documents={}; vectors={}",
                documents.len(),
                vectors.len()
            )));
    }
    if let Some((pos, v)) = vectors
        .iter()
        .enumerate()
        .find(|(_, v)| v.len() != manifest.dims as usize)
    {
        return Err(AppError::new("AI_INDEX_CORRUPT", "Index vector dims mismatch")
            .with_details(format!("position={pos}; expected={}; got={}", manifest.dims, v.len())));
    }
    if fingerprint(&documents) != manifest.fingerprint {
        return Err(AppError::new(
            "AI_INDEX_CORRUPT",
            "Index documents do not match the manifest fingerprint",
        ));
    }

    tracing::info!(path = %dir.display(), documents = expected, "loaded vector index");
    Ok(VectorIndex::from_parts(manifest, documents, vectors))
}

/// Reuse the persisted index when it matches the configured model, otherwise
/// chunk the corpus, embed it and persist the result.
pub fn build_or_load_index(
    store: &DocumentStore,
    index_dir: &Path,
    embedder: &dyn Embedder,
    model: &str,
    retry: &RetryPolicy,
    force_rebuild: bool,
) -> Result<VectorIndex, AppError> {
    if !force_rebuild && read_manifest(index_dir)?.is_some() {
        match load_index(index_dir, model) {
            Ok(index) => return Ok(index),
            Err(e) => tracing::warn!(error = %e, "persisted index unusable; rebuilding"),
        }
    }
    let index = build_index_with_retry(store.load_documents()?, embedder, model, retry)?;
    save_index(&index, index_dir)?;
    Ok(index)
}

fn fingerprint(documents: &[Document]) -> String {
    let mut hasher = Sha256::new();
    for doc in documents {
        hasher.update(doc.source().as_bytes());
        hasher.update([0u8]);
        hasher.update(doc.content.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}

fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), AppError> {
    let tmp = path.with_extension("tmp");
    let json = serde_json::to_vec(value).map_err(|e| {
        AppError::new("AI_INDEX_BUILD_FAILED", "Failed to encode index file")
            .with_details(format!("path={}; err={}", path.display(), e))
    })?;
    fs::write(&tmp, json).map_err(|e| {
        AppError::new("AI_INDEX_BUILD_FAILED", "Failed to write index file")
            .with_details(format!("path={}; err={}", tmp.display(), e))
    })?;
    fs::rename(&tmp, path).map_err(|e| {
        AppError::new("AI_INDEX_BUILD_FAILED", "Failed to finalize index file write")
            .with_details(format!("tmp={}; dest={}; err={}", tmp.display(), path.display(), e))
    })
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, AppError> {
    let bytes = fs::read(path).map_err(|e| {
        AppError::new("AI_INDEX_CORRUPT", "Failed to read index file")
            .with_details(format!("path={}; err={}", path.display(), e))
    })?;
    serde_json::from_slice(&bytes).map_err(|e| {
        AppError::new("AI_INDEX_CORRUPT", "Failed to decode index file")
            .with_details(format!("path={}; err={}", path.display(), e))
    })
}
