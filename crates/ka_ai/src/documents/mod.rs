//! Document store: enumerates the `.txt` corpus and splits each file into chunks.

use std::fs;
use std::path::{Path, PathBuf};

use ka_core::config::StructuredSourceRule;
use ka_core::domain::{Chunk, Document};
use ka_core::error::AppError;

pub mod chunking;

pub use chunking::{chunk_source_text, split_paragraphs, split_records, split_windows};

#[derive(Debug, Clone)]
pub struct DocumentStore {
    root: PathBuf,
    rules: Vec<StructuredSourceRule>,
}

impl DocumentStore {
    pub fn open(root: PathBuf, rules: Vec<StructuredSourceRule>) -> Self {
        Self { root, rules }
    }

    pub fn root(&self) -> &Path {
        self.root.as_path()
    }

    /// `.txt` files directly under the root, sorted by file name.
    pub fn list_text_files(&self) -> Result<Vec<PathBuf>, AppError> {
        let entries = fs::read_dir(&self.root).map_err(|e| {
            AppError::new("DOCS_READ_FAILED", "Failed to list document directory")
                .with_details(format!("path={}; err={}", self.root.display(), e))
        })?;
        let mut files = Vec::new();
        for ent in entries {
            let path = ent
                .map_err(|e| {
                    AppError::new("DOCS_READ_FAILED", "Failed to read document directory entry")
                        .with_details(format!("path={}; err={}", self.root.display(), e))
                })?
                .path();
            if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("txt") {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Raw text of one corpus file, addressed by its file name (`company_faqs.txt`).
    pub fn read_document(&self, file_name: &str) -> Result<String, AppError> {
        if file_name.contains('/') || file_name.contains('\\') || file_name.starts_with('.') {
            return Err(AppError::new("DOCS_NOT_FOUND", "Document name must be a plain file name")
                .with_details(format!("name={file_name}")));
        }
        let path = self.root.join(file_name);
        fs::read_to_string(&path).map_err(|e| {
            AppError::new("DOCS_NOT_FOUND", "Document could not be read")
                .with_details(format!("path={}; err={}", path.display(), e))
        })
    }

    pub fn load_and_chunk(&self) -> Result<Vec<Chunk>, AppError> {
        let mut chunks = Vec::new();
        for path in self.list_text_files()? {
            let Some(source) = source_label(&path) else {
                continue;
            };
            let text = fs::read_to_string(&path).map_err(|e| {
                AppError::new("DOCS_READ_FAILED", "Failed to read document")
                    .with_details(format!("path={}; err={}", path.display(), e))
            })?;
            let file_chunks = chunk_source_text(&source, &text, &self.rules);
            tracing::debug!(source = %source, chunks = file_chunks.len(), "chunked document");
            chunks.extend(file_chunks);
        }
        tracing::info!(
            root = %self.root.display(),
            chunks = chunks.len(),
            "loaded document corpus"
        );
        Ok(chunks)
    }

    pub fn load_documents(&self) -> Result<Vec<Document>, AppError> {
        Ok(self.load_and_chunk()?.into_iter().map(Document::from).collect())
    }
}

/// `load_and_chunk(source_directory)` as a free function over a directory.
pub fn load_and_chunk(dir: &Path, rules: &[StructuredSourceRule]) -> Result<Vec<Chunk>, AppError> {
    DocumentStore::open(dir.to_path_buf(), rules.to_vec()).load_and_chunk()
}

/// File stem with directory and extension stripped.
pub fn source_label(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(|s| s.to_string())
        .filter(|s| !s.is_empty())
}
