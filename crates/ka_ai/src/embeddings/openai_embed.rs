use ka_core::error::AppError;
use serde::{Deserialize, Serialize};

use super::Embedder;
use crate::client::{map_http_error, HttpEndpoint};

const MAX_INPUT_BYTES: usize = 12_000;

/// OpenAI-compatible `/embeddings` client. Works against hosted APIs and local
/// servers (text-embeddings-inference, llama.cpp, Ollama's `/v1`).
#[derive(Debug, Clone)]
pub struct OpenAiEmbedder {
    endpoint: HttpEndpoint,
    api_key: Option<String>,
}

impl OpenAiEmbedder {
    pub fn new(endpoint: HttpEndpoint, api_key: Option<String>) -> Self {
        Self { endpoint, api_key }
    }
}

#[derive(Debug, Clone, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
struct EmbeddingsResponse {
    #[serde(default)]
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Clone, Deserialize)]
struct EmbeddingItem {
    embedding: Vec<f32>,
}

fn truncate_on_char_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

impl Embedder for OpenAiEmbedder {
    fn embed(&self, model: &str, input: &str) -> Result<Vec<f32>, AppError> {
        let req = EmbeddingsRequest {
            model,
            input: truncate_on_char_boundary(input, MAX_INPUT_BYTES),
        };
        let body = serde_json::to_value(req).map_err(|e| {
            AppError::new("AI_EMBEDDINGS_FAILED", "Failed to encode embeddings request")
                .with_details(e.to_string())
        })?;

        let mut call = self.endpoint.agent().post(&self.endpoint.url("/embeddings"));
        if let Some(key) = self.api_key.as_deref() {
            call = call.set("Authorization", &format!("Bearer {key}"));
        }
        let resp = call
            .send_json(body)
            .map_err(|e| map_http_error("AI_EMBEDDINGS_FAILED", "Embeddings request failed", e))?;

        let v: EmbeddingsResponse = resp.into_json().map_err(|e| {
            AppError::new("AI_EMBEDDINGS_FAILED", "Failed to decode embeddings response")
                .with_details(e.to_string())
        })?;
        match v.data.into_iter().next() {
            Some(item) if !item.embedding.is_empty() => Ok(item.embedding),
            _ => Err(AppError::new("AI_EMBEDDINGS_FAILED", "Embeddings response was empty")),
        }
    }
}
