use ka_core::error::AppError;

/// Text → vector oracle. Must be deterministic for a given model and input.
pub trait Embedder: Send + Sync {
    fn embed(&self, model: &str, input: &str) -> Result<Vec<f32>, AppError>;
}

pub mod openai_embed;
