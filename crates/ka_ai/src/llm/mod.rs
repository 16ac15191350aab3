use ka_core::error::AppError;

/// Chat-style completion oracle: a system/context prompt plus one user message.
pub trait Llm: Send + Sync {
    fn chat(&self, model: &str, system: &str, user: &str) -> Result<String, AppError>;
}

pub mod openai_chat;
pub mod retry;

pub use retry::RetryPolicy;
