use ka_core::error::AppError;
use serde::{Deserialize, Serialize};

use super::Llm;
use crate::client::{map_http_error, HttpEndpoint};

/// OpenAI-compatible `/chat/completions` client (OpenAI, Together, vLLM, ...).
#[derive(Debug, Clone)]
pub struct OpenAiChatLlm {
    endpoint: HttpEndpoint,
    api_key: String,
}

impl OpenAiChatLlm {
    pub fn new(endpoint: HttpEndpoint, api_key: impl Into<String>) -> Self {
        Self {
            endpoint,
            api_key: api_key.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Clone, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl Llm for OpenAiChatLlm {
    fn chat(&self, model: &str, system: &str, user: &str) -> Result<String, AppError> {
        let req = ChatRequest {
            model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: 0.0,
            stream: false,
        };
        let body = serde_json::to_value(req).map_err(|e| {
            AppError::new("AI_LLM_FAILED", "Failed to encode chat request")
                .with_details(e.to_string())
        })?;

        let resp = self
            .endpoint
            .agent()
            .post(&self.endpoint.url("/chat/completions"))
            .set("Authorization", &format!("Bearer {}", self.api_key))
            .send_json(body)
            .map_err(|e| map_http_error("AI_LLM_FAILED", "Chat completion request failed", e))?;

        let v: ChatResponse = resp.into_json().map_err(|e| {
            AppError::new("AI_LLM_FAILED", "Failed to decode chat response")
                .with_details(e.to_string())
        })?;
        let content = v
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        if content.trim().is_empty() {
            return Err(AppError::new("AI_LLM_FAILED", "Chat response was empty"));
        }
        Ok(content)
    }
}
