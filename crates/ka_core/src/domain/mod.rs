use std::fmt;

use serde::{Deserialize, Serialize};

/// A contiguous unit of source text tagged with its originating category.
///
/// `source` is the file stem the chunk came from (`product_specs`, `company_faqs`, ...).
/// Chunks never span files and are never mutated after splitting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    pub source: String,
    pub content: String,
}

/// The retrieval unit: what gets embedded, indexed and returned as context.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Document {
    pub content: String,
    pub metadata: DocumentMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentMetadata {
    pub source: String,
}

impl Document {
    pub fn new(source: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: DocumentMetadata {
                source: source.into(),
            },
        }
    }

    pub fn source(&self) -> &str {
        &self.metadata.source
    }
}

impl From<Chunk> for Document {
    fn from(chunk: Chunk) -> Self {
        Document::new(chunk.source, chunk.content)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub text: String,
    pub created_at: String, // RFC3339
}

/// Which router branch produced an answer. Serialized with the labels callers display.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ToolUsed {
    #[serde(rename = "memory")]
    Memory,
    #[serde(rename = "calculator")]
    Calculator,
    #[serde(rename = "dictionary+llm")]
    DictionaryLlm,
    #[serde(rename = "llm-definition")]
    LlmDefinition,
    #[serde(rename = "retrieval")]
    Retrieval,
    #[serde(rename = "llm-only")]
    LlmOnly,
    #[serde(rename = "error")]
    Error,
}

impl ToolUsed {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolUsed::Memory => "memory",
            ToolUsed::Calculator => "calculator",
            ToolUsed::DictionaryLlm => "dictionary+llm",
            ToolUsed::LlmDefinition => "llm-definition",
            ToolUsed::Retrieval => "retrieval",
            ToolUsed::LlmOnly => "llm-only",
            ToolUsed::Error => "error",
        }
    }
}

impl fmt::Display for ToolUsed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Uniform result of one routed query. Built fresh per query and never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentResult {
    pub answer: String,
    pub tool_used: ToolUsed,
    pub context_snippets: Vec<String>,
}

impl AgentResult {
    pub fn new(
        answer: impl Into<String>,
        tool_used: ToolUsed,
        context_snippets: Vec<String>,
    ) -> Self {
        Self {
            answer: answer.into(),
            tool_used,
            context_snippets,
        }
    }
}
