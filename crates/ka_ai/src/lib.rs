pub mod assistant;
pub mod client;
pub mod dictionary;
pub mod documents;
pub mod embeddings;
pub mod index;
pub mod llm;
pub mod retrieve;
pub mod router;
