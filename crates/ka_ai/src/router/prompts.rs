//! Prompt contracts for every router call.
//!
//! Classification prompts are fixed system strings; generation prompts start
//! with a fixed header followed by their context, so each call can be
//! identified by its system prompt alone.

pub const MEMORY_CHECK: &str = "You are a routing classifier for a question-answering assistant. \
Decide whether the user's latest question can be answered solely from the prior conversation turns shown. \
Reply with exactly one word: YES or NO.";

pub const CALCULATION_CHECK: &str = "You are a routing classifier for a question-answering assistant. \
Decide whether answering the question requires performing a numeric calculation. \
Reply with exactly one word: YES or NO.";

/// Separates the numeric result from the explanation in calculator output.
pub const CALCULATION_DELIMITER: &str = "Reasoning:";

pub const CALCULATION: &str = "You are a precise calculator. Solve the user's problem. \
Respond in exactly this format and nothing else:\n\
<numeric result>\n\
Reasoning: <one or two sentences explaining the steps>";

pub const TERM_EXTRACTION: &str = "Extract the single word or phrase the user wants defined. \
Reply with the term only, without quotes, punctuation or explanation.";

pub const DICTIONARY_ANSWER_HEADER: &str = "You explain the meaning of words using a dictionary entry.";

pub const KNOWLEDGE_DEFINITION_HEADER: &str = "You explain the meaning of words from general knowledge.";

pub const RETRIEVAL_HEADER: &str = "Use the given context to answer the question. \
If you don't know the answer, say 'I don't know'. \
Use three sentences maximum. Be concise.";

pub const MEMORY_ANSWER_HEADER: &str = "Answer the user's question using only the prior conversation below as context. \
Do not add facts that are not in the conversation.";

pub const FALLBACK_HEADER: &str = "You are a helpful knowledge assistant. Answer the user's question directly and concisely. \
The prior conversation is provided for context.";

/// Prefixed to answers when the dictionary had no entry for the term.
pub fn not_in_dictionary_disclosure(term: &str) -> String {
    format!("The term \"{term}\" is not present in the dictionary, so this definition was generated by the language model.")
}

/// Snippet recorded in place of dictionary text for generated definitions.
pub const LLM_GENERATED_MARKER: &str = "[LLM-generated definition: no dictionary entry found]";

pub fn memory_check_user(history: &str, query: &str) -> String {
    format!("Prior conversation:\n{history}\n\nLatest question: {query}")
}

pub fn dictionary_answer_system(term: &str, definition: &str) -> String {
    format!(
        "{DICTIONARY_ANSWER_HEADER}\n\nTerm: {term}\nDictionary definition: {definition}\n\n\
Answer the user's question in context, grounded in the dictionary definition."
    )
}

pub fn knowledge_definition_system(term: &str) -> String {
    format!(
        "{KNOWLEDGE_DEFINITION_HEADER}\n\nThe dictionary has no entry for \"{term}\". \
Give its definition (or definitions, if it has several common senses) and answer the user's question in context."
    )
}

pub fn retrieval_system(context: &str) -> String {
    format!("{RETRIEVAL_HEADER}\n\nContext:\n{context}")
}

pub fn memory_answer_system(history: &str) -> String {
    format!("{MEMORY_ANSWER_HEADER}\n\nConversation:\n{history}")
}

pub fn fallback_system(history: &str) -> String {
    format!("{FALLBACK_HEADER}\n\nConversation:\n{history}")
}
