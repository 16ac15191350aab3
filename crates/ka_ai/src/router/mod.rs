//! Query router: an ordered state machine over the answer strategies.
//!
//! States are evaluated in `ROUTE_ORDER`; the first state whose guard passes
//! handles the query and the walk stops. Guards are model classifications
//! (memory, calculation), a keyword match (definition), or configuration
//! (retrieval). `Fallback` always passes.
//!
//! History contract per query: the user's query is appended exactly once before
//! any guard runs, and exactly one assistant turn is appended when a result is
//! produced. Subsidiary outputs (extracted term, dictionary outcome) go to the
//! session's audit trail instead.

use std::sync::Arc;

use ka_core::domain::{AgentResult, Role, ToolUsed, Turn};
use ka_core::error::AppError;
use ka_core::memory::{format_turns, ConversationMemory, DEFAULT_HISTORY_WINDOW};

use crate::dictionary::DefinitionOracle;
use crate::llm::{Llm, RetryPolicy};
use crate::retrieve::Retriever;

pub mod parse;
pub mod prompts;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteState {
    MemoryCheck,
    CalculationCheck,
    DefinitionCheck,
    RetrievalCheck,
    Fallback,
}

/// Fixed priority order; the first matching state wins.
pub const ROUTE_ORDER: [RouteState; 5] = [
    RouteState::MemoryCheck,
    RouteState::CalculationCheck,
    RouteState::DefinitionCheck,
    RouteState::RetrievalCheck,
    RouteState::Fallback,
];

impl RouteState {
    pub fn name(&self) -> &'static str {
        match self {
            RouteState::MemoryCheck => "memory_check",
            RouteState::CalculationCheck => "calculation_check",
            RouteState::DefinitionCheck => "definition_check",
            RouteState::RetrievalCheck => "retrieval_check",
            RouteState::Fallback => "fallback",
        }
    }
}

pub const DEGRADED_ANSWER: &str =
    "Sorry, I couldn't reach the language model to answer that right now. Please try again in a moment.";

#[derive(Debug, Clone)]
pub struct RouterSettings {
    pub model: String,
    pub history_window: usize,
    pub retry: RetryPolicy,
}

impl RouterSettings {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            history_window: DEFAULT_HISTORY_WINDOW,
            retry: RetryPolicy::default(),
        }
    }
}

pub struct Router {
    llm: Arc<dyn Llm>,
    dictionary: Arc<DefinitionOracle>,
    memory: Arc<ConversationMemory>,
    settings: RouterSettings,
}

struct QueryContext<'a> {
    query: &'a str,
    session_id: &'a str,
    /// Recent turns from before this query was recorded.
    prior: Vec<Turn>,
    retriever: Option<&'a Retriever>,
    use_retrieval: bool,
}

/// A result plus the text recorded as the assistant turn (the calculator
/// records its raw output rather than the trimmed answer).
struct Outcome {
    result: AgentResult,
    record: String,
}

impl Outcome {
    fn new(result: AgentResult) -> Self {
        let record = result.answer.clone();
        Self { result, record }
    }
}

impl Router {
    pub fn new(
        llm: Arc<dyn Llm>,
        dictionary: Arc<DefinitionOracle>,
        memory: Arc<ConversationMemory>,
        settings: RouterSettings,
    ) -> Self {
        Self {
            llm,
            dictionary,
            memory,
            settings,
        }
    }

    pub fn memory(&self) -> &Arc<ConversationMemory> {
        &self.memory
    }

    pub fn settings(&self) -> &RouterSettings {
        &self.settings
    }

    /// Route one query. Never fails: model failures that survive retries come
    /// back as a `ToolUsed::Error` result.
    pub fn answer(
        &self,
        query: &str,
        session_id: &str,
        retriever: Option<&Retriever>,
        use_retrieval: bool,
    ) -> AgentResult {
        let span = tracing::info_span!("answer", session = %session_id);
        let _enter = span.enter();

        let query = query.trim();
        if query.is_empty() {
            return AgentResult::new("Please ask a question.", ToolUsed::Error, Vec::new());
        }

        let prior = self.memory.recent(session_id, self.settings.history_window);
        self.memory.append(session_id, Role::User, query);

        let ctx = QueryContext {
            query,
            session_id,
            prior,
            retriever,
            use_retrieval,
        };
        let outcome = match self.route(&ctx) {
            Ok(o) => o,
            Err(e) => {
                tracing::warn!(error = %e, "query degraded after model failure");
                Outcome::new(AgentResult::new(DEGRADED_ANSWER, ToolUsed::Error, Vec::new()))
            }
        };

        self.memory.append(session_id, Role::Assistant, &outcome.record);
        tracing::info!(
            tool_used = %outcome.result.tool_used,
            snippets = outcome.result.context_snippets.len(),
            "answered"
        );
        outcome.result
    }

    fn route(&self, ctx: &QueryContext<'_>) -> Result<Outcome, AppError> {
        for state in ROUTE_ORDER {
            let matched = self.guard(state, ctx)?;
            tracing::debug!(state = state.name(), matched, "route guard evaluated");
            if matched {
                return self.dispatch(state, ctx);
            }
        }
        self.dispatch(RouteState::Fallback, ctx)
    }

    fn guard(&self, state: RouteState, ctx: &QueryContext<'_>) -> Result<bool, AppError> {
        match state {
            // Nothing to recall in a fresh session.
            RouteState::MemoryCheck if ctx.prior.is_empty() => Ok(false),
            RouteState::MemoryCheck => self.classify(
                state,
                prompts::MEMORY_CHECK,
                &prompts::memory_check_user(&format_turns(&ctx.prior), ctx.query),
            ),
            RouteState::CalculationCheck => {
                self.classify(state, prompts::CALCULATION_CHECK, ctx.query)
            }
            RouteState::DefinitionCheck => Ok(parse::is_definition_query(ctx.query)),
            RouteState::RetrievalCheck => Ok(ctx.use_retrieval && ctx.retriever.is_some()),
            RouteState::Fallback => Ok(true),
        }
    }

    fn dispatch(&self, state: RouteState, ctx: &QueryContext<'_>) -> Result<Outcome, AppError> {
        match state {
            RouteState::MemoryCheck => self.answer_from_memory(ctx),
            RouteState::CalculationCheck => self.answer_calculation(ctx),
            RouteState::DefinitionCheck => self.answer_definition(ctx),
            RouteState::RetrievalCheck => self.answer_with_retrieval(ctx),
            RouteState::Fallback => self.answer_directly(ctx),
        }
    }

    fn call(&self, op: &str, system: &str, user: &str) -> Result<String, AppError> {
        self.settings
            .retry
            .run(op, || self.llm.chat(&self.settings.model, system, user))
    }

    fn classify(&self, state: RouteState, system: &str, user: &str) -> Result<bool, AppError> {
        let raw = self.call(state.name(), system, user)?;
        let yes = parse::parse_yes_no(&raw);
        if !yes && !raw.trim().eq_ignore_ascii_case("no") {
            tracing::debug!(
                state = state.name(),
                raw = %raw.trim(),
                "unclear classification treated as NO"
            );
        }
        Ok(yes)
    }

    fn answer_from_memory(&self, ctx: &QueryContext<'_>) -> Result<Outcome, AppError> {
        let system = prompts::memory_answer_system(&format_turns(&ctx.prior));
        let answer = self.call("memory_answer", &system, ctx.query)?;
        Ok(Outcome::new(AgentResult::new(answer.trim(), ToolUsed::Memory, Vec::new())))
    }

    fn answer_calculation(&self, ctx: &QueryContext<'_>) -> Result<Outcome, AppError> {
        let raw = self.call("calculation", prompts::CALCULATION, ctx.query)?;
        let parsed = parse::split_calculation(&raw);
        if parsed.reasoning.is_none() {
            tracing::warn!("calculator output missing reasoning delimiter; returning raw text");
        }
        Ok(Outcome {
            result: AgentResult::new(
                parsed.result,
                ToolUsed::Calculator,
                parsed.reasoning.into_iter().collect(),
            ),
            record: raw.trim().to_string(),
        })
    }

    fn answer_definition(&self, ctx: &QueryContext<'_>) -> Result<Outcome, AppError> {
        let extracted = self.call("term_extraction", prompts::TERM_EXTRACTION, ctx.query)?;
        let term = parse::clean_term(&extracted);
        self.memory.record_audit(ctx.session_id, "term_extraction", &term);

        let definition = if term.is_empty() {
            None
        } else {
            self.dictionary.define(&term)
        };
        self.memory.record_audit(
            ctx.session_id,
            "dictionary_lookup",
            definition.as_deref().unwrap_or("not found"),
        );

        match definition {
            Some(def) => {
                let system = prompts::dictionary_answer_system(&term, &def);
                let answer = self.call("dictionary_answer", &system, ctx.query)?;
                Ok(Outcome::new(AgentResult::new(
                    answer.trim(),
                    ToolUsed::DictionaryLlm,
                    vec![def],
                )))
            }
            None => {
                let shown = if term.is_empty() { ctx.query } else { term.as_str() };
                let system = prompts::knowledge_definition_system(shown);
                let generated = self.call("knowledge_definition", &system, ctx.query)?;
                let answer = format!(
                    "{} {}",
                    prompts::not_in_dictionary_disclosure(shown),
                    generated.trim()
                );
                Ok(Outcome::new(AgentResult::new(
                    answer,
                    ToolUsed::LlmDefinition,
                    vec![prompts::LLM_GENERATED_MARKER.to_string()],
                )))
            }
        }
    }

    fn answer_with_retrieval(&self, ctx: &QueryContext<'_>) -> Result<Outcome, AppError> {
        let Some(retriever) = ctx.retriever else {
            return self.answer_directly(ctx);
        };
        let hits = match retriever.retrieve(ctx.query) {
            Ok(h) if !h.is_empty() => h,
            Ok(_) => {
                tracing::debug!("retriever returned no documents; falling back");
                return self.answer_directly(ctx);
            }
            Err(e) => {
                tracing::warn!(error = %e, "retrieval failed; falling back");
                return self.answer_directly(ctx);
            }
        };

        let snippets: Vec<String> = hits.into_iter().map(|h| h.document.content).collect();
        let system = prompts::retrieval_system(&snippets.join("\n\n"));
        let answer = self.call("retrieval_answer", &system, ctx.query)?;
        Ok(Outcome::new(AgentResult::new(answer.trim(), ToolUsed::Retrieval, snippets)))
    }

    fn answer_directly(&self, ctx: &QueryContext<'_>) -> Result<Outcome, AppError> {
        let system = prompts::fallback_system(&format_turns(&ctx.prior));
        let answer = self.call("direct_answer", &system, ctx.query)?;
        Ok(Outcome::new(AgentResult::new(answer.trim(), ToolUsed::LlmOnly, Vec::new())))
    }
}
