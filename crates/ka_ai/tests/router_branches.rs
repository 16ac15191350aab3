use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use ka_ai::assistant::{Assistant, Oracles};
use ka_ai::dictionary::DictionarySource;
use ka_ai::embeddings::Embedder;
use ka_ai::llm::Llm;
use ka_ai::router::prompts;
use ka_ai::router::DEGRADED_ANSWER;
use ka_core::config::AppConfig;
use ka_core::domain::{Role, ToolUsed};
use ka_core::error::AppError;
use pretty_assertions::assert_eq;

type Script = dyn Fn(&str, &str) -> Result<String, AppError> + Send + Sync;

/// Answers by matching the system prompt; records every system prompt it sees.
struct ScriptedLlm {
    script: Box<Script>,
    systems: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    fn new(
        script: impl Fn(&str, &str) -> Result<String, AppError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            script: Box::new(script),
            systems: Mutex::new(Vec::new()),
        }
    }

    fn count(&self, system: &str) -> usize {
        self.systems.lock().expect("lock").iter().filter(|s| s.as_str() == system).count()
    }

    fn total(&self) -> usize {
        self.systems.lock().expect("lock").len()
    }
}

impl Llm for ScriptedLlm {
    fn chat(&self, _model: &str, system: &str, user: &str) -> Result<String, AppError> {
        self.systems.lock().expect("lock").push(system.to_string());
        (self.script)(system, user)
    }
}

fn default_script(system: &str, user: &str) -> Result<String, AppError> {
    let reply = if system == prompts::MEMORY_CHECK {
        if user.contains("Latest question: What was my previous question") {
            "YES"
        } else {
            "NO"
        }
    } else if system == prompts::CALCULATION_CHECK {
        let arithmetic = user.chars().any(|c| c.is_ascii_digit())
            && user.contains(|c: char| matches!(c, '*' | '+' | '/'));
        if arithmetic {
            "yes"
        } else {
            "No."
        }
    } else if system == prompts::CALCULATION {
        "96\nReasoning: 12 multiplied by 8 is 96."
    } else if system == prompts::TERM_EXTRACTION {
        return Ok(user
            .split_whitespace()
            .last()
            .unwrap_or_default()
            .trim_matches('?')
            .to_string());
    } else if system.starts_with(prompts::DICTIONARY_ANSWER_HEADER) {
        "Photosynthesis is how green plants turn sunlight into food."
    } else if system.starts_with(prompts::KNOWLEDGE_DEFINITION_HEADER) {
        "A zyzzyva is a tropical weevil."
    } else if system.starts_with(prompts::RETRIEVAL_HEADER) {
        "The company sells Widget A and Widget B."
    } else if system.starts_with(prompts::MEMORY_ANSWER_HEADER) {
        "You asked what 12 * 8 is."
    } else if system.starts_with(prompts::FALLBACK_HEADER) {
        "Paris is the capital of France."
    } else {
        return Err(AppError::new("AI_LLM_FAILED", "unexpected prompt"));
    };
    Ok(reply.to_string())
}

const KEYWORDS: [&str; 5] = ["product", "sell", "refund", "policy", "hours"];

struct KeywordEmbedder;

impl Embedder for KeywordEmbedder {
    fn embed(&self, _model: &str, input: &str) -> Result<Vec<f32>, AppError> {
        let lower = input.to_lowercase();
        Ok(KEYWORDS.iter().map(|k| lower.matches(k).count() as f32).collect())
    }
}

const PHOTOSYNTHESIS: &str = "the process by which green plants use sunlight to synthesize foods";

struct MockDictionary {
    calls: AtomicUsize,
    entries: HashMap<String, String>,
}

impl DictionarySource for MockDictionary {
    fn lookup(&self, term: &str) -> Result<Option<String>, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.entries.get(term).cloned())
    }
}

struct Harness {
    _tmp: tempfile::TempDir,
    llm: Arc<ScriptedLlm>,
    dictionary: Arc<MockDictionary>,
    assistant: Assistant,
}

fn write_corpus(dir: &Path) {
    fs::create_dir_all(dir).expect("mkdir");
    fs::write(
        dir.join("product_specs.txt"),
        "Spring catalog\n\nProduct Name: Widget A\nThe company sells Widget A for home use.\n\n\
Product Name: Widget B\nWidget B is a product we sell to offices.\n",
    )
    .expect("write");
    fs::write(
        dir.join("company_faqs.txt"),
        "Our refund policy lasts 30 days.\n\nOffice hours are 9 to 5.\n",
    )
    .expect("write");
}

fn test_config(root: &Path) -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.llm.api_key = Some("test-key".to_string());
    cfg.llm.base_url = Some("http://127.0.0.1:9/v1".to_string());
    cfg.llm.max_attempts = 2;
    cfg.llm.retry_backoff_ms = 0;
    cfg.dictionary.app_id = Some("app-id".to_string());
    cfg.dictionary.app_key = Some("app-key".to_string());
    cfg.documents.path = root.join("docs");
    cfg.index.path = root.join("index");
    cfg.index.k = 2;
    cfg.index.fetch_k = 4;
    cfg
}

fn harness_with(llm: ScriptedLlm, with_corpus: bool) -> Harness {
    let tmp = tempfile::tempdir().expect("tempdir");
    if with_corpus {
        write_corpus(&tmp.path().join("docs"));
    }
    let llm = Arc::new(llm);
    let dictionary = Arc::new(MockDictionary {
        calls: AtomicUsize::new(0),
        entries: HashMap::from([("photosynthesis".to_string(), PHOTOSYNTHESIS.to_string())]),
    });
    let oracles = Oracles {
        llm: llm.clone(),
        embedder: Arc::new(KeywordEmbedder),
        dictionary: dictionary.clone(),
    };
    let assistant =
        Assistant::with_oracles(test_config(tmp.path()), oracles, false).expect("assistant");
    Harness {
        _tmp: tmp,
        llm,
        dictionary,
        assistant,
    }
}

fn harness() -> Harness {
    harness_with(ScriptedLlm::new(default_script), true)
}

#[test]
fn calculation_returns_numeric_result_and_reasoning() {
    let h = harness();
    let res = h.assistant.answer("What is 12 * 8?", "s1", true);

    assert_eq!(res.tool_used, ToolUsed::Calculator);
    assert!(res.answer.contains("96"));
    assert_eq!(res.answer, "96");
    assert_eq!(res.context_snippets, vec!["12 multiplied by 8 is 96.".to_string()]);
    // Fresh session: no memory classification call.
    assert_eq!(h.llm.count(prompts::MEMORY_CHECK), 0);

    let turns = h.assistant.memory().all("s1");
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0].role, Role::User);
    assert_eq!(turns[0].text, "What is 12 * 8?");
    assert_eq!(turns[1].role, Role::Assistant);
    assert_eq!(turns[1].text, "96\nReasoning: 12 multiplied by 8 is 96.");
}

#[test]
fn calculation_without_delimiter_returns_raw_text() {
    let llm = ScriptedLlm::new(|system, user| {
        if system == prompts::CALCULATION {
            Ok("The answer is 96".to_string())
        } else {
            default_script(system, user)
        }
    });
    let h = harness_with(llm, true);
    let res = h.assistant.answer("What is 12 * 8?", "s1", true);

    assert_eq!(res.tool_used, ToolUsed::Calculator);
    assert_eq!(res.answer, "The answer is 96");
    assert!(res.context_snippets.is_empty());
}

#[test]
fn memory_branch_takes_precedence_over_calculation() {
    let h = harness();
    h.assistant.answer("What is 12 * 8?", "s1", true);
    assert_eq!(h.llm.count(prompts::CALCULATION_CHECK), 1);

    // Would also classify as a calculation; memory must win.
    let res = h.assistant.answer("What was my previous question, and what is 12 * 8?", "s1", true);
    assert_eq!(res.tool_used, ToolUsed::Memory);
    assert_eq!(res.answer, "You asked what 12 * 8 is.");
    assert!(res.context_snippets.is_empty());
    assert_eq!(h.llm.count(prompts::MEMORY_CHECK), 1);
    assert_eq!(h.llm.count(prompts::CALCULATION_CHECK), 1, "calculation guard not consulted");
    assert_eq!(h.assistant.memory().all("s1").len(), 4);
}

#[test]
fn definition_with_dictionary_hit() {
    let h = harness();
    let res = h.assistant.answer("define photosynthesis", "s1", true);

    assert_eq!(res.tool_used, ToolUsed::DictionaryLlm);
    assert_eq!(res.context_snippets, vec![PHOTOSYNTHESIS.to_string()]);
    assert_eq!(res.answer, "Photosynthesis is how green plants turn sunlight into food.");
    assert_eq!(h.dictionary.calls.load(Ordering::SeqCst), 1);

    let audit = h.assistant.memory().audit("s1");
    let steps: Vec<(&str, &str)> = audit
        .iter()
        .map(|a| (a.step.as_str(), a.text.as_str()))
        .collect();
    assert_eq!(
        steps,
        vec![("term_extraction", "photosynthesis"), ("dictionary_lookup", PHOTOSYNTHESIS)]
    );
    assert_eq!(h.assistant.memory().all("s1").len(), 2);

    // Second ask hits the cache.
    h.assistant.answer("What is the definition of Photosynthesis?", "s2", true);
    assert_eq!(h.dictionary.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn definition_with_dictionary_miss_discloses_generation() {
    let h = harness();
    let res = h.assistant.answer("Define zyzzyva", "s1", true);

    assert_eq!(res.tool_used, ToolUsed::LlmDefinition);
    assert_eq!(res.context_snippets, vec![prompts::LLM_GENERATED_MARKER.to_string()]);
    assert!(res.answer.starts_with(&prompts::not_in_dictionary_disclosure("zyzzyva")));
    assert!(res.answer.ends_with("A zyzzyva is a tropical weevil."));
    assert_eq!(h.assistant.memory().audit("s1")[1].text, "not found");
}

#[test]
fn retrieval_answers_from_product_specs() {
    let h = harness();
    assert!(h.assistant.index_manifest().is_some());

    let res = h.assistant.answer("What products does the company sell?", "s1", true);
    assert_eq!(res.tool_used, ToolUsed::Retrieval);
    assert_eq!(res.context_snippets.len(), 2);
    assert!(res.context_snippets.iter().all(|s| s.starts_with("Product Name")));
    assert!(res.context_snippets[0].contains("Widget A"));
    assert_eq!(res.answer, "The company sells Widget A and Widget B.");
}

#[test]
fn retrieval_disabled_by_caller_falls_back() {
    let h = harness();
    let res = h.assistant.answer("What products does the company sell?", "s1", false);
    assert_eq!(res.tool_used, ToolUsed::LlmOnly);
    assert!(res.context_snippets.is_empty());
}

#[test]
fn missing_corpus_leaves_no_retriever_and_falls_back() {
    let h = harness_with(ScriptedLlm::new(default_script), false);
    assert!(h.assistant.retriever().is_none());

    let res = h.assistant.answer("What products does the company sell?", "s1", true);
    assert_eq!(res.tool_used, ToolUsed::LlmOnly);
    assert_eq!(res.answer, "Paris is the capital of France.");
}

#[test]
fn uploaded_text_retriever_is_used_for_ask_file() {
    let h = harness();
    let upload = "Our refund policy lasts 30 days and covers every product we sell.";
    let retriever = h.assistant.retriever_for_text(upload).expect("raw retriever");

    let res = h.assistant.answer_with("How long is the refund policy?", "s1", &retriever);
    assert_eq!(res.tool_used, ToolUsed::Retrieval);
    assert_eq!(res.context_snippets, vec![upload.to_string()]);
}

#[test]
fn unclear_classification_counts_as_no() {
    let llm = ScriptedLlm::new(|system, user| {
        if system == prompts::CALCULATION_CHECK {
            Ok("Yes, this looks like arithmetic".to_string())
        } else {
            default_script(system, user)
        }
    });
    let h = harness_with(llm, true);
    let res = h.assistant.answer("What is 12 * 8?", "s1", false);
    assert_eq!(res.tool_used, ToolUsed::LlmOnly);
    assert_eq!(h.llm.count(prompts::CALCULATION), 0);
}

#[test]
fn exhausted_model_calls_degrade_to_error_result() {
    let llm = ScriptedLlm::new(|_, _| Err(AppError::transient("AI_LLM_UNREACHABLE", "timeout")));
    let h = harness_with(llm, true);

    let res = h.assistant.answer("What is the capital of France?", "s1", true);
    assert_eq!(res.tool_used, ToolUsed::Error);
    assert_eq!(res.answer, DEGRADED_ANSWER);
    assert!(res.context_snippets.is_empty());
    // Calculation guard tried max_attempts times, nothing further.
    assert_eq!(h.llm.total(), 2);

    let turns = h.assistant.memory().all("s1");
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[1].text, DEGRADED_ANSWER);
}

#[test]
fn permanent_model_errors_are_not_retried() {
    let llm = ScriptedLlm::new(|_, _| Err(AppError::new("AI_LLM_FAILED", "bad request")));
    let h = harness_with(llm, true);
    let res = h.assistant.answer("What is the capital of France?", "s1", true);
    assert_eq!(res.tool_used, ToolUsed::Error);
    assert_eq!(h.llm.total(), 1);
}

#[test]
fn each_query_adds_exactly_one_user_and_one_assistant_turn() {
    let h = harness();
    let queries = [
        "What is 12 * 8?",
        "define photosynthesis",
        "What products does the company sell?",
        "What is the capital of France?",
    ];
    for (n, q) in queries.iter().enumerate() {
        h.assistant.answer(q, "s1", true);
        let turns = h.assistant.memory().all("s1");
        assert_eq!(turns.len(), 2 * (n + 1), "{q}");
        assert_eq!(turns[2 * n].role, Role::User);
        assert_eq!(turns[2 * n].text, *q);
        assert_eq!(turns[2 * n + 1].role, Role::Assistant);
    }
}

#[test]
fn blank_query_is_rejected_without_touching_history() {
    let h = harness();
    let res = h.assistant.answer("   ", "s1", true);
    assert_eq!(res.tool_used, ToolUsed::Error);
    assert_eq!(h.llm.total(), 0);
    assert!(h.assistant.memory().all("s1").is_empty());
}

#[test]
fn concurrent_sessions_stay_isolated() {
    let h = harness();
    thread::scope(|s| {
        for n in 0..6 {
            let assistant = &h.assistant;
            s.spawn(move || {
                let session = format!("session-{n}");
                assistant.answer("What is the capital of France?", &session, false);
            });
        }
    });
    for n in 0..6 {
        let turns = h.assistant.memory().all(&format!("session-{n}"));
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].text, "What is the capital of France?");
    }
}

#[test]
fn bootstrap_fails_fast_on_missing_credentials() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let mut cfg = test_config(tmp.path());
    cfg.dictionary.app_key = None;
    let err = Assistant::bootstrap(cfg).err().expect("config error");
    assert_eq!(err.code, "CONFIG_MISSING");

    let mut cfg = test_config(tmp.path());
    cfg.llm.base_url = Some("ftp://example.com".to_string());
    let err = Assistant::bootstrap(cfg).err().expect("config error");
    assert_eq!(err.code, "CONFIG_INVALID");
}

#[test]
fn bootstrap_reports_missing_base_url_before_building_clients() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let mut cfg = test_config(tmp.path());
    cfg.llm.base_url = None;
    let err = Assistant::bootstrap(cfg).err().expect("config error");
    assert_eq!(err.code, "CONFIG_MISSING");
    assert!(err.to_string().contains("llm.base_url"), "{err}");
}
