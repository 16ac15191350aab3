use std::fs;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use ka_ai::assistant::{open_index, Assistant, Oracles};
use ka_ai::documents::{source_label, DocumentStore};
use ka_core::config::AppConfig;
use ka_core::domain::AgentResult;
use ka_core::error::AppError;
use tracing_subscriber::EnvFilter;

pub const DEFAULT_SESSION: &str = "default";

/// Knowledge Assistant: routed question answering over a local document corpus.
#[derive(Debug, Parser)]
#[command(name = "knowledge-assistant", version, about, long_about = None)]
pub struct Cli {
    /// TOML configuration file (environment variables override it)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Answer a single question
    Ask {
        query: String,
        /// Conversation session key
        #[arg(long, default_value = DEFAULT_SESSION)]
        session: String,
        /// Never route to document retrieval
        #[arg(long)]
        no_retrieval: bool,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Interactive session on stdin; `exit` or EOF ends it
    Chat {
        #[arg(long, default_value = DEFAULT_SESSION)]
        session: String,
        #[arg(long)]
        no_retrieval: bool,
    },
    /// Build the document index, reusing a matching persisted one
    Index {
        /// Re-embed the corpus even if a matching index exists
        #[arg(long)]
        rebuild: bool,
    },
    /// Inspect the raw corpus
    Docs {
        #[command(subcommand)]
        action: DocsCommands,
    },
    /// Answer a question against an uploaded plain-text file
    AskFile {
        file: PathBuf,
        query: String,
        #[arg(long, default_value = DEFAULT_SESSION)]
        session: String,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Subcommand)]
pub enum DocsCommands {
    /// List corpus files
    List,
    /// Print one corpus file
    Show { name: String },
}

#[derive(Debug, serde::Serialize)]
pub struct IndexBuildResponse {
    pub path: String,
    pub embed_model: String,
    pub documents: u32,
    pub dims: u32,
    pub fingerprint: String,
    pub built_at: String,
}

#[derive(Debug, serde::Serialize)]
pub struct DocsListItem {
    pub name: String,
    pub source: String,
}

/// Logs go to stderr so stdout carries only answers. `RUST_LOG` wins over `default_filter`.
pub fn init_logging(default_filter: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn run(cli: Cli, out: &mut dyn Write) -> Result<(), AppError> {
    let config = AppConfig::load(cli.config.as_deref())?;
    match cli.command {
        Commands::Ask {
            query,
            session,
            no_retrieval,
            json,
        } => {
            let assistant = Assistant::bootstrap(config)?;
            let result = assistant.answer(&query, &session, !no_retrieval);
            write_out(out, &render_answer(&result, json)?)
        }
        Commands::Chat { session, no_retrieval } => {
            let assistant = Assistant::bootstrap(config)?;
            let stdin = std::io::stdin();
            chat_loop(&assistant, &session, !no_retrieval, stdin.lock(), out)
        }
        Commands::Index { rebuild } => {
            let resp = index_build(&config, rebuild)?;
            write_out(out, &to_json(&resp)?)
        }
        Commands::Docs { action } => {
            let store = DocumentStore::open(
                config.documents.path.clone(),
                config.documents.structured_sources.clone(),
            );
            match action {
                DocsCommands::List => {
                    let items = docs_list(&store)?;
                    let text = items
                        .iter()
                        .map(|i| format!("{}\t{}", i.name, i.source))
                        .collect::<Vec<_>>()
                        .join("\n");
                    write_out(out, &text)
                }
                DocsCommands::Show { name } => write_out(out, &store.read_document(&name)?),
            }
        }
        Commands::AskFile {
            file,
            query,
            session,
            json,
        } => {
            let assistant = Assistant::bootstrap(config)?;
            let result = ask_file(&assistant, &file, &query, &session)?;
            write_out(out, &render_answer(&result, json)?)
        }
    }
}

pub fn index_build(config: &AppConfig, rebuild: bool) -> Result<IndexBuildResponse, AppError> {
    let oracles = Oracles::from_config(config)?;
    let store = DocumentStore::open(
        config.documents.path.clone(),
        config.documents.structured_sources.clone(),
    );
    let index = open_index(config, &store, oracles.embedder.as_ref(), rebuild)?;
    let m = index.manifest();
    Ok(IndexBuildResponse {
        path: config.index.path.display().to_string(),
        embed_model: m.embed_model.clone(),
        documents: m.document_count,
        dims: m.dims,
        fingerprint: m.fingerprint.clone(),
        built_at: m.built_at.clone(),
    })
}

pub fn docs_list(store: &DocumentStore) -> Result<Vec<DocsListItem>, AppError> {
    Ok(store
        .list_text_files()?
        .iter()
        .filter_map(|path| {
            let name = path.file_name()?.to_str()?.to_string();
            let source = source_label(path)?;
            Some(DocsListItem { name, source })
        })
        .collect())
}

pub fn ask_file(
    assistant: &Assistant,
    file: &Path,
    query: &str,
    session: &str,
) -> Result<AgentResult, AppError> {
    let text = fs::read_to_string(file).map_err(|e| {
        AppError::new("DOCS_READ_FAILED", "Failed to read uploaded file")
            .with_details(format!("path={}; err={}", file.display(), e))
    })?;
    let retriever = assistant.retriever_for_text(&text)?;
    Ok(assistant.answer_with(query, session, &retriever))
}

/// One answer per input line until `exit`, `quit` or EOF. Blank lines are skipped.
pub fn chat_loop<R: BufRead>(
    assistant: &Assistant,
    session: &str,
    use_retrieval: bool,
    input: R,
    out: &mut dyn Write,
) -> Result<(), AppError> {
    for line in input.lines() {
        let line = line.map_err(|e| {
            AppError::new("CLI_IO_FAILED", "Failed to read input").with_details(e.to_string())
        })?;
        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        if query.eq_ignore_ascii_case("exit") || query.eq_ignore_ascii_case("quit") {
            break;
        }
        let result = assistant.answer(query, session, use_retrieval);
        write_out(out, &render_answer(&result, false)?)?;
    }
    Ok(())
}

/// Human form: branch, context snippets, then the answer. JSON form mirrors `AgentResult`.
pub fn render_answer(result: &AgentResult, json: bool) -> Result<String, AppError> {
    if json {
        return to_json(result);
    }
    let mut text = format!("Tool used: {}\n", result.tool_used);
    if !result.context_snippets.is_empty() {
        text.push_str("Context:\n");
        for (n, snippet) in result.context_snippets.iter().enumerate() {
            text.push_str(&format!("  [{}] {}\n", n + 1, snippet.replace('\n', "\n      ")));
        }
    }
    text.push_str(&format!("Answer: {}", result.answer));
    Ok(text)
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, AppError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| {
            AppError::new("CLI_ENCODE_FAILED", "Failed to encode output")
                .with_details(e.to_string())
        })
}

fn write_out(out: &mut dyn Write, text: &str) -> Result<(), AppError> {
    writeln!(out, "{text}")
        .and_then(|_| out.flush())
        .map_err(|e| {
            AppError::new("CLI_IO_FAILED", "Failed to write output").with_details(e.to_string())
        })
}
