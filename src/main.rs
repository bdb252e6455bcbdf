//! askpdf CLI
//!
//! Commands:
//!   ask     - Answer one question about a document
//!   extract - Print the text extracted from a document
//!   chunks  - Show how a document would be chunked for a question
//!   config  - Show or initialize the config file
//!   repl    - Interactive mode (default)

use anyhow::{Context, Result};
use askpdf::repl::print_outcome;
use askpdf::{
    run_repl, AskOutcome, Asker, CandleEngine, CandleLoader, ChunkOutcome, CombinedAnswer, CompletionEngine,
    Config, ContextBudget, DevicePreference, Document, EngineOptions, ProgressTracker, Session,
    SkipReason, TokenizerEstimator,
};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "askpdf")]
#[command(about = "Ask questions about a local PDF with a local GGUF model")]
#[command(version)]
struct Cli {
    /// Total tokens per completion call (overrides config)
    #[arg(long, global = true)]
    context_window: Option<usize>,

    /// Tokens reserved beyond the question when sizing chunks (overrides config)
    #[arg(long, global = true)]
    safety_margin: Option<usize>,

    /// Compute device (overrides config)
    #[arg(long, global = true, value_enum)]
    device: Option<DevicePreference>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer one question about a document
    Ask {
        /// Document to ask about (PDF, txt, md)
        #[arg(long)]
        pdf: PathBuf,

        /// GGUF model weights
        #[arg(short, long)]
        model: PathBuf,

        /// tokenizer.json (default: next to the weights)
        #[arg(long)]
        tokenizer: Option<PathBuf>,

        /// Count question tokens with the model tokenizer instead of words
        #[arg(long)]
        real_tokens: bool,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,

        /// The question
        question: String,
    },

    /// Print the text extracted from a document
    Extract {
        path: PathBuf,

        /// Print word and character counts instead of the text
        #[arg(long)]
        stats: bool,
    },

    /// Show how a document would be chunked, without loading a model
    Chunks {
        path: PathBuf,

        /// Question the chunks are sized for
        #[arg(short, long, default_value = "")]
        question: String,
    },

    /// Show the effective config, or write the default config file
    Config {
        #[arg(long)]
        init: bool,

        /// Overwrite an existing config file with --init
        #[arg(long, requires = "init")]
        force: bool,
    },

    /// Interactive mode
    Repl {
        /// Document to import on start
        #[arg(long)]
        pdf: Option<PathBuf>,

        /// GGUF model to load on start
        #[arg(short, long)]
        model: Option<PathBuf>,

        #[arg(long)]
        tokenizer: Option<PathBuf>,

        #[arg(long)]
        real_tokens: bool,
    },
}

/// JSON shape of `askpdf ask --json`
#[derive(Serialize)]
struct AskReport<'a> {
    question: &'a str,
    document: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    skipped: Option<SkipReason>,
    chunk_size: Option<usize>,
    answer: Option<&'a str>,
    chunks_answered: usize,
    chunks_failed: usize,
    usage: askpdf::llm::Usage,
    chunks: Vec<ChunkReport>,
}

#[derive(Serialize)]
struct ChunkReport {
    index: usize,
    words: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl From<&ChunkOutcome> for ChunkReport {
    fn from(outcome: &ChunkOutcome) -> Self {
        Self {
            index: outcome.index,
            words: outcome.word_count,
            error: outcome.result.as_ref().err().map(|e| e.to_string()),
        }
    }
}

impl<'a> AskReport<'a> {
    fn new(question: &'a str, document: &Document, outcome: &'a AskOutcome) -> Self {
        let answer: Option<&CombinedAnswer> = outcome.answer();
        Self {
            question,
            document: document.name(),
            skipped: match outcome {
                AskOutcome::Skipped(reason) => Some(*reason),
                AskOutcome::Answered(_) => None,
            },
            chunk_size: answer.map(|a| a.chunk_size),
            answer: answer.filter(|a| !a.is_empty()).map(|a| a.text.as_str()),
            chunks_answered: answer.map_or(0, |a| a.answered()),
            chunks_failed: answer.map_or(0, |a| a.failed()),
            usage: answer.map(|a| a.usage()).unwrap_or_default(),
            chunks: answer.map_or_else(Vec::new, |a| a.outcomes.iter().map(ChunkReport::from).collect()),
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("askpdf=warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Config file merged with command-line overrides
fn effective_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load_or_default()?;
    if let Some(window) = cli.context_window {
        config.context_window = window;
    }
    if let Some(margin) = cli.safety_margin {
        config.safety_margin = margin;
    }
    if let Some(device) = cli.device {
        config.device = device;
    }
    config.validate()?;
    Ok(config)
}

fn open_document(path: &Path) -> Result<Document> {
    Document::open(path).with_context(|| format!("Could not import {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = effective_config(&cli)?;
    let budget = ContextBudget::from_config(&config);

    match cli.command {
        Some(Commands::Ask {
            pdf,
            model,
            tokenizer,
            real_tokens,
            json,
            question,
        }) => {
            let document = open_document(&pdf)?;
            if document.is_empty() {
                eprintln!("Warning: {} contains no extractable text", document.name());
            }

            eprintln!("Loading model {}...", model.display());
            let options = EngineOptions::from_config(&config).with_tokenizer(tokenizer);
            let engine = CandleEngine::load(&model, &options)
                .with_context(|| format!("Could not load model {}", model.display()))?;

            let mut asker = Asker::new(budget);
            if real_tokens {
                if let Some(tokenizer) = engine.tokenizer() {
                    asker = asker.with_estimator(Box::new(TokenizerEstimator::new(tokenizer.clone())));
                }
            }

            let mut progress = if json {
                ProgressTracker::quiet()
            } else {
                ProgressTracker::new()
            };
            let outcome = asker
                .ask(Some(&engine), Some(&document), &question, &mut progress)
                .await?;

            if json {
                let report = AskReport::new(&question, &document, &outcome);
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_outcome(&outcome);
            }
        }

        Some(Commands::Extract { path, stats }) => {
            let document = open_document(&path)?;
            if stats {
                println!("Document:   {}", document.name());
                println!("Words:      {}", document.word_count());
                println!("Characters: {}", document.text.chars().count());
            } else {
                println!("{}", document.text);
            }
        }

        Some(Commands::Chunks { path, question }) => {
            let document = open_document(&path)?;
            let asker = Asker::new(budget);
            let chunks = asker.plan(&document.text, &question)?;
            let size = asker.chunk_size(&question)?;

            println!(
                "{}: {} words -> {} chunks of up to {} words",
                document.name(),
                document.word_count(),
                chunks.len(),
                size
            );
            for chunk in &chunks {
                let preview: String = chunk.text.chars().take(60).collect();
                println!("  {:>4}. {:>5} words  {}...", chunk.index + 1, chunk.word_count, preview);
            }
        }

        Some(Commands::Config { init, force }) => {
            if init {
                let path = Config::init(force)?;
                println!("Wrote default config to {}", path.display());
            } else {
                println!("# {}", Config::path()?.display());
                print!("{}", toml::to_string_pretty(&config)?);
            }
        }

        Some(Commands::Repl {
            pdf,
            model,
            tokenizer,
            real_tokens,
        }) => {
            let session = start_session(&config, budget, pdf, model, tokenizer, real_tokens)?;
            run_repl(session).await?;
        }

        None => {
            let session = start_session(&config, budget, None, None, None, false)?;
            run_repl(session).await?;
        }
    }

    Ok(())
}

fn start_session(
    config: &Config,
    budget: ContextBudget,
    pdf: Option<PathBuf>,
    model: Option<PathBuf>,
    tokenizer: Option<PathBuf>,
    real_tokens: bool,
) -> Result<Session> {
    let options = EngineOptions::from_config(config).with_tokenizer(tokenizer);
    let mut session = Session::new(Box::new(CandleLoader::new(options)), budget).with_real_tokens(real_tokens);

    if let Some(path) = pdf {
        session
            .import_document(&path)
            .with_context(|| format!("Could not import {}", path.display()))?;
    }
    if let Some(path) = model {
        eprintln!("Loading model {}...", path.display());
        session
            .load_model(&path)
            .with_context(|| format!("Could not load model {}", path.display()))?;
    }

    Ok(session)
}
