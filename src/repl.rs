//! Interactive REPL mode for askpdf
//!
//! Run `askpdf` with no arguments to enter interactive mode. Load a
//! document and a model with slash commands, then type questions.

use anyhow::Result;
use colored::*;
use crossterm::{
    cursor::MoveTo,
    execute,
    terminal::{Clear, ClearType},
};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use crate::pipeline::{AskOutcome, CombinedAnswer, ProgressTracker};
use crate::session::Session;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Command definition with name and description
struct Command {
    name: &'static str,
    description: &'static str,
}

const COMMANDS: &[Command] = &[
    Command { name: "/pdf", description: "Import a document (PDF, txt, md)" },
    Command { name: "/model", description: "Load a GGUF model file" },
    Command { name: "/status", description: "Show what is loaded" },
    Command { name: "/clear", description: "Clear screen" },
    Command { name: "/help", description: "Show this help" },
    Command { name: "/exit", description: "Exit" },
];

/// Print the welcome banner
fn print_banner(session: &Session) {
    println!();
    println!("  {} v{}", "askpdf".green().bold(), VERSION);
    println!("  {}", "Ask questions about a PDF with a local model".dimmed());
    println!();
    print_status(session);
    println!();
    println!("  {}", "Try:".dimmed());
    println!("    {} {}  {}", ">".green(), "/pdf ~/papers/attention.pdf".white(), "(Import a document)".dimmed());
    println!("    {} {}  {}", ">".green(), "what problem does this paper solve?".white(), "(Ask)".dimmed());
    println!();
}

fn print_status(session: &Session) {
    let status = session.status();

    let model = match status.model {
        Some(meta) => format!("{} (context {})", meta.id, meta.context_length).green().to_string(),
        None => "none".yellow().to_string(),
    };
    let document = match status.document {
        Some(name) => format!("{} ({} words)", name, status.document_words).green().to_string(),
        None => "none".yellow().to_string(),
    };

    println!("  Model:     {}", model);
    println!("  Document:  {}", document);
    println!(
        "  Budget:    {} tokens, margin {}",
        status.budget.context_window.to_string().cyan(),
        status.budget.safety_margin.to_string().cyan()
    );
}

/// Expand a leading `~/` to the home directory
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Print a combined answer, or say plainly that there is none
pub fn print_answer(answer: &CombinedAnswer) {
    if answer.is_empty() {
        println!("{}", "No answer produced.".yellow());
    } else {
        println!("{}", answer.text);
    }

    if answer.failed() > 0 {
        println!(
            "{}",
            format!(
                "({} of {} chunks skipped after errors)",
                answer.failed(),
                answer.outcomes.len()
            )
            .dimmed()
        );
    }
}

/// Print the outcome of an ask
pub fn print_outcome(outcome: &AskOutcome) {
    match outcome {
        AskOutcome::Answered(answer) => print_answer(answer),
        AskOutcome::Skipped(reason) => println!("{}", reason.message().yellow()),
    }
}

/// Run the interactive REPL
pub async fn run_repl(mut session: Session) -> Result<()> {
    print_banner(&session);

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("{} ", ">".green().bold());
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            // EOF
            println!();
            break;
        }
        let input = line.trim();

        if input.is_empty() {
            continue;
        }

        if input.starts_with('/') {
            let should_exit = handle_command(input, &mut session, &mut stdout)?;
            if should_exit {
                println!("{}", "Goodbye!".cyan());
                break;
            }
        } else {
            do_ask(input, &session).await;
        }

        println!(); // Empty line after output
    }

    Ok(())
}

/// Handle slash commands. Returns true if should exit.
fn handle_command(input: &str, session: &mut Session, stdout: &mut io::Stdout) -> Result<bool> {
    let parts: Vec<&str> = input.splitn(2, ' ').collect();
    let cmd = parts[0].to_lowercase();
    let args = parts.get(1).map(|s| s.trim()).unwrap_or("");

    match cmd.as_str() {
        "/exit" | "/quit" | "/q" => {
            return Ok(true);
        }
        "/help" | "/h" | "/?" => {
            println!("{}", "Commands:".green().bold());
            println!();
            println!("  {}    {}", "<question>".dimmed(), "Ask about the loaded document (default)".white());
            println!();
            for cmd in COMMANDS {
                println!("  {}  {}", format!("{:<12}", cmd.name).dimmed(), cmd.description.white());
            }
        }
        "/clear" => {
            execute!(stdout, Clear(ClearType::All), MoveTo(0, 0))?;
        }
        "/status" | "/s" => {
            print_status(session);
        }
        "/pdf" | "/open" | "/p" => {
            if args.is_empty() {
                println!("{}", "Usage: /pdf <path>".yellow());
            } else {
                match session.import_document(&expand_path(args)) {
                    Ok(doc) if doc.is_empty() => {
                        println!(
                            "{} {} contains no extractable text",
                            "Warning:".yellow().bold(),
                            doc.name()
                        );
                    }
                    Ok(doc) => {
                        println!(
                            "{} {} ({} words)",
                            "Imported".green().bold(),
                            doc.name().white(),
                            doc.word_count().to_string().cyan()
                        );
                    }
                    Err(e) => println!("{} {}", "Error:".red().bold(), e),
                }
            }
        }
        "/model" | "/m" => {
            if args.is_empty() {
                println!("{}", "Usage: /model <path-to-gguf>".yellow());
            } else {
                println!("{}...", "Loading model".green().bold());
                match session.load_model(&expand_path(args)) {
                    Ok(meta) => println!("{} {}", "Model loaded:".green().bold(), meta.id.white()),
                    Err(e) => println!("{} {}", "Error:".red().bold(), e),
                }
            }
        }
        _ => {
            println!("{} Unknown command: {}", "Error:".red().bold(), cmd);
            println!("Type {} for available commands.", "/help".yellow());
        }
    }

    Ok(false)
}

/// Ask a question and display the answer
async fn do_ask(question: &str, session: &Session) {
    if !session.has_model() {
        println!("{} Load one with {}", "No model loaded.".yellow(), "/model <path>".cyan());
        return;
    }

    let mut progress = ProgressTracker::new();
    match session.ask(question, &mut progress).await {
        Ok(outcome) => print_outcome(&outcome),
        Err(e) => println!("{} {}", "Error:".red().bold(), e),
    }
}
