//! Sift CLI
//!
//! Command-line interface for the sift interpretation engine.
//!
//! ## Usage
//!
//! ```bash
//! # Resolve one stimulus
//! sift resolve "which of {washer, vaccine, fridge} is for sauces?"
//!
//! # Pipe from stdin, with earlier responses as context
//! echo "my week went sideways" | sift resolve --context "The garden needs water."
//!
//! # JSON output with the audit trail
//! sift resolve "what is entropy?" --format json
//!
//! # Interactive conversation
//! sift chat --config sift.yaml
//!
//! # Check files
//! sift config validate sift.yaml
//! sift knowledge validate knowledge.yaml
//! ```
//!
//! ## Exit Codes
//!
//! - 0: Resolved
//! - 1: Courtesy exit
//! - 3: Error

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use std::io::{self, BufRead, Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use sift_core::{
    ConversationContext, DisclosureLevel, Engine, KnowledgeBase, Outcome,
    ResolveOptions, SelectionResult, Session, Stimulus,
};
use sift_runtime::RuntimeConfig;

/// Sift: depth-bounded interpretation ranking
#[derive(Parser)]
#[command(name = "sift")]
#[command(author = "Sift contributors")]
#[command(version)]
#[command(about = "Find the shallowest interpretation that answers", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a single stimulus
    Resolve {
        /// The stimulus text (reads from stdin if not provided)
        text: Option<String>,

        /// Earlier responses, oldest first (can be specified multiple times)
        #[arg(long)]
        context: Vec<String>,

        /// How much the response may disclose
        #[arg(short, long)]
        disclosure: Option<Disclosure>,

        /// Skip filler compression
        #[arg(long)]
        precision: bool,

        /// Latency budget, e.g. 250ms
        #[arg(short, long, value_parser = parse_duration)]
        budget: Option<Duration>,

        /// Runtime configuration file (YAML or JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Knowledge tables merged over the built-ins
        #[arg(short, long)]
        knowledge: Option<PathBuf>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,

        /// Show the audit trail
        #[arg(long)]
        explain: bool,

        /// Explicit timestamp for deterministic resolution (ISO 8601 / RFC 3339).
        /// Example: --resolved-at 2025-12-20T00:00:00Z
        #[arg(long, value_parser = parse_datetime)]
        resolved_at: Option<DateTime<Utc>>,
    },

    /// Interactive conversation on stdin
    Chat {
        /// Runtime configuration file (YAML or JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Knowledge tables merged over the built-ins
        #[arg(short, long)]
        knowledge: Option<PathBuf>,

        /// How much responses may disclose
        #[arg(short, long)]
        disclosure: Option<Disclosure>,

        /// Print the audit defense after each response
        #[arg(long)]
        explain: bool,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Knowledge table commands
    Knowledge {
        #[command(subcommand)]
        action: KnowledgeAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Validate a configuration file
    Validate {
        /// Path to the configuration file
        path: PathBuf,
    },

    /// Show the effective configuration (defaults if no file is given)
    Show {
        /// Path to the configuration file
        path: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum KnowledgeAction {
    /// Validate a knowledge file
    Validate {
        /// Path to the knowledge file
        path: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
enum Disclosure {
    Taste,
    Open,
    Full,
}

impl From<Disclosure> for DisclosureLevel {
    fn from(value: Disclosure) -> Self {
        match value {
            Disclosure::Taste => DisclosureLevel::Taste,
            Disclosure::Open => DisclosureLevel::Open,
            Disclosure::Full => DisclosureLevel::Full,
        }
    }
}

/// Parse ISO 8601 / RFC 3339 datetime string to DateTime<Utc>.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("Invalid datetime format: {}. Expected ISO 8601/RFC 3339 (e.g., 2025-12-20T00:00:00Z)", e))
}

/// Parse a humantime duration such as `250ms` or `2s`.
fn parse_duration(s: &str) -> Result<Duration, String> {
    humantime::parse_duration(s).map_err(|e| format!("Invalid duration: {}. Expected e.g. 250ms or 2s", e))
}

fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    match run() {
        Ok(exit_code) => exit_code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(3)
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Resolve {
            text,
            context,
            disclosure,
            precision,
            budget,
            config,
            knowledge,
            format,
            explain,
            resolved_at,
        } => {
            let mut config = load_config(config, knowledge)?;
            if let Some(budget) = budget {
                config.latency_budget = budget;
                config.global_timeout = config.global_timeout.max(budget);
            }
            if let Some(timestamp) = resolved_at {
                config.determinism.resolved_at = Some(timestamp);
            }
            let context = ConversationContext {
                prior_outputs: context,
                disclosure: disclosure.map_or(config.disclosure, DisclosureLevel::from),
                precision,
            };
            resolve_command(text, context, &config, format, explain)
        }

        Commands::Chat {
            config,
            knowledge,
            disclosure,
            explain,
        } => {
            let mut config = load_config(config, knowledge)?;
            if let Some(disclosure) = disclosure {
                config.disclosure = disclosure.into();
            }
            chat_command(&config, explain)
        }

        Commands::Config { action } => match action {
            ConfigAction::Validate { path } => validate_config(path),
            ConfigAction::Show { path } => show_config(path),
        },

        Commands::Knowledge { action } => match action {
            KnowledgeAction::Validate { path } => validate_knowledge(path),
        },
    }
}

/// Configuration from `path` (or defaults), with an optional knowledge override.
fn load_config(path: Option<PathBuf>, knowledge: Option<PathBuf>) -> Result<RuntimeConfig> {
    let mut config = match path {
        Some(path) => RuntimeConfig::from_file(&path)
            .with_context(|| format!("Failed to load configuration from {:?}", path))?,
        None => RuntimeConfig::default(),
    };
    if let Some(knowledge) = knowledge {
        config.knowledge.path = Some(knowledge);
    }
    Ok(config)
}

fn build_engine(config: &RuntimeConfig) -> Result<Engine> {
    config.build_engine().context("Failed to build engine")
}

fn resolve_command(
    text: Option<String>,
    context: ConversationContext,
    config: &RuntimeConfig,
    format: OutputFormat,
    explain: bool,
) -> Result<ExitCode> {
    let raw = match text {
        Some(text) => text,
        None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read from stdin")?;
            buffer
        }
    };

    let engine = build_engine(config)?;
    let result = engine.resolve_with(
        &Stimulus::new(raw),
        &context,
        ResolveOptions::with_budget(config.budget()),
        config.resolved_at(),
    );

    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&result)?;
            println!("{}", json);
        }
        OutputFormat::Text => print_text_result(&result, explain),
    }

    Ok(exit_code(&result))
}

fn exit_code(result: &SelectionResult) -> ExitCode {
    match result.outcome {
        Outcome::Resolved { .. } => ExitCode::from(0),
        Outcome::CourtesyExit { .. } => ExitCode::from(1),
    }
}

fn print_text_result(result: &SelectionResult, explain: bool) {
    match &result.outcome {
        Outcome::Resolved {
            text,
            depth,
            blended,
            score,
            ..
        } => {
            println!("RESOLVED (depth {}{})", depth, if *blended { ", blended" } else { "" });
            println!();
            println!("{}", text);
            println!();
            println!(
                "Score: {:.3} ({} categories met)",
                score.aggregate, score.met_count
            );
        }
        Outcome::CourtesyExit { text, reason } => {
            println!("COURTESY EXIT ({:?})", reason);
            println!();
            println!("{}", text);
        }
    }

    if explain {
        let audit = &result.audit;
        println!();
        println!("--- Defense ---");
        println!();
        for line in &audit.defense {
            println!("{}", line);
        }

        println!();
        println!("--- Attempts ---");
        println!();
        for entry in &audit.attempts {
            println!("Depth {}: {} attempt(s)", entry.depth, entry.attempts);
        }
        println!("Total: {}", audit.total_attempts);

        if !audit.top_candidates.is_empty() {
            println!();
            println!("--- Top Candidates ---");
            println!();
            for candidate in &audit.top_candidates {
                println!(
                    "{} (depth {}, {:?}): {:?}",
                    candidate.id, candidate.depth, candidate.dimension, candidate.verdict
                );
                println!("  {}", candidate.text);
            }
        }
    }
}

fn chat_command(config: &RuntimeConfig, explain: bool) -> Result<ExitCode> {
    let engine = Arc::new(build_engine(config)?);
    let mut session = Session::new(engine);
    session.disclosure = config.disclosure;
    session.max_turns = config.history.max_turns_considered;
    let budget = config.budget();

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    loop {
        print!("> ");
        stdout.flush().context("Failed to write prompt")?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line).context("Failed to read from stdin")? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "/quit" | "/exit") {
            break;
        }

        let result = session.respond_at(line, budget, config.resolved_at());
        println!("{}", result.text());
        if explain {
            for defense in &result.audit.defense {
                println!("  | {}", defense);
            }
        }
    }

    Ok(ExitCode::from(0))
}

fn validate_config(path: PathBuf) -> Result<ExitCode> {
    match RuntimeConfig::from_file(&path) {
        Ok(config) => {
            println!("Configuration is valid: {}", path.display());
            println!();
            println!("Latency budget: {}", humantime::format_duration(config.latency_budget));
            println!("Global timeout: {}", humantime::format_duration(config.global_timeout));
            println!(
                "Limits: depth {}, {} attempt(s) per depth",
                config.max_depth, config.attempts_per_depth
            );
            Ok(ExitCode::from(0))
        }
        Err(e) => {
            eprintln!("Configuration validation failed: {}", e);
            Ok(ExitCode::from(1))
        }
    }
}

fn show_config(path: Option<PathBuf>) -> Result<ExitCode> {
    let config = load_config(path, None)?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(ExitCode::from(0))
}

fn validate_knowledge(path: PathBuf) -> Result<ExitCode> {
    match KnowledgeBase::from_file(&path) {
        Ok(base) if base.is_empty() => {
            println!("Knowledge file is valid but contains no entries: {}", path.display());
            Ok(ExitCode::from(0))
        }
        Ok(base) => {
            println!("Knowledge file is valid: {}", path.display());
            println!();
            println!("Entries: {}", base.entry_count());
            println!("Idioms: {}", base.idioms.len());
            println!("Definitions: {}", base.definitions.len());
            Ok(ExitCode::from(0))
        }
        Err(e) => {
            eprintln!("Knowledge validation failed: {}", e);
            Ok(ExitCode::from(1))
        }
    }
}
