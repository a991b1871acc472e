//! Command-line interface.

use crate::config::Config;
use crate::document::{DocumentSource, FileSource, SinkTarget, WriterSink};
use crate::pipeline::summarize_all;
use crate::render::Format;
use crate::summarize::{TokenBudget, split};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Summarize long newsletters with a token-budgeted language model
#[derive(Parser, Debug)]
#[command(name = "tldr", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: <config dir>/tldr/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Debug logging on stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Summarize one or more documents
    Summarize(SummarizeArgs),
    /// Show how a document would be chunked, without calling the model
    Split(SplitArgs),
    /// Inspect configuration
    Config(ConfigArgs),
}

#[derive(Parser, Debug)]
pub struct SummarizeArgs {
    /// Files to summarize (.txt, .html, .eml; "-" reads stdin)
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Model id, overriding the config
    #[arg(short, long)]
    pub model: Option<String>,

    /// Output format
    #[arg(short, long, value_enum)]
    pub format: Option<Format>,

    /// Write one file per document here instead of stdout
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Documents summarized at once
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Extra instruction for every chunk prompt
    #[arg(long)]
    pub focus: Option<String>,
}

#[derive(Parser, Debug)]
pub struct SplitArgs {
    /// File to split ("-" reads stdin)
    pub path: PathBuf,

    /// Chunk budget in tokens (default: the configured model's chunk budget)
    #[arg(short, long)]
    pub budget: Option<usize>,

    /// Model id, overriding the config
    #[arg(short, long)]
    pub model: Option<String>,

    /// Print chunks as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show config file path
    Path,
    /// Print the effective configuration
    Show,
}

pub async fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Commands::Summarize(args) => summarize(args, cli.config).await,
        Commands::Split(args) => run_split(args, cli.config).await,
        Commands::Config(args) => show_config(&args.action, cli.config),
    };
    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn summarize(args: SummarizeArgs, config_path: Option<PathBuf>) -> Result<ExitCode> {
    let mut config = Config::load(config_path.as_deref())?;
    if let Some(model) = args.model {
        config.model = model;
    }
    if let Some(focus) = args.focus {
        config.prompt_focus = Some(focus);
    }
    if let Some(concurrency) = args.concurrency {
        config.concurrency = concurrency;
    }
    let format = args.format.unwrap_or(config.format);

    let summarizer = config.summarizer()?;
    let documents = FileSource::new(args.paths)
        .fetch()
        .await
        .context("Failed to read documents")?;

    let target = match args.output_dir {
        Some(dir) => SinkTarget::Directory(dir),
        None => SinkTarget::Stdout,
    };
    let sink = WriterSink::new(target, format);

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling run");
            ctrl_c.cancel();
        }
    });

    let report = summarize_all(&summarizer, documents, &sink, config.concurrency, &cancel).await;

    for outcome in &report.outcomes {
        if let Err(e) = &outcome.result {
            eprintln!("Failed: {}: {e}", outcome.document.id());
        }
    }

    Ok(if report.failed() == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn run_split(args: SplitArgs, config_path: Option<PathBuf>) -> Result<ExitCode> {
    let mut config = Config::load(config_path.as_deref())?;
    if let Some(model) = args.model {
        config.model = model;
    }

    let counter = config.token_counter()?;
    let budget = match args.budget {
        Some(budget) => budget,
        None => TokenBudget::new(&config.profile()?, config.context_carry_tokens)?.chunk_tokens,
    };

    let documents = FileSource::new(vec![args.path]).fetch().await?;
    let mut stdout = io::stdout().lock();
    for document in &documents {
        let chunks = split(document.text(), budget, counter.as_ref())?;
        if args.json {
            serde_json::to_writer_pretty(&mut stdout, &chunks)?;
            writeln!(stdout)?;
            continue;
        }

        writeln!(
            stdout,
            "{}: {} chunk(s), budget {} tokens ({})",
            document.id(),
            chunks.len(),
            budget,
            counter.name()
        )?;
        for chunk in &chunks {
            let preview: String = chunk.text.chars().take(60).collect();
            writeln!(
                stdout,
                "  [{}] bytes {}..{}  {} tokens  {:?}",
                chunk.index,
                chunk.start,
                chunk.end,
                chunk.token_count,
                preview
            )?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn show_config(action: &ConfigAction, config_path: Option<PathBuf>) -> Result<ExitCode> {
    match action {
        ConfigAction::Path => {
            let path = config_path.unwrap_or_else(Config::default_path);
            println!("{}", path.display());
        }
        ConfigAction::Show => {
            let mut config = Config::load(config_path.as_deref())?;
            if config.api_key.is_some() {
                config.api_key = Some("********".to_string());
            }
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }
    Ok(ExitCode::SUCCESS)
}
