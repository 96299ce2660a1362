use anyhow::Result;
use chaekbo::config::Config;
use chaekbo::engine::Engine;
use chaekbo::models::FetchOptions;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "chaekbo",
    version,
    about = "Multi-node book downloader with bulk retrieval and gap repair",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML); environment variables otherwise
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json)
    #[arg(long, global = true, default_value = "text")]
    log_format: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Download a book
    Fetch {
        /// Book identifier
        book_id: String,

        /// Inclusive chapter index range, e.g. 10-25 (disables bulk mode)
        #[arg(short, long)]
        range: Option<String>,

        /// Comma-separated chapter indices (disables bulk mode)
        #[arg(long)]
        chapters: Option<String>,

        /// Pin a specific node base URL for this run
        #[arg(long)]
        node: Option<String>,

        /// Write the assembled result as JSON to this path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Resume an interrupted download from its checkpoint
    Resume {
        /// Book identifier
        book_id: String,

        /// Write the assembled result as JSON to this path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Probe all configured nodes and report their status
    Probe,

    /// List books with a checkpoint on disk
    Checkpoints {
        /// Discard the checkpoint for this book id instead of listing
        #[arg(long)]
        clear: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_tracing(&cli.log_format, cli.verbose)?;

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };

    let engine = Arc::new(Engine::new(config)?);

    // Ctrl-C stops in-flight runs at their next safe point; the checkpoint
    // survives for the next resume.
    {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received, stopping after current chapters");
                engine.close();
            }
        });
    }

    match cli.command {
        Commands::Fetch {
            book_id,
            range,
            chapters,
            node,
            output,
        } => {
            if let Some(node) = node {
                engine.pin_node(&node).await;
            }

            let options = FetchOptions {
                range: range.as_deref().map(parse_range).transpose()?,
                subset: chapters.as_deref().map(parse_subset).transpose()?,
                cancel: None,
            };

            tracing::info!(book_id = %book_id, "Starting fetch");
            let result = engine.run(&book_id, options).await?;
            report(&book_id, &result);
            if let Some(path) = output {
                write_result(&path, &result)?;
            }
        }

        Commands::Resume { book_id, output } => {
            tracing::info!(book_id = %book_id, "Resuming fetch");
            let result = engine.run(&book_id, FetchOptions::default()).await?;
            report(&book_id, &result);
            if let Some(path) = output {
                write_result(&path, &result)?;
            }
        }

        Commands::Probe => {
            for candidate in engine.probe_nodes().await {
                match &candidate.last_probe {
                    Some(probe) if probe.available => println!(
                        "{}  up  {}ms  bulk={}",
                        candidate.base_url,
                        probe.latency_ms.unwrap_or(0),
                        probe.verified_supports_bulk
                    ),
                    Some(probe) => println!(
                        "{}  down  {}",
                        candidate.base_url,
                        probe.error.as_deref().unwrap_or("unknown")
                    ),
                    None => println!("{}  unprobed", candidate.base_url),
                }
            }
        }

        Commands::Checkpoints { clear } => match clear {
            Some(book_id) => {
                engine.clear_checkpoint(&book_id).await?;
                println!("Checkpoint for {book_id} cleared");
            }
            None => {
                let ids = engine.list_checkpoints().await?;
                if ids.is_empty() {
                    println!("No checkpoints");
                } else {
                    for id in ids {
                        println!("{id}");
                    }
                }
            }
        },
    }

    Ok(())
}

fn setup_tracing(format: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("chaekbo=debug,info")
    } else {
        tracing_subscriber::EnvFilter::new("chaekbo=info,warn")
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}

fn parse_range(raw: &str) -> Result<(usize, usize)> {
    let (start, end) = raw
        .split_once('-')
        .ok_or_else(|| anyhow::anyhow!("range must look like START-END, got '{raw}'"))?;
    let start: usize = start.trim().parse()?;
    let end: usize = end.trim().parse()?;
    if start > end {
        anyhow::bail!("range start {start} is after end {end}");
    }
    Ok((start, end))
}

fn parse_subset(raw: &str) -> Result<Vec<usize>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| Ok(s.parse()?))
        .collect()
}

fn write_result(path: &PathBuf, result: &chaekbo::models::BookResult) -> Result<()> {
    let json = serde_json::to_string_pretty(result)?;
    std::fs::write(path, json)?;
    tracing::info!(path = %path.display(), "Result written");
    Ok(())
}

fn report(book_id: &str, result: &chaekbo::models::BookResult) {
    println!("Book {book_id}: {} chapters acquired", result.chapters.len());
    println!("Completeness: {:.1}%", result.completeness_percent);
    if !result.missing_indices.is_empty() {
        println!("Missing chapter indices: {:?}", result.missing_indices);
    }
}
