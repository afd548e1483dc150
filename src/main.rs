use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use localfind::indexer::Indexer;
use localfind::mcp::McpServer;
use localfind::messages::Messages;
use localfind::searcher::Searcher;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "localfind", version, about = "Local document indexing and BM25 search over MCP")]
struct Cli {
    /// Directory to index and search
    #[arg(long, global = true, default_value = ".")]
    dir: PathBuf,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    debug_log: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build or update the index for the target directory
    Index {
        /// Reindex every file even if unchanged
        #[arg(long)]
        force: bool,
    },
    /// Search the indexed directory and print ranked results
    Search {
        /// Query text
        text: String,

        /// Maximum number of results
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Serve the index as an MCP tool server over stdio
    Mcp,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.debug_log.as_deref());

    if let Err(e) = run(cli).await {
        tracing::error!(error = %format!("{e:#}"), "Fatal error");
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

/// Stdout is reserved for command output (and JSON-RPC frames in MCP mode),
/// so logs always go to stderr or to the requested file.
fn init_tracing(debug_log: Option<&std::path::Path>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match debug_log.map(std::fs::File::create) {
        Some(Ok(file)) => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::sync::Mutex::new(file))
                .with_ansi(false)
                .init();
        }
        Some(Err(e)) => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
            tracing::warn!(error = %e, "Failed to open debug log file, logging to stderr");
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let dir = cli
        .dir
        .canonicalize()
        .with_context(|| format!("Target directory not found: {}", cli.dir.display()))?;
    let messages = Messages::from_env();

    match cli.command {
        Command::Index { force } => {
            let summary = Indexer::new(&dir).index(force).map_err(|e| {
                anyhow::anyhow!(messages.format("error.indexing", &[("error", &e.to_string())]))
            })?;
            println!("{}", messages.get("indexing.complete"));
            println!(
                "  total: {}, indexed: {}, removed: {}, terms: {}",
                summary.total_files,
                summary.indexed_files,
                summary.removed_files,
                summary.total_terms
            );
        }
        Command::Search { text, limit } => {
            ensure_index(&dir, &messages, false)?;
            let results = Searcher::new(&dir).search(&text, limit).map_err(|e| {
                anyhow::anyhow!(messages.format("error.search", &[("error", &e.to_string())]))
            })?;

            if results.is_empty() {
                println!("{}", messages.get("search.no_results"));
                return Ok(());
            }
            println!(
                "{}",
                messages.format("search.results", &[("count", &results.len().to_string())])
            );
            for (i, result) in results.iter().enumerate() {
                println!("\n{}. {}", i + 1, result.path);
                println!(
                    "   {}",
                    messages.format("search.score", &[("score", &format!("{:.4}", result.score))])
                );
                println!(
                    "   {}",
                    messages.format("search.content", &[("content", &preview(&result.content, 200))])
                );
            }
        }
        Command::Mcp => {
            // Build the index up front when missing so the first tool call
            // does not pay the cold-start cost; logs only, stdout stays clean.
            ensure_index(&dir, &messages, true)?;
            McpServer::new(&dir).run().await?;
        }
    }
    Ok(())
}

/// Build the index when no snapshot exists yet. In quiet mode progress goes
/// to the log only.
fn ensure_index(dir: &std::path::Path, messages: &Messages, quiet: bool) -> Result<()> {
    let indexer = Indexer::new(dir);
    if indexer.store().exists() {
        return Ok(());
    }
    if quiet {
        tracing::info!(dir = %dir.display(), "No index snapshot, building one");
    } else {
        println!("{}", messages.get("indexing.start"));
    }
    indexer.index(false).map_err(|e| {
        anyhow::anyhow!(messages.format("error.indexing", &[("error", &e.to_string())]))
    })?;
    if !quiet {
        println!("{}", messages.get("indexing.complete"));
    }
    Ok(())
}

/// First `max_chars` characters of a snippet, cut on a char boundary.
fn preview(content: &str, max_chars: usize) -> String {
    let flattened = content.replace('\n', " ");
    match flattened.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &flattened[..idx]),
        None => flattened,
    }
}
