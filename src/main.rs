//! # Drive QA CLI (`dqa`)
//!
//! ## Usage
//!
//! ```bash
//! dqa --config ./config/dqa.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `dqa serve [--reindex]` | Start the HTTP + MCP server |
//! | `dqa reindex` | Build the index once and report the result |
//! | `dqa search "<query>"` | Rank indexed documents against a query |
//! | `dqa ask "<question>"` | Answer a question from the documents |
//! | `dqa list` | List Drive files |
//! | `dqa read <id>` | Print a document's text |
//! | `dqa create <title> <content>` | Create a Google Doc |
//! | `dqa completions <shell>` | Print shell completions |
//!
//! The index lives in memory, so `search` and `ask` rebuild it first. A
//! failed rebuild stops `search`; `ask` still answers without documents.

use std::io;
use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use drive_qa::config;
use drive_qa::server;
use drive_qa::service::build_service;
use drive_qa::telemetry;

/// Drive QA: ask questions about your Google Docs.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/dqa.example.toml` for every setting.
#[derive(Parser)]
#[command(
    name = "dqa",
    about = "Drive QA: semantic search and grounded answers over your Google Docs",
    version
)]
struct Cli {
    /// Path to configuration file (TOML). Every setting in it is optional.
    #[arg(long, global = true, default_value = "./config/dqa.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server (REST tools at /tools, MCP at /mcp).
    Serve {
        /// Build the index before accepting requests.
        #[arg(long)]
        reindex: bool,
    },

    /// Build the index from Drive and print what was indexed.
    Reindex,

    /// Rank indexed documents by similarity to a query.
    Search {
        query: String,

        /// Maximum number of results (clamped to `retrieval.max_documents_cap`).
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Answer a question.
    Ask {
        question: String,

        /// Skip the documents and answer from general knowledge.
        #[arg(long)]
        no_documents: bool,
    },

    /// List files in Drive.
    List {
        #[arg(long)]
        page_size: Option<u32>,

        /// Only list files with this MIME type.
        #[arg(long)]
        mime_type: Option<String>,
    },

    /// Print the plain text of a Google Doc.
    Read { id: String },

    /// Create a Google Doc.
    Create { title: String, content: String },

    /// Print shell completions to stdout.
    Completions { shell: Shell },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine; variables may come from the shell.
    let _ = dotenvy::dotenv();
    telemetry::init();

    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "dqa", &mut io::stdout());
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;

    if let Commands::Serve { reindex } = cli.command {
        return server::run_server(&cfg, reindex).await;
    }

    let (service, _completer) = build_service(&cfg)?;

    match cli.command {
        Commands::Reindex => {
            let report = service.rebuild_index().await?;
            println!(
                "Indexed {} documents (generation {}).",
                report.count, report.generation
            );
            for skipped in &report.skipped {
                println!("  skipped {} ({}): {}", skipped.name, skipped.id, skipped.reason);
            }
        }
        Commands::Search { query, limit } => {
            service.rebuild_index().await?;
            let hits = service.search(&query, limit).await?;
            if hits.is_empty() {
                println!("No results.");
            }
            for (rank, hit) in hits.iter().enumerate() {
                println!(
                    "{}. [{:.3}] {} ({})",
                    rank + 1,
                    hit.score,
                    hit.record.name,
                    hit.record.id
                );
            }
        }
        Commands::Ask {
            question,
            no_documents,
        } => {
            let answer = service.refresh_and_ask(&question, !no_documents).await?;
            println!("{}", answer.answer);
            if !answer.sources.is_empty() {
                println!();
                println!("Sources: {}", answer.sources.join(", "));
            }
        }
        Commands::List {
            page_size,
            mime_type,
        } => {
            let files = service.list_files(page_size, mime_type.as_deref()).await?;
            for f in files {
                println!("{}  {}  {}", f.id, f.content_type, f.name);
            }
        }
        Commands::Read { id } => {
            println!("{}", service.read_document(&id).await?);
        }
        Commands::Create { title, content } => {
            let created = service.create_document(&title, &content).await?;
            println!("Created \"{}\": {}", created.title, created.url);
        }
        Commands::Serve { .. } | Commands::Completions { .. } => {}
    }

    Ok(())
}
