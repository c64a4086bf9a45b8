//! # docs-mcp CLI
//!
//! Serves a documentation tree over the Model Context Protocol, or queries
//! it directly from the command line.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docs-mcp serve` | Start the HTTP server (`/mcp`, `/health`, `/reindex`) |
//! | `docs-mcp serve --stdio` | Speak MCP over stdin/stdout |
//! | `docs-mcp search "<query>"` | Print ranked hits |
//! | `docs-mcp get <route>` | Print one page |
//! | `docs-mcp routes` | List every route |
//! | `docs-mcp check` | Rebuild once and report counts and warnings |
//!
//! Logs go to stderr and are filtered with `RUST_LOG` (default `info`).

use anyhow::Context;
use clap::{Parser, Subcommand};
use rmcp::{transport::stdio, ServiceExt};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use docs_mcp::config::{self, Config};
use docs_mcp::index::{DocsIndex, DEFAULT_SEARCH_LIMIT};
use docs_mcp::mcp::DocsMcp;
use docs_mcp::prompts::PromptRegistry;
use docs_mcp::tools::ToolRegistry;
use docs_mcp::{commands, server};

/// Documentation search served over MCP.
///
/// Settings come from the optional `--config` TOML file, then from
/// environment variables (`PORT`, `DOCS_GLOB`, ...).
#[derive(Parser)]
#[command(name = "docs-mcp", version, about = "Index a docs tree and serve it over MCP")]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server.
    Serve {
        /// Serve MCP over stdin/stdout instead of HTTP.
        #[arg(long)]
        stdio: bool,
    },

    /// Search the docs.
    Search {
        query: String,

        /// Maximum number of results (1-25).
        #[arg(long, default_value_t = DEFAULT_SEARCH_LIMIT)]
        limit: usize,
    },

    /// Print a page by route.
    Get {
        /// Route such as `/guides/install`, or a file path with `--file`.
        target: String,

        /// Treat the target as a file path.
        #[arg(long)]
        file: bool,
    },

    /// List routes.
    Routes {
        /// Only routes starting with this prefix.
        #[arg(long)]
        prefix: Option<String>,
    },

    /// Rebuild the index once and report counts and warnings.
    Check,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn serve_stdio(cfg: &Config) -> anyhow::Result<()> {
    let index = Arc::new(DocsIndex::new(cfg.docs.clone()));
    index.rebuild().await?;

    let handler = DocsMcp::new(
        index,
        Arc::new(ToolRegistry::with_builtins()),
        Arc::new(PromptRegistry::with_builtins()),
    );
    let service = handler.serve(stdio()).await.inspect_err(|e| {
        tracing::error!("serving error: {:?}", e);
    })?;
    service.waiting().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let cfg = config::load_config(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Commands::Serve { stdio: true } => serve_stdio(&cfg).await?,
        Commands::Serve { stdio: false } => server::run_server(&cfg).await?,
        Commands::Search { query, limit } => commands::run_search(&cfg, &query, limit).await?,
        Commands::Get { target, file } => commands::run_get(&cfg, &target, file).await?,
        Commands::Routes { prefix } => commands::run_routes(&cfg, prefix.as_deref()).await?,
        Commands::Check => commands::run_check(&cfg).await?,
    }

    Ok(())
}
