//! CLI commands that query the index directly, without the server.
//!
//! Each command rebuilds the index from the configured workspace and prints
//! a human-readable result to stdout.

use anyhow::{bail, Result};

use crate::config::Config;
use crate::index::{DocsIndex, RebuildStats, MAX_SEARCH_LIMIT};

async fn load(config: &Config) -> Result<(DocsIndex, RebuildStats)> {
    let index = DocsIndex::new(config.docs.clone());
    let stats = index.rebuild().await?;
    Ok((index, stats))
}

/// `docs-mcp search <query>`
pub async fn run_search(config: &Config, query: &str, limit: usize) -> Result<()> {
    let (index, _) = load(config).await?;
    let hits = index.search(query, limit.clamp(1, MAX_SEARCH_LIMIT));

    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        println!("{}. [{}] {}", i + 1, hit.score, hit.title);
        println!("    route: {}", hit.route);
        println!("    file: {}", hit.file_path);
        println!("    excerpt: \"{}\"", hit.excerpt);
        println!();
    }
    Ok(())
}

/// `docs-mcp get <route>`, or a file path with `--file`.
pub async fn run_get(config: &Config, target: &str, by_file: bool) -> Result<()> {
    let (index, _) = load(config).await?;
    let doc = if by_file {
        index.get_by_file_path(target)
    } else {
        index.get_by_route(target)
    };
    let Some(doc) = doc else {
        bail!("page not found: {}", target);
    };

    println!("--- Page ---");
    println!("route:       {}", doc.route);
    println!("title:       {}", doc.title);
    println!("file:        {}", doc.file_path);
    println!("frontmatter: {}", serde_json::Value::Object(doc.metadata.clone()));
    for warning in &doc.warnings {
        println!("warning:     {}", warning);
    }
    println!();
    println!("--- Body ---");
    println!("{}", doc.resolved_body);
    Ok(())
}

/// `docs-mcp routes`
pub async fn run_routes(config: &Config, prefix: Option<&str>) -> Result<()> {
    let (index, _) = load(config).await?;
    let routes = index.list_routes(prefix);
    if routes.is_empty() {
        println!("No routes.");
        return Ok(());
    }
    let width = routes.iter().map(|r| r.route.len()).max().unwrap_or(0);
    for entry in &routes {
        println!("{:<width$}  {}", entry.route, entry.title, width = width);
    }
    println!();
    println!("{} route(s)", routes.len());
    Ok(())
}

/// `docs-mcp check`: rebuild once and report what happened.
pub async fn run_check(config: &Config) -> Result<()> {
    let (_, stats) = load(config).await?;
    println!("documents: {}", stats.documents);
    println!("skipped:   {}", stats.skipped);
    println!("excluded:  {}", stats.excluded);
    println!("warnings:  {}", stats.warnings.len());
    for warning in &stats.warnings {
        println!("  - {}", warning);
    }
    Ok(())
}
