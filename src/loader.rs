//! Content loader.
//!
//! Walks the workspace root, keeps files whose relative path matches the
//! configured glob, and turns each into a [`DocRecord`]: front matter split,
//! includes resolved, route and title derived, search text normalized.
//!
//! A file that cannot be read or has broken front matter is logged and
//! skipped. Only a missing workspace root or an invalid glob fails the
//! whole load.

use anyhow::{bail, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::DocsConfig;
use crate::errors::LoadError;
use crate::frontmatter;
use crate::include::resolve_includes;
use crate::models::{DocRecord, Metadata};
use crate::normalize::normalize;

/// Everything produced by one pass over the workspace.
#[derive(Debug, Default)]
pub struct LoadOutcome {
    /// Indexed documents in file enumeration order, routes unique.
    pub documents: Vec<DocRecord>,
    /// Files that failed to load.
    pub skipped: usize,
    /// Files dropped because their route matched an exclusion pattern.
    pub excluded: usize,
    pub warnings: Vec<String>,
}

pub fn load_documents(config: &DocsConfig) -> Result<LoadOutcome> {
    let root = &config.workspace_root;
    if !root.is_dir() {
        bail!("Docs workspace root does not exist: {}", root.display());
    }

    let include_set = build_globset(std::slice::from_ref(&config.glob))?;
    let exclude_set = build_globset(&config.exclude_routes)?;

    let files = enumerate_files(config, &include_set);
    info!("Found {} documentation files", files.len());

    let mut outcome = LoadOutcome::default();
    let mut loaded = Vec::with_capacity(files.len());

    for rel in &files {
        match load_file(config, rel) {
            Ok(doc) => {
                if exclude_set.is_match(&doc.route) {
                    debug!(route = %doc.route, file = %rel, "excluded by route pattern");
                    outcome.excluded += 1;
                    continue;
                }
                outcome.warnings.extend(doc.warnings.iter().cloned());
                loaded.push(doc);
            }
            Err(e) => {
                warn!("Skipping {}: {}", rel, e);
                outcome.warnings.push(e.to_string());
                outcome.skipped += 1;
            }
        }
    }

    outcome.documents = dedupe_routes(loaded, &mut outcome.warnings);
    Ok(outcome)
}

/// Relative, `/`-separated paths of every matching file, sorted.
fn enumerate_files(config: &DocsConfig, include_set: &GlobSet) -> Vec<String> {
    let root = &config.workspace_root;
    let include_hidden = config.include_hidden;

    let walker = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_entry(|e| include_hidden || e.depth() == 0 || !is_hidden(e.file_name()));

    let mut files = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable path during walk: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = to_slash(relative);

        if include_set.is_match(&rel_str) {
            files.push(rel_str);
        }
    }

    // Sort for deterministic ordering
    files.sort();
    files
}

fn load_file(config: &DocsConfig, rel: &str) -> Result<DocRecord, LoadError> {
    let path = config.workspace_root.join(rel);
    let raw = std::fs::read_to_string(&path).map_err(|source| LoadError::Read {
        path: rel.to_string(),
        source,
    })?;
    build_record(config, rel, &raw, &path)
}

/// Build a record from file contents. `path` locates the file on disk so
/// includes can be resolved next to it.
pub fn build_record(
    config: &DocsConfig,
    file_path: &str,
    raw: &str,
    path: &Path,
) -> Result<DocRecord, LoadError> {
    let parsed = frontmatter::split(raw).map_err(|message| LoadError::FrontMatter {
        path: file_path.to_string(),
        message,
    })?;

    let resolution = resolve_includes(&parsed.body, path);

    let route = config
        .use_frontmatter_routes
        .then(|| frontmatter_route(&parsed.metadata, &config.route_keys))
        .flatten()
        .unwrap_or_else(|| derive_route(file_path, &config.docs_root));

    let title = parsed
        .metadata
        .get("title")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| file_stem(file_path));

    let search_text = normalize(&resolution.body);

    Ok(DocRecord {
        file_path: file_path.to_string(),
        route,
        title,
        metadata: parsed.metadata,
        raw_body: parsed.body,
        resolved_body: resolution.body,
        search_text,
        warnings: resolution.warnings,
    })
}

/// First route key holding a non-empty string, with a leading `/`.
pub fn frontmatter_route(metadata: &Metadata, route_keys: &[String]) -> Option<String> {
    route_keys.iter().find_map(|key| {
        let value = metadata.get(key)?.as_str()?.trim();
        if value.is_empty() {
            None
        } else if value.starts_with('/') {
            Some(value.to_string())
        } else {
            Some(format!("/{}", value))
        }
    })
}

/// Route for a file path: docs root and extension stripped, `index` mapped
/// to its parent directory.
///
/// `content/docs/a/b/index.mdx` → `/a/b`, `content/docs/a/b/c.mdx` → `/a/b/c`,
/// `content/docs/index.mdx` → `/`.
pub fn derive_route(file_path: &str, docs_root: &str) -> String {
    let rel = file_path.replace('\\', "/");
    let root = docs_root.replace('\\', "/");
    let root = root.trim_start_matches("./").trim_end_matches('/');

    let without_root = if root.is_empty() {
        rel.as_str()
    } else {
        rel.strip_prefix(root)
            .and_then(|rest| rest.strip_prefix('/'))
            .unwrap_or(&rel)
    };

    let without_ext = strip_markdown_ext(without_root);
    let without_index = if without_ext == "index" {
        ""
    } else {
        without_ext.strip_suffix("/index").unwrap_or(without_ext)
    };

    let segments: Vec<&str> = without_index.split('/').filter(|s| !s.is_empty()).collect();
    format!("/{}", segments.join("/"))
}

fn strip_markdown_ext(path: &str) -> &str {
    for ext in [".mdx", ".md"] {
        let cut = path.len().saturating_sub(ext.len());
        if path.len() > ext.len()
            && path.get(cut..).is_some_and(|tail| tail.eq_ignore_ascii_case(ext))
        {
            return &path[..cut];
        }
    }
    path
}

fn file_stem(file_path: &str) -> String {
    let name = file_path.rsplit('/').next().unwrap_or(file_path);
    strip_markdown_ext(name).to_string()
}

/// Keep the last document for each route, preserving enumeration order.
fn dedupe_routes(docs: Vec<DocRecord>, warnings: &mut Vec<String>) -> Vec<DocRecord> {
    let mut winner: HashMap<String, usize> = HashMap::new();
    for (i, doc) in docs.iter().enumerate() {
        if let Some(prev) = winner.insert(doc.route.clone(), i) {
            let msg = format!(
                "duplicate route {}: {} replaces {}",
                doc.route, doc.file_path, docs[prev].file_path
            );
            warn!("{}", msg);
            warnings.push(msg);
        }
    }

    docs.into_iter()
        .enumerate()
        .filter(|(i, doc)| winner.get(&doc.route) == Some(i))
        .map(|(_, doc)| doc)
        .collect()
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_str().is_some_and(|s| s.starts_with('.'))
}

fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(GlobBuilder::new(pattern).literal_separator(true).build()?);
    }
    Ok(builder.build()?)
}
