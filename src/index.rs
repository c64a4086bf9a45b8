//! In-memory document index.
//!
//! [`DocsIndex`] owns the current [`Snapshot`] behind an `Arc`. A rebuild
//! loads a complete replacement off the async runtime and swaps it in with
//! a single pointer store, so readers see either the old or the new
//! document set in full and never wait for a rebuild to finish.
//!
//! # Scoring
//!
//! Search is a plain substring scorer over the lower-cased query `q`:
//!
//! | Match | Points |
//! |-------|--------|
//! | title contains `q` | 50 |
//! | route contains `q` | 20 |
//! | search text contains `q` | 10 |
//! | per token, title contains it (multi-token queries only) | 5 |
//! | per token, search text contains it (multi-token queries only) | 2 |
//!
//! Documents scoring zero are dropped; ties keep document order.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::info;

use crate::config::DocsConfig;
use crate::loader::load_documents;
use crate::models::{DocRecord, RouteEntry, SearchHit};

pub const DEFAULT_SEARCH_LIMIT: usize = 8;
pub const MAX_SEARCH_LIMIT: usize = 25;

const EXCERPT_BEFORE: usize = 80;
const EXCERPT_AFTER: usize = 160;
const EXCERPT_HEAD: usize = 240;

/// An immutable, fully built document set.
#[derive(Debug, Default)]
pub struct Snapshot {
    docs: Vec<DocRecord>,
    by_route: HashMap<String, usize>,
    by_file: HashMap<String, usize>,
}

impl Snapshot {
    /// Build a snapshot. For duplicate routes or file paths the later
    /// document wins the lookup.
    pub fn new(docs: Vec<DocRecord>) -> Self {
        let mut by_route = HashMap::with_capacity(docs.len());
        let mut by_file = HashMap::with_capacity(docs.len());
        for (i, doc) in docs.iter().enumerate() {
            by_route.insert(doc.route.clone(), i);
            by_file.insert(doc.file_path.clone(), i);
        }
        Self {
            docs,
            by_route,
            by_file,
        }
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Entries whose route starts with `prefix` (all when absent or blank),
    /// sorted by route.
    pub fn list_routes(&self, prefix: Option<&str>) -> Vec<RouteEntry> {
        let prefix = prefix.map(str::trim).filter(|p| !p.is_empty());
        let mut routes: Vec<RouteEntry> = self
            .docs
            .iter()
            .filter(|d| prefix.is_none_or(|p| d.route.starts_with(p)))
            .map(DocRecord::route_entry)
            .collect();
        routes.sort_by(|a, b| a.route.cmp(&b.route));
        routes
    }

    /// Exact, case-sensitive route lookup; a missing leading `/` is added.
    pub fn get_by_route(&self, route: &str) -> Option<&DocRecord> {
        let idx = if route.starts_with('/') {
            self.by_route.get(route)
        } else {
            self.by_route.get(&format!("/{}", route))
        };
        idx.map(|&i| &self.docs[i])
    }

    pub fn get_by_file_path(&self, file_path: &str) -> Option<&DocRecord> {
        self.by_file.get(file_path).map(|&i| &self.docs[i])
    }

    pub fn search(&self, query: &str, limit: usize) -> Vec<SearchHit> {
        let q = query.trim().to_lowercase();
        if q.is_empty() {
            return Vec::new();
        }
        let tokens: Vec<&str> = q.split_whitespace().collect();

        let mut scored: Vec<(u32, &DocRecord, String)> = self
            .docs
            .iter()
            .filter_map(|doc| {
                let text = doc.search_text.to_lowercase();
                let score = score_document(doc, &text, &q, &tokens);
                (score > 0).then_some((score, doc, text))
            })
            .collect();

        // Stable: equal scores keep document order
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored.truncate(limit);

        scored
            .into_iter()
            .map(|(score, doc, lowered)| SearchHit {
                route: doc.route.clone(),
                title: doc.title.clone(),
                file_path: doc.file_path.clone(),
                excerpt: excerpt(&doc.search_text, &lowered, &q),
                score,
            })
            .collect()
    }
}

fn score_document(doc: &DocRecord, text: &str, q: &str, tokens: &[&str]) -> u32 {
    let title = doc.title.to_lowercase();
    let route = doc.route.to_lowercase();

    let mut score = 0;
    if title.contains(q) {
        score += 50;
    }
    if route.contains(q) {
        score += 20;
    }
    if text.contains(q) {
        score += 10;
    }

    if tokens.len() > 1 {
        for token in tokens {
            if text.contains(token) {
                score += 2;
            }
            if title.contains(token) {
                score += 5;
            }
        }
    }

    score
}

/// Window around the first match of `q` in `lowered`, cut from `text` by
/// character position. Falls back to the head of the text.
fn excerpt(text: &str, lowered: &str, q: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let window = match lowered.find(q) {
        Some(byte_idx) => {
            let idx = lowered[..byte_idx].chars().count();
            let q_len = q.chars().count();
            let start = idx.saturating_sub(EXCERPT_BEFORE).min(chars.len());
            let end = (idx + q_len + EXCERPT_AFTER).min(chars.len());
            &chars[start..end.max(start)]
        }
        None => &chars[..EXCERPT_HEAD.min(chars.len())],
    };
    window.iter().collect::<String>().trim().to_string()
}

/// Counts from a completed rebuild.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebuildStats {
    pub documents: usize,
    pub skipped: usize,
    pub excluded: usize,
    pub warnings: Vec<String>,
}

/// The served index. Cheap to share behind an `Arc`.
pub struct DocsIndex {
    config: DocsConfig,
    current: RwLock<Arc<Snapshot>>,
    rebuild_lock: tokio::sync::Mutex<()>,
}

impl DocsIndex {
    /// An empty index; call [`rebuild`](Self::rebuild) to load documents.
    pub fn new(config: DocsConfig) -> Self {
        Self {
            config,
            current: RwLock::new(Arc::new(Snapshot::default())),
            rebuild_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// An index serving a fixed document set.
    pub fn from_documents(config: DocsConfig, docs: Vec<DocRecord>) -> Self {
        let index = Self::new(config);
        index.replace(Snapshot::new(docs));
        index
    }

    /// The snapshot currently being served.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Reload every document and swap the result in.
    ///
    /// Per-file problems are absorbed into the stats; only a failure to
    /// enumerate the workspace is returned as an error, in which case the
    /// previous snapshot keeps serving.
    pub async fn rebuild(&self) -> Result<RebuildStats> {
        let _guard = self.rebuild_lock.lock().await;
        info!("Rebuilding docs index...");

        let config = self.config.clone();
        let outcome = tokio::task::spawn_blocking(move || load_documents(&config))
            .await
            .context("docs loader task panicked")??;

        let stats = RebuildStats {
            documents: outcome.documents.len(),
            skipped: outcome.skipped,
            excluded: outcome.excluded,
            warnings: outcome.warnings,
        };
        self.replace(Snapshot::new(outcome.documents));

        info!(
            documents = stats.documents,
            skipped = stats.skipped,
            excluded = stats.excluded,
            "Docs index rebuilt"
        );
        Ok(stats)
    }

    fn replace(&self, snapshot: Snapshot) {
        let mut current = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *current = Arc::new(snapshot);
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    pub fn list_routes(&self, prefix: Option<&str>) -> Vec<RouteEntry> {
        self.snapshot().list_routes(prefix)
    }

    pub fn get_by_route(&self, route: &str) -> Option<DocRecord> {
        self.snapshot().get_by_route(route).cloned()
    }

    pub fn get_by_file_path(&self, file_path: &str) -> Option<DocRecord> {
        self.snapshot().get_by_file_path(file_path).cloned()
    }

    pub fn search(&self, query: &str, limit: usize) -> Vec<SearchHit> {
        self.snapshot().search(query, limit)
    }
}
