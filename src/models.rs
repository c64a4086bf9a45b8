//! Core data models used throughout docs-mcp.
//!
//! These types represent loaded documents and the shapes returned to
//! callers by the index and the MCP tools.

use serde::Serialize;

/// Parsed front matter. Keys and values are preserved as authored.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// One source file after loading.
#[derive(Debug, Clone)]
pub struct DocRecord {
    /// Path relative to the workspace root, `/`-separated.
    pub file_path: String,
    /// Canonical route; always begins with `/`.
    pub route: String,
    pub title: String,
    pub metadata: Metadata,
    /// Body as authored, include directives untouched.
    pub raw_body: String,
    /// Body with include directives spliced in.
    pub resolved_body: String,
    /// Normalized plain text of `resolved_body`, used for scoring.
    pub search_text: String,
    /// Include problems recorded while resolving this document.
    pub warnings: Vec<String>,
}

impl DocRecord {
    pub fn route_entry(&self) -> RouteEntry {
        RouteEntry {
            route: self.route.clone(),
            title: self.title.clone(),
            file_path: self.file_path.clone(),
        }
    }
}

/// A `(route, title, filePath)` listing entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteEntry {
    pub route: String,
    pub title: String,
    pub file_path: String,
}

/// A scored search result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub route: String,
    pub title: String,
    pub file_path: String,
    pub excerpt: String,
    pub score: u32,
}
