//! # docs-mcp
//!
//! An in-memory documentation index served over the Model Context Protocol.
//!
//! Markup files matching a glob are loaded, their front matter split off,
//! `<include>` directives expanded and a route derived for each page. The
//! resulting snapshot answers scored substring searches and route lookups,
//! exposed as MCP tools over HTTP (JSON or SSE) or stdio.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │    Loader    │──▶│  Normalizer  │──▶│   Snapshot   │
//! │ glob+include │   │ search text  │   │ route → doc  │
//! └──────────────┘   └──────────────┘   └──────┬───────┘
//!                                              │
//!                         ┌────────────────────┤
//!                         ▼                    ▼
//!                    ┌──────────┐        ┌──────────┐
//!                    │   CLI    │        │ MCP HTTP │
//!                    │ commands │        │ + stdio  │
//!                    └──────────┘        └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML + environment configuration |
//! | [`models`] | Document, route and hit types |
//! | [`frontmatter`] | YAML front matter splitting |
//! | [`include`] | Include directive expansion |
//! | [`loader`] | Workspace enumeration and route derivation |
//! | [`normalize`] | Search text flattening |
//! | [`index`] | Snapshot, search scoring, atomic rebuild |
//! | [`tools`] | `docs_search`, `docs_getPage`, `docs_listRoutes` |
//! | [`prompts`] | `answer_from_docs`, `write_mdx_snippet` |
//! | [`protocol`] | JSON-RPC dispatch for the HTTP transport |
//! | [`mcp`] | rmcp model conversion and the stdio handler |
//! | [`lifecycle`] | Connection tracking, drain and shutdown |
//! | [`server`] | axum routes, origin checks, SSE |
//! | [`commands`] | CLI commands |

pub mod commands;
pub mod config;
pub mod errors;
pub mod frontmatter;
pub mod include;
pub mod index;
pub mod lifecycle;
pub mod loader;
pub mod mcp;
pub mod models;
pub mod normalize;
pub mod prompts;
pub mod protocol;
pub mod server;
pub mod tools;
