//! Configuration loading.
//!
//! Settings come from an optional TOML file, then environment overrides
//! (`PORT`, `REQUEST_TIMEOUT`, `ALLOWED_ORIGINS`, ...), then validation.
//! Every field has a default, so the service starts without a file.

use anyhow::{bail, Context, Result};
use globset::Glob;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub docs: DocsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Per-connection timeout. Far longer than typical HTTP timeouts so
    /// streaming replies can stay open.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_sse_keep_alive_ms")]
    pub sse_keep_alive_ms: u64,
    /// Request inactivity after which the process is assumed to be drained.
    #[serde(default = "default_drain_after_ms")]
    pub drain_after_ms: u64,
    #[serde(default = "default_drain_check_interval_ms")]
    pub drain_check_interval_ms: u64,
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_ms: default_request_timeout_ms(),
            sse_keep_alive_ms: default_sse_keep_alive_ms(),
            drain_after_ms: default_drain_after_ms(),
            drain_check_interval_ms: default_drain_check_interval_ms(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
            allowed_origins: default_allowed_origins(),
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn sse_keep_alive(&self) -> Duration {
        Duration::from_millis(self.sse_keep_alive_ms)
    }

    pub fn drain_after(&self) -> Duration {
        Duration::from_millis(self.drain_after_ms)
    }

    pub fn drain_check_interval(&self) -> Duration {
        Duration::from_millis(self.drain_check_interval_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    3100
}
fn default_request_timeout_ms() -> u64 {
    300_000
}
fn default_sse_keep_alive_ms() -> u64 {
    30_000
}
fn default_drain_after_ms() -> u64 {
    60_000
}
fn default_drain_check_interval_ms() -> u64 {
    10_000
}
fn default_shutdown_grace_ms() -> u64 {
    30_000
}
fn default_allowed_origins() -> Vec<String> {
    vec![
        "http://localhost:3000".to_string(),
        "https://journium.app".to_string(),
        "https://*.journium.app".to_string(),
    ]
}

/// Where documents come from and how their routes are derived.
#[derive(Debug, Deserialize, Clone)]
pub struct DocsConfig {
    #[serde(default = "default_workspace_root")]
    pub workspace_root: PathBuf,
    /// Glob matched against paths relative to `workspace_root`.
    #[serde(default = "default_glob")]
    pub glob: String,
    /// Prefix stripped from file paths when deriving routes.
    #[serde(default = "default_docs_root")]
    pub docs_root: String,
    #[serde(default = "default_true")]
    pub use_frontmatter_routes: bool,
    /// Front-matter keys checked, in order, for an explicit route.
    #[serde(default = "default_route_keys")]
    pub route_keys: Vec<String>,
    /// Route globs omitted from the index, e.g. `/shared/**`.
    #[serde(default)]
    pub exclude_routes: Vec<String>,
    #[serde(default)]
    pub include_hidden: bool,
}

impl Default for DocsConfig {
    fn default() -> Self {
        Self {
            workspace_root: default_workspace_root(),
            glob: default_glob(),
            docs_root: default_docs_root(),
            use_frontmatter_routes: true,
            route_keys: default_route_keys(),
            exclude_routes: Vec::new(),
            include_hidden: false,
        }
    }
}

fn default_workspace_root() -> PathBuf {
    PathBuf::from(".")
}
fn default_glob() -> String {
    "content/docs/**/*.mdx".to_string()
}
fn default_docs_root() -> String {
    "content/docs".to_string()
}
fn default_true() -> bool {
    true
}
fn default_route_keys() -> Vec<String> {
    ["route", "slug", "pathname", "href"]
        .iter()
        .map(|k| k.to_string())
        .collect()
}

/// Load configuration from `path` (if given), apply environment overrides
/// and validate.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            toml::from_str(&content).with_context(|| "Failed to parse config file")?
        }
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    validate(&config)?;
    Ok(config)
}

/// Apply environment-style overrides using `lookup` to read variables.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(port) = lookup("PORT") {
        config.server.port = port
            .trim()
            .parse()
            .with_context(|| format!("PORT must be a port number, got '{}'", port))?;
    }
    if let Some(timeout) = lookup("REQUEST_TIMEOUT") {
        config.server.request_timeout_ms = timeout
            .trim()
            .parse()
            .with_context(|| format!("REQUEST_TIMEOUT must be milliseconds, got '{}'", timeout))?;
    }
    if let Some(interval) = lookup("SSE_KEEPALIVE_INTERVAL") {
        config.server.sse_keep_alive_ms = interval.trim().parse().with_context(|| {
            format!("SSE_KEEPALIVE_INTERVAL must be milliseconds, got '{}'", interval)
        })?;
    }
    if let Some(origins) = lookup("ALLOWED_ORIGINS") {
        config.server.allowed_origins = origins
            .split(',')
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect();
    }
    if let Some(glob) = lookup("DOCS_GLOB") {
        config.docs.glob = glob;
    }
    if let Some(root) = lookup("DOCS_ROOT") {
        config.docs.docs_root = root;
    }
    if let Some(root) = lookup("DOCS_WORKSPACE_ROOT") {
        config.docs.workspace_root = PathBuf::from(root);
    }
    Ok(())
}

pub fn validate(config: &Config) -> Result<()> {
    let server = &config.server;
    if server.request_timeout_ms == 0 {
        bail!("server.request_timeout_ms must be > 0");
    }
    if server.sse_keep_alive_ms == 0 {
        bail!("server.sse_keep_alive_ms must be > 0");
    }
    if server.drain_after_ms == 0 || server.drain_check_interval_ms == 0 {
        bail!("server.drain_after_ms and server.drain_check_interval_ms must be > 0");
    }

    let docs = &config.docs;
    Glob::new(&docs.glob).with_context(|| format!("Invalid docs.glob: {}", docs.glob))?;
    for pattern in &docs.exclude_routes {
        Glob::new(pattern).with_context(|| format!("Invalid docs.exclude_routes entry: {}", pattern))?;
    }
    if docs.use_frontmatter_routes && docs.route_keys.is_empty() {
        bail!("docs.route_keys must not be empty when docs.use_frontmatter_routes is enabled");
    }

    Ok(())
}
