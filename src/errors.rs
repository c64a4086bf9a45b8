use thiserror::Error;

/// A per-document failure during a rebuild. Never aborts the rebuild.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("read error: {source} (path: {path})")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("front matter error: {message} (path: {path})")]
    FrontMatter { path: String, message: String },
}

/// Failures reported to MCP callers as structured protocol errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    #[error("invalid arguments: {0}")]
    InvalidParams(String),

    #[error("no tool registered with name: {0}")]
    UnknownTool(String),

    #[error("no prompt registered with name: {0}")]
    UnknownPrompt(String),
}

/// Reasons a connection open is refused. Both map to 503 so clients can
/// fail over to another instance.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("Server draining")]
    Draining,

    #[error("Server shutting down")]
    ShuttingDown,
}
