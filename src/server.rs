//! HTTP transport.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Draining flag, connection count and age stats |
//! | `POST` | `/reindex` | Rebuild the index, returns `{ok, count}` |
//! | `POST` | `/mcp` | JSON-RPC messages; reply as JSON or a short SSE stream |
//! | `GET`  | `/mcp` | Long-lived SSE stream with keep-alive comments |
//!
//! Any other method on `/mcp` gets `405`. The server is stateless, so there
//! are no session ids and nothing to `DELETE`.
//!
//! # Error Contract
//!
//! `/mcp` failures are JSON-RPC error objects with `id: null`. Admin
//! endpoints use:
//!
//! ```json
//! { "error": { "code": "reindex_failed", "message": "docs root not found: ..." } }
//! ```
//!
//! # CORS
//!
//! Browser origins are checked against `[server].allowed_origins` (exact
//! match or a `*` standing for one subdomain label). Credentials are
//! allowed and request headers are mirrored.

use axum::{
    body::Bytes,
    extract::{Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{
        sse::{Event, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures::stream::{self, Stream};
use rmcp::model::ErrorCode;
use serde::Serialize;
use serde_json::json;
use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::errors::LifecycleError;
use crate::index::DocsIndex;
use crate::lifecycle::{ConnectionGuard, ConnectionKind, ConnectionManager};
use crate::prompts::PromptRegistry;
use crate::protocol::{self, JsonRpcResponse, ProtocolSession, Reply};
use crate::tools::{ToolContext, ToolRegistry};

const PROTOCOL_VERSION_HEADER: &str = "mcp-protocol-version";
const STREAM_CACHE_CONTROL: &str = "no-cache, no-store, must-revalidate";

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub index: Arc<DocsIndex>,
    pub tools: Arc<ToolRegistry>,
    pub prompts: Arc<PromptRegistry>,
    pub connections: Arc<ConnectionManager>,
    origins: Arc<OriginPolicy>,
}

impl AppState {
    pub fn new(config: Config, index: Arc<DocsIndex>) -> Self {
        let connections = ConnectionManager::new(&config.server);
        let origins = Arc::new(OriginPolicy::new(&config.server.allowed_origins));
        Self {
            config: Arc::new(config),
            index,
            tools: Arc::new(ToolRegistry::with_builtins()),
            prompts: Arc::new(PromptRegistry::with_builtins()),
            connections,
            origins,
        }
    }

    fn session(&self, protocol_version: &str) -> ProtocolSession {
        ProtocolSession::new(
            ToolContext::new(self.index.clone()),
            self.tools.clone(),
            self.prompts.clone(),
            protocol_version,
        )
    }
}

/// Build the index, bind `[server]` host and port, and serve until
/// SIGINT/SIGTERM.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let index = Arc::new(DocsIndex::new(config.docs.clone()));
    index.rebuild().await?;

    let bind_addr = config.server.bind_addr();
    let listener = TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| anyhow::anyhow!("failed to bind {}: {}", bind_addr, e))?;

    serve(listener, AppState::new(config.clone(), index), shutdown_signal()).await
}

/// Serve `state` on `listener` until `shutdown` resolves.
///
/// On shutdown every tracked connection is told to close, then in-flight
/// exchanges get `shutdown_grace` to finish. Exchanges still running after
/// that abort the server and make this return an error.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    let grace = state.config.server.shutdown_grace();
    let connections = state.connections.clone();
    connections.spawn_drain_monitor();

    let (stopping_tx, stopping_rx) = tokio::sync::oneshot::channel::<()>();
    let signal = async move {
        shutdown.await;
        info!("shutdown signal received, draining");
        connections.shutdown();
        let _ = stopping_tx.send(());
    };

    let app = router(state);
    info!("docs-mcp listening on http://{}", addr);

    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(signal)
            .await
    });

    tokio::select! {
        res = &mut server => {
            res??;
            return Ok(());
        }
        _ = stopping_rx => {}
    }

    match tokio::time::timeout(grace, &mut server).await {
        Ok(res) => res??,
        Err(_) => {
            error!(
                grace_ms = grace.as_millis() as u64,
                "connections did not close in time, forcing shutdown"
            );
            server.abort();
            anyhow::bail!("forced shutdown after {}ms", grace.as_millis());
        }
    }
    info!("server stopped");
    Ok(())
}

/// Resolves on SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

pub fn router(state: AppState) -> Router {
    let origins = state.origins.clone();
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(move |origin: &HeaderValue, _| {
            origin.to_str().map(|o| origins.allows(o)).unwrap_or(false)
        }))
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(AllowHeaders::mirror_request())
        .expose_headers([HeaderName::from_static(PROTOCOL_VERSION_HEADER)])
        .allow_credentials(true);

    Router::new()
        .route("/health", get(handle_health))
        .route("/reindex", post(handle_reindex))
        .route(
            "/mcp",
            get(handle_mcp_stream)
                .post(handle_mcp_post)
                .fallback(handle_mcp_method_not_allowed),
        )
        .layer(middleware::from_fn_with_state(state.clone(), track_requests))
        .layer(cors)
        .with_state(state)
}

async fn track_requests(State(state): State<AppState>, request: Request, next: Next) -> Response {
    state.connections.record_request();
    next.run(request).await
}

// ============ Origin policy ============

#[derive(Debug, Clone, PartialEq, Eq)]
enum OriginRule {
    Exact(String),
    /// `https://*.example.com` split around the wildcard.
    Subdomain { prefix: String, suffix: String },
}

/// Allowed browser origins.
#[derive(Debug, Clone)]
pub struct OriginPolicy {
    rules: Vec<OriginRule>,
}

impl OriginPolicy {
    pub fn new(allowed: &[String]) -> Self {
        let rules = allowed
            .iter()
            .map(|entry| match entry.split_once('*') {
                Some((prefix, suffix)) => OriginRule::Subdomain {
                    prefix: prefix.to_string(),
                    suffix: suffix.to_string(),
                },
                None => OriginRule::Exact(entry.to_string()),
            })
            .collect();
        Self { rules }
    }

    pub fn allows(&self, origin: &str) -> bool {
        self.rules.iter().any(|rule| match rule {
            OriginRule::Exact(allowed) => origin == allowed,
            OriginRule::Subdomain { prefix, suffix } => origin
                .strip_prefix(prefix.as_str())
                .and_then(|rest| rest.strip_suffix(suffix.as_str()))
                .is_some_and(|label| {
                    !label.is_empty()
                        && label
                            .chars()
                            .all(|c| c.is_ascii_alphanumeric() || c == '-')
                }),
        })
    }

    /// Requests without an `Origin` header are not from a browser and pass.
    pub fn check(&self, headers: &HeaderMap) -> bool {
        match headers.get(header::ORIGIN) {
            None => true,
            Some(value) => value.to_str().map(|o| self.allows(o)).unwrap_or(false),
        }
    }
}

// ============ Error responses ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Error for the admin endpoints.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn rpc_error(status: StatusCode, code: ErrorCode, message: impl Into<String>) -> Response {
    (status, Json(JsonRpcResponse::bare_error(code, message))).into_response()
}

fn unavailable(err: LifecycleError) -> Response {
    rpc_error(StatusCode::SERVICE_UNAVAILABLE, ErrorCode::INTERNAL_ERROR, err.to_string())
}

// ============ GET /health, POST /reindex ============

async fn handle_health(State(state): State<AppState>) -> Response {
    Json(state.connections.health()).into_response()
}

async fn handle_reindex(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    let stats = state.index.rebuild().await.map_err(|e| {
        error!("reindex failed: {:#}", e);
        AppError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "reindex_failed".to_string(),
            message: format!("{:#}", e),
        }
    })?;
    info!(documents = stats.documents, "reindexed via http");
    Ok(Json(json!({ "ok": true, "count": stats.documents })))
}

// ============ /mcp ============

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReplyFormat {
    Json,
    EventStream,
}

/// Media types listed in `Accept`. `None` when the header is absent or blank.
fn media_types(headers: &HeaderMap) -> Option<Vec<String>> {
    let accept = headers.get(header::ACCEPT)?.to_str().ok()?;
    let types: Vec<String> = accept
        .split(',')
        .map(|part| {
            part.split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase()
        })
        .filter(|m| !m.is_empty())
        .collect();
    (!types.is_empty()).then_some(types)
}

/// Pick the reply format from the first supported type in `Accept`.
fn negotiate_reply(headers: &HeaderMap) -> Option<ReplyFormat> {
    let Some(types) = media_types(headers) else {
        return Some(ReplyFormat::Json);
    };
    types.iter().find_map(|m| match m.as_str() {
        "text/event-stream" => Some(ReplyFormat::EventStream),
        "application/json" | "application/*" | "*/*" => Some(ReplyFormat::Json),
        _ => None,
    })
}

fn accepts_event_stream(headers: &HeaderMap) -> bool {
    media_types(headers)
        .map(|types| types.iter().any(|m| m == "text/event-stream"))
        .unwrap_or(false)
}

fn protocol_version(headers: &HeaderMap) -> String {
    match headers.get(PROTOCOL_VERSION_HEADER).and_then(|v| v.to_str().ok()) {
        Some(v) => {
            if !protocol::is_supported_version(v) {
                warn!(version = v, "unsupported MCP-Protocol-Version header");
            }
            v.to_string()
        }
        None => protocol::DEFAULT_PROTOCOL_VERSION.to_string(),
    }
}

fn reject_origin(headers: &HeaderMap) -> Response {
    let origin = headers
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("<invalid>");
    warn!(origin, "rejected request from disallowed origin");
    rpc_error(StatusCode::FORBIDDEN, ErrorCode::INVALID_REQUEST, "Invalid Origin header")
}

fn stream_headers() -> [(HeaderName, HeaderValue); 2] {
    [
        (HeaderName::from_static("x-accel-buffering"), HeaderValue::from_static("no")),
        (header::CACHE_CONTROL, HeaderValue::from_static(STREAM_CACHE_CONTROL)),
    ]
}

async fn handle_mcp_post(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    if !state.origins.check(&headers) {
        return reject_origin(&headers);
    }
    let Some(format) = negotiate_reply(&headers) else {
        warn!("rejected POST with unsupported Accept header");
        return rpc_error(
            StatusCode::BAD_REQUEST,
            ErrorCode::INVALID_REQUEST,
            "Not Acceptable: Client must accept application/json or text/event-stream",
        );
    };
    let version = protocol_version(&headers);

    let message = match protocol::parse_body(&body) {
        Ok(message) => message,
        Err(reply) => return (StatusCode::BAD_REQUEST, Json(reply)).into_response(),
    };

    let guard = match state.connections.open(ConnectionKind::Post) {
        Ok(guard) => guard,
        Err(e) => return unavailable(e),
    };
    guard.activate();

    let mut session = state.session(&version);
    let timeout = state.config.server.request_timeout();
    let reply = match tokio::time::timeout(timeout, session.handle_body(message)).await {
        Ok(reply) => reply,
        Err(_) => {
            warn!(id = guard.id(), timeout_ms = timeout.as_millis() as u64, "request timed out");
            return rpc_error(
                StatusCode::REQUEST_TIMEOUT,
                ErrorCode::INTERNAL_ERROR,
                "Request timed out",
            );
        }
    };

    let version_header = [(
        HeaderName::from_static(PROTOCOL_VERSION_HEADER),
        HeaderValue::from_str(session.protocol_version())
            .unwrap_or_else(|_| HeaderValue::from_static(protocol::DEFAULT_PROTOCOL_VERSION)),
    )];

    match (reply, format) {
        (Reply::Accepted, _) => (StatusCode::ACCEPTED, version_header).into_response(),
        (reply, ReplyFormat::Json) => match reply.to_json() {
            Some(value) => (version_header, Json(value)).into_response(),
            None => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        },
        (reply, ReplyFormat::EventStream) => {
            let responses = match reply {
                Reply::Single(r) => vec![r],
                Reply::Batch(rs) => rs,
                Reply::Accepted => Vec::new(),
            };
            let events: Vec<Result<Event, Infallible>> = responses
                .into_iter()
                .map(|r| {
                    let data = serde_json::to_string(&r).unwrap_or_default();
                    Ok(Event::default()
                        .event("message")
                        .id(session.next_event_id().to_string())
                        .data(data))
                })
                .collect();
            (stream_headers(), version_header, Sse::new(stream::iter(events))).into_response()
        }
    }
}

async fn handle_mcp_stream(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if !state.origins.check(&headers) {
        return reject_origin(&headers);
    }
    if !accepts_event_stream(&headers) {
        return rpc_error(
            StatusCode::NOT_ACCEPTABLE,
            ErrorCode::INVALID_REQUEST,
            "Not Acceptable: Client must accept text/event-stream",
        );
    }

    let mut guard = match state.connections.open(ConnectionKind::Stream) {
        Ok(guard) => guard,
        Err(e) => return unavailable(e),
    };

    let last_event_id = headers
        .get("last-event-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("none");
    info!(id = guard.id(), last_event_id, "stream opened");

    let ticks = guard.take_keep_alive();
    let deadline = tokio::time::Instant::now() + state.config.server.request_timeout();
    let events = keep_alive_stream(StreamState {
        guard,
        ticks,
        deadline,
    });

    (stream_headers(), Sse::new(events)).into_response()
}

async fn handle_mcp_method_not_allowed(method: Method) -> Response {
    debug!(%method, "method not allowed on /mcp");
    let mut response = rpc_error(
        StatusCode::METHOD_NOT_ALLOWED,
        ErrorCode(-32000),
        "Method not allowed.",
    );
    response
        .headers_mut()
        .insert(header::ALLOW, HeaderValue::from_static("GET, POST"));
    response
}

struct StreamState {
    guard: ConnectionGuard,
    ticks: Option<mpsc::Receiver<()>>,
    deadline: tokio::time::Instant,
}

enum StreamStep {
    KeepAlive,
    End,
}

async fn next_tick(ticks: &mut Option<mpsc::Receiver<()>>) -> Option<()> {
    match ticks {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Keep-alive comments until shutdown, the deadline, or client disconnect.
/// The guard lives inside the stream, so dropping the stream closes the
/// connection.
fn keep_alive_stream(state: StreamState) -> impl Stream<Item = Result<Event, Infallible>> {
    stream::unfold(state, |mut st| async move {
        let step = {
            let StreamState {
                guard,
                ticks,
                deadline,
            } = &mut st;
            tokio::select! {
                _ = guard.closed() => StreamStep::End,
                _ = tokio::time::sleep_until(*deadline) => StreamStep::End,
                tick = next_tick(ticks) => match tick {
                    Some(()) => StreamStep::KeepAlive,
                    None => StreamStep::End,
                },
            }
        };
        match step {
            StreamStep::KeepAlive => Some((Ok(Event::default().comment("keep-alive")), st)),
            StreamStep::End => {
                debug!(id = st.guard.id(), "stream ended");
                None
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(*k, HeaderValue::from_static(v));
        }
        map
    }

    #[test]
    fn test_origin_policy() {
        let policy = OriginPolicy::new(&crate::config::ServerConfig::default().allowed_origins);
        assert!(policy.allows("http://localhost:3000"));
        assert!(policy.allows("https://journium.app"));
        assert!(policy.allows("https://docs.journium.app"));
        assert!(!policy.allows("https://a.b.journium.app"));
        assert!(!policy.allows("https://.journium.app"));
        assert!(!policy.allows("https://evil.com"));
        assert!(!policy.allows("https://journium.app.evil.com"));
        assert!(!policy.allows("http://localhost:3001"));
    }

    #[test]
    fn test_missing_origin_passes() {
        let policy = OriginPolicy::new(&[]);
        assert!(policy.check(&HeaderMap::new()));
        assert!(!policy.check(&headers(&[("origin", "https://x.test")])));
    }

    #[test]
    fn test_negotiate_reply() {
        assert_eq!(negotiate_reply(&HeaderMap::new()), Some(ReplyFormat::Json));
        assert_eq!(
            negotiate_reply(&headers(&[("accept", "application/json, text/event-stream")])),
            Some(ReplyFormat::Json)
        );
        assert_eq!(
            negotiate_reply(&headers(&[("accept", "text/event-stream, application/json")])),
            Some(ReplyFormat::EventStream)
        );
        assert_eq!(
            negotiate_reply(&headers(&[("accept", "text/html;q=0.9, */*;q=0.1")])),
            Some(ReplyFormat::Json)
        );
        assert_eq!(negotiate_reply(&headers(&[("accept", "text/html")])), None);
        assert_eq!(negotiate_reply(&headers(&[("accept", "")])), Some(ReplyFormat::Json));
        assert_eq!(negotiate_reply(&headers(&[("accept", " , ")])), Some(ReplyFormat::Json));
    }

    #[test]
    fn test_accepts_event_stream() {
        assert!(accepts_event_stream(&headers(&[("accept", "Text/Event-Stream")])));
        assert!(!accepts_event_stream(&headers(&[("accept", "application/json")])));
        assert!(!accepts_event_stream(&HeaderMap::new()));
    }
}
