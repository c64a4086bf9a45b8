//! JSON-RPC 2.0 message handling for the HTTP transport.
//!
//! A [`ProtocolSession`] lives for one HTTP exchange. It classifies each
//! incoming message (request, notification, or client response), dispatches
//! requests to the tool and prompt registries, and collects the replies.
//! Transport concerns (headers, SSE framing, status codes) stay in
//! [`crate::server`].

use rmcp::model::{ErrorCode, ProtocolVersion};
use rmcp::ErrorData;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::errors::ToolError;
use crate::mcp;
use crate::prompts::PromptRegistry;
use crate::tools::{ToolContext, ToolRegistry};

/// Protocol versions this server speaks, newest first.
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2025-11-25", "2025-06-18", "2025-03-26"];

pub const LATEST_PROTOCOL_VERSION: &str = "2025-11-25";

/// Assumed when a request carries no `MCP-Protocol-Version` header.
pub const DEFAULT_PROTOCOL_VERSION: &str = "2025-03-26";

pub fn is_supported_version(version: &str) -> bool {
    SUPPORTED_PROTOCOL_VERSIONS.contains(&version)
}

/// A JSON-RPC 2.0 response sent back to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorData>,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Value, error: ErrorData) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }

    /// Error reply not tied to any request id.
    pub fn bare_error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::error(Value::Null, ErrorData::new(code, message.into(), None))
    }
}

/// What one POST body produced.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Only notifications or client responses; nothing to send back.
    Accepted,
    Single(JsonRpcResponse),
    Batch(Vec<JsonRpcResponse>),
}

impl Reply {
    pub fn to_json(&self) -> Option<Value> {
        match self {
            Reply::Accepted => None,
            Reply::Single(r) => serde_json::to_value(r).ok(),
            Reply::Batch(rs) => serde_json::to_value(rs).ok(),
        }
    }
}

/// Classification of one incoming JSON value.
#[derive(Debug, PartialEq)]
enum Message {
    Request { id: Value, method: String, params: Option<Value> },
    Notification { method: String },
    Response,
    Invalid { id: Value, reason: &'static str },
}

fn classify(msg: &Value) -> Message {
    let Some(obj) = msg.as_object() else {
        return Message::Invalid { id: Value::Null, reason: "message must be an object" };
    };
    let id = obj.get("id").cloned();

    if obj.get("jsonrpc").and_then(|v| v.as_str()) != Some("2.0") {
        return Message::Invalid {
            id: id.unwrap_or(Value::Null),
            reason: "jsonrpc must be \"2.0\"",
        };
    }

    match obj.get("method") {
        Some(Value::String(method)) => match id {
            Some(id) if id.is_string() || id.is_number() => Message::Request {
                id,
                method: method.clone(),
                params: obj.get("params").cloned(),
            },
            Some(_) => Message::Invalid { id: Value::Null, reason: "id must be a string or number" },
            None => Message::Notification { method: method.clone() },
        },
        Some(_) => Message::Invalid {
            id: id.unwrap_or(Value::Null),
            reason: "method must be a string",
        },
        None if id.is_some() && (obj.contains_key("result") || obj.contains_key("error")) => {
            Message::Response
        }
        None => Message::Invalid {
            id: id.unwrap_or(Value::Null),
            reason: "missing method",
        },
    }
}

/// Parse a raw POST body. Empty or malformed input is a `-32700` reply.
pub fn parse_body(body: &[u8]) -> Result<Value, JsonRpcResponse> {
    if body.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(JsonRpcResponse::bare_error(ErrorCode::PARSE_ERROR, "Parse error: empty body"));
    }
    serde_json::from_slice(body)
        .map_err(|e| JsonRpcResponse::bare_error(ErrorCode::PARSE_ERROR, format!("Parse error: {}", e)))
}

/// Per-exchange protocol state.
pub struct ProtocolSession {
    ctx: ToolContext,
    tools: Arc<ToolRegistry>,
    prompts: Arc<PromptRegistry>,
    protocol_version: String,
    next_event_id: u64,
}

impl ProtocolSession {
    /// `protocol_version` is what the transport header announced.
    pub fn new(
        ctx: ToolContext,
        tools: Arc<ToolRegistry>,
        prompts: Arc<PromptRegistry>,
        protocol_version: impl Into<String>,
    ) -> Self {
        Self {
            ctx,
            tools,
            prompts,
            protocol_version: protocol_version.into(),
            next_event_id: 0,
        }
    }

    pub fn protocol_version(&self) -> &str {
        &self.protocol_version
    }

    /// Monotonic id for the next SSE event, starting at 1.
    pub fn next_event_id(&mut self) -> u64 {
        self.next_event_id += 1;
        self.next_event_id
    }

    /// Handle a single message or a batch.
    pub async fn handle_body(&mut self, body: Value) -> Reply {
        match body {
            Value::Array(items) if items.is_empty() => Reply::Single(JsonRpcResponse::bare_error(
                ErrorCode::INVALID_REQUEST,
                "Invalid Request: empty batch",
            )),
            Value::Array(items) => {
                let mut responses = Vec::new();
                for item in items {
                    if let Some(r) = self.handle_message(item).await {
                        responses.push(r);
                    }
                }
                if responses.is_empty() {
                    Reply::Accepted
                } else {
                    Reply::Batch(responses)
                }
            }
            single => match self.handle_message(single).await {
                Some(r) => Reply::Single(r),
                None => Reply::Accepted,
            },
        }
    }

    async fn handle_message(&mut self, msg: Value) -> Option<JsonRpcResponse> {
        match classify(&msg) {
            Message::Request { id, method, params } => {
                debug!(method = %method, id = %id, "mcp request");
                let response = match self.dispatch(&method, params).await {
                    Ok(result) => JsonRpcResponse::success(id, result),
                    Err(error) => JsonRpcResponse::error(id, error),
                };
                Some(response)
            }
            Message::Notification { method } => {
                debug!(method = %method, "mcp notification");
                None
            }
            Message::Response => {
                debug!("ignoring client response");
                None
            }
            Message::Invalid { id, reason } => Some(JsonRpcResponse::error(
                id,
                ErrorData::new(
                    ErrorCode::INVALID_REQUEST,
                    format!("Invalid Request: {}", reason),
                    None,
                ),
            )),
        }
    }

    async fn dispatch(&mut self, method: &str, params: Option<Value>) -> Result<Value, ErrorData> {
        let params = match params {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map,
            Some(_) => return Err(invalid_params("params must be an object")),
        };

        match method {
            "initialize" => Ok(self.initialize(&params)),
            "ping" => Ok(json!({})),
            "tools/list" => to_result(&mcp::list_tools(&self.tools)),
            "tools/call" => {
                let name = required_name(&params)?;
                let arguments = optional_object(&params, "arguments")?;
                let result = mcp::call_tool(&self.tools, &self.ctx, name, arguments).await?;
                to_result(&result)
            }
            "prompts/list" => to_result(&mcp::list_prompts(&self.prompts)),
            "prompts/get" => {
                let name = required_name(&params)?;
                let arguments = optional_object(&params, "arguments")?;
                let result = mcp::get_prompt(&self.prompts, name, arguments.as_ref())?;
                to_result(&result)
            }
            other => Err(ErrorData::new(
                ErrorCode::METHOD_NOT_FOUND,
                format!("Method not found: {}", other),
                None,
            )),
        }
    }

    fn initialize(&mut self, params: &Map<String, Value>) -> Value {
        let requested = params.get("protocolVersion").and_then(|v| v.as_str());
        let negotiated = match requested {
            Some(v) if is_supported_version(v) => v,
            Some(v) => {
                warn!(requested = v, "unsupported protocol version requested, offering latest");
                LATEST_PROTOCOL_VERSION
            }
            None => LATEST_PROTOCOL_VERSION,
        };
        self.protocol_version = negotiated.to_string();

        let mut info = serde_json::to_value(mcp::server_info(ProtocolVersion::LATEST))
            .unwrap_or_else(|_| json!({}));
        if let Value::Object(map) = &mut info {
            map.insert("protocolVersion".into(), json!(negotiated));
        }
        info
    }
}

fn to_result<T: Serialize>(value: &T) -> Result<Value, ErrorData> {
    serde_json::to_value(value)
        .map_err(|e| ErrorData::new(ErrorCode::INTERNAL_ERROR, e.to_string(), None))
}

fn invalid_params(msg: &str) -> ErrorData {
    ToolError::InvalidParams(msg.to_string()).into()
}

fn required_name(params: &Map<String, Value>) -> Result<&str, ErrorData> {
    params
        .get("name")
        .and_then(|v| v.as_str())
        .ok_or_else(|| invalid_params("missing required parameter: name"))
}

fn optional_object(params: &Map<String, Value>, key: &str) -> Result<Option<Map<String, Value>>, ErrorData> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map.clone())),
        Some(_) => Err(invalid_params("arguments must be an object")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DocsConfig;
    use crate::index::DocsIndex;
    use crate::models::DocRecord;

    fn session() -> ProtocolSession {
        let docs = vec![DocRecord {
            file_path: "content/docs/api.mdx".into(),
            route: "/api".into(),
            title: "API".into(),
            metadata: Default::default(),
            raw_body: "Endpoints".into(),
            resolved_body: "Endpoints".into(),
            search_text: "Endpoints".into(),
            warnings: vec![],
        }];
        let index = Arc::new(DocsIndex::from_documents(DocsConfig::default(), docs));
        ProtocolSession::new(
            ToolContext::new(index),
            Arc::new(ToolRegistry::with_builtins()),
            Arc::new(PromptRegistry::with_builtins()),
            DEFAULT_PROTOCOL_VERSION,
        )
    }

    fn single(reply: Reply) -> Value {
        match reply {
            Reply::Single(r) => serde_json::to_value(r).unwrap(),
            other => panic!("expected single reply, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_initialize_echoes_supported_version() {
        let mut s = session();
        let out = single(
            s.handle_body(json!({
                "jsonrpc": "2.0", "id": 1, "method": "initialize",
                "params": { "protocolVersion": "2025-06-18", "capabilities": {}, "clientInfo": { "name": "t", "version": "0" } }
            }))
            .await,
        );
        assert_eq!(out["result"]["protocolVersion"], "2025-06-18");
        assert_eq!(out["result"]["serverInfo"]["name"], "docs-mcp");
        assert!(out["result"]["capabilities"]["tools"].is_object());
        assert_eq!(s.protocol_version(), "2025-06-18");
    }

    #[tokio::test]
    async fn test_initialize_unknown_version_gets_latest() {
        let mut s = session();
        let out = single(
            s.handle_body(json!({
                "jsonrpc": "2.0", "id": 1, "method": "initialize",
                "params": { "protocolVersion": "1999-01-01" }
            }))
            .await,
        );
        assert_eq!(out["result"]["protocolVersion"], LATEST_PROTOCOL_VERSION);
    }

    #[tokio::test]
    async fn test_ping_and_unknown_method() {
        let mut s = session();
        let out = single(s.handle_body(json!({ "jsonrpc": "2.0", "id": "a", "method": "ping" })).await);
        assert_eq!(out["id"], "a");
        assert_eq!(out["result"], json!({}));

        let out = single(s.handle_body(json!({ "jsonrpc": "2.0", "id": 2, "method": "resources/list" })).await);
        assert_eq!(out["error"]["code"], -32601);
    }

    #[tokio::test]
    async fn test_notifications_and_responses_are_accepted() {
        let mut s = session();
        let reply = s
            .handle_body(json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }))
            .await;
        assert!(matches!(reply, Reply::Accepted));

        let reply = s.handle_body(json!({ "jsonrpc": "2.0", "id": 9, "result": {} })).await;
        assert!(matches!(reply, Reply::Accepted));
    }

    #[tokio::test]
    async fn test_bad_envelopes() {
        let mut s = session();
        let out = single(s.handle_body(json!({ "id": 1, "method": "ping" })).await);
        assert_eq!(out["error"]["code"], -32600);
        assert_eq!(out["id"], 1);

        let out = single(s.handle_body(json!("ping")).await);
        assert_eq!(out["error"]["code"], -32600);

        let out = single(s.handle_body(json!([])).await);
        assert_eq!(out["error"]["code"], -32600);
    }

    #[tokio::test]
    async fn test_batch_mixes_requests_and_notifications() {
        let mut s = session();
        let reply = s
            .handle_body(json!([
                { "jsonrpc": "2.0", "method": "notifications/initialized" },
                { "jsonrpc": "2.0", "id": 1, "method": "ping" },
                { "jsonrpc": "2.0", "id": 2, "method": "tools/list" }
            ]))
            .await;
        let Reply::Batch(responses) = reply else {
            panic!("expected batch");
        };
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[1].result.as_ref().unwrap()["tools"][0]["name"], "docs_search");
    }

    #[tokio::test]
    async fn test_tools_call() {
        let mut s = session();
        let out = single(
            s.handle_body(json!({
                "jsonrpc": "2.0", "id": 3, "method": "tools/call",
                "params": { "name": "docs_search", "arguments": { "query": "api" } }
            }))
            .await,
        );
        let text = out["result"]["content"][0]["text"].as_str().unwrap();
        let payload: Value = serde_json::from_str(text).unwrap();
        assert_eq!(payload["hits"][0]["score"], 70);
    }

    #[tokio::test]
    async fn test_tools_call_errors() {
        let mut s = session();
        let out = single(
            s.handle_body(json!({
                "jsonrpc": "2.0", "id": 4, "method": "tools/call",
                "params": { "name": "docs_search", "arguments": { "query": "" } }
            }))
            .await,
        );
        assert_eq!(out["error"]["code"], -32602);

        let out = single(
            s.handle_body(json!({
                "jsonrpc": "2.0", "id": 5, "method": "tools/call",
                "params": { "name": "nope" }
            }))
            .await,
        );
        assert_eq!(out["error"]["code"], -32601);

        let out = single(
            s.handle_body(json!({ "jsonrpc": "2.0", "id": 6, "method": "tools/call", "params": {} }))
                .await,
        );
        assert_eq!(out["error"]["code"], -32602);
    }

    #[tokio::test]
    async fn test_prompts_get() {
        let mut s = session();
        let out = single(
            s.handle_body(json!({
                "jsonrpc": "2.0", "id": 7, "method": "prompts/get",
                "params": { "name": "write_mdx_snippet", "arguments": { "topic": "auth", "style": "reference" } }
            }))
            .await,
        );
        let text = out["result"]["messages"][0]["content"]["text"].as_str().unwrap();
        assert!(text.contains("Style: reference"));
        assert_eq!(out["result"]["messages"][0]["role"], "user");
    }

    #[test]
    fn test_parse_body() {
        assert!(parse_body(b"").is_err());
        assert!(parse_body(b"  \n").is_err());
        let err = parse_body(b"{nope").unwrap_err();
        assert_eq!(serde_json::to_value(err).unwrap()["error"]["code"], -32700);
        assert!(parse_body(br#"{"jsonrpc":"2.0"}"#).is_ok());
    }

    #[test]
    fn test_event_ids_increase() {
        let mut s = session();
        assert_eq!(s.next_event_id(), 1);
        assert_eq!(s.next_event_id(), 2);
    }
}
