//! MCP tools over the document index.
//!
//! Every tool implements [`Tool`] and is registered in a [`ToolRegistry`].
//! Arguments are checked against the tool's JSON schema by
//! [`validate_params`] before [`Tool::execute`] runs, so a malformed call is
//! reported as [`ToolError::InvalidParams`] and never reaches the index.
//!
//! | Tool | Arguments | Result |
//! |------|-----------|--------|
//! | `docs_search` | `query`, `limit?` (1..=25) | `{query, hits}` |
//! | `docs_getPage` | `route?`, `filePath?`, `include?` | page payload or `{error: "Not found"}` |
//! | `docs_listRoutes` | `prefix?` | `{prefix, routes}` |

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;

use crate::errors::ToolError;
use crate::index::{DocsIndex, DEFAULT_SEARCH_LIMIT, MAX_SEARCH_LIMIT};

/// A callable MCP tool.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Wire name, e.g. `"docs_search"`.
    fn name(&self) -> &str;

    /// Human-readable title for tool pickers.
    fn title(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema (`type: "object"`) for the arguments.
    fn parameters_schema(&self) -> Value;

    /// Run with arguments already validated against
    /// [`parameters_schema`](Tool::parameters_schema).
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value>;
}

/// Read-only access to the index for tool implementations.
#[derive(Clone)]
pub struct ToolContext {
    index: Arc<DocsIndex>,
}

impl ToolContext {
    pub fn new(index: Arc<DocsIndex>) -> Self {
        Self { index }
    }

    pub fn index(&self) -> &DocsIndex {
        &self.index
    }
}

// ============ docs_search ============

pub struct SearchTool;

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &str {
        "docs_search"
    }

    fn title(&self) -> &str {
        "Search Documentation"
    }

    fn description(&self) -> &str {
        "Search the documentation. Returns matching pages with excerpts showing the matched content. \
         Use this to find information about specific features, APIs, or concepts."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "minLength": 1, "description": "Search query string" },
                "limit": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": MAX_SEARCH_LIMIT,
                    "default": DEFAULT_SEARCH_LIMIT,
                    "description": "Maximum number of results to return (default: 8)"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let query = params["query"].as_str().unwrap_or_default();
        let limit = params["limit"]
            .as_u64()
            .map(|l| l as usize)
            .unwrap_or(DEFAULT_SEARCH_LIMIT)
            .min(MAX_SEARCH_LIMIT);

        let hits = ctx.index().search(query, limit);
        Ok(json!({ "query": query, "hits": hits }))
    }
}

// ============ docs_getPage ============

pub struct GetPageTool;

#[async_trait]
impl Tool for GetPageTool {
    fn name(&self) -> &str {
        "docs_getPage"
    }

    fn title(&self) -> &str {
        "Get Documentation Page"
    }

    fn description(&self) -> &str {
        "Retrieve the full content of a documentation page by its route (URL path) or file path. \
         Returns the resolved MDX content, plain text, and frontmatter metadata. \
         Use this after searching to get complete details about a page."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "route": { "type": "string", "description": "URL route of the page (e.g., /docs/getting-started)" },
                "filePath": { "type": "string", "description": "File system path to the documentation file" },
                "include": {
                    "type": "object",
                    "description": "Which parts of the page to return (all default to true)",
                    "properties": {
                        "mdx": { "type": "boolean", "description": "Include MDX content with includes resolved" },
                        "text": { "type": "boolean", "description": "Include plain text content" },
                        "frontmatter": { "type": "boolean", "description": "Include frontmatter metadata" }
                    }
                }
            }
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let route = params["route"].as_str().filter(|r| !r.is_empty());
        let file_path = params["filePath"].as_str().filter(|p| !p.is_empty());

        let snapshot = ctx.index().snapshot();
        let doc = route
            .and_then(|r| snapshot.get_by_route(r))
            .or_else(|| file_path.and_then(|p| snapshot.get_by_file_path(p)));

        let Some(doc) = doc else {
            return Ok(json!({ "error": "Not found" }));
        };

        let include = &params["include"];
        let wants = |part: &str| include[part].as_bool().unwrap_or(true);

        let mut payload = Map::new();
        payload.insert("route".into(), json!(doc.route));
        payload.insert("title".into(), json!(doc.title));
        payload.insert("filePath".into(), json!(doc.file_path));
        if wants("frontmatter") {
            payload.insert("frontmatter".into(), Value::Object(doc.metadata.clone()));
        }
        if wants("mdx") {
            payload.insert("mdx".into(), json!(doc.resolved_body));
        }
        if wants("text") {
            payload.insert("text".into(), json!(doc.search_text));
        }
        Ok(Value::Object(payload))
    }
}

// ============ docs_listRoutes ============

pub struct ListRoutesTool;

#[async_trait]
impl Tool for ListRoutesTool {
    fn name(&self) -> &str {
        "docs_listRoutes"
    }

    fn title(&self) -> &str {
        "List Documentation Routes"
    }

    fn description(&self) -> &str {
        "List the available documentation page routes. Optionally filter by a route prefix \
         to explore one section of the docs."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "prefix": { "type": "string", "description": "Optional prefix to filter routes (e.g., /docs/api)" }
            }
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let prefix = params["prefix"].as_str();
        let routes = ctx.index().list_routes(prefix);
        Ok(json!({ "prefix": prefix, "routes": routes }))
    }
}

// ============ Registry ============

/// Ordered collection of tools.
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Registry with `docs_search`, `docs_getPage` and `docs_listRoutes`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(SearchTool));
        registry.register(Box::new(GetPageTool));
        registry.register(Box::new(ListRoutesTool));
        registry
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn tools(&self) -> &[Box<dyn Tool>] {
        &self.tools
    }

    pub fn find(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ============ Validation ============

/// Check `params` against a tool schema and inject defaults.
///
/// Supports `required`, `type`, `enum`, `minLength`, `minimum`, `maximum`
/// and nested `object` properties. Unknown properties pass through.
pub fn validate_params(schema: &Value, params: &Value) -> Result<Value, ToolError> {
    let obj = match params {
        Value::Null => Map::new(),
        Value::Object(map) => map.clone(),
        other => {
            return Err(ToolError::InvalidParams(format!(
                "arguments must be an object, got {}",
                json_type_name(other)
            )))
        }
    };
    validate_object(schema, obj, "").map(Value::Object)
}

fn validate_object(schema: &Value, obj: Map<String, Value>, path: &str) -> Result<Map<String, Value>, ToolError> {
    let properties = schema
        .get("properties")
        .and_then(|p| p.as_object())
        .cloned()
        .unwrap_or_default();

    let required = schema
        .get("required")
        .and_then(|r| r.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str()).collect::<Vec<_>>())
        .unwrap_or_default();

    for field in required {
        if !obj.contains_key(field) {
            return Err(ToolError::InvalidParams(format!(
                "missing required parameter: {}{}",
                path, field
            )));
        }
    }

    let mut result = obj.clone();
    for (name, prop) in &properties {
        let label = format!("{}{}", path, name);
        match obj.get(name) {
            Some(value) => {
                let checked = validate_value(prop, value, &label)?;
                result.insert(name.clone(), checked);
            }
            None => {
                if let Some(default) = prop.get("default") {
                    result.insert(name.clone(), default.clone());
                }
            }
        }
    }
    Ok(result)
}

fn validate_value(prop: &Value, value: &Value, label: &str) -> Result<Value, ToolError> {
    let invalid = |msg: String| Err(ToolError::InvalidParams(msg));

    if let Some(expected) = prop.get("type").and_then(|t| t.as_str()) {
        let type_ok = match expected {
            "string" => value.is_string(),
            "integer" => value.is_i64() || value.is_u64(),
            "number" => value.is_number(),
            "boolean" => value.is_boolean(),
            "array" => value.is_array(),
            "object" => value.is_object(),
            _ => true,
        };
        if !type_ok {
            return invalid(format!(
                "parameter '{}' must be of type '{}', got {}",
                label,
                expected,
                json_type_name(value)
            ));
        }
    }

    if let Some(allowed) = prop.get("enum").and_then(|e| e.as_array()) {
        if !allowed.contains(value) {
            let names: Vec<String> = allowed.iter().map(|v| v.to_string()).collect();
            return invalid(format!(
                "parameter '{}' must be one of [{}], got {}",
                label,
                names.join(", "),
                value
            ));
        }
    }

    if let (Some(min_len), Some(s)) = (prop.get("minLength").and_then(|m| m.as_u64()), value.as_str()) {
        if (s.chars().count() as u64) < min_len {
            return invalid(format!(
                "parameter '{}' must be at least {} character(s)",
                label, min_len
            ));
        }
    }

    if let Some(n) = value.as_f64() {
        if let Some(min) = prop.get("minimum").and_then(|m| m.as_f64()) {
            if n < min {
                return invalid(format!("parameter '{}' must be >= {}", label, min));
            }
        }
        if let Some(max) = prop.get("maximum").and_then(|m| m.as_f64()) {
            if n > max {
                return invalid(format!("parameter '{}' must be <= {}", label, max));
            }
        }
    }

    if let Value::Object(map) = value {
        if prop.get("properties").is_some() {
            let nested = validate_object(prop, map.clone(), &format!("{}.", label))?;
            return Ok(Value::Object(nested));
        }
    }

    Ok(value.clone())
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
