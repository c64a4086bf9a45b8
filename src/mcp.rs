//! MCP model bridge.
//!
//! Converts the [`ToolRegistry`] and [`PromptRegistry`] into rmcp model
//! types and runs tool calls. The HTTP transport in [`crate::protocol`]
//! and the stdio transport ([`DocsMcp`] as an rmcp [`ServerHandler`]) share
//! these conversions, so both expose identical tools and prompts.

use std::borrow::Cow;
use std::sync::Arc;

use rmcp::model::*;
use rmcp::{ErrorData as McpError, ServerHandler};
use serde_json::{Map, Value};
use tracing::debug;

use crate::errors::ToolError;
use crate::index::DocsIndex;
use crate::prompts::{PromptRegistry, PromptTemplate, RenderedPrompt};
use crate::tools::{self, ToolContext, ToolRegistry};

pub const SERVER_NAME: &str = "docs-mcp";

const INSTRUCTIONS: &str = "Documentation MCP server. Search and retrieve pages from the indexed docs.\n\n\
Use the tools to:\n\
- docs_search: Search for information about features, APIs, and concepts\n\
- docs_getPage: Retrieve full documentation pages with MDX content\n\
- docs_listRoutes: Explore the documentation structure by listing available routes\n\n\
The prompts provide pre-configured workflows for answering questions from the docs or writing new docs.";

impl From<ToolError> for McpError {
    fn from(err: ToolError) -> Self {
        let code = match err {
            ToolError::InvalidParams(_) => ErrorCode::INVALID_PARAMS,
            ToolError::UnknownTool(_) | ToolError::UnknownPrompt(_) => ErrorCode::METHOD_NOT_FOUND,
        };
        McpError::new(code, err.to_string(), None)
    }
}

/// Server identity and capabilities, reported on `initialize`.
pub fn server_info(protocol_version: ProtocolVersion) -> ServerInfo {
    ServerInfo {
        protocol_version,
        capabilities: ServerCapabilities::builder()
            .enable_tools()
            .enable_prompts()
            .build(),
        server_info: Implementation {
            name: SERVER_NAME.to_string(),
            title: Some("Documentation MCP".to_string()),
            version: env!("CARGO_PKG_VERSION").to_string(),
            description: None,
            icons: None,
            website_url: None,
        },
        instructions: Some(INSTRUCTIONS.to_string()),
    }
}

/// rmcp descriptor for a registered tool.
pub fn to_mcp_tool(tool: &dyn tools::Tool) -> Tool {
    let input_schema: Arc<Map<String, Value>> = match tool.parameters_schema() {
        Value::Object(map) => Arc::new(map),
        _ => Arc::new(Map::new()),
    };

    Tool {
        name: Cow::Owned(tool.name().to_string()),
        title: Some(tool.title().to_string()),
        description: Some(Cow::Owned(tool.description().to_string())),
        input_schema,
        output_schema: None,
        annotations: Some(ToolAnnotations::new().read_only(true)),
        execution: None,
        icons: None,
        meta: None,
    }
}

/// rmcp descriptor for a prompt template.
pub fn to_mcp_prompt(prompt: &dyn PromptTemplate) -> Prompt {
    let args = prompt.arguments();
    let arguments = if args.is_empty() {
        None
    } else {
        Some(
            args.into_iter()
                .map(|a| PromptArgument {
                    name: a.name.to_string(),
                    title: None,
                    description: Some(a.description.to_string()),
                    required: Some(a.required),
                })
                .collect(),
        )
    };

    Prompt {
        name: prompt.name().to_string(),
        title: Some(prompt.title().to_string()),
        description: Some(prompt.description().to_string()),
        arguments,
        icons: None,
        meta: None,
    }
}

pub fn list_tools(registry: &ToolRegistry) -> ListToolsResult {
    ListToolsResult::with_all_items(
        registry
            .tools()
            .iter()
            .map(|t| to_mcp_tool(t.as_ref()))
            .collect(),
    )
}

pub fn list_prompts(registry: &PromptRegistry) -> ListPromptsResult {
    ListPromptsResult::with_all_items(
        registry
            .prompts()
            .iter()
            .map(|p| to_mcp_prompt(p.as_ref()))
            .collect(),
    )
}

/// Validate and run one tool call.
///
/// Unknown tools and schema violations are protocol errors. A failure
/// inside the tool itself becomes an `isError` result.
pub async fn call_tool(
    registry: &ToolRegistry,
    ctx: &ToolContext,
    name: &str,
    arguments: Option<Map<String, Value>>,
) -> Result<CallToolResult, ToolError> {
    let tool = registry
        .find(name)
        .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;

    let raw = arguments.map(Value::Object).unwrap_or(Value::Null);
    let params = tools::validate_params(&tool.parameters_schema(), &raw)?;
    debug!(tool = name, "calling tool");

    match tool.execute(params, ctx).await {
        Ok(result) => {
            let text = serde_json::to_string_pretty(&result).unwrap_or_default();
            Ok(CallToolResult::success(vec![Content::text(text)]))
        }
        Err(e) => Ok(CallToolResult::error(vec![Content::text(e.to_string())])),
    }
}

pub fn get_prompt(
    registry: &PromptRegistry,
    name: &str,
    arguments: Option<&Map<String, Value>>,
) -> Result<GetPromptResult, ToolError> {
    let RenderedPrompt { description, text } = registry.render(name, arguments)?;
    Ok(GetPromptResult {
        description: Some(description),
        messages: vec![PromptMessage::new_text(PromptMessageRole::User, text)],
    })
}

/// rmcp server handler used for `serve --stdio`.
#[derive(Clone)]
pub struct DocsMcp {
    ctx: ToolContext,
    tools: Arc<ToolRegistry>,
    prompts: Arc<PromptRegistry>,
}

impl DocsMcp {
    pub fn new(index: Arc<DocsIndex>, tools: Arc<ToolRegistry>, prompts: Arc<PromptRegistry>) -> Self {
        Self {
            ctx: ToolContext::new(index),
            tools,
            prompts,
        }
    }
}

impl ServerHandler for DocsMcp {
    fn get_info(&self) -> ServerInfo {
        server_info(ProtocolVersion::LATEST)
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, McpError>> + Send + '_ {
        std::future::ready(Ok(list_tools(&self.tools)))
    }

    fn get_tool(&self, name: &str) -> Option<Tool> {
        self.tools.find(name).map(to_mcp_tool)
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        Ok(call_tool(&self.tools, &self.ctx, &request.name, request.arguments).await?)
    }

    fn list_prompts(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListPromptsResult, McpError>> + Send + '_ {
        std::future::ready(Ok(list_prompts(&self.prompts)))
    }

    async fn get_prompt(
        &self,
        request: GetPromptRequestParams,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> Result<GetPromptResult, McpError> {
        Ok(get_prompt(&self.prompts, &request.name, request.arguments.as_ref())?)
    }
}
