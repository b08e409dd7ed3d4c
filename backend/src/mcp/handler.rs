//! MCP JSON-RPC request handler.
//!
//! Routes MCP protocol methods, tool calls and resource reads to the
//! interface source held by [`AppState`].

use crate::state::AppState;
use crate::yapi::{InterfaceSource, YapiError};
use axum::http::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error};

/// MCP protocol version we support (the HTTP + SSE transport revision).
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// URI prefix of the interface-by-path resource template.
const PATH_RESOURCE_PREFIX: &str = "yapi://interface/path/";

/// URI prefix of the interface-by-id resource template.
const ID_RESOURCE_PREFIX: &str = "yapi://interface/";

/// JSON-RPC 2.0 Request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: impl Into<Value>, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: Some(id.into()),
            method: method.into(),
            params: Some(params),
        }
    }
}

/// JSON-RPC 2.0 Response.
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Create a success response.
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response.
    pub fn error(id: Option<Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
            }),
        }
    }
}

/// JSON-RPC 2.0 Error.
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
}

/// A dispatched command that failed.
#[derive(Debug, thiserror::Error)]
pub enum McpError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error(transparent)]
    Yapi(#[from] YapiError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl McpError {
    /// JSON-RPC error code.
    pub fn code(&self) -> i32 {
        match self {
            McpError::InvalidRequest(_) => -32600,
            McpError::MethodNotFound(_) => -32601,
            McpError::InvalidParams(_) => -32602,
            McpError::Yapi(e) if e.is_not_found() => -32002,
            McpError::Yapi(_) | McpError::Serialization(_) => -32603,
        }
    }

    /// HTTP status returned by the message-submission call.
    pub fn status(&self) -> StatusCode {
        match self {
            McpError::InvalidRequest(_)
            | McpError::MethodNotFound(_)
            | McpError::InvalidParams(_) => StatusCode::BAD_REQUEST,
            McpError::Yapi(e) if e.is_not_found() => StatusCode::NOT_FOUND,
            McpError::Yapi(_) => StatusCode::BAD_GATEWAY,
            McpError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Tools exposed through `tools/call`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Tool {
    ListInterfaces,
    GetInterface,
    GetInterfaceByPath,
    GetInterfaceByName,
}

impl Tool {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "listInterfaces" => Some(Tool::ListInterfaces),
            "getInterface" => Some(Tool::GetInterface),
            "getInterfaceByPath" => Some(Tool::GetInterfaceByPath),
            "getInterfaceByName" => Some(Tool::GetInterfaceByName),
            _ => None,
        }
    }
}

/// Tool call parameters from MCP.
#[derive(Debug, Deserialize)]
struct ToolCallParams {
    name: String,
    #[serde(default)]
    arguments: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct IdArgs {
    id: String,
}

#[derive(Debug, Deserialize)]
struct PathArgs {
    path: String,
}

#[derive(Debug, Deserialize)]
struct NameArgs {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ReadResourceParams {
    uri: String,
}

/// Target of a resource URI.
#[derive(Debug, PartialEq, Eq)]
enum ResourceTarget {
    ById(String),
    ByPath(String),
}

/// Match `uri` against `yapi://interface/path/{path}` then `yapi://interface/{id}`.
fn parse_resource_uri(uri: &str) -> Option<ResourceTarget> {
    if let Some(encoded) = uri.strip_prefix(PATH_RESOURCE_PREFIX) {
        if encoded.is_empty() {
            return None;
        }
        let path = urlencoding::decode(encoded).ok()?;
        return Some(ResourceTarget::ByPath(path.into_owned()));
    }
    let id = uri.strip_prefix(ID_RESOURCE_PREFIX)?;
    if id.is_empty() || id.contains('/') {
        return None;
    }
    Some(ResourceTarget::ById(id.to_string()))
}

fn parse_params<T: DeserializeOwned>(params: Option<Value>) -> Result<T, McpError> {
    serde_json::from_value(params.unwrap_or_else(|| json!({})))
        .map_err(|e| McpError::InvalidParams(e.to_string()))
}

/// MCP request handler.
pub struct McpHandler;

impl McpHandler {
    /// Handle an MCP JSON-RPC request.
    ///
    /// Returns `Ok(None)` for notifications, which get no response.
    pub async fn handle_request(
        state: &AppState,
        request: JsonRpcRequest,
    ) -> Result<Option<JsonRpcResponse>, McpError> {
        let id = request.id.clone();
        debug!("MCP: Handling method: {}", request.method);

        if request.jsonrpc != "2.0" {
            return Err(McpError::InvalidRequest(format!(
                "unsupported jsonrpc version {}",
                request.jsonrpc
            )));
        }

        let source = state.source();
        let result = match request.method.as_str() {
            "initialize" => Self::handle_initialize(),
            "ping" => json!({}),
            "tools/list" => Self::handle_list_tools(),
            "tools/call" => Self::handle_call_tool(source, request.params).await?,
            "resources/list" => json!({ "resources": [] }),
            "resources/templates/list" => Self::handle_list_resource_templates(),
            "resources/read" => Self::handle_read_resource(source, request.params).await?,
            method if method.starts_with("notifications/") => return Ok(None),
            method => return Err(McpError::MethodNotFound(method.to_string())),
        };

        Ok(Some(JsonRpcResponse::success(id, result)))
    }

    /// Handle the initialize request.
    fn handle_initialize() -> Value {
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {
                "tools": {},
                "resources": {}
            },
            "serverInfo": {
                "name": "yapi-mcp",
                "version": env!("CARGO_PKG_VERSION")
            }
        })
    }

    /// Handle the tools/list request.
    fn handle_list_tools() -> Value {
        json!({
            "tools": [
                {
                    "name": "listInterfaces",
                    "description": "List the interfaces of the configured YAPI project (first 100)",
                    "inputSchema": {
                        "type": "object",
                        "properties": {},
                        "required": []
                    }
                },
                {
                    "name": "getInterface",
                    "description": "Get the full documentation of an interface by its id",
                    "inputSchema": {
                        "type": "object",
                        "properties": {
                            "id": {
                                "type": "string",
                                "description": "The YAPI interface id"
                            }
                        },
                        "required": ["id"]
                    }
                },
                {
                    "name": "getInterfaceByPath",
                    "description": "Get the full documentation of an interface by its request path",
                    "inputSchema": {
                        "type": "object",
                        "properties": {
                            "path": {
                                "type": "string",
                                "description": "Request path, e.g. '/api/user/login'"
                            }
                        },
                        "required": ["path"]
                    }
                },
                {
                    "name": "getInterfaceByName",
                    "description": "Get the full documentation of an interface by its title",
                    "inputSchema": {
                        "type": "object",
                        "properties": {
                            "name": {
                                "type": "string",
                                "description": "Interface title as shown in YAPI"
                            }
                        },
                        "required": ["name"]
                    }
                }
            ]
        })
    }

    fn handle_list_resource_templates() -> Value {
        json!({
            "resourceTemplates": [
                {
                    "name": "interface",
                    "uriTemplate": "yapi://interface/{id}",
                    "description": "Interface documentation by id",
                    "mimeType": "application/json"
                },
                {
                    "name": "interfaceByPath",
                    "uriTemplate": "yapi://interface/path/{path}",
                    "description": "Interface documentation by request path (percent-encoded)",
                    "mimeType": "application/json"
                }
            ]
        })
    }

    /// Handle a tools/call request.
    async fn handle_call_tool(
        source: &dyn InterfaceSource,
        params: Option<Value>,
    ) -> Result<Value, McpError> {
        let ToolCallParams { name, arguments } = parse_params(params)?;
        let tool = Tool::from_name(&name)
            .ok_or_else(|| McpError::InvalidParams(format!("Unknown tool: {}", name)))?;
        debug!("MCP: Calling tool {}", name);

        let document = Self::run_tool(source, tool, arguments)
            .await
            .inspect_err(|e| error!("MCP: tool {} failed: {}", name, e))?;

        Ok(json!({
            "content": [{
                "type": "text",
                "text": serde_json::to_string_pretty(&document)?
            }]
        }))
    }

    async fn run_tool(
        source: &dyn InterfaceSource,
        tool: Tool,
        arguments: Option<Value>,
    ) -> Result<Value, McpError> {
        let document = match tool {
            Tool::ListInterfaces => serde_json::to_value(source.list_interfaces().await?)?,
            Tool::GetInterface => {
                let args: IdArgs = parse_params(arguments)?;
                source.get_interface(&args.id).await?
            }
            Tool::GetInterfaceByPath => {
                let args: PathArgs = parse_params(arguments)?;
                source.get_interface_by_path(&args.path).await?
            }
            Tool::GetInterfaceByName => {
                let args: NameArgs = parse_params(arguments)?;
                source.get_interface_by_name(&args.name).await?
            }
        };
        Ok(document)
    }

    /// Handle a resources/read request.
    async fn handle_read_resource(
        source: &dyn InterfaceSource,
        params: Option<Value>,
    ) -> Result<Value, McpError> {
        let params: ReadResourceParams = parse_params(params)?;
        let target = parse_resource_uri(&params.uri)
            .ok_or_else(|| McpError::InvalidParams(format!("Unknown resource: {}", params.uri)))?;

        let document = match target {
            ResourceTarget::ById(id) => source.get_interface(&id).await,
            ResourceTarget::ByPath(path) => source.get_interface_by_path(&path).await,
        }
        .inspect_err(|e| error!("MCP: reading {} failed: {}", params.uri, e))?;

        Ok(json!({
            "contents": [{
                "uri": params.uri,
                "mimeType": "application/json",
                "text": serde_json::to_string_pretty(&document)?
            }]
        }))
    }
}
