//! MCP server implementation for CSV file analysis.
//!
//! This module implements the MCP server lifecycle:
//!
//! 1. **Initialisation**: Capability negotiation and version agreement
//! 2. **Operation**: Handling tool calls and resource reads
//! 3. **Shutdown**: Graceful termination on EOF or signal
//!
//! Tool and resource handlers never fail at the protocol level: problems with
//! files, columns or queries come back as a JSON `{"error": ...}` text payload.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::analyzer::{render, AnalyzerError, AnalyzerResult, CsvAnalyzer, Rendered};
use crate::mcp::protocol::{
    parse_message, IncomingMessage, JsonRpcError, JsonRpcNotification, JsonRpcRequest,
    JsonRpcResponse, RequestId, MCP_PROTOCOL_VERSION, SERVER_NAME,
};
use crate::mcp::resources::{self, ReadResourceParams};
use crate::mcp::transport::{StdioTransport, Transport};

/// Server state in the MCP lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Waiting for initialize request.
    AwaitingInit,
    /// Initialize received, waiting for initialized notification.
    Initialising,
    /// Ready for normal operation.
    Running,
    /// Shutdown in progress.
    ShuttingDown,
}

/// Server capabilities advertised during initialisation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ServerCapabilities {
    /// Tool-related capabilities.
    pub tools: ListChangedCapability,
    /// Resource-related capabilities.
    pub resources: ResourceCapabilities,
}

/// Capability flag shared by tools and resources.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ListChangedCapability {
    /// Whether the list can change during the session.
    #[serde(rename = "listChanged")]
    pub list_changed: bool,
}

/// Resource-specific capabilities.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceCapabilities {
    /// Whether clients may subscribe to resource updates.
    pub subscribe: bool,
    /// Whether the resource list can change during the session.
    pub list_changed: bool,
}

#[allow(clippy::trivially_copy_pass_by_ref)] // serde's skip_serializing_if requires a predicate fn(&T) -> bool
const fn is_false(b: &bool) -> bool {
    !*b
}

/// Server information for initialisation response.
#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    /// Server name.
    pub name: String,
    /// Server version.
    pub version: String,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            name: SERVER_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Client information received during initialisation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    /// Client name.
    pub name: String,
    /// Client version.
    #[serde(default)]
    pub version: Option<String>,
}

/// Parameters for the initialize request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    /// Protocol version requested by client.
    pub protocol_version: String,
    /// Client capabilities.
    #[serde(default)]
    pub capabilities: Value,
    /// Client information.
    #[serde(default)]
    pub client_info: Option<ClientInfo>,
}

/// A tool definition for tools/list response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for the tool's input parameters.
    pub input_schema: Value,
}

/// Parameters for tools/call request.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallParams {
    /// Name of the tool to call.
    pub name: String,
    /// Arguments for the tool.
    #[serde(default)]
    pub arguments: Value,
}

/// Content item in a tool call response.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    /// Text content.
    Text {
        /// The text content.
        text: String,
    },
}

/// Result of a tool call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResult {
    /// Content returned by the tool.
    pub content: Vec<ToolContent>,
    /// Whether the tool call resulted in an error.
    #[serde(skip_serializing_if = "is_false")]
    pub is_error: bool,
}

impl ToolCallResult {
    /// Wraps a rendered envelope, carrying over its error flag.
    #[must_use]
    pub fn from_rendered(rendered: Rendered) -> Self {
        Self {
            content: vec![ToolContent::Text {
                text: rendered.text,
            }],
            is_error: rendered.is_error,
        }
    }

    /// Serialises an operation outcome into a tool result.
    #[must_use]
    pub fn from_result<T: Serialize>(result: &AnalyzerResult<T>) -> Self {
        Self::from_rendered(render(result))
    }
}

/// The MCP server for CSV file analysis.
pub struct McpServer<R = tokio::io::Stdin, W = tokio::io::Stdout> {
    /// Current server state.
    state: ServerState,
    /// The transport layer.
    transport: Transport<R, W>,
    /// Negotiated protocol version (set after initialisation).
    protocol_version: Option<String>,
    /// The CSV operations.
    analyzer: CsvAnalyzer,
}

impl McpServer {
    /// Creates a server speaking over stdin/stdout.
    #[must_use]
    pub fn new(analyzer: CsvAnalyzer) -> Self {
        Self::with_transport(analyzer, StdioTransport::stdio())
    }
}

impl<R, W> McpServer<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Creates a server over an arbitrary transport.
    pub const fn with_transport(analyzer: CsvAnalyzer, transport: Transport<R, W>) -> Self {
        Self {
            state: ServerState::AwaitingInit,
            transport,
            protocol_version: None,
            analyzer,
        }
    }

    /// Returns the current server state.
    #[must_use]
    pub const fn state(&self) -> ServerState {
        self.state
    }

    /// Returns the negotiated protocol version, once initialised.
    #[must_use]
    pub fn protocol_version(&self) -> Option<&str> {
        self.protocol_version.as_deref()
    }

    /// Returns the transport (useful for inspecting in-memory output).
    #[must_use]
    pub const fn transport(&self) -> &Transport<R, W> {
        &self.transport
    }

    /// Runs the MCP server main loop with graceful shutdown handling.
    ///
    /// # Errors
    ///
    /// Returns an error if transport I/O fails.
    pub async fn run(&mut self) -> std::io::Result<()> {
        self.run_with_shutdown().await
    }

    /// Processes messages until the input is closed, without signal handling.
    ///
    /// # Errors
    ///
    /// Returns an error if transport I/O fails.
    pub async fn serve(&mut self) -> std::io::Result<()> {
        loop {
            let line_result = self.transport.read_line().await;
            if self.handle_transport_result(line_result).await? {
                return Ok(());
            }
        }
    }

    /// Runs the main loop and handles shutdown.
    #[cfg(unix)]
    async fn run_with_shutdown(&mut self) -> std::io::Result<()> {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt()).map_err(std::io::Error::other)?;
        let mut sigterm = signal(SignalKind::terminate()).map_err(std::io::Error::other)?;

        loop {
            tokio::select! {
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT, initiating graceful shutdown");
                    self.state = ServerState::ShuttingDown;
                    return Ok(());
                }

                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM, initiating graceful shutdown");
                    self.state = ServerState::ShuttingDown;
                    return Ok(());
                }

                line_result = self.transport.read_line() => {
                    if self.handle_transport_result(line_result).await? {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Runs the main loop and handles shutdown.
    #[cfg(windows)]
    async fn run_with_shutdown(&mut self) -> std::io::Result<()> {
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        loop {
            tokio::select! {
                _ = &mut ctrl_c => {
                    tracing::info!("Received Ctrl+C, initiating graceful shutdown");
                    self.state = ServerState::ShuttingDown;
                    return Ok(());
                }

                line_result = self.transport.read_line() => {
                    if self.handle_transport_result(line_result).await? {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Handles the result from transport read.
    ///
    /// Returns `true` if the server should shut down.
    async fn handle_transport_result(
        &mut self,
        line_result: std::io::Result<Option<String>>,
    ) -> std::io::Result<bool> {
        let Some(line) = line_result? else {
            tracing::debug!("Input closed");
            self.state = ServerState::ShuttingDown;
            return Ok(true);
        };

        if line.trim().is_empty() {
            return Ok(false);
        }

        self.handle_line(&line).await?;

        Ok(self.state == ServerState::ShuttingDown)
    }

    /// Handles a single line of input.
    async fn handle_line(&mut self, line: &str) -> std::io::Result<()> {
        match parse_message(line) {
            Ok(IncomingMessage::Request(req)) => {
                tracing::debug!(id = %req.id, method = %req.method, "Request");
                match self.handle_request(&req) {
                    Ok(resp) => self.transport.write_message(&resp).await,
                    Err(error) => self.transport.write_message(&error).await,
                }
            }
            Ok(IncomingMessage::Notification(notif)) => {
                self.handle_notification(&notif);
                Ok(())
            }
            Err(error) => {
                tracing::warn!(code = error.error.code, "Rejected malformed message");
                self.transport.write_message(&error).await
            }
        }
    }

    /// Dispatches a request to its handler.
    ///
    /// # Errors
    ///
    /// Returns a JSON-RPC error for unknown methods, lifecycle violations or
    /// malformed parameters.
    pub fn handle_request(&mut self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        match req.method.as_str() {
            "initialize" => self.handle_initialize(req),
            "ping" => Ok(JsonRpcResponse::success(req.id.clone(), json!({}))),
            "tools/list" => self.handle_tools_list(req),
            "tools/call" => self.handle_tools_call(req),
            "resources/list" => self.handle_resources_list(req),
            "resources/templates/list" => self.handle_resource_templates_list(req),
            "resources/read" => self.handle_resources_read(req),
            _ => Err(JsonRpcError::method_not_found(req.id.clone(), &req.method)),
        }
    }

    /// Handles an incoming notification.
    pub fn handle_notification(&mut self, notif: &JsonRpcNotification) {
        if notif.method == "notifications/initialized" && self.state == ServerState::Initialising {
            tracing::info!("Client initialised, server running");
            self.state = ServerState::Running;
        }
    }

    /// Handles the initialize request.
    fn handle_initialize(&mut self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        if self.state != ServerState::AwaitingInit {
            return Err(JsonRpcError::invalid_request_with(
                req.id.clone(),
                "Server already initialised",
            ));
        }

        let params: InitializeParams = req.parse_params("initialize")?;
        tracing::info!(
            client = params.client_info.as_ref().map_or("unknown", |c| c.name.as_str()),
            requested_version = %params.protocol_version,
            "Initialising session"
        );

        let negotiated_version = MCP_PROTOCOL_VERSION.to_string();
        self.protocol_version = Some(negotiated_version.clone());
        self.state = ServerState::Initialising;

        let result = json!({
            "protocolVersion": negotiated_version,
            "capabilities": ServerCapabilities::default(),
            "serverInfo": ServerInfo::default(),
        });

        Ok(JsonRpcResponse::success(req.id.clone(), result))
    }

    /// Handles the tools/list request.
    fn handle_tools_list(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        self.require_running(&req.id)?;

        Ok(JsonRpcResponse::success(
            req.id.clone(),
            json!({ "tools": Self::get_tool_definitions() }),
        ))
    }

    /// Handles the tools/call request.
    fn handle_tools_call(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        self.require_running(&req.id)?;

        let params: ToolCallParams = req.parse_params("tool call")?;
        tracing::debug!(tool = %params.name, "Tool call");

        let args = &params.arguments;
        let result = match params.name.as_str() {
            "read_csv" => self.call_read_csv(args),
            "get_csv_info" => self.call_get_csv_info(args),
            "query_csv" => self.call_query_csv(args),
            "get_csv_statistics" => self.call_get_csv_statistics(args),
            name => ToolCallResult::from_result::<()>(&Err(AnalyzerError::UnknownTool {
                name: name.to_string(),
            })),
        };

        let result_value = serde_json::to_value(&result).map_err(|e| {
            tracing::error!(error = %e, "Failed to serialise tool call result");
            JsonRpcError::internal_error(
                req.id.clone(),
                "Internal error: failed to serialise result",
            )
        })?;

        Ok(JsonRpcResponse::success(req.id.clone(), result_value))
    }

    /// Handles the resources/list request.
    fn handle_resources_list(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        self.require_running(&req.id)?;

        Ok(JsonRpcResponse::success(
            req.id.clone(),
            json!({ "resources": resources::list_resources() }),
        ))
    }

    /// Handles the resources/templates/list request.
    fn handle_resource_templates_list(
        &self,
        req: &JsonRpcRequest,
    ) -> Result<JsonRpcResponse, JsonRpcError> {
        self.require_running(&req.id)?;

        Ok(JsonRpcResponse::success(
            req.id.clone(),
            json!({ "resourceTemplates": resources::list_templates() }),
        ))
    }

    /// Handles the resources/read request.
    fn handle_resources_read(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        self.require_running(&req.id)?;

        let params: ReadResourceParams = req.parse_params("resource read")?;
        let content = resources::read_resource(&self.analyzer, &params.uri)
            .ok_or_else(|| JsonRpcError::resource_not_found(req.id.clone(), &params.uri))?;

        Ok(JsonRpcResponse::success(
            req.id.clone(),
            json!({ "contents": [content] }),
        ))
    }

    /// Ensures the server is in the Running state.
    fn require_running(&self, id: &RequestId) -> Result<(), JsonRpcError> {
        if self.state != ServerState::Running {
            return Err(JsonRpcError::invalid_request_with(
                id.clone(),
                "Server not initialised",
            ));
        }
        Ok(())
    }

    /// Returns the list of available tools.
    fn get_tool_definitions() -> Vec<ToolDefinition> {
        vec![
            ToolDefinition {
                name: "read_csv".to_string(),
                description: Some(
                    "Read a CSV file and return its contents as an array of row objects. \
                     Use rows to return only the first N rows; omit it (or pass 0) to \
                     return every row."
                        .to_string(),
                ),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "filename": {
                            "type": "string",
                            "description": "Name of the CSV file to read"
                        },
                        "rows": {
                            "type": "integer",
                            "description": "Optional: number of rows to return (default: all)"
                        }
                    },
                    "required": ["filename"]
                }),
            },
            ToolDefinition {
                name: "get_csv_info".to_string(),
                description: Some(
                    "Get detailed information about a CSV file: shape, column names, \
                     inferred types, missing values per column, estimated memory usage, \
                     and which columns are numeric or categorical."
                        .to_string(),
                ),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "filename": {
                            "type": "string",
                            "description": "Name of the CSV file"
                        }
                    },
                    "required": ["filename"]
                }),
            },
            ToolDefinition {
                name: "query_csv".to_string(),
                description: Some(
                    "Filter the rows of a CSV file with a boolean expression, e.g. \
                     \"age > 30 and city == 'NYC'\". Supports ==, !=, <, <=, >, >=, \
                     in / not in [...], and / or / not (also &, |, ~), parentheses, \
                     numbers, quoted strings, True, False and None. Quote column names \
                     containing spaces with backticks."
                        .to_string(),
                ),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "filename": {
                            "type": "string",
                            "description": "Name of the CSV file"
                        },
                        "query": {
                            "type": "string",
                            "description": "Filter expression (e.g., \"age > 30 and city == 'NYC'\")"
                        }
                    },
                    "required": ["filename", "query"]
                }),
            },
            ToolDefinition {
                name: "get_csv_statistics".to_string(),
                description: Some(
                    "Get a statistical summary of a CSV file or of one column. Numeric \
                     columns report count, mean, std, min, 25%, 50%, 75% and max; other \
                     columns report count, unique, top and freq."
                        .to_string(),
                ),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "filename": {
                            "type": "string",
                            "description": "Name of the CSV file"
                        },
                        "column": {
                            "type": "string",
                            "description": "Optional: specific column to analyse"
                        }
                    },
                    "required": ["filename"]
                }),
            },
        ]
    }

    // ==================== Tool Handlers ====================

    /// Reads a CSV file, optionally truncated.
    fn call_read_csv(&self, arguments: &Value) -> ToolCallResult {
        let result = required_str(arguments, "filename").and_then(|filename| {
            let rows = arguments.get("rows").and_then(Value::as_i64);
            self.analyzer.read(filename, rows)
        });
        ToolCallResult::from_result(&result)
    }

    /// Describes the structure of a CSV file.
    fn call_get_csv_info(&self, arguments: &Value) -> ToolCallResult {
        let result =
            required_str(arguments, "filename").and_then(|filename| self.analyzer.info(filename));
        ToolCallResult::from_result(&result)
    }

    /// Filters a CSV file.
    fn call_query_csv(&self, arguments: &Value) -> ToolCallResult {
        let result = required_str(arguments, "filename").and_then(|filename| {
            let query = required_str(arguments, "query")?;
            self.analyzer.query(filename, query)
        });
        ToolCallResult::from_result(&result)
    }

    /// Summarises a CSV file or one of its columns.
    fn call_get_csv_statistics(&self, arguments: &Value) -> ToolCallResult {
        let result = required_str(arguments, "filename").and_then(|filename| {
            let column = arguments.get("column").and_then(Value::as_str);
            self.analyzer.statistics(filename, column)
        });
        ToolCallResult::from_result(&result)
    }
}

/// Extracts a required string argument.
fn required_str<'a>(arguments: &'a Value, name: &'static str) -> AnalyzerResult<&'a str> {
    arguments
        .get(name)
        .and_then(Value::as_str)
        .ok_or(AnalyzerError::MissingParameter { name })
}
