//! MCP server implementation

use crate::config::ConnectionConfig;
use crate::connection::{MySqlBackend, SqlBackend};
use crate::error::codes;
use crate::protocol::{
    self, CallToolParams, CallToolResult, JsonRpcRequest, JsonRpcResponse, ReadResourceParams,
    Resource, ToolDescriptor,
};
use crate::query::{self, Execution};
use crate::{Result, ServerError};
use serde_json::{json, Map, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, error, info, warn};

/// MCP server for MySQL database operations
///
/// Built once at startup. Requests are handled one at a time and each
/// handler opens and closes its own database connection.
pub struct McpServer {
    config: ConnectionConfig,
    backend: Box<dyn SqlBackend>,
}

impl McpServer {
    /// Create a new MCP server backed by MySQL
    pub fn new(config: ConnectionConfig) -> Self {
        let backend = Box::new(MySqlBackend::new(config.clone()));
        Self { config, backend }
    }

    /// Create a server over any backend
    pub fn with_backend(config: ConnectionConfig, backend: Box<dyn SqlBackend>) -> Self {
        Self { config, backend }
    }

    /// Get the server configuration
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// List tables as resources.
    ///
    /// Database failures are logged and produce an empty list.
    pub async fn list_resources(&self) -> Vec<Resource> {
        match self.backend.list_tables().await {
            Ok(tables) => tables.iter().map(|t| Resource::for_table(t)).collect(),
            Err(e) => {
                error!("Failed to list resources: {}", e.detailed_message());
                Vec::new()
            }
        }
    }

    /// Read the first rows of the table named by `uri`
    pub async fn read_resource(&self, uri: &str) -> Result<String> {
        info!("Reading resource: {}", uri);

        let table = protocol::table_from_uri(uri)?;
        match self.backend.read_table(table).await {
            Ok(table) => Ok(table.to_text()),
            Err(e) => {
                error!("Database error reading resource {}: {}", uri, e.detailed_message());
                Err(e)
            }
        }
    }

    /// Tools offered to the client
    pub fn list_tools(&self) -> Vec<ToolDescriptor> {
        debug!("Listing tools");
        vec![protocol::execute_sql_tool()]
    }

    /// Invoke a tool.
    ///
    /// Unknown tools and a missing `query` are rejected; database failures
    /// come back as an error text result.
    pub async fn call_tool(&self, name: &str, arguments: Option<&Map<String, Value>>) -> Result<CallToolResult> {
        info!("Calling tool: {} with arguments: {:?}", name, arguments);

        if name != protocol::EXECUTE_SQL_TOOL {
            return Err(ServerError::validation_error(
                format!("Unknown tool: {}", name),
                Some(name.to_string()),
            ));
        }

        let sql = arguments
            .and_then(|args| args.get("query"))
            .and_then(Value::as_str)
            .filter(|q| !q.trim().is_empty())
            .ok_or_else(|| {
                ServerError::validation_error(
                    "Query is required".to_string(),
                    Some("query field not found, empty or not a string".to_string()),
                )
            })?;

        match self.backend.execute(sql).await {
            Ok(execution) => Ok(self.format_execution(sql, execution)),
            Err(e) => {
                error!("Error executing SQL '{}': {}", sql, e.detailed_message());
                Ok(CallToolResult::error_text(format!("Error executing query: {}", e)))
            }
        }
    }

    fn format_execution(&self, sql: &str, execution: Execution) -> CallToolResult {
        match execution {
            Execution::Unreadable { error } => CallToolResult::text(format!(
                "Query executed but error fetching results: {}",
                error
            )),
            Execution::ResultSet(table) if query::is_show_tables(sql) => {
                self.table_listing(table.first_column())
            }
            Execution::Affected(_) if query::is_show_tables(sql) => self.table_listing(Vec::new()),
            Execution::ResultSet(table) => CallToolResult::text(table.to_text()),
            Execution::Affected(rows) => CallToolResult::text(format!(
                "Query executed successfully. Rows affected: {}",
                rows
            )),
        }
    }

    /// `Tables_in_<database>` header followed by one table per line
    fn table_listing(&self, tables: Vec<String>) -> CallToolResult {
        let header = format!("Tables_in_{}", self.config.database);
        let lines: Vec<String> = std::iter::once(header).chain(tables).collect();
        CallToolResult::text(lines.join("\n"))
    }

    /// Serve newline-delimited JSON-RPC on stdin/stdout until stdin closes
    pub async fn serve_stdio(&self) -> Result<()> {
        self.serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
            .await
    }

    /// Serve newline-delimited JSON-RPC until the reader reaches EOF.
    ///
    /// Each request is answered before the next line is read.
    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        info!("MCP server ready on {}", self.config.masked_connection_url());
        let mut lines = reader.lines();

        while let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| ServerError::io_error(e, "reading request".to_string()))?
        {
            if line.trim().is_empty() {
                continue;
            }

            if let Some(response) = self.handle_message(&line).await {
                let mut payload = serde_json::to_string(&response)
                    .map_err(|e| ServerError::serialization_error(e, "response".to_string()))?;
                payload.push('\n');

                writer
                    .write_all(payload.as_bytes())
                    .await
                    .map_err(|e| ServerError::io_error(e, "writing response".to_string()))?;
                writer
                    .flush()
                    .await
                    .map_err(|e| ServerError::io_error(e, "flushing response".to_string()))?;
            }
        }

        info!("Input closed, stopping server");
        Ok(())
    }

    /// Decode one line and dispatch it
    pub async fn handle_message(&self, line: &str) -> Option<JsonRpcResponse> {
        let value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                let err = ServerError::serialization_error(e, "request".to_string());
                return Some(JsonRpcResponse::failure(Value::Null, &err));
            }
        };

        let id = value.get("id").cloned().unwrap_or(Value::Null);
        match serde_json::from_value::<JsonRpcRequest>(value) {
            Ok(request) => self.handle_jsonrpc_request(request).await,
            Err(e) => {
                let err = ServerError::protocol_error(
                    format!("Invalid request: {}", e),
                    codes::INVALID_REQUEST,
                );
                Some(JsonRpcResponse::failure(id, &err))
            }
        }
    }

    /// Handle JSON-RPC requests
    pub async fn handle_jsonrpc_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        debug!(
            "Handling JSON-RPC request: method={}, id={:?}",
            request.method, request.id
        );

        let result = if request.jsonrpc != protocol::JSONRPC_VERSION {
            Err(ServerError::protocol_error(
                format!("Unsupported jsonrpc version: {}", request.jsonrpc),
                codes::INVALID_REQUEST,
            ))
        } else {
            match request.method.as_str() {
                "initialize" => self.handle_initialize(request.params.as_ref()),
                "ping" => Ok(json!({})),
                "tools/list" => Ok(json!({ "tools": self.list_tools() })),
                "tools/call" => self.handle_call_tool(request.params).await,
                "resources/list" => Ok(json!({ "resources": self.list_resources().await })),
                "resources/read" => self.handle_read_resource(request.params).await,
                "resources/templates/list" => Ok(json!({ "resourceTemplates": [] })),
                method if method.starts_with("notifications/") => Ok(Value::Null),
                method => Err(ServerError::protocol_error(
                    format!("Unknown method: {}", method),
                    codes::METHOD_NOT_FOUND,
                )),
            }
        };

        let id = match request.id {
            Some(id) => id,
            None => {
                match result {
                    Ok(_) => debug!("Notification handled: {}", request.method),
                    Err(e) => warn!("Notification {} failed: {}", request.method, e.detailed_message()),
                }
                return None;
            }
        };

        Some(match result {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(e) => {
                error!("JSON-RPC request failed: {}", e.detailed_message());
                JsonRpcResponse::failure(id, &e)
            }
        })
    }

    /// Handle initialize request
    fn handle_initialize(&self, params: Option<&Value>) -> Result<Value> {
        let requested = params
            .and_then(|p| p.get("protocolVersion"))
            .and_then(Value::as_str);

        let version = match requested {
            Some(v) if protocol::SUPPORTED_PROTOCOL_VERSIONS.contains(&v) => v,
            _ => protocol::DEFAULT_PROTOCOL_VERSION,
        };
        info!("Handling initialize request, protocol version {}", version);

        Ok(json!({
            "protocolVersion": version,
            "capabilities": {
                "tools": { "listChanged": false },
                "resources": { "subscribe": false, "listChanged": false }
            },
            "serverInfo": {
                "name": protocol::SERVER_NAME,
                "version": env!("CARGO_PKG_VERSION")
            }
        }))
    }

    async fn handle_call_tool(&self, params: Option<Value>) -> Result<Value> {
        let params: CallToolParams = protocol::parse_params(params, "tools/call")?;
        let result = self.call_tool(&params.name, params.arguments.as_ref()).await?;

        serde_json::to_value(result)
            .map_err(|e| ServerError::serialization_error(e, "tool call result".to_string()))
    }

    async fn handle_read_resource(&self, params: Option<Value>) -> Result<Value> {
        let params: ReadResourceParams = protocol::parse_params(params, "resources/read")?;
        let text = self.read_resource(&params.uri).await?;

        Ok(json!({
            "contents": [{
                "uri": params.uri,
                "mimeType": "text/plain",
                "text": text
            }]
        }))
    }
}
