//! JSON-RPC and MCP message shapes

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use crate::error::codes;
use crate::{Result, ServerError};

pub const JSONRPC_VERSION: &str = "2.0";
pub const DEFAULT_PROTOCOL_VERSION: &str = "2024-11-05";
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2024-11-05", "2025-03-26", "2025-06-18"];
pub const SERVER_NAME: &str = "mysql_mcp_server";

/// Scheme prefix of table resources
pub const RESOURCE_SCHEME: &str = "mysql://";
pub const EXECUTE_SQL_TOOL: &str = "execute_sql";

/// JSON-RPC request structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    /// `None` only when the member is absent; `"id": null` is `Some(Value::Null)`
    #[serde(
        default,
        deserialize_with = "present_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

fn present_value<'de, D>(deserializer: D) -> std::result::Result<Option<Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl JsonRpcRequest {
    /// Notifications carry no id and get no response
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// JSON-RPC response structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC error structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, error: &ServerError) -> Self {
        let message = if error.is_database_error() {
            format!("Database error: {}", error.user_message())
        } else {
            error.user_message()
        };

        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code: error.rpc_code(),
                message,
                data: None,
            }),
        }
    }
}

/// A table exposed as a readable resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub uri: String,
    pub name: String,
    pub mime_type: String,
    pub description: String,
}

impl Resource {
    pub fn for_table(table: &str) -> Self {
        Self {
            uri: format!("{}{}/data", RESOURCE_SCHEME, table),
            name: format!("Table: {}", table),
            mime_type: "text/plain".to_string(),
            description: format!("Data in table: {}", table),
        }
    }
}

/// Table name addressed by a `mysql://<table>/data` URI.
///
/// Only the first path segment is interpreted.
pub fn table_from_uri(uri: &str) -> Result<&str> {
    let rest = uri.strip_prefix(RESOURCE_SCHEME).ok_or_else(|| {
        ServerError::validation_error(
            format!("Invalid URI scheme: {}", uri),
            Some(uri.to_string()),
        )
    })?;

    let table = rest.split('/').next().unwrap_or_default();
    if table.is_empty() {
        return Err(ServerError::validation_error(
            format!("Resource URI names no table: {}", uri),
            Some(uri.to_string()),
        ));
    }

    Ok(table)
}

/// Static description of a callable tool
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
}

/// The single tool this server exposes
pub fn execute_sql_tool() -> ToolDescriptor {
    ToolDescriptor {
        name: EXECUTE_SQL_TOOL,
        description: "Execute an SQL query on the MySQL server",
        input_schema: json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The SQL query to execute"
                }
            },
            "required": ["query"]
        }),
    }
}

/// `tools/call` parameters
#[derive(Debug, Clone, Deserialize)]
pub struct CallToolParams {
    pub name: String,
    #[serde(default)]
    pub arguments: Option<serde_json::Map<String, Value>>,
}

/// `resources/read` parameters
#[derive(Debug, Clone, Deserialize)]
pub struct ReadResourceParams {
    pub uri: String,
}

/// Text payload of a tool result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    pub content: Vec<TextContent>,
    pub is_error: bool,
}

impl CallToolResult {
    pub fn text(text: String) -> Self {
        Self {
            content: vec![TextContent::new(text)],
            is_error: false,
        }
    }

    pub fn error_text(text: String) -> Self {
        Self {
            content: vec![TextContent::new(text)],
            is_error: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextContent {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

impl TextContent {
    pub fn new(text: String) -> Self {
        Self {
            kind: "text".to_string(),
            text,
        }
    }
}

/// Deserialize request params, reporting failures as invalid params
pub fn parse_params<T: serde::de::DeserializeOwned>(params: Option<Value>, method: &str) -> Result<T> {
    let params = params.ok_or_else(|| {
        ServerError::protocol_error(
            format!("Missing parameters for {}", method),
            codes::INVALID_PARAMS,
        )
    })?;

    serde_json::from_value(params).map_err(|e| {
        ServerError::protocol_error(
            format!("Invalid parameters for {}: {}", method, e),
            codes::INVALID_PARAMS,
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_resource_for_table() {
        let resource = Resource::for_table("users");

        assert_eq!(resource.uri, "mysql://users/data");
        assert_eq!(resource.name, "Table: users");
        assert_eq!(resource.mime_type, "text/plain");
        assert_eq!(resource.description, "Data in table: users");

        let value = serde_json::to_value(&resource).unwrap();
        assert_eq!(value["mimeType"], "text/plain");
    }

    #[test]
    fn test_table_from_uri() {
        assert_eq!(table_from_uri("mysql://users/data").unwrap(), "users");
        assert_eq!(table_from_uri("mysql://users").unwrap(), "users");
        assert_eq!(table_from_uri("mysql://orders/data/extra").unwrap(), "orders");
    }

    #[test]
    fn test_table_from_uri_rejects_other_schemes() {
        for uri in ["postgres://users/data", "users/data", "MYSQL://users/data", "mysql:/users"] {
            match table_from_uri(uri) {
                Err(ServerError::Validation { message, .. }) => {
                    assert!(message.contains("Invalid URI scheme"))
                }
                other => panic!("Expected validation error for {}, got {:?}", uri, other),
            }
        }
    }

    #[test]
    fn test_table_from_uri_requires_table() {
        assert!(matches!(
            table_from_uri("mysql:///data"),
            Err(ServerError::Validation { .. })
        ));
    }

    #[test]
    fn test_execute_sql_tool_schema() {
        let tool = serde_json::to_value(execute_sql_tool()).unwrap();

        assert_eq!(tool["name"], "execute_sql");
        assert_eq!(tool["inputSchema"]["properties"]["query"]["type"], "string");
        assert_eq!(tool["inputSchema"]["required"], json!(["query"]));
    }

    #[test]
    fn test_call_tool_result_shape() {
        let value = serde_json::to_value(CallToolResult::text("ok".to_string())).unwrap();
        assert_eq!(
            value,
            json!({"content": [{"type": "text", "text": "ok"}], "isError": false})
        );
    }

    #[test]
    fn test_notification_has_no_id() {
        let request: JsonRpcRequest =
            serde_json::from_str(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#).unwrap();
        assert!(request.is_notification());
    }

    #[test]
    fn test_null_id_is_not_a_notification() {
        let request: JsonRpcRequest =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":null,"method":"ping"}"#).unwrap();
        assert!(!request.is_notification());
        assert_eq!(request.id, Some(Value::Null));
    }

    #[test]
    fn test_parse_params_missing() {
        let result: Result<ReadResourceParams> = parse_params(None, "resources/read");
        match result {
            Err(e) => assert_eq!(e.rpc_code(), codes::INVALID_PARAMS),
            Ok(_) => panic!("Expected error"),
        }
    }

    proptest! {
        #[test]
        fn test_resource_uri_names_its_table(table in "[A-Za-z_][A-Za-z0-9_$]{0,30}") {
            let resource = Resource::for_table(&table);
            prop_assert_eq!(table_from_uri(&resource.uri).unwrap(), table.as_str());
        }
    }
}
