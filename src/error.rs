//! Error types for the MySQL MCP server

use std::fmt;
use tracing::{error, warn};

/// Result type alias for the server
pub type Result<T> = std::result::Result<T, ServerError>;

/// JSON-RPC error codes used on the protocol channel
pub mod codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
}

/// Main error type for the MySQL MCP server
#[derive(Debug)]
pub enum ServerError {
    /// Database connection errors
    Connection {
        /// The underlying database error
        source: sqlx::Error,
        /// User-friendly error message
        message: String,
    },
    /// Query execution errors
    Query {
        /// The SQL statement that failed
        sql: String,
        /// The underlying database error
        source: sqlx::Error,
    },
    /// Rejected tool or resource input
    Validation {
        /// The validation error message
        message: String,
        /// The invalid value that caused the error
        invalid_value: Option<String>,
    },
    /// Configuration errors, fatal at startup
    Configuration {
        /// Configuration parameter that is invalid or missing
        parameter: String,
        /// Error message
        message: String,
    },
    /// Serialization/deserialization errors
    Serialization {
        /// The underlying serialization error
        source: serde_json::Error,
        /// Context about what was being serialized
        context: String,
    },
    /// I/O errors on the protocol channel
    Io {
        /// The underlying I/O error
        source: std::io::Error,
        /// Context about the I/O operation
        context: String,
    },
    /// Protocol errors (MCP-specific)
    Protocol {
        /// Protocol error message
        message: String,
        /// JSON-RPC error code to report
        code: i32,
    },
}

impl ServerError {
    /// Create a new connection error
    pub fn connection_error(source: sqlx::Error) -> Self {
        let message = Self::format_connection_error(&source);
        error!("Connection error: {}", source);
        Self::log_database_codes(&source);

        Self::Connection { source, message }
    }

    /// Create a new query error
    pub fn query_error(sql: String, source: sqlx::Error) -> Self {
        error!("Query execution failed: {} | SQL: {}", source, sql);
        Self::log_database_codes(&source);

        Self::Query { sql, source }
    }

    /// Create a new validation error
    pub fn validation_error(message: String, invalid_value: Option<String>) -> Self {
        warn!("Validation error: {} | Invalid value: {:?}", message, invalid_value);

        Self::Validation {
            message,
            invalid_value,
        }
    }

    /// Create a new configuration error
    pub fn configuration_error(parameter: String, message: String) -> Self {
        error!("Configuration error for '{}': {}", parameter, message);

        Self::Configuration { parameter, message }
    }

    /// Create a new serialization error
    pub fn serialization_error(source: serde_json::Error, context: String) -> Self {
        error!("Serialization error in {}: {}", context, source);

        Self::Serialization { source, context }
    }

    /// Create a new I/O error
    pub fn io_error(source: std::io::Error, context: String) -> Self {
        error!("I/O error in {}: {}", context, source);

        Self::Io { source, context }
    }

    /// Create a new protocol error
    pub fn protocol_error(message: String, code: i32) -> Self {
        warn!("Protocol error ({}): {}", code, message);

        Self::Protocol { message, code }
    }

    /// Whether this error came from the database (connect or execute)
    pub fn is_database_error(&self) -> bool {
        matches!(self, ServerError::Connection { .. } | ServerError::Query { .. })
    }

    /// JSON-RPC error code reported for this error
    pub fn rpc_code(&self) -> i32 {
        match self {
            ServerError::Protocol { code, .. } => *code,
            ServerError::Validation { .. } => codes::INVALID_PARAMS,
            ServerError::Serialization { .. } => codes::PARSE_ERROR,
            _ => codes::INTERNAL_ERROR,
        }
    }

    /// Get a user-friendly error message (safe to send to clients)
    pub fn user_message(&self) -> String {
        match self {
            ServerError::Connection { message, .. } => message.clone(),
            ServerError::Query { source, .. } => Self::sanitize_database_error(source),
            ServerError::Validation { message, .. } => message.clone(),
            ServerError::Configuration { parameter, message } => {
                format!("Configuration error for '{}': {}", parameter, message)
            }
            ServerError::Serialization { context, source } => {
                format!("Invalid JSON in {}: {}", context, source)
            }
            ServerError::Io { context, .. } => format!("I/O error during {}", context),
            ServerError::Protocol { message, .. } => message.clone(),
        }
    }

    /// Get detailed error information for logging
    pub fn detailed_message(&self) -> String {
        match self {
            ServerError::Connection { source, message } => {
                format!("Connection error: {} | Source: {}", message, source)
            }
            ServerError::Query { sql, source } => {
                format!(
                    "Query error: {} | SQL: {} | Error code: {:?}",
                    source,
                    sql,
                    Self::mysql_error_code(source)
                )
            }
            ServerError::Validation {
                message,
                invalid_value,
            } => {
                format!("Validation error: {} | Invalid value: {:?}", message, invalid_value)
            }
            ServerError::Configuration { parameter, message } => {
                format!("Configuration error for '{}': {}", parameter, message)
            }
            ServerError::Serialization { source, context } => {
                format!("Serialization error in {}: {}", context, source)
            }
            ServerError::Io { source, context } => format!("I/O error in {}: {}", context, source),
            ServerError::Protocol { message, code } => {
                format!("Protocol error: {} | Code: {}", message, code)
            }
        }
    }

    /// MySQL error code reported by the server, if any
    pub fn mysql_error_code(source: &sqlx::Error) -> Option<String> {
        match source {
            sqlx::Error::Database(db) => db
                .try_downcast_ref::<sqlx::mysql::MySqlDatabaseError>()
                .map(|e| e.number().to_string()),
            _ => None,
        }
    }

    fn log_database_codes(source: &sqlx::Error) {
        if let sqlx::Error::Database(db) = source {
            error!(
                "Error code: {:?}, SQL state: {:?}",
                Self::mysql_error_code(source),
                db.code()
            );
        }
    }

    /// Connection failure text, always carrying the driver's cause
    fn format_connection_error(source: &sqlx::Error) -> String {
        let cause = Self::sanitize_database_error(source);
        match source {
            sqlx::Error::Io(_) => format!("Unable to connect to database: {}", cause),
            sqlx::Error::Tls(_) => format!("Database connection failed due to TLS/SSL error: {}", cause),
            _ => format!("Database connection failed: {}", cause),
        }
    }

    /// Strip credentials and cap the length of database error text
    fn sanitize_database_error(source: &sqlx::Error) -> String {
        let sanitized = source
            .to_string()
            .replace("password=", "password=[REDACTED]")
            .replace("pwd=", "pwd=[REDACTED]");

        if sanitized.chars().count() > 500 {
            let truncated: String = sanitized.chars().take(497).collect();
            format!("{}...", truncated)
        } else {
            sanitized
        }
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.user_message())
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServerError::Connection { source, .. } => Some(source),
            ServerError::Query { source, .. } => Some(source),
            ServerError::Serialization { source, .. } => Some(source),
            ServerError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}
