//! MySQL MCP Server
//!
//! A Model Context Protocol server that exposes the tables of a MySQL
//! database as resources and offers a single `execute_sql` tool, speaking
//! newline-delimited JSON-RPC over stdio.

pub mod config;
pub mod connection;
pub mod error;
pub mod protocol;
pub mod query;
pub mod server;

pub use config::{CliArgs, ConnectionConfig};
pub use connection::{MySqlBackend, SqlBackend};
pub use error::{Result, ServerError};
pub use server::McpServer;
