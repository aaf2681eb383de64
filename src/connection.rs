//! Database access, one connection per operation

use crate::config::ConnectionConfig;
use crate::query::{self, Execution, TextTable};
use crate::{Result, ServerError};
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::TryStreamExt;
use sqlx::{Column, Connection, Either, Executor, MySqlConnection, Row};
use tracing::{debug, info, warn};

/// The operations the MCP handlers need from the database.
///
/// Every call opens its own connection and closes it before returning.
#[async_trait]
pub trait SqlBackend: Send + Sync {
    /// Names of the tables in the configured database
    async fn list_tables(&self) -> Result<Vec<String>>;

    /// Up to [`query::TABLE_READ_LIMIT`] rows of a table
    async fn read_table(&self, table: &str) -> Result<TextTable>;

    /// Run an arbitrary statement, committing it when it has no result set
    async fn execute(&self, sql: &str) -> Result<Execution>;
}

/// MySQL implementation of [`SqlBackend`]
pub struct MySqlBackend {
    config: ConnectionConfig,
}

impl MySqlBackend {
    /// Create a new backend for the resolved configuration
    pub fn new(config: ConnectionConfig) -> Self {
        Self { config }
    }

    /// Run `op` on a fresh connection.
    ///
    /// The connection is closed on every exit path, whether the session
    /// setup or `op` succeeds or fails.
    pub async fn with_connection<T, F>(&self, op: F) -> Result<T>
    where
        T: Send,
        F: for<'c> FnOnce(&'c mut MySqlConnection) -> BoxFuture<'c, Result<T>> + Send,
    {
        let mut conn = self.connect().await?;

        let outcome = async {
            Self::prepare_session(&mut conn, &self.config).await?;
            op(&mut conn).await
        }
        .await;

        match conn.close().await {
            Ok(()) => debug!("Database connection closed"),
            Err(e) => warn!("Failed to close database connection cleanly: {}", e),
        }

        outcome
    }

    async fn connect(&self) -> Result<MySqlConnection> {
        info!(
            "Connecting to MySQL with charset: {}, collation: {}",
            self.config.charset, self.config.collation
        );
        debug!("Database URL: {}", self.config.masked_connection_url());

        MySqlConnection::connect_with(&self.config.connect_options())
            .await
            .map_err(ServerError::connection_error)
    }

    /// Apply sql_mode and autocommit, then log the server version
    async fn prepare_session(conn: &mut MySqlConnection, config: &ConnectionConfig) -> Result<()> {
        let settings = session_settings_sql(config);
        (&mut *conn)
            .execute(settings.as_str())
            .await
            .map_err(|e| ServerError::query_error(settings.clone(), e))?;

        match sqlx::query_scalar::<_, String>("SELECT VERSION()")
            .fetch_one(&mut *conn)
            .await
        {
            Ok(version) => info!("Successfully connected to MySQL server version: {}", version),
            Err(e) => debug!("Could not read server version: {}", e),
        }

        Ok(())
    }

    /// Column names of a statement's result set without running it.
    ///
    /// Statements MySQL cannot prepare report no columns.
    async fn describe_columns(conn: &mut MySqlConnection, sql: &str) -> Vec<String> {
        match conn.describe(sql).await {
            Ok(describe) => describe
                .columns()
                .iter()
                .map(|c| c.name().to_string())
                .collect(),
            Err(e) => {
                debug!("Could not describe statement: {}", e);
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl SqlBackend for MySqlBackend {
    async fn list_tables(&self) -> Result<Vec<String>> {
        self.with_connection(|conn| Box::pin(fetch_table_names(conn)))
            .await
    }

    async fn read_table(&self, table: &str) -> Result<TextTable> {
        let sql = query::table_read_sql(table);
        self.with_connection(move |conn| Box::pin(fetch_table_rows(conn, sql)))
            .await
    }

    async fn execute(&self, sql: &str) -> Result<Execution> {
        let sql = sql.to_string();
        self.with_connection(move |conn| Box::pin(run_statement(conn, sql)))
            .await
    }
}

async fn fetch_table_names(conn: &mut MySqlConnection) -> Result<Vec<String>> {
    let sql = "SHOW TABLES";
    let rows = conn
        .fetch_all(sql)
        .await
        .map_err(|e| ServerError::query_error(sql.to_string(), e))?;

    let tables = rows
        .iter()
        .map(|row| row.try_get_unchecked::<String, _>(0))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| ServerError::query_error(sql.to_string(), e))?;

    info!("Found tables: {:?}", tables);
    Ok(tables)
}

async fn fetch_table_rows(conn: &mut MySqlConnection, sql: String) -> Result<TextTable> {
    let rows = (&mut *conn)
        .fetch_all(sql.as_str())
        .await
        .map_err(|e| ServerError::query_error(sql.clone(), e))?;

    if rows.is_empty() {
        let columns = MySqlBackend::describe_columns(conn, &sql).await;
        return Ok(TextTable::new(columns, Vec::new()));
    }

    query::render_rows(&rows).map_err(|e| ServerError::query_error(sql, e))
}

async fn run_statement(conn: &mut MySqlConnection, sql: String) -> Result<Execution> {
    let mut rows = Vec::new();
    let mut affected = 0u64;

    {
        let mut results = (&mut *conn).fetch_many(sql.as_str());
        while let Some(item) = results
            .try_next()
            .await
            .map_err(|e| ServerError::query_error(sql.clone(), e))?
        {
            match item {
                Either::Left(done) => affected += done.rows_affected(),
                Either::Right(row) => rows.push(row),
            }
        }
    }

    if !rows.is_empty() {
        return Ok(match query::render_rows(&rows) {
            Ok(table) => Execution::ResultSet(table),
            Err(e) => {
                warn!("Error fetching results: {}", e);
                Execution::Unreadable {
                    error: e.to_string(),
                }
            }
        });
    }

    let columns = MySqlBackend::describe_columns(&mut *conn, &sql).await;
    if !columns.is_empty() {
        return Ok(Execution::ResultSet(TextTable::new(columns, Vec::new())));
    }

    conn.execute("COMMIT")
        .await
        .map_err(|e| ServerError::query_error("COMMIT".to_string(), e))?;
    debug!("Statement committed, {} rows affected", affected);

    Ok(Execution::Affected(affected))
}

/// `SET SESSION` statement carrying sql_mode and autocommit
fn session_settings_sql(config: &ConnectionConfig) -> String {
    format!(
        "SET SESSION sql_mode = '{}', autocommit = {}",
        escape_literal(&config.sql_mode),
        u8::from(config.autocommit)
    )
}

fn escape_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}
