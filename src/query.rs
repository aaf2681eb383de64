//! Query result shapes and text rendering

use base64::{engine::general_purpose, Engine as _};
use sqlx::mysql::{MySqlColumn, MySqlRow};
use sqlx::{Column, Row, TypeInfo, ValueRef};
use tracing::debug;

/// Rows returned when a table is read as a resource
pub const TABLE_READ_LIMIT: u32 = 100;

/// A materialized result set, every value already rendered as text
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextTable {
    /// Column names from the driver metadata
    pub columns: Vec<String>,
    /// Rendered row values
    pub rows: Vec<Vec<String>>,
}

impl TextTable {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { columns, rows }
    }

    /// Header line then one line per row, values joined with commas
    pub fn to_text(&self) -> String {
        std::iter::once(self.columns.join(","))
            .chain(self.rows.iter().map(|row| row.join(",")))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// First value of every row
    pub fn first_column(&self) -> Vec<String> {
        self.rows
            .iter()
            .filter_map(|row| row.first().cloned())
            .collect()
    }
}

/// Outcome of running an arbitrary statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Execution {
    /// The statement produced a result set
    ResultSet(TextTable),
    /// The statement ran and produced rows, but they could not be rendered
    Unreadable { error: String },
    /// The statement produced no result set
    Affected(u64),
}

/// Whether the statement is a `SHOW TABLES` request
pub fn is_show_tables(sql: &str) -> bool {
    sql.trim_start().to_uppercase().starts_with("SHOW TABLES")
}

/// `SELECT * FROM <table> LIMIT <n>` for a resource read
pub fn table_read_sql(table: &str) -> String {
    format!("SELECT * FROM {} LIMIT {}", table, TABLE_READ_LIMIT)
}

/// Render fetched rows into a table, taking column names from the first row
pub fn render_rows(rows: &[MySqlRow]) -> std::result::Result<TextTable, sqlx::Error> {
    let columns = rows
        .first()
        .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
        .unwrap_or_default();

    let rendered = rows
        .iter()
        .map(render_row)
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(TextTable::new(columns, rendered))
}

/// Render every value of a row as text
pub fn render_row(row: &MySqlRow) -> std::result::Result<Vec<String>, sqlx::Error> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, column)| render_value(row, i, column))
        .collect()
}

/// Render a single MySQL value as text, by column type
fn render_value(
    row: &MySqlRow,
    index: usize,
    column: &MySqlColumn,
) -> std::result::Result<String, sqlx::Error> {
    // SQL NULL prints as the literal NULL, never as an empty field
    if row.try_get_raw(index)?.is_null() {
        return Ok("NULL".to_string());
    }

    let type_name = column.type_info().name();

    let text = match type_name {
        "TINYINT" => row.try_get::<i8, _>(index)?.to_string(),
        "SMALLINT" => row.try_get::<i16, _>(index)?.to_string(),
        "MEDIUMINT" | "INT" => row.try_get::<i32, _>(index)?.to_string(),
        "BIGINT" => row.try_get::<i64, _>(index)?.to_string(),
        "TINYINT UNSIGNED" => row.try_get::<u8, _>(index)?.to_string(),
        "SMALLINT UNSIGNED" => row.try_get::<u16, _>(index)?.to_string(),
        "MEDIUMINT UNSIGNED" | "INT UNSIGNED" => row.try_get::<u32, _>(index)?.to_string(),
        "BIGINT UNSIGNED" => row.try_get::<u64, _>(index)?.to_string(),
        "FLOAT" => row.try_get::<f32, _>(index)?.to_string(),
        "DOUBLE" => row.try_get::<f64, _>(index)?.to_string(),

        // TINYINT(1); shown the way MySQL stores it
        "BOOLEAN" | "BOOL" => u8::from(row.try_get::<bool, _>(index)?).to_string(),

        // DECIMAL travels as text in both protocols
        "DECIMAL" | "NUMERIC" => row.try_get_unchecked::<String, _>(index)?,

        "CHAR" | "VARCHAR" | "TEXT" | "TINYTEXT" | "MEDIUMTEXT" | "LONGTEXT" | "ENUM" | "SET" => {
            row.try_get::<String, _>(index)?
        }

        "BINARY" | "VARBINARY" | "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" => {
            render_bytes(row.try_get::<Vec<u8>, _>(index)?)
        }

        "DATE" => row.try_get::<chrono::NaiveDate, _>(index)?.to_string(),
        "DATETIME" | "TIMESTAMP" => row.try_get::<chrono::NaiveDateTime, _>(index)?.to_string(),
        // TIME may be negative or exceed 24h, which NaiveTime cannot hold
        "TIME" => match row.try_get::<chrono::NaiveTime, _>(index) {
            Ok(val) => val.to_string(),
            Err(_) => row.try_get_unchecked::<String, _>(index)?,
        },

        "JSON" => row.try_get::<serde_json::Value, _>(index)?.to_string(),

        _ => {
            debug!("Unknown MySQL type '{}', rendering raw bytes", type_name);
            match row.try_get_unchecked::<String, _>(index) {
                Ok(val) => val,
                Err(_) => render_bytes(row.try_get_unchecked::<Vec<u8>, _>(index)?),
            }
        }
    };

    Ok(text)
}

/// Binary values print as text when they are valid UTF-8, base64 otherwise
fn render_bytes(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => general_purpose::STANDARD.encode(e.into_bytes()),
    }
}
