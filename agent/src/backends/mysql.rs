//! MySQL catalog over a single `sqlx` connection.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::mysql::{MySqlConnection, MySqlRow};
use sqlx::{Column, Connection, Row, TypeInfo};

use common::errors::AppResult;
use common::models::connection::{BackendKind, ConnectionSpec};
use common::models::schema::{ColumnInfo, PreviewResult};

use super::{connect_error, query_error, Catalog};

pub struct MySqlCatalog {
    conn: MySqlConnection,
}

impl MySqlCatalog {
    pub async fn connect(spec: &ConnectionSpec) -> AppResult<Self> {
        let conn = MySqlConnection::connect(&spec.url())
            .await
            .map_err(connect_error)?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl Catalog for MySqlCatalog {
    fn kind(&self) -> BackendKind {
        BackendKind::MySql
    }

    async fn current_database(&mut self) -> AppResult<String> {
        let (name,): (Option<String>,) = sqlx::query_as("SELECT DATABASE()")
            .fetch_one(&mut self.conn)
            .await
            .map_err(query_error)?;
        Ok(name.unwrap_or_default())
    }

    async fn list_schemas(&mut self) -> AppResult<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT CAST(SCHEMA_NAME AS CHAR) FROM information_schema.SCHEMATA ORDER BY SCHEMA_NAME",
        )
        .fetch_all(&mut self.conn)
        .await
        .map_err(query_error)?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    async fn list_tables(&mut self, schema: &str) -> AppResult<Vec<String>> {
        // Cast to CHAR to avoid BINARY type mismatch with Rust String
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT CAST(TABLE_NAME AS CHAR)
            FROM information_schema.TABLES
            WHERE TABLE_SCHEMA = ? AND TABLE_TYPE = 'BASE TABLE'
            ORDER BY TABLE_NAME
            "#,
        )
        .bind(schema)
        .fetch_all(&mut self.conn)
        .await
        .map_err(query_error)?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    async fn list_columns(&mut self, schema: &str, table: &str) -> AppResult<Vec<ColumnInfo>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            r#"
            SELECT CAST(COLUMN_NAME AS CHAR), CAST(DATA_TYPE AS CHAR)
            FROM information_schema.COLUMNS
            WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
            ORDER BY ORDINAL_POSITION
            "#,
        )
        .bind(schema)
        .bind(table)
        .fetch_all(&mut self.conn)
        .await
        .map_err(query_error)?;

        Ok(rows
            .into_iter()
            .map(|(name, data_type)| ColumnInfo::new(name, type_name(&data_type)))
            .collect())
    }

    async fn fetch(&mut self, sql: &str) -> AppResult<PreviewResult> {
        let rows: Vec<MySqlRow> = sqlx::query(sql)
            .fetch_all(&mut self.conn)
            .await
            .map_err(query_error)?;

        let columns = rows
            .first()
            .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();
        let rows = rows
            .iter()
            .map(|row| (0..row.len()).map(|idx| json_value(row, idx)).collect())
            .collect();
        Ok(PreviewResult { columns, rows })
    }

    async fn close(self: Box<Self>) {
        if let Err(e) = self.conn.close().await {
            tracing::debug!(error = %e, "mysql connection close failed");
        }
    }
}

/// Upper-cased `DATA_TYPE`, spelling `int` the way the reflection layer
/// the cloud was built against does.
pub(crate) fn type_name(data_type: &str) -> String {
    match data_type.to_uppercase().as_str() {
        "INT" => "INTEGER".to_string(),
        other => other.to_string(),
    }
}

/// Converts one cell to JSON, trying the wider types first.
fn json_value(row: &MySqlRow, idx: usize) -> Value {
    if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<u64>, _>(idx) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(idx) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<f32>, _>(idx) {
        return v.map(|f| Value::from(f as f64)).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<Decimal>, _>(idx) {
        return v.map(|d| Value::String(d.to_string())).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
        return v.map(Value::String).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::NaiveDateTime>, _>(idx) {
        return v
            .map(|dt| Value::String(dt.format("%Y-%m-%d %H:%M:%S").to_string()))
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx) {
        return v.map(|dt| Value::String(dt.to_rfc3339())).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::NaiveDate>, _>(idx) {
        return v.map(|d| Value::String(d.to_string())).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::NaiveTime>, _>(idx) {
        return v.map(|t| Value::String(t.to_string())).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(idx) {
        return v
            .map(|b| Value::String(String::from_utf8_lossy(&b).into_owned()))
            .unwrap_or(Value::Null);
    }
    Value::String(format!("<{}>", row.column(idx).type_info().name()))
}
