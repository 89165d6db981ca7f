//! PostgreSQL catalog over a single `sqlx` connection.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::postgres::{PgConnection, PgRow};
use sqlx::{Column, Connection, Row, TypeInfo};

use common::errors::AppResult;
use common::models::connection::{BackendKind, ConnectionSpec};
use common::models::schema::{ColumnInfo, PreviewResult};

use super::{connect_error, query_error, Catalog};

pub struct PgCatalog {
    conn: PgConnection,
}

impl PgCatalog {
    pub async fn connect(spec: &ConnectionSpec) -> AppResult<Self> {
        let conn = PgConnection::connect(&spec.url())
            .await
            .map_err(connect_error)?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl Catalog for PgCatalog {
    fn kind(&self) -> BackendKind {
        BackendKind::Postgres
    }

    async fn current_database(&mut self) -> AppResult<String> {
        let (name,): (String,) = sqlx::query_as("SELECT current_database()::text")
            .fetch_one(&mut self.conn)
            .await
            .map_err(query_error)?;
        Ok(name)
    }

    async fn list_schemas(&mut self) -> AppResult<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT schema_name::text FROM information_schema.schemata ORDER BY schema_name",
        )
        .fetch_all(&mut self.conn)
        .await
        .map_err(query_error)?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    async fn list_tables(&mut self, schema: &str) -> AppResult<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT table_name::text
            FROM information_schema.tables
            WHERE table_schema = $1 AND table_type = 'BASE TABLE'
            ORDER BY table_name
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
            SELECT column_name::text, upper(data_type)::text
            FROM information_schema.columns
            WHERE table_schema = $1 AND table_name = $2
            ORDER BY ordinal_position
            "#,
        )
        .bind(schema)
        .bind(table)
        .fetch_all(&mut self.conn)
        .await
        .map_err(query_error)?;

        Ok(rows
            .into_iter()
            .map(|(name, data_type)| ColumnInfo::new(name, data_type))
            .collect())
    }

    async fn fetch(&mut self, sql: &str) -> AppResult<PreviewResult> {
        let rows: Vec<PgRow> = sqlx::query(sql)
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
            tracing::debug!(error = %e, "postgres connection close failed");
        }
    }
}

/// Converts one cell to JSON. PostgreSQL types are strict, so each integer
/// width is tried separately.
fn json_value(row: &PgRow, idx: usize) -> Value {
    if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<i32>, _>(idx) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<i16>, _>(idx) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(idx) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<f32>, _>(idx) {
        return v.map(|f| Value::from(f as f64)).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(idx) {
        return v.map(Value::Bool).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<Decimal>, _>(idx) {
        return v.map(|d| Value::String(d.to_string())).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
        return v.map(Value::String).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx) {
        return v.map(|dt| Value::String(dt.to_rfc3339())).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::NaiveDateTime>, _>(idx) {
        return v
            .map(|dt| Value::String(dt.format("%Y-%m-%d %H:%M:%S").to_string()))
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::NaiveDate>, _>(idx) {
        return v.map(|d| Value::String(d.to_string())).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::NaiveTime>, _>(idx) {
        return v.map(|t| Value::String(t.to_string())).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<serde_json::Value>, _>(idx) {
        return v.unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(idx) {
        return v
            .map(|b| Value::String(String::from_utf8_lossy(&b).into_owned()))
            .unwrap_or(Value::Null);
    }
    Value::String(format!("<{}>", row.column(idx).type_info().name()))
}
