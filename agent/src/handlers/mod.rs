//! Handler模块
//!
//! - `db2`：DB2 内省 JSON 接口
//! - `connect`：MySQL/PostgreSQL 即时连接与同步
//! - `pages`：登录、仪表盘、预览等 HTML 页面
//! - `tally`：Tally 同步与透传
//! - `system`：健康检查、令牌接收

pub mod connect;
pub mod db2;
pub mod pages;
pub mod system;
pub mod tally;

use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;

use common::models::schema::ColumnInfo;

/// `{ "database": name }`
#[derive(Debug, Serialize, ToSchema)]
pub struct DatabaseResponse {
    pub database: String,
}

/// `{ "tables": [...] }`
#[derive(Debug, Serialize, ToSchema)]
pub struct TablesResponse {
    pub tables: Vec<String>,
}

/// `{ "columns": [...] }`
#[derive(Debug, Serialize, ToSchema)]
pub struct ColumnsResponse {
    pub columns: Vec<ColumnInfo>,
}

/// `{ "schema": [...] }`
#[derive(Debug, Serialize, ToSchema)]
pub struct SchemaResponse {
    pub schema: Vec<ColumnInfo>,
}

/// `{ "data": [...] }`
#[derive(Debug, Serialize, ToSchema)]
pub struct ColumnDataResponse {
    #[schema(value_type = Vec<Object>)]
    pub data: Vec<Value>,
}

/// Splits a comma-separated table list, dropping blanks.
pub(crate) fn split_tables(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}
