//! DB2 内省接口

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use utoipa::IntoParams;

use common::errors::{AppError, AppResult};
use common::models::schema::DatabaseMetadata;

use super::{ColumnDataResponse, ColumnsResponse, DatabaseResponse, SchemaResponse, TablesResponse};
use crate::session::AuthSession;
use crate::state::AppState;

#[derive(Debug, Deserialize, IntoParams)]
pub struct ColumnsQuery {
    /// 表名（大小写不敏感）
    pub table: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ColumnDataQuery {
    pub table: Option<String>,
    pub column: Option<String>,
    /// 返回行数上限，不超过 `COLUMN_VALUES_LIMIT`
    pub limit: Option<u32>,
}

fn required(value: Option<String>, name: &str) -> AppResult<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::Validation(format!("missing query parameter '{}'", name)))
}

/// 当前配置的 DB2 数据库名
#[utoipa::path(
    get,
    path = "/dbs",
    tag = "db2",
    responses(
        (status = 200, description = "数据库名", body = DatabaseResponse),
        (status = 401, description = "未登录或令牌无效", body = common::response::ErrorBody)
    )
)]
pub async fn list_databases(
    State(state): State<AppState>,
    _session: AuthSession,
) -> Json<DatabaseResponse> {
    Json(DatabaseResponse {
        database: state.config.db2.database.clone(),
    })
}

/// 列出当前用户模式下的表
#[utoipa::path(
    get,
    path = "/tables",
    tag = "db2",
    responses(
        (status = 200, description = "表名列表", body = TablesResponse),
        (status = 401, description = "未登录或令牌无效", body = common::response::ErrorBody),
        (status = 502, description = "数据库连接失败", body = common::response::ErrorBody)
    )
)]
pub async fn list_tables(
    State(state): State<AppState>,
    _session: AuthSession,
) -> AppResult<Json<TablesResponse>> {
    let db2 = &state.config.db2;
    let tables = state.service.tables(db2, &db2.db2_schema()).await?;
    Ok(Json(TablesResponse { tables }))
}

/// 表的列信息（含长度）
#[utoipa::path(
    get,
    path = "/columns",
    tag = "db2",
    params(ColumnsQuery),
    responses(
        (status = 200, description = "列信息", body = ColumnsResponse),
        (status = 400, description = "缺少参数或表不存在", body = common::response::ErrorBody)
    )
)]
pub async fn list_columns(
    State(state): State<AppState>,
    _session: AuthSession,
    Query(query): Query<ColumnsQuery>,
) -> AppResult<Json<ColumnsResponse>> {
    let table = required(query.table, "table")?;
    let db2 = &state.config.db2;
    let columns = state.service.columns(db2, &db2.db2_schema(), &table).await?;
    Ok(Json(ColumnsResponse { columns }))
}

/// 表结构（列名与类型）
#[utoipa::path(
    get,
    path = "/listschema/{table}",
    tag = "db2",
    params(("table" = String, Path, description = "表名")),
    responses(
        (status = 200, description = "表结构", body = SchemaResponse),
        (status = 400, description = "表不存在", body = common::response::ErrorBody)
    )
)]
pub async fn list_schema(
    State(state): State<AppState>,
    _session: AuthSession,
    Path(table): Path<String>,
) -> AppResult<Json<SchemaResponse>> {
    let db2 = &state.config.db2;
    let schema = state
        .service
        .table_schema(db2, &db2.db2_schema(), &table)
        .await?;
    Ok(Json(SchemaResponse { schema }))
}

/// 某一列的取值
#[utoipa::path(
    get,
    path = "/column_data",
    tag = "db2",
    params(ColumnDataQuery),
    responses(
        (status = 200, description = "列取值", body = ColumnDataResponse),
        (status = 400, description = "缺少参数或列不存在", body = common::response::ErrorBody)
    )
)]
pub async fn column_data(
    State(state): State<AppState>,
    _session: AuthSession,
    Query(query): Query<ColumnDataQuery>,
) -> AppResult<Json<ColumnDataResponse>> {
    let table = required(query.table, "table")?;
    let column = required(query.column, "column")?;
    let cap = state.config.column_values_cap(query.limit);

    let db2 = &state.config.db2;
    let data = state
        .service
        .column_values(db2, &db2.db2_schema(), &table, &column, cap)
        .await?;
    Ok(Json(ColumnDataResponse { data }))
}

/// 数据库名以及全部表和列
#[utoipa::path(
    get,
    path = "/metadata",
    tag = "db2",
    responses(
        (status = 200, description = "数据库元数据", body = DatabaseMetadata)
    )
)]
pub async fn metadata(
    State(state): State<AppState>,
    _session: AuthSession,
) -> AppResult<Json<DatabaseMetadata>> {
    let db2 = &state.config.db2;
    let metadata = state.service.metadata(db2, &db2.db2_schema()).await?;
    Ok(Json(metadata))
}
