//! MySQL/PostgreSQL 即时连接
//!
//! 表单提交后立即连接、内省并把模式映射转发到云端，成功后回到仪表盘。

use axum::extract::State;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::Form;
use serde::Deserialize;
use utoipa::ToSchema;
use validator::Validate;

use common::errors::{AppError, AppResult};
use common::models::connection::{BackendKind, ConnectForm};

use crate::introspect::split_qualified;
use crate::session::{AuthSession, PageSession};
use crate::state::AppState;
use crate::views;

const DEFAULT_PG_SCHEMA: &str = "public";

async fn connect_and_forward(state: &AppState, kind: BackendKind, form: ConnectForm) -> AppResult<Redirect> {
    form.validate()?;
    let spec = form.into_spec(kind).map_err(AppError::Validation)?;

    let mapping = state.service.schema_mapping(&spec).await?;
    tracing::info!(
        kind = %kind,
        host = %spec.host,
        database = %spec.database,
        schemas = mapping.len(),
        "schema introspected, forwarding to cloud"
    );

    match kind {
        BackendKind::Postgres => state.cloud.send_postgres(&mapping).await?,
        _ => state.cloud.send_mysql(&mapping).await?,
    }
    Ok(Redirect::to("/dashboard"))
}

/// 连接 MySQL，内省并转发到云端
#[utoipa::path(
    post,
    path = "/connect-mysql",
    tag = "connect",
    request_body(content = ConnectForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 303, description = "同步完成，跳转到仪表盘"),
        (status = 400, description = "表单不合法", body = common::response::ErrorBody),
        (status = 502, description = "数据库或云端不可用", body = common::response::ErrorBody)
    )
)]
pub async fn connect_mysql(
    State(state): State<AppState>,
    _session: AuthSession,
    Form(form): Form<ConnectForm>,
) -> AppResult<Redirect> {
    connect_and_forward(&state, BackendKind::MySql, form).await
}

/// 连接 PostgreSQL，内省并转发到云端
#[utoipa::path(
    post,
    path = "/connect-postgres",
    tag = "connect",
    request_body(content = ConnectForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 303, description = "同步完成，跳转到仪表盘"),
        (status = 400, description = "表单不合法", body = common::response::ErrorBody),
        (status = 502, description = "数据库或云端不可用", body = common::response::ErrorBody)
    )
)]
pub async fn connect_postgres(
    State(state): State<AppState>,
    _session: AuthSession,
    Form(form): Form<ConnectForm>,
) -> AppResult<Redirect> {
    connect_and_forward(&state, BackendKind::Postgres, form).await
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PostgresPreviewForm {
    /// 为空时使用配置的数据库
    #[serde(default)]
    pub dbname: String,
    /// `schema.table`，省略模式时为 `public`
    pub table: String,
}

/// PostgreSQL 表预览页面
pub async fn preview_postgres(
    State(state): State<AppState>,
    _session: PageSession,
    Form(form): Form<PostgresPreviewForm>,
) -> Response {
    let spec = match form.dbname.trim() {
        "" => state.config.postgres.clone(),
        name => state.config.postgres.with_database(name),
    };
    let (schema, table) = split_qualified(form.table.trim(), DEFAULT_PG_SCHEMA);

    let result = state
        .service
        .preview(&spec, schema, table, state.config.preview_limit)
        .await;

    match result {
        // columns come from the catalog, so they are listed even for an empty table
        Ok(preview) => Html(views::postgres_preview(
            &spec.database,
            &form.table,
            &preview.columns,
            &preview,
        ))
        .into_response(),
        Err(e) => {
            tracing::warn!(database = %spec.database, table = %form.table, error = %e, "postgres preview failed");
            (e.status(), Html(views::error("Preview failed", &e.to_string()))).into_response()
        }
    }
}
