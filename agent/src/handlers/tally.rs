//! Tally 接口

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use utoipa::ToSchema;
use validator::Validate;

use common::errors::AppResult;
use common::models::tally::TallyPayload;
use common::response::StatusBody;

use crate::session::AuthSession;
use crate::state::AppState;
use crate::tally::TallyQueryResult;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct QueryTallyRequest {
    /// 原样转发给 Tally 的 XML
    #[serde(default)]
    #[validate(length(min = 1, message = "xml must not be empty"))]
    pub xml: String,
}

/// 拉取全部公司的账簿与凭证并转发到云端
#[utoipa::path(
    post,
    path = "/sync-tally",
    tag = "tally",
    responses(
        (status = 200, description = "同步成功", body = StatusBody),
        (status = 502, description = "Tally 或云端不可用", body = StatusBody)
    )
)]
pub async fn sync_tally(
    State(state): State<AppState>,
    _session: AuthSession,
) -> (StatusCode, Json<StatusBody>) {
    let result = async {
        let records = state.tally.sync_all().await?;
        let count = records.len();
        state.cloud.send_tally(&TallyPayload::from(records)).await?;
        AppResult::Ok(count)
    }
    .await;

    match result {
        Ok(count) => {
            tracing::info!(companies = count, "tally data synced");
            (
                StatusCode::OK,
                Json(StatusBody::success().with_message(format!("Synced {} companies", count))),
            )
        }
        Err(e) => {
            tracing::error!(error = %e, "tally sync failed");
            (
                StatusCode::BAD_GATEWAY,
                Json(StatusBody::new("error").with_message(e.to_string())),
            )
        }
    }
}

/// 透传任意 XML 请求到 Tally
#[utoipa::path(
    post,
    path = "/query_tally",
    tag = "tally",
    request_body = QueryTallyRequest,
    responses(
        (status = 200, description = "Tally 响应", body = TallyQueryResult),
        (status = 400, description = "xml 为空", body = common::response::ErrorBody)
    )
)]
pub async fn query_tally(
    State(state): State<AppState>,
    _session: AuthSession,
    Json(req): Json<QueryTallyRequest>,
) -> AppResult<Json<TallyQueryResult>> {
    req.validate()?;
    let result = state.tally.query(req.xml).await?;
    Ok(Json(result))
}

/// 当前公司的账簿列表（原始 XML）
#[utoipa::path(
    get,
    path = "/get_ledgers",
    tag = "tally",
    responses(
        (status = 200, description = "Tally 原始 XML", body = String, content_type = "text/xml"),
        (status = 502, description = "Tally 不可用", body = common::response::ErrorBody)
    )
)]
pub async fn get_ledgers(
    State(state): State<AppState>,
    _session: AuthSession,
) -> AppResult<impl IntoResponse> {
    let xml = state.tally.list_ledgers().await?;
    Ok(([(header::CONTENT_TYPE, "text/xml; charset=utf-8")], xml))
}
