//! 健康检查与令牌接收

use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use common::errors::AppResult;
use common::response::StatusBody;

use crate::state::AppState;
use crate::verifier::strip_bearer;

pub const SERVICE_NAME: &str = "bridge-agent";

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    /// 服务状态
    pub status: String,
    /// 服务名称
    pub service: String,
    /// 服务版本
    pub version: String,
    /// 当前时间戳
    pub timestamp: DateTime<Utc>,
}

/// 健康检查端点
#[utoipa::path(
    get,
    path = "/api/health",
    tag = "health",
    responses(
        (status = 200, description = "服务运行正常", body = HealthResponse)
    )
)]
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: SERVICE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
    })
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ReceiveTokenRequest {
    #[validate(length(min = 1, message = "token must not be empty"))]
    pub token: String,
    #[serde(default)]
    pub client_id: Option<String>,
}

/// 接收云端推送的令牌并写入令牌文件
#[utoipa::path(
    post,
    path = "/receive-token",
    tag = "auth",
    request_body = ReceiveTokenRequest,
    responses(
        (status = 200, description = "已保存", body = StatusBody),
        (status = 400, description = "令牌为空", body = common::response::ErrorBody)
    )
)]
pub async fn receive_token(
    State(state): State<AppState>,
    Json(req): Json<ReceiveTokenRequest>,
) -> AppResult<Json<StatusBody>> {
    req.validate()?;
    let token = strip_bearer(&req.token);
    tokio::fs::write(&state.config.token_file, token).await?;
    tracing::info!(
        client_id = req.client_id.as_deref().unwrap_or("-"),
        file = %state.config.token_file,
        "token received"
    );
    Ok(Json(StatusBody::new("received")))
}
