//! 本地数据库桥接代理
//!
//! 连接本地 DB2 / MySQL / PostgreSQL 与 Tally，并把内省结果提供给云端：
//! - HTTP 接口与简单页面（令牌登录后使用）
//! - MySQL / PostgreSQL 模式与 Tally 数据转发到云端
//! - Socket.IO 隧道，响应云端的按需内省请求

mod backends;
mod cloud;
mod handlers;
mod introspect;
mod routes;
mod service;
mod session;
mod state;
mod tally;
mod tunnel;
mod verifier;
mod views;

use anyhow::Context;
use axum::{middleware, routing::get, Json, Router};
use common::config::AppConfig;
use common::middleware::request_id::request_id_middleware;
use state::AppState;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;

use handlers::system::SERVICE_NAME;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "桥接代理 API",
        version = "0.1.0",
        description = "本地数据库与 Tally 桥接代理"
    ),
    paths(
        handlers::db2::list_databases,
        handlers::db2::list_tables,
        handlers::db2::list_columns,
        handlers::db2::list_schema,
        handlers::db2::column_data,
        handlers::db2::metadata,
        handlers::connect::connect_mysql,
        handlers::connect::connect_postgres,
        handlers::pages::sync_db,
        handlers::pages::unsync_db,
        handlers::tally::sync_tally,
        handlers::tally::query_tally,
        handlers::tally::get_ledgers,
        handlers::system::receive_token,
        handlers::system::health_check,
    ),
    components(schemas(
        common::models::ColumnInfo,
        common::models::ConnectForm,
        common::models::DatabaseMetadata,
        common::models::TableMetadata,
        common::models::CompanyRecord,
        common::models::Voucher,
        common::models::TallyPayload,
        common::response::ErrorBody,
        common::response::StatusBody,
        handlers::DatabaseResponse,
        handlers::TablesResponse,
        handlers::ColumnsResponse,
        handlers::SchemaResponse,
        handlers::ColumnDataResponse,
        handlers::tally::QueryTallyRequest,
        handlers::system::ReceiveTokenRequest,
        handlers::system::HealthResponse,
        tally::TallyQueryResult,
    )),
    tags(
        (name = "db2", description = "DB2 内省端点"),
        (name = "connect", description = "MySQL / PostgreSQL 同步端点"),
        (name = "session", description = "会话端点"),
        (name = "tally", description = "Tally 端点"),
        (name = "auth", description = "令牌端点"),
        (name = "health", description = "健康检查端点")
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file (if present) before anything else
    load_dotenv();

    // 初始化日志追踪
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // 加载配置
    let config = AppConfig::load();
    let state = AppState::new(config.clone()).context("failed to initialize application state")?;

    // 启动隧道
    if config.tunnel_enabled {
        let tunnel = tunnel::TunnelService::new(state.service.clone(), state.config.clone());
        tokio::spawn(tunnel::run(tunnel));
    } else {
        info!("隧道已禁用");
    }

    // 创建路由
    let app = create_router(state);

    // 启动服务
    let addr = format!("{}:{}", config.host, config.port);
    info!(service = SERVICE_NAME, address = %addr, "启动服务");

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("绑定地址失败: {}", addr))?;
    axum::serve(listener, app).await.context("服务运行失败")?;
    Ok(())
}

fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(routes::router())
        .route("/api-docs/openapi.json", get(openapi_json))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Load .env file from the working directory (best-effort, no error if missing).
fn load_dotenv() {
    let env_path = std::path::Path::new(".env");
    if env_path.exists() {
        if let Ok(content) = std::fs::read_to_string(env_path) {
            for line in content.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                if let Some((key, value)) = line.split_once('=') {
                    let key = key.trim();
                    let value = value.trim().trim_matches('"');
                    // Only set if not already set by the environment
                    if std::env::var(key).is_err() {
                        std::env::set_var(key, value);
                    }
                }
            }
        }
    }
}
