//! 登录、仪表盘与预览页面

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::{Form, Json};
use axum_extra::extract::cookie::{Cookie, SignedCookieJar};
use serde::Deserialize;

use common::response::StatusBody;

use super::split_tables;
use crate::session::{session_cookie, AuthSession, PageSession, SessionState, SESSION_COOKIE};
use crate::state::AppState;
use crate::verifier::strip_bearer;
use crate::views::{self, DatabaseEntry};

pub async fn index() -> Redirect {
    Redirect::to("/login")
}

pub async fn login_page() -> Html<String> {
    Html(views::login(None))
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub token: String,
}

/// 校验令牌，成功后建立会话并跳转到仪表盘
pub async fn login_submit(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Form(form): Form<LoginForm>,
) -> Response {
    let token = strip_bearer(&form.token).to_string();
    if token.is_empty() {
        return (StatusCode::BAD_REQUEST, Html(views::login(Some("Please enter a token.")))).into_response();
    }
    if !state.verifier.verify(&token).await {
        return (
            StatusCode::UNAUTHORIZED,
            Html(views::login(Some("Token verification failed."))),
        )
            .into_response();
    }

    // drop any previous session of this browser
    if let Some(old) = jar.get(SESSION_COOKIE) {
        state.sessions.remove(old.value()).await;
    }
    let id = state
        .sessions
        .create(SessionState {
            token: Some(token),
            ..Default::default()
        })
        .await;
    tracing::info!(session = %id, "login succeeded");

    (jar.add(session_cookie(id)), Redirect::to("/dashboard")).into_response()
}

pub async fn logout(State(state): State<AppState>, jar: SignedCookieJar) -> (SignedCookieJar, Redirect) {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        state.sessions.remove(cookie.value()).await;
    }
    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    (jar, Redirect::to("/login"))
}

pub async fn dashboard(State(state): State<AppState>, PageSession(session): PageSession) -> Html<String> {
    let db2 = &state.config.db2;
    let databases = vec![DatabaseEntry {
        synced: session.state.synced.contains(&db2.database),
        name: db2.database.clone(),
    }];
    let tables = state.service.tables(db2, &db2.db2_schema()).await;
    if let Err(e) = &tables {
        tracing::warn!(error = %e, "dashboard could not list DB2 tables");
    }
    Html(views::dashboard(&databases, &tables))
}

/// 标记数据库为已同步
#[utoipa::path(
    post,
    path = "/sync_db/{db}",
    tag = "session",
    params(("db" = String, Path, description = "数据库名")),
    responses(
        (status = 200, description = "已标记", body = StatusBody),
        (status = 401, description = "未登录或令牌无效", body = common::response::ErrorBody)
    )
)]
pub async fn sync_db(
    State(state): State<AppState>,
    session: AuthSession,
    Path(db): Path<String>,
) -> Json<StatusBody> {
    state
        .sessions
        .update(&session.id, |s| {
            s.synced.insert(db);
        })
        .await;
    Json(StatusBody::success())
}

/// 取消数据库的同步标记
#[utoipa::path(
    post,
    path = "/unsync_db/{db}",
    tag = "session",
    params(("db" = String, Path, description = "数据库名")),
    responses(
        (status = 200, description = "已取消", body = StatusBody),
        (status = 401, description = "未登录或令牌无效", body = common::response::ErrorBody)
    )
)]
pub async fn unsync_db(
    State(state): State<AppState>,
    session: AuthSession,
    Path(db): Path<String>,
) -> Json<StatusBody> {
    state
        .sessions
        .update(&session.id, |s| {
            s.synced.remove(&db);
        })
        .await;
    Json(StatusBody::success())
}

/// 预览逗号分隔的多张 DB2 表
pub async fn preview_tables(
    State(state): State<AppState>,
    _session: PageSession,
    Path((db, tables)): Path<(String, String)>,
) -> Response {
    let tables = split_tables(&tables);
    if tables.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Html(views::error("Preview failed", "no table selected")),
        )
            .into_response();
    }

    let spec = state.config.db2.with_database(db.clone());
    match state
        .service
        .preview_many(&spec, &spec.db2_schema(), &tables, state.config.preview_limit)
        .await
    {
        Ok(previews) => Html(views::previews(&db, &previews)).into_response(),
        Err(e) => {
            tracing::warn!(database = %db, error = %e, "preview failed");
            (e.status(), Html(views::error("Preview failed", &e.to_string()))).into_response()
        }
    }
}
