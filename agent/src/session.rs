//! 浏览器会话
//!
//! 会话内容保存在进程内存中，浏览器只持有一个签名 cookie 形式的不透明会话 ID。
//! 受保护的路由通过 [`AuthSession`]（JSON，401）或 [`PageSession`]（HTML，重定向）
//! 提取器取得会话，每次请求都会重新校验令牌。闲置超过超时时间的会话会被清除。

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;
use axum::response::Redirect;
use axum_extra::extract::cookie::{Cookie, Key, SignedCookieJar};
use tokio::sync::RwLock;

use common::errors::AppError;
use common::utils::IdGenerator;

use crate::state::AppState;

pub const SESSION_COOKIE: &str = "bridge_session";

/// Per-browser state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub token: Option<String>,
    /// DB2 database names the user marked as synced.
    pub synced: BTreeSet<String>,
}

struct Entry {
    state: SessionState,
    last_seen: Instant,
}

impl Entry {
    fn expired(&self, now: Instant, idle_timeout: Duration) -> bool {
        now.duration_since(self.last_seen) > idle_timeout
    }
}

/// In-memory session store keyed by session id.
///
/// Entries idle for longer than the timeout are treated as missing and are
/// pruned whenever a new session is created.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<String, Entry>>>,
    idle_timeout: Duration,
}

impl SessionStore {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            inner: Arc::default(),
            idle_timeout,
        }
    }

    /// Stores `state` under a new id and returns the id.
    pub async fn create(&self, state: SessionState) -> String {
        let id = IdGenerator::session_id();
        let now = Instant::now();
        let mut sessions = self.inner.write().await;
        let before = sessions.len();
        sessions.retain(|_, entry| !entry.expired(now, self.idle_timeout));
        if sessions.len() < before {
            tracing::debug!(pruned = before - sessions.len(), "idle sessions dropped");
        }
        sessions.insert(
            id.clone(),
            Entry {
                state,
                last_seen: now,
            },
        );
        id
    }

    /// Live session state; refreshes the idle clock. An expired entry is
    /// removed and reported as missing.
    pub async fn get(&self, id: &str) -> Option<SessionState> {
        let now = Instant::now();
        let mut sessions = self.inner.write().await;
        let entry = sessions.get_mut(id)?;
        if entry.expired(now, self.idle_timeout) {
            sessions.remove(id);
            tracing::info!(session = %id, "session expired");
            return None;
        }
        entry.last_seen = now;
        Some(entry.state.clone())
    }

    /// Applies `f` to the session, returning `false` when it no longer exists.
    pub async fn update<F>(&self, id: &str, f: F) -> bool
    where
        F: FnOnce(&mut SessionState),
    {
        match self.inner.write().await.get_mut(id) {
            Some(entry) => {
                f(&mut entry.state);
                entry.last_seen = Instant::now();
                true
            }
            None => false,
        }
    }

    pub async fn remove(&self, id: &str) -> Option<SessionState> {
        self.inner.write().await.remove(id).map(|entry| entry.state)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }
}

/// Signing key for the session cookie.
///
/// Falls back to a random per-process key when `secret` is missing or too
/// short, which invalidates sessions on restart.
pub fn cookie_key(secret: Option<&str>) -> Key {
    match secret.map(|s| Key::try_from(s.as_bytes())) {
        Some(Ok(key)) => key,
        Some(Err(_)) => {
            tracing::warn!("SESSION_SECRET shorter than 64 bytes, using a random key");
            Key::generate()
        }
        None => {
            tracing::warn!("SESSION_SECRET not set, sessions will not survive a restart");
            Key::generate()
        }
    }
}

/// Cookie carrying the session id.
pub fn session_cookie(id: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, id))
        .path("/")
        .http_only(true)
        .build()
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.cookie_key.clone()
    }
}

/// A verified session.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub id: String,
    pub state: SessionState,
}

/// Session id from the signed cookie, if the signature checks out.
pub fn session_id(parts: &Parts, key: &Key) -> Option<String> {
    SignedCookieJar::from_headers(&parts.headers, key.clone())
        .get(SESSION_COOKIE)
        .map(|c| c.value().to_string())
}

async fn authenticate(parts: &Parts, state: &AppState) -> Option<AuthSession> {
    let id = session_id(parts, &state.cookie_key)?;
    let session = state.sessions.get(&id).await?;
    let token = session.token.as_deref()?;
    if !state.verifier.verify(token).await {
        tracing::info!(session = %id, "session token no longer verified");
        return None;
    }
    Some(AuthSession { id, state: session })
}

impl FromRequestParts<AppState> for AuthSession {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        authenticate(parts, state).await.ok_or(AppError::Unauthorized)
    }
}

/// A verified session for HTML pages; rejection redirects to the login page.
#[derive(Debug, Clone)]
pub struct PageSession(pub AuthSession);

impl FromRequestParts<AppState> for PageSession {
    type Rejection = Redirect;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        authenticate(parts, state)
            .await
            .map(PageSession)
            .ok_or_else(|| Redirect::to("/login"))
    }
}
