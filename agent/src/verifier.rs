//! 令牌校验
//!
//! 校验完全委托给云端身份服务；任何异常都视为校验失败。

use async_trait::async_trait;
use serde::Serialize;

/// Accepts or rejects a bearer token.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> bool;
}

#[derive(Serialize)]
struct VerifyRequest<'a> {
    token: &'a str,
    client_id: &'a str,
}

/// 远程令牌校验器
pub struct RemoteTokenVerifier {
    client: reqwest::Client,
    url: String,
    client_id: String,
}

impl RemoteTokenVerifier {
    pub fn new(client: reqwest::Client, url: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            client_id: client_id.into(),
        }
    }
}

/// Removes a leading `Bearer ` scheme, if any.
pub fn strip_bearer(token: &str) -> &str {
    let token = token.trim();
    token
        .strip_prefix("Bearer ")
        .or_else(|| token.strip_prefix("bearer "))
        .map(str::trim)
        .unwrap_or(token)
}

#[async_trait]
impl TokenVerifier for RemoteTokenVerifier {
    async fn verify(&self, token: &str) -> bool {
        let token = strip_bearer(token);
        if token.is_empty() {
            return false;
        }

        let body = VerifyRequest {
            token,
            client_id: &self.client_id,
        };
        match self.client.post(&self.url).json(&body).send().await {
            Ok(resp) if resp.status() == reqwest::StatusCode::OK => true,
            Ok(resp) => {
                tracing::warn!(status = %resp.status(), "token rejected by verifier");
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, url = %self.url, "token verification failed");
                false
            }
        }
    }
}

/// Verifier with a fixed answer.
#[cfg(test)]
pub struct StaticVerifier(pub bool);

#[cfg(test)]
#[async_trait]
impl TokenVerifier for StaticVerifier {
    async fn verify(&self, _token: &str) -> bool {
        self.0
    }
}
