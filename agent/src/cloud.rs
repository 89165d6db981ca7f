//! 云端转发
//!
//! 将模式映射和 Tally 数据以 JSON 形式 POST 到云端固定地址，不做重试。

use serde::Serialize;

use common::config::CloudUrls;
use common::errors::{AppError, AppResult};
use common::models::schema::SchemaMapping;
use common::models::tally::TallyPayload;

#[derive(Clone)]
pub struct CloudForwarder {
    client: reqwest::Client,
    urls: CloudUrls,
}

impl CloudForwarder {
    pub fn new(client: reqwest::Client, urls: CloudUrls) -> Self {
        Self { client, urls }
    }

    pub async fn send_mysql(&self, mapping: &SchemaMapping) -> AppResult<()> {
        self.post(&self.urls.receive_mysql, mapping).await
    }

    pub async fn send_postgres(&self, mapping: &SchemaMapping) -> AppResult<()> {
        self.post(&self.urls.receive_postgres, mapping).await
    }

    pub async fn send_tally(&self, payload: &TallyPayload) -> AppResult<()> {
        self.post(&self.urls.receive_tally, payload).await
    }

    async fn post<T: Serialize + ?Sized>(&self, url: &str, body: &T) -> AppResult<()> {
        let resp = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::ExternalService(format!("cloud request to {} failed: {}", url, e)))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            tracing::warn!(%url, %status, "cloud rejected payload");
            return Err(AppError::ExternalService(format!(
                "cloud returned {} for {}: {}",
                status, url, text
            )));
        }

        tracing::info!(%url, %status, "payload forwarded to cloud");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
    use common::models::schema::ColumnInfo;
    use indexmap::IndexMap;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tokio::sync::Mutex;

    type Received = Arc<Mutex<Vec<(String, Value)>>>;

    async fn spawn_cloud(status: StatusCode) -> (String, Received) {
        let received: Received = Arc::default();
        let record = |path: &'static str| {
            move |State(store): State<Received>, Json(body): Json<Value>| async move {
                store.lock().await.push((path.to_string(), body));
                status
            }
        };
        let app = Router::new()
            .route("/receive-mysql", post(record("mysql")))
            .route("/receive-postgres", post(record("postgres")))
            .route("/receive-tally", post(record("tally")))
            .with_state(received.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}", addr), received)
    }

    #[tokio::test]
    async fn test_send_mysql_posts_mapping() {
        let (base, received) = spawn_cloud(StatusCode::OK).await;
        let cloud = CloudForwarder::new(reqwest::Client::new(), CloudUrls::from_base(&base));

        let mut mapping = SchemaMapping::new();
        let mut tables = IndexMap::new();
        tables.insert("orders".to_string(), vec![ColumnInfo::new("id", "INTEGER")]);
        mapping.insert("shopdb", "shop", tables);

        cloud.send_mysql(&mapping).await.unwrap();

        let received = received.lock().await;
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].0, "mysql");
        assert_eq!(
            received[0].1,
            json!({"shopdb:shop": {"orders": [{"name": "id", "type": "INTEGER"}]}})
        );
    }

    #[tokio::test]
    async fn test_non_success_is_external_error() {
        let (base, _) = spawn_cloud(StatusCode::INTERNAL_SERVER_ERROR).await;
        let cloud = CloudForwarder::new(reqwest::Client::new(), CloudUrls::from_base(&base));
        let result = cloud.send_tally(&TallyPayload::default()).await;
        assert!(matches!(result, Err(AppError::ExternalService(_))));
    }
}
