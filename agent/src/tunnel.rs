//! 云端隧道
//!
//! 通过 Socket.IO 长连接接收云端的按需内省请求。每个请求在有界工作池中
//! 独立执行，每个 `request_id` 恰好得到一次响应；失败时返回空结果并附带 `error`。

use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use rust_socketio::asynchronous::{Client, ClientBuilder};
use rust_socketio::Payload;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::sync::Semaphore;

use common::config::AppConfig;
use common::errors::AppResult;

use crate::introspect::split_qualified;
use crate::service::IntrospectionService;

const RECONNECT_DELAY: Duration = Duration::from_secs(10);
const DEFAULT_PG_SCHEMA: &str = "public";

/// Inbound tunnel events.
pub const EVENTS: [&str; 5] = [
    "get_schema",
    "get_tables",
    "get_column_data",
    "get_postgres_tables",
    "get_postgres_schema",
];

#[derive(Debug, Deserialize)]
struct TableArgs {
    request_id: String,
    table: String,
}

#[derive(Debug, Deserialize)]
struct RequestArgs {
    request_id: String,
}

#[derive(Debug, Deserialize)]
struct ColumnArgs {
    request_id: String,
    table: String,
    column: String,
    #[serde(default)]
    limit: Option<u32>,
}

/// A parsed tunnel request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TunnelRequest {
    Schema { request_id: String, table: String },
    Tables { request_id: String },
    ColumnData {
        request_id: String,
        table: String,
        column: String,
        limit: Option<u32>,
    },
    PostgresTables { request_id: String },
    /// `table` is `schema.table`.
    PostgresSchema { request_id: String, table: String },
}

impl TunnelRequest {
    pub fn parse(event: &str, payload: Value) -> Result<Self, String> {
        let invalid = |e: serde_json::Error| format!("invalid {} payload: {}", event, e);
        match event {
            "get_schema" => {
                let a: TableArgs = serde_json::from_value(payload).map_err(invalid)?;
                Ok(Self::Schema {
                    request_id: a.request_id,
                    table: a.table,
                })
            }
            "get_tables" => {
                let a: RequestArgs = serde_json::from_value(payload).map_err(invalid)?;
                Ok(Self::Tables {
                    request_id: a.request_id,
                })
            }
            "get_column_data" => {
                let a: ColumnArgs = serde_json::from_value(payload).map_err(invalid)?;
                Ok(Self::ColumnData {
                    request_id: a.request_id,
                    table: a.table,
                    column: a.column,
                    limit: a.limit,
                })
            }
            "get_postgres_tables" => {
                let a: RequestArgs = serde_json::from_value(payload).map_err(invalid)?;
                Ok(Self::PostgresTables {
                    request_id: a.request_id,
                })
            }
            "get_postgres_schema" => {
                let a: TableArgs = serde_json::from_value(payload).map_err(invalid)?;
                Ok(Self::PostgresSchema {
                    request_id: a.request_id,
                    table: a.table,
                })
            }
            other => Err(format!("unknown tunnel event {}", other)),
        }
    }

    pub fn request_id(&self) -> &str {
        match self {
            Self::Schema { request_id, .. }
            | Self::Tables { request_id }
            | Self::ColumnData { request_id, .. }
            | Self::PostgresTables { request_id }
            | Self::PostgresSchema { request_id, .. } => request_id,
        }
    }
}

/// Outbound event name and payload key for an inbound event.
pub fn response_shape(event: &str) -> Option<(&'static str, &'static str)> {
    match event {
        "get_schema" => Some(("schema_response", "schema")),
        "get_tables" => Some(("tables_response", "tables")),
        "get_column_data" => Some(("column_data_response", "data")),
        "get_postgres_tables" => Some(("postgres_tables_response", "tables")),
        "get_postgres_schema" => Some(("postgres_schema_response", "schema")),
        _ => None,
    }
}

/// Answers tunnel requests on a bounded number of workers.
#[derive(Clone)]
pub struct TunnelService {
    service: IntrospectionService,
    config: Arc<AppConfig>,
    permits: Arc<Semaphore>,
}

impl TunnelService {
    pub fn new(service: IntrospectionService, config: Arc<AppConfig>) -> Self {
        let permits = Arc::new(Semaphore::new(config.tunnel_workers.max(1)));
        Self {
            service,
            config,
            permits,
        }
    }

    /// Builds the reply for one inbound event.
    ///
    /// Returns `None` only when the payload carries no `request_id`, since
    /// such a reply could not be correlated.
    pub async fn respond(&self, event: &str, payload: Value) -> Option<(&'static str, Value)> {
        let (response_event, key) = response_shape(event)?;
        let request_id = payload
            .get("request_id")
            .and_then(Value::as_str)
            .map(str::to_string);

        let outcome = match TunnelRequest::parse(event, payload) {
            Ok(request) => {
                // a closed semaphore is never produced; treat it as "no limit"
                let _permit = self.permits.acquire().await.ok();
                self.answer(&request).await.map_err(|e| e.to_string())
            }
            Err(message) => Err(message),
        };

        let Some(request_id) = request_id else {
            tracing::warn!(event, "tunnel request without request_id dropped");
            return None;
        };

        let mut body = Map::new();
        match outcome {
            Ok(value) => {
                body.insert(key.to_string(), value);
            }
            Err(error) => {
                tracing::warn!(event, %request_id, %error, "tunnel request failed");
                body.insert(key.to_string(), Value::Array(Vec::new()));
                body.insert("error".to_string(), Value::String(error));
            }
        }
        body.insert("request_id".to_string(), Value::String(request_id));
        Some((response_event, Value::Object(body)))
    }

    async fn answer(&self, request: &TunnelRequest) -> AppResult<Value> {
        let db2 = &self.config.db2;
        let pg = &self.config.postgres;
        let value = match request {
            TunnelRequest::Schema { table, .. } => {
                json!(self.service.table_schema(db2, &db2.db2_schema(), table).await?)
            }
            TunnelRequest::Tables { .. } => {
                json!(self.service.tables(db2, &db2.db2_schema()).await?)
            }
            TunnelRequest::ColumnData {
                table,
                column,
                limit,
                ..
            } => {
                let cap = self.config.column_values_cap(*limit);
                json!(
                    self.service
                        .column_values(db2, &db2.db2_schema(), table, column, cap)
                        .await?
                )
            }
            TunnelRequest::PostgresTables { .. } => json!(self.service.qualified_tables(pg).await?),
            TunnelRequest::PostgresSchema { table, .. } => {
                let (schema, table) = split_qualified(table, DEFAULT_PG_SCHEMA);
                json!(self.service.columns(pg, schema, table).await?)
            }
        };
        Ok(value)
    }
}

/// First JSON value of a Socket.IO payload.
fn payload_value(payload: Payload) -> Option<Value> {
    match payload {
        Payload::Text(values) => values.into_iter().next(),
        _ => None,
    }
}

/// Connects the tunnel and keeps it up until the process exits.
pub async fn run(tunnel: TunnelService) {
    let url = tunnel.config.cloud.base.clone();
    let namespace = tunnel.config.cloud.tunnel_namespace.clone();

    loop {
        let mut builder = ClientBuilder::new(url.clone())
            .namespace(namespace.clone())
            .reconnect(true)
            .reconnect_on_disconnect(true)
            .on("error", |err: Payload, _socket: Client| {
                async move {
                    tracing::warn!(error = ?err, "tunnel socket error");
                }
                .boxed()
            });

        for event in EVENTS {
            let tunnel = tunnel.clone();
            builder = builder.on(event, move |payload: Payload, socket: Client| {
                let tunnel = tunnel.clone();
                async move {
                    let Some(value) = payload_value(payload) else {
                        tracing::warn!(event, "tunnel event without JSON payload");
                        return;
                    };
                    // run off the socket's callback loop
                    tokio::spawn(async move {
                        if let Some((reply, body)) = tunnel.respond(event, value).await {
                            if let Err(e) = socket.emit(reply, body).await {
                                tracing::warn!(event = reply, error = %e, "tunnel reply not sent");
                            }
                        }
                    });
                }
                .boxed()
            });
        }

        match builder.connect().await {
            Ok(client) => {
                tracing::info!(%url, %namespace, "tunnel connected");
                // the client reconnects on its own; keep it alive
                let _client = client;
                std::future::pending::<()>().await;
            }
            Err(e) => {
                tracing::warn!(%url, error = %e, delay_secs = RECONNECT_DELAY.as_secs(), "tunnel connect failed, retrying");
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::introspect::fake::FakeCatalog;
    use crate::service::testing::FakeSource;
    use common::errors::AppError;
    use common::models::connection::BackendKind;

    fn tunnel() -> TunnelService {
        let source = FakeSource::new(|spec| match spec.kind {
            BackendKind::Db2 => Ok(FakeCatalog::new(BackendKind::Db2).with_table(
                "DB2ADMIN",
                "STUDENTS",
                &[("ID", "INTEGER"), ("NAME", "VARCHAR")],
                vec![
                    vec![json!("1"), json!("Asha")],
                    vec![json!("2"), json!("Ravi")],
                ],
            )),
            BackendKind::Postgres => Ok(FakeCatalog::new(BackendKind::Postgres)
                .with_table("public", "students", &[("id", "INTEGER")], vec![])
                .with_table("pg_catalog", "pg_class", &[("oid", "OID")], vec![])),
            BackendKind::MySql => Err(AppError::DatabaseConnection("unused".into())),
        });
        let service = IntrospectionService::with_source(Arc::new(source), Duration::from_secs(5));
        TunnelService::new(service, Arc::new(AppConfig::default()))
    }

    #[test]
    fn test_parse_requests() {
        let req = TunnelRequest::parse(
            "get_column_data",
            json!({"request_id": "r1", "table": "students", "column": "NAME"}),
        )
        .unwrap();
        assert_eq!(
            req,
            TunnelRequest::ColumnData {
                request_id: "r1".into(),
                table: "students".into(),
                column: "NAME".into(),
                limit: None,
            }
        );
        assert_eq!(req.request_id(), "r1");

        assert!(TunnelRequest::parse("get_schema", json!({"request_id": "r2"})).is_err());
        assert!(TunnelRequest::parse("drop_everything", json!({"request_id": "r3"})).is_err());
    }

    #[tokio::test]
    async fn test_tables_response() {
        let (event, body) = tunnel()
            .respond("get_tables", json!({"request_id": "r1"}))
            .await
            .unwrap();
        assert_eq!(event, "tables_response");
        assert_eq!(body, json!({"request_id": "r1", "tables": ["STUDENTS"]}));
    }

    #[tokio::test]
    async fn test_schema_response_is_case_insensitive() {
        let (event, body) = tunnel()
            .respond("get_schema", json!({"request_id": "r2", "table": "students"}))
            .await
            .unwrap();
        assert_eq!(event, "schema_response");
        assert_eq!(body["schema"].as_array().unwrap().len(), 2);
        assert!(body.get("error").is_none());
    }

    #[tokio::test]
    async fn test_schema_response_omits_length() {
        let source = FakeSource::new(|_| {
            let mut catalog = FakeCatalog::new(BackendKind::Db2).with_table(
                "DB2ADMIN",
                "STUDENTS",
                &[("NAME", "VARCHAR")],
                vec![],
            );
            catalog.schemas[0].1[0].columns[0].length = Some(50);
            Ok(catalog)
        });
        let service = IntrospectionService::with_source(Arc::new(source), Duration::from_secs(5));
        let tunnel = TunnelService::new(service, Arc::new(AppConfig::default()));

        let (_, body) = tunnel
            .respond("get_schema", json!({"request_id": "r6", "table": "students"}))
            .await
            .unwrap();
        assert_eq!(body["schema"], json!([{"name": "NAME", "type": "VARCHAR"}]));
    }

    #[tokio::test]
    async fn test_column_data_respects_limit() {
        let (event, body) = tunnel()
            .respond(
                "get_column_data",
                json!({"request_id": "r3", "table": "STUDENTS", "column": "NAME", "limit": 1}),
            )
            .await
            .unwrap();
        assert_eq!(event, "column_data_response");
        assert_eq!(body["data"], json!(["Asha"]));
    }

    #[tokio::test]
    async fn test_postgres_events() {
        let tunnel = tunnel();
        let (event, body) = tunnel
            .respond("get_postgres_tables", json!({"request_id": "p1"}))
            .await
            .unwrap();
        assert_eq!(event, "postgres_tables_response");
        assert_eq!(body["tables"], json!(["public.students"]));

        let (event, body) = tunnel
            .respond(
                "get_postgres_schema",
                json!({"request_id": "p2", "table": "public.students"}),
            )
            .await
            .unwrap();
        assert_eq!(event, "postgres_schema_response");
        assert_eq!(body["schema"], json!([{"name": "id", "type": "INTEGER"}]));
    }

    #[tokio::test]
    async fn test_failure_still_answers_with_error() {
        let (event, body) = tunnel()
            .respond("get_schema", json!({"request_id": "r4", "table": "MISSING"}))
            .await
            .unwrap();
        assert_eq!(event, "schema_response");
        assert_eq!(body["request_id"], "r4");
        assert_eq!(body["schema"], json!([]));
        assert!(body["error"].as_str().unwrap().contains("MISSING"));
    }

    #[tokio::test]
    async fn test_malformed_payload_answers_with_error() {
        let (_, body) = tunnel()
            .respond("get_column_data", json!({"request_id": "r5", "table": "STUDENTS"}))
            .await
            .unwrap();
        assert_eq!(body["data"], json!([]));
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_missing_request_id_is_dropped() {
        assert!(tunnel().respond("get_tables", json!({})).await.is_none());
        assert!(tunnel().respond("unknown", json!({"request_id": "x"})).await.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_requests_each_answered_once() {
        let tunnel = tunnel();
        let mut handles = Vec::new();
        for i in 0..16 {
            let tunnel = tunnel.clone();
            handles.push(tokio::spawn(async move {
                tunnel
                    .respond("get_tables", json!({"request_id": format!("r{i}")}))
                    .await
            }));
        }
        let mut ids = Vec::new();
        for handle in handles {
            let (_, body) = handle.await.unwrap().unwrap();
            ids.push(body["request_id"].as_str().unwrap().to_string());
        }
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 16);
    }
}
