//! 路由模块

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::{connect, db2, pages, system, tally};
use crate::state::AppState;

/// 创建全部路由
pub fn router() -> Router<AppState> {
    Router::new()
        // 页面与会话
        .route("/", get(pages::index))
        .route("/login", get(pages::login_page).post(pages::login_submit))
        .route("/logout", get(pages::logout))
        .route("/dashboard", get(pages::dashboard))
        .route("/sync_db/{db}", post(pages::sync_db))
        .route("/unsync_db/{db}", post(pages::unsync_db))
        .route("/preview/{db}/{tables}", get(pages::preview_tables))
        // DB2 内省
        .route("/dbs", get(db2::list_databases))
        .route("/tables", get(db2::list_tables))
        .route("/columns", get(db2::list_columns))
        .route("/listschema/{table}", get(db2::list_schema))
        .route("/column_data", get(db2::column_data))
        .route("/metadata", get(db2::metadata))
        // MySQL / PostgreSQL
        .route("/connect-mysql", post(connect::connect_mysql))
        .route("/connect-postgres", post(connect::connect_postgres))
        .route("/preview-postgres", post(connect::preview_postgres))
        // Tally
        .route("/sync-tally", post(tally::sync_tally))
        .route("/query_tally", post(tally::query_tally))
        .route("/get_ledgers", get(tally::get_ledgers))
        // 系统
        .route("/receive-token", post(system::receive_token))
        .route("/api/health", get(system::health_check))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::Body;
    use axum::extract::State;
    use axum::http::{header, Request, StatusCode};
    use axum::response::IntoResponse;
    use axum::Json;
    use axum_extra::extract::cookie::SignedCookieJar;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tokio::sync::Mutex;
    use tower::ServiceExt;

    use common::config::{AppConfig, CloudUrls};
    use common::errors::AppError;
    use common::models::connection::BackendKind;

    use crate::introspect::fake::FakeCatalog;
    use crate::service::testing::FakeSource;
    use crate::session::{session_cookie, SessionState};
    use crate::verifier::StaticVerifier;

    type Received = Arc<Mutex<Vec<Value>>>;

    /// Cloud stand-in recording every `/receive-*` body.
    async fn spawn_cloud() -> (String, Received) {
        let received: Received = Arc::default();
        let app = Router::new()
            .route(
                "/receive-mysql",
                post(|State(store): State<Received>, Json(body): Json<Value>| async move {
                    store.lock().await.push(body);
                    StatusCode::OK
                }),
            )
            .route(
                "/receive-postgres",
                post(|State(store): State<Received>, Json(body): Json<Value>| async move {
                    store.lock().await.push(body);
                    StatusCode::OK
                }),
            )
            .with_state(received.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}", addr), received)
    }

    fn catalogs() -> FakeSource {
        FakeSource::new(|spec| match spec.kind {
            BackendKind::Db2 => Ok(FakeCatalog::new(BackendKind::Db2).with_table(
                "DB2ADMIN",
                "STUDENTS",
                &[("ID", "INTEGER"), ("NAME", "VARCHAR")],
                vec![
                    vec![json!("1"), json!("Asha")],
                    vec![json!("2"), json!("Ravi")],
                ],
            )),
            BackendKind::MySql if spec.host == "unreachable" => {
                Err(AppError::DatabaseConnection("connection refused".into()))
            }
            BackendKind::MySql => Ok(FakeCatalog::new(BackendKind::MySql)
                .with_table("shop", "orders", &[("id", "INTEGER"), ("total", "VARCHAR")], vec![])
                .with_table("mysql", "user", &[("Host", "CHAR")], vec![])),
            BackendKind::Postgres => Ok(FakeCatalog::new(BackendKind::Postgres).with_table(
                "public",
                "students",
                &[("id", "INTEGER"), ("name", "TEXT")],
                vec![vec![json!(1), json!("Asha")]],
            )),
        })
    }

    fn state_with(config: AppConfig, accept: bool) -> AppState {
        AppState::new(config)
            .unwrap()
            .with_verifier(Arc::new(StaticVerifier(accept)))
            .with_catalogs(Arc::new(catalogs()))
    }

    fn test_state(accept: bool) -> AppState {
        state_with(AppConfig::default(), accept)
    }

    async fn body_json(resp: axum::response::Response) -> Value {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn body_text(resp: axum::response::Response) -> String {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::empty()).unwrap()
    }

    fn post_form(uri: &str, form: &str, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::from(form.to_string())).unwrap()
    }

    fn post_json(uri: &str, body: Value, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    /// `name=value` part of the first `Set-Cookie` header.
    fn cookie_of(resp: &axum::response::Response) -> String {
        resp.headers()
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap()
            .split(';')
            .next()
            .unwrap()
            .to_string()
    }

    /// Logs in through the form and returns the session cookie.
    async fn login(app: &Router) -> String {
        let resp = app
            .clone()
            .oneshot(post_form("/login", "token=Bearer+abc", None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(resp.headers()[header::LOCATION], "/dashboard");
        cookie_of(&resp)
    }

    #[tokio::test]
    async fn test_index_redirects_to_login() {
        let app = router().with_state(test_state(true));
        let resp = app.oneshot(get("/", None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(resp.headers()[header::LOCATION], "/login");
    }

    #[tokio::test]
    async fn test_health_is_public() {
        let app = router().with_state(test_state(false));
        let resp = app.oneshot(get("/api/health", None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["service"], "bridge-agent");
    }

    #[tokio::test]
    async fn test_json_route_without_session_is_unauthorized() {
        let app = router().with_state(test_state(true));
        let resp = app.oneshot(get("/tables", None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            body_json(resp).await,
            json!({"error": "Unauthorized", "code": "UNAUTHORIZED"})
        );
    }

    #[tokio::test]
    async fn test_page_without_session_redirects_to_login() {
        let app = router().with_state(test_state(true));
        let resp = app.oneshot(get("/dashboard", None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(resp.headers()[header::LOCATION], "/login");
    }

    #[tokio::test]
    async fn test_rejecting_verifier_blocks_every_protected_route() {
        let state = test_state(false);
        let id = state
            .sessions
            .create(SessionState {
                token: Some("revoked".into()),
                ..Default::default()
            })
            .await;
        let jar = SignedCookieJar::new(state.cookie_key.clone()).add(session_cookie(id));
        let cookie = cookie_of(&(jar, ()).into_response());
        let app = router().with_state(state);

        for uri in [
            "/dbs",
            "/tables",
            "/columns?table=students",
            "/listschema/students",
            "/column_data?table=students&column=NAME",
            "/metadata",
            "/get_ledgers",
        ] {
            let resp = app.clone().oneshot(get(uri, Some(&cookie))).await.unwrap();
            assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "{}", uri);
        }
        for uri in ["/sync_db/TESTDB", "/unsync_db/TESTDB", "/sync-tally"] {
            let resp = app
                .clone()
                .oneshot(post_form(uri, "", Some(&cookie)))
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "{}", uri);
        }
        let resp = app
            .clone()
            .oneshot(post_json("/query_tally", json!({"xml": "<ENVELOPE/>"}), Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        for uri in ["/dashboard", "/preview/TESTDB/STUDENTS"] {
            let resp = app.clone().oneshot(get(uri, Some(&cookie))).await.unwrap();
            assert_eq!(resp.status(), StatusCode::SEE_OTHER, "{}", uri);
            assert_eq!(resp.headers()[header::LOCATION], "/login");
        }
    }

    #[tokio::test]
    async fn test_tampered_cookie_is_rejected() {
        let app = router().with_state(test_state(true));
        let cookie = login(&app).await;
        let forged = format!("{}x", cookie);
        let resp = app.oneshot(get("/dbs", Some(&forged))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_failed_login_shows_error() {
        let app = router().with_state(test_state(false));
        let resp = app
            .oneshot(post_form("/login", "token=nope", None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert!(resp.headers().get(header::SET_COOKIE).is_none());
        assert!(body_text(resp).await.contains("Token verification failed."));
    }

    #[tokio::test]
    async fn test_login_sync_and_logout() {
        let state = test_state(true);
        let app = router().with_state(state.clone());
        let cookie = login(&app).await;
        assert_eq!(state.sessions.len().await, 1);

        let resp = app
            .clone()
            .oneshot(post_form("/sync_db/TESTDB", "", Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await, json!({"status": "success"}));

        let resp = app.clone().oneshot(get("/dashboard", Some(&cookie))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let html = body_text(resp).await;
        assert!(html.contains("/unsync_db/TESTDB"));
        assert!(html.contains("STUDENTS"));

        let resp = app
            .clone()
            .oneshot(post_form("/unsync_db/TESTDB", "", Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = app.clone().oneshot(get("/logout", Some(&cookie))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(state.sessions.len().await, 0);

        let resp = app.oneshot(get("/dbs", Some(&cookie))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_db2_introspection_routes() {
        let app = router().with_state(test_state(true));
        let cookie = login(&app).await;
        let call = |uri: &'static str| {
            let app = app.clone();
            let cookie = cookie.clone();
            async move { app.oneshot(get(uri, Some(&cookie))).await.unwrap() }
        };

        let resp = call("/dbs").await;
        assert_eq!(body_json(resp).await, json!({"database": "TESTDB"}));

        let resp = call("/tables").await;
        assert_eq!(body_json(resp).await, json!({"tables": ["STUDENTS"]}));

        let resp = call("/columns").await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = call("/columns?table=students").await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["columns"].as_array().unwrap().len(), 2);

        let resp = call("/listschema/students").await;
        assert_eq!(
            body_json(resp).await,
            json!({"schema": [{"name": "ID", "type": "INTEGER"}, {"name": "NAME", "type": "VARCHAR"}]})
        );

        let resp = call("/listschema/nosuch").await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["code"], "CATALOG_QUERY_ERROR");

        let resp = call("/column_data?table=students").await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = call("/column_data?table=students&column=NAME&limit=1").await;
        assert_eq!(body_json(resp).await, json!({"data": ["Asha"]}));

        let resp = call("/metadata").await;
        let body = body_json(resp).await;
        assert_eq!(body["database"], "testdb");
        assert_eq!(body["tables"][0]["name"], "STUDENTS");
    }

    #[tokio::test]
    async fn test_preview_page_reports_each_table() {
        let app = router().with_state(test_state(true));
        let cookie = login(&app).await;
        let resp = app
            .oneshot(get("/preview/TESTDB/students,missing", Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let html = body_text(resp).await;
        assert!(html.contains("<td>Asha</td>"));
        assert!(html.contains("unknown table &#39;missing&#39;"));
    }

    #[tokio::test]
    async fn test_preview_postgres_page() {
        let app = router().with_state(test_state(true));
        let cookie = login(&app).await;
        let resp = app
            .oneshot(post_form(
                "/preview-postgres",
                "dbname=school&table=public.students",
                Some(&cookie),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let html = body_text(resp).await;
        assert!(html.contains("<li>id</li>"));
        assert!(html.contains("<td>Asha</td>"));
    }

    #[tokio::test]
    async fn test_connect_mysql_forwards_mapping() {
        let (base, received) = spawn_cloud().await;
        let config = AppConfig {
            cloud: CloudUrls::from_base(&base),
            ..AppConfig::default()
        };
        let app = router().with_state(state_with(config, true));
        let cookie = login(&app).await;

        let resp = app
            .oneshot(post_form(
                "/connect-mysql",
                "host=db.local&port=3306&username=root&password=secret&database=shopdb",
                Some(&cookie),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(resp.headers()[header::LOCATION], "/dashboard");

        let received = received.lock().await;
        assert_eq!(
            received.as_slice(),
            &[json!({
                "shopdb:shop": {
                    "orders": [
                        {"name": "id", "type": "INTEGER"},
                        {"name": "total", "type": "VARCHAR"}
                    ]
                }
            })]
        );
    }

    #[tokio::test]
    async fn test_connect_errors_are_typed() {
        let app = router().with_state(test_state(true));
        let cookie = login(&app).await;

        let resp = app
            .clone()
            .oneshot(post_form(
                "/connect-mysql",
                "host=&port=3306&username=root&password=&database=shop",
                Some(&cookie),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["code"], "VALIDATION_ERROR");

        let resp = app
            .oneshot(post_form(
                "/connect-mysql",
                "host=unreachable&port=3306&username=root&password=&database=shop",
                Some(&cookie),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(body_json(resp).await["code"], "CONNECTION_ERROR");
    }

    #[tokio::test]
    async fn test_query_tally_requires_xml() {
        let app = router().with_state(test_state(true));
        let cookie = login(&app).await;
        let resp = app
            .oneshot(post_json("/query_tally", json!({"xml": ""}), Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_sync_tally_failure_is_bad_gateway() {
        let config = AppConfig {
            tally_url: "http://127.0.0.1:1/".to_string(),
            http_timeout_secs: 5,
            ..AppConfig::default()
        };
        let app = router().with_state(state_with(config, true));
        let cookie = login(&app).await;
        let resp = app
            .oneshot(post_form("/sync-tally", "", Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(body_json(resp).await["status"], "error");
    }

    #[tokio::test]
    async fn test_receive_token_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("latest_token.txt");
        let config = AppConfig {
            token_file: path.to_string_lossy().into_owned(),
            ..AppConfig::default()
        };
        let app = router().with_state(state_with(config, false));

        let resp = app
            .clone()
            .oneshot(post_json(
                "/receive-token",
                json!({"token": "Bearer tok-123", "client_id": "smartcard_client"}),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await, json!({"status": "received"}));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "tok-123");

        let resp = app
            .oneshot(post_json("/receive-token", json!({"token": ""}), None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_query_timeout_maps_to_gateway_timeout() {
        use crate::backends::{Catalog, CatalogSource};
        use async_trait::async_trait;
        use common::errors::AppResult;
        use common::models::connection::ConnectionSpec;

        /// Catalog whose queries never finish.
        struct Stuck;

        #[async_trait]
        impl Catalog for Stuck {
            fn kind(&self) -> BackendKind {
                BackendKind::Db2
            }
            async fn current_database(&mut self) -> AppResult<String> {
                std::future::pending().await
            }
            async fn list_schemas(&mut self) -> AppResult<Vec<String>> {
                std::future::pending().await
            }
            async fn list_tables(&mut self, _schema: &str) -> AppResult<Vec<String>> {
                std::future::pending().await
            }
            async fn list_columns(
                &mut self,
                _schema: &str,
                _table: &str,
            ) -> AppResult<Vec<common::models::schema::ColumnInfo>> {
                std::future::pending().await
            }
            async fn fetch(&mut self, _sql: &str) -> AppResult<common::models::schema::PreviewResult> {
                std::future::pending().await
            }
            async fn close(self: Box<Self>) {}
        }

        struct StuckSource;

        #[async_trait]
        impl CatalogSource for StuckSource {
            async fn open(&self, _spec: &ConnectionSpec) -> AppResult<Box<dyn Catalog>> {
                Ok(Box::new(Stuck))
            }
        }

        let config = AppConfig {
            query_timeout_secs: 1,
            ..AppConfig::default()
        };
        let state = state_with(config, true).with_catalogs(Arc::new(StuckSource));
        let app = router().with_state(state);
        let cookie = login(&app).await;

        let resp = tokio::time::timeout(
            Duration::from_secs(10),
            app.oneshot(get("/tables", Some(&cookie))),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(resp.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(body_json(resp).await["code"], "TIMEOUT");
    }
}
