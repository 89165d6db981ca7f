//! Application state for the bridge agent.

use std::sync::Arc;

use axum_extra::extract::cookie::Key;
use common::config::AppConfig;
use common::errors::{AppError, AppResult};

use crate::backends::CatalogSource;
use crate::cloud::CloudForwarder;
use crate::service::IntrospectionService;
use crate::session::{cookie_key, SessionStore};
use crate::tally::TallyClient;
use crate::verifier::{RemoteTokenVerifier, TokenVerifier};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub service: IntrospectionService,
    pub verifier: Arc<dyn TokenVerifier>,
    pub sessions: SessionStore,
    pub cookie_key: Key,
    pub cloud: CloudForwarder,
    pub tally: TallyClient,
}

impl AppState {
    /// Creates the state; every outbound HTTP call shares one client with
    /// the configured timeout.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout())
            .build()
            .map_err(|e| AppError::Internal(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            service: IntrospectionService::new(&config),
            verifier: Arc::new(RemoteTokenVerifier::new(
                http.clone(),
                config.cloud.verify_token.clone(),
                config.client_id.clone(),
            )),
            sessions: SessionStore::new(config.session_idle_timeout()),
            cookie_key: cookie_key(config.session_secret.as_deref()),
            cloud: CloudForwarder::new(http.clone(), config.cloud.clone()),
            tally: TallyClient::new(http, config.tally_url.clone(), config.tally_company.clone()),
            config: Arc::new(config),
        })
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn TokenVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    /// Replaces the database connector, keeping the query timeout.
    pub fn with_catalogs(mut self, source: Arc<dyn CatalogSource>) -> Self {
        self.service = IntrospectionService::with_source(source, self.config.query_timeout());
        self
    }
}
