//! Application configuration.
//!
//! Everything is read from environment variables (optionally seeded from a
//! `.env` file by the binary). Parsing goes through a lookup function so the
//! same code path serves `std::env` and tests.

use std::str::FromStr;
use std::time::Duration;

use crate::models::connection::{BackendKind, ConnectionSpec};

/// Top-level agent configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Bind address for the HTTP façade.
    pub host: String,
    /// Bind port for the HTTP façade.
    pub port: u16,
    /// The fixed DB2 instance served by the DB2 routes and tunnel events.
    pub db2: ConnectionSpec,
    /// PostgreSQL instance served by the tunnel and `/preview-postgres`.
    pub postgres: ConnectionSpec,
    /// Cloud endpoints.
    pub cloud: CloudUrls,
    /// Client identifier sent along with every token verification.
    pub client_id: String,
    /// Tally XML endpoint.
    pub tally_url: String,
    /// Company used by the ledger listing envelope.
    pub tally_company: String,
    pub connect_timeout_secs: u64,
    pub query_timeout_secs: u64,
    pub http_timeout_secs: u64,
    /// Default row limit for table previews.
    pub preview_limit: u32,
    /// Upper bound on rows returned by a column scan.
    pub column_values_limit: u32,
    pub tunnel_enabled: bool,
    /// Number of tunnel requests allowed to run concurrently.
    pub tunnel_workers: usize,
    /// Secret used to sign the session cookie.
    pub session_secret: Option<String>,
    /// Sessions idle for longer than this are dropped.
    pub session_idle_timeout_secs: u64,
    /// File the cloud-pushed token is written to.
    pub token_file: String,
}

/// Cloud service URLs, all derived from one base URL.
#[derive(Debug, Clone)]
pub struct CloudUrls {
    pub base: String,
    pub verify_token: String,
    pub receive_mysql: String,
    pub receive_postgres: String,
    pub receive_tally: String,
    /// Socket.IO namespace of the tunnel.
    pub tunnel_namespace: String,
}

impl CloudUrls {
    /// Builds every endpoint from the base URL.
    pub fn from_base(base: &str) -> Self {
        let base = base.trim_end_matches('/').to_string();
        Self {
            verify_token: format!("{}/verify-token", base),
            receive_mysql: format!("{}/receive-mysql", base),
            receive_postgres: format!("{}/receive-postgres", base),
            receive_tally: format!("{}/receive-tally", base),
            tunnel_namespace: "/tunnel".to_string(),
            base,
        }
    }
}

const DEFAULT_CLOUD_URL: &str = "https://smartcard-cloud.onrender.com";

/// Parses `value` as `T`; missing, malformed or out-of-range input yields `default`.
fn parse_or<T: FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

impl AppConfig {
    /// Loads configuration from the process environment.
    pub fn load() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str, default: &str| -> String {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        let flag = |key: &str, default: bool| -> bool {
            match lookup(key).map(|v| v.trim().to_ascii_lowercase()) {
                Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => true,
                Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => false,
                _ => default,
            }
        };

        let db2 = ConnectionSpec::new(
            BackendKind::Db2,
            text("DB2_HOSTNAME", "127.0.0.1"),
            parse_or(lookup("DB2_PORT"), 50000u16),
            text("DB2_USERNAME", "DB2ADMIN"),
            lookup("DB2_PASSWORD").unwrap_or_default(),
            text("DB2_DATABASE", "TESTDB"),
        );

        let postgres = ConnectionSpec::new(
            BackendKind::Postgres,
            text("POSTGRES_HOST", "localhost"),
            parse_or(lookup("POSTGRES_PORT"), 5432u16),
            text("POSTGRES_USER", "postgres"),
            lookup("POSTGRES_PASSWORD").unwrap_or_default(),
            text("POSTGRES_DATABASE", "school"),
        );

        Self {
            host: text("SERVER_HOST", "0.0.0.0"),
            port: parse_or(lookup("SERVER_PORT"), 5005u16),
            db2,
            postgres,
            cloud: CloudUrls::from_base(&text("CLOUD_BASE_URL", DEFAULT_CLOUD_URL)),
            client_id: text("SMARTCARD_CLIENT_ID", "smartcard_client"),
            tally_url: text("TALLY_URL", "http://localhost:9000"),
            tally_company: text("TALLY_COMPANY", "Test Company"),
            connect_timeout_secs: parse_or(lookup("CONNECT_TIMEOUT_SECS"), 10),
            query_timeout_secs: parse_or(lookup("QUERY_TIMEOUT_SECS"), 30),
            http_timeout_secs: parse_or(lookup("HTTP_TIMEOUT_SECS"), 30),
            preview_limit: parse_or(lookup("PREVIEW_LIMIT"), 10u32).max(1),
            column_values_limit: parse_or(lookup("COLUMN_VALUES_LIMIT"), 1000u32).max(1),
            tunnel_enabled: flag("TUNNEL_ENABLED", true),
            tunnel_workers: parse_or(lookup("TUNNEL_WORKERS"), 4usize).max(1),
            session_secret: lookup("SESSION_SECRET").filter(|s| !s.is_empty()),
            session_idle_timeout_secs: parse_or(lookup("SESSION_IDLE_TIMEOUT_SECS"), 8 * 60 * 60),
            token_file: text("TOKEN_FILE", "latest_token.txt"),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn session_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.session_idle_timeout_secs)
    }

    /// Clamps a caller-supplied column scan limit to the configured cap.
    pub fn column_values_cap(&self, requested: Option<u32>) -> u32 {
        requested
            .filter(|n| *n > 0)
            .map_or(self.column_values_limit, |n| n.min(self.column_values_limit))
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}
