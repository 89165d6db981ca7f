//! Backend connectors.
//!
//! Opens one connection per logical operation for DB2, MySQL or PostgreSQL
//! and exposes the catalog through the [`Catalog`] trait. There is no pool:
//! the connection lives exactly as long as the boxed catalog that owns it.

pub mod db2;
pub mod mysql;
pub mod postgres;

use std::time::Duration;

use async_trait::async_trait;
use common::config::AppConfig;
use common::errors::{AppError, AppResult};
use common::models::connection::{BackendKind, ConnectionSpec};
use common::models::schema::{ColumnInfo, PreviewResult};
use common::utils::SqlDialect;

/// Catalog access over one open backend connection.
///
/// Dropping the value closes the connection; [`Catalog::close`] does the
/// same gracefully.
#[async_trait]
pub trait Catalog: Send {
    fn kind(&self) -> BackendKind;

    fn dialect(&self) -> SqlDialect {
        SqlDialect::new(self.kind())
    }

    /// Name of the database the connection is bound to.
    async fn current_database(&mut self) -> AppResult<String>;

    /// All schemas visible to the connection, system schemas included.
    async fn list_schemas(&mut self) -> AppResult<Vec<String>>;

    /// Base tables of one schema, ordered by name.
    async fn list_tables(&mut self, schema: &str) -> AppResult<Vec<String>>;

    /// Columns of one table, ordered by position.
    async fn list_columns(&mut self, schema: &str, table: &str) -> AppResult<Vec<ColumnInfo>>;

    /// Runs a generated, already-bounded `SELECT`.
    async fn fetch(&mut self, sql: &str) -> AppResult<PreviewResult>;

    async fn close(self: Box<Self>);
}

/// Anything that can hand out a fresh catalog for a connection spec.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn open(&self, spec: &ConnectionSpec) -> AppResult<Box<dyn Catalog>>;
}

/// Opens connections with a bounded connect time.
#[derive(Debug, Clone)]
pub struct Connector {
    connect_timeout: Duration,
}

#[async_trait]
impl CatalogSource for Connector {
    async fn open(&self, spec: &ConnectionSpec) -> AppResult<Box<dyn Catalog>> {
        Connector::open(self, spec).await
    }
}

impl Connector {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout(),
        }
    }

    pub fn with_timeout(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    /// Opens a connection described by `spec`.
    ///
    /// Every failure, including the connect timeout, is reported as
    /// [`AppError::DatabaseConnection`] carrying the driver's message.
    pub async fn open(&self, spec: &ConnectionSpec) -> AppResult<Box<dyn Catalog>> {
        let attempt = async {
            match spec.kind {
                BackendKind::MySql => mysql::MySqlCatalog::connect(spec)
                    .await
                    .map(|c| Box::new(c) as Box<dyn Catalog>),
                BackendKind::Postgres => postgres::PgCatalog::connect(spec)
                    .await
                    .map(|c| Box::new(c) as Box<dyn Catalog>),
                BackendKind::Db2 => db2::connect(spec).await,
            }
        };

        match tokio::time::timeout(self.connect_timeout, attempt).await {
            Ok(Ok(catalog)) => {
                tracing::debug!(kind = %spec.kind, host = %spec.host, port = spec.port, "backend connected");
                Ok(catalog)
            }
            Ok(Err(e)) => {
                tracing::warn!(kind = %spec.kind, host = %spec.host, port = spec.port, error = %e, "backend connection failed");
                Err(e)
            }
            Err(_) => Err(AppError::DatabaseConnection(format!(
                "timed out after {}s connecting to {}:{}",
                self.connect_timeout.as_secs(),
                spec.host,
                spec.port
            ))),
        }
    }
}

/// Maps a driver error raised while connecting.
pub(crate) fn connect_error(e: impl std::fmt::Display) -> AppError {
    AppError::DatabaseConnection(e.to_string())
}

/// Maps a driver error raised by a catalog or preview query.
pub(crate) fn query_error(e: impl std::fmt::Display) -> AppError {
    AppError::CatalogQuery(e.to_string())
}
