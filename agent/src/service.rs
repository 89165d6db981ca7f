//! 内省服务模块
//!
//! 每个操作打开一条独立连接，执行完毕（无论成功与否）立即关闭。

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use common::config::AppConfig;
use common::errors::{AppError, AppResult};
use common::models::connection::ConnectionSpec;
use common::models::schema::{ColumnInfo, DatabaseMetadata, PreviewResult, SchemaMapping};

use crate::backends::{Catalog, CatalogSource, Connector};
use crate::introspect;

/// 数据库内省服务
#[derive(Clone)]
pub struct IntrospectionService {
    source: Arc<dyn CatalogSource>,
    query_timeout: Duration,
}

impl IntrospectionService {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_source(Arc::new(Connector::new(config)), config.query_timeout())
    }

    pub fn with_source(source: Arc<dyn CatalogSource>, query_timeout: Duration) -> Self {
        Self {
            source,
            query_timeout,
        }
    }

    async fn open(&self, spec: &ConnectionSpec) -> AppResult<Box<dyn Catalog>> {
        self.source.open(spec).await
    }

    /// 为单个操作套上查询超时
    async fn bounded<T>(&self, op: impl std::future::Future<Output = AppResult<T>>) -> AppResult<T> {
        match tokio::time::timeout(self.query_timeout, op).await {
            Ok(result) => result,
            Err(_) => Err(AppError::Timeout(format!(
                "query did not finish within {}s",
                self.query_timeout.as_secs()
            ))),
        }
    }

    /// 构建完整的模式映射，键为 `database:schema`
    pub async fn schema_mapping(&self, spec: &ConnectionSpec) -> AppResult<SchemaMapping> {
        let mut catalog = self.open(spec).await?;
        let result = self
            .bounded(introspect::build_schema_mapping(catalog.as_mut(), &spec.database))
            .await;
        catalog.close().await;
        result
    }

    /// 列出某个模式下的基表
    pub async fn tables(&self, spec: &ConnectionSpec, schema: &str) -> AppResult<Vec<String>> {
        let mut catalog = self.open(spec).await?;
        let result = self.bounded(catalog.list_tables(schema)).await;
        catalog.close().await;
        result
    }

    pub async fn columns(
        &self,
        spec: &ConnectionSpec,
        schema: &str,
        table: &str,
    ) -> AppResult<Vec<ColumnInfo>> {
        let mut catalog = self.open(spec).await?;
        let result = self
            .bounded(introspect::table_columns(catalog.as_mut(), schema, table))
            .await;
        catalog.close().await;
        result
    }

    pub async fn table_schema(
        &self,
        spec: &ConnectionSpec,
        schema: &str,
        table: &str,
    ) -> AppResult<Vec<ColumnInfo>> {
        let mut catalog = self.open(spec).await?;
        let result = self
            .bounded(introspect::table_schema(catalog.as_mut(), schema, table))
            .await;
        catalog.close().await;
        result
    }

    pub async fn preview(
        &self,
        spec: &ConnectionSpec,
        schema: &str,
        table: &str,
        limit: u32,
    ) -> AppResult<PreviewResult> {
        let mut catalog = self.open(spec).await?;
        let result = self
            .bounded(introspect::preview_table(catalog.as_mut(), schema, table, limit))
            .await;
        catalog.close().await;
        result
    }

    /// 预览多张表，共用一条连接
    pub async fn preview_many(
        &self,
        spec: &ConnectionSpec,
        schema: &str,
        tables: &[String],
        limit: u32,
    ) -> AppResult<Vec<(String, AppResult<PreviewResult>)>> {
        let mut catalog = self.open(spec).await?;
        let mut previews = Vec::with_capacity(tables.len());
        for table in tables {
            let result = self
                .bounded(introspect::preview_table(catalog.as_mut(), schema, table, limit))
                .await;
            previews.push((table.clone(), result));
        }
        catalog.close().await;
        Ok(previews)
    }

    pub async fn column_values(
        &self,
        spec: &ConnectionSpec,
        schema: &str,
        table: &str,
        column: &str,
        cap: u32,
    ) -> AppResult<Vec<Value>> {
        let mut catalog = self.open(spec).await?;
        let result = self
            .bounded(introspect::column_values(catalog.as_mut(), schema, table, column, cap))
            .await;
        catalog.close().await;
        result
    }

    pub async fn metadata(&self, spec: &ConnectionSpec, schema: &str) -> AppResult<DatabaseMetadata> {
        let mut catalog = self.open(spec).await?;
        let result = self
            .bounded(introspect::metadata(catalog.as_mut(), schema))
            .await;
        catalog.close().await;
        result
    }

    /// 所有非系统模式下的 `schema.table`
    pub async fn qualified_tables(&self, spec: &ConnectionSpec) -> AppResult<Vec<String>> {
        let mut catalog = self.open(spec).await?;
        let result = self
            .bounded(introspect::qualified_tables(catalog.as_mut()))
            .await;
        catalog.close().await;
        result
    }
}
