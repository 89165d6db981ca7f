//! DB2 catalog over the ODBC/CLI driver.
//!
//! Only compiled with the `db2` feature. The driver is blocking, so every
//! call hops onto tokio's blocking pool while holding the connection mutex.

use common::errors::AppResult;
use common::models::connection::ConnectionSpec;

use super::Catalog;

#[cfg(feature = "db2")]
pub use driver::Db2Catalog;

#[cfg(feature = "db2")]
pub async fn connect(spec: &ConnectionSpec) -> AppResult<Box<dyn Catalog>> {
    let catalog = Db2Catalog::connect(spec).await?;
    Ok(Box::new(catalog))
}

#[cfg(not(feature = "db2"))]
pub async fn connect(spec: &ConnectionSpec) -> AppResult<Box<dyn Catalog>> {
    tracing::warn!(host = %spec.host, "DB2 requested but the driver is not compiled in");
    Err(common::errors::AppError::UnsupportedDatabaseType(
        "db2 (rebuild the agent with `--features db2`)".to_string(),
    ))
}

#[cfg(feature = "db2")]
mod driver {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use odbc_api::buffers::TextRowSet;
    use odbc_api::{
        ConnectionOptions, Cursor, IntoParameter, ParameterCollectionRef, ResultSetMetadata,
    };
    use serde_json::Value;

    use common::errors::{AppError, AppResult};
    use common::models::connection::{BackendKind, ConnectionSpec};
    use common::models::schema::{ColumnInfo, PreviewResult};

    use super::super::{connect_error, query_error, Catalog};

    const BATCH_SIZE: usize = 256;
    const MAX_TEXT_LEN: usize = 4096;

    pub struct Db2Catalog {
        /// One blocking-pool thread uses the handle at a time.
        conn: Arc<Mutex<odbc_api::Connection<'static>>>,
        schema: String,
    }

    impl Db2Catalog {
        pub async fn connect(spec: &ConnectionSpec) -> AppResult<Self> {
            let conn_str = spec.db2_connection_string();
            let conn = tokio::task::spawn_blocking(move || {
                let env = odbc_api::environment().map_err(connect_error)?;
                env.connect_with_connection_string(&conn_str, ConnectionOptions::default())
                    .map_err(connect_error)
            })
            .await
            .map_err(|e| AppError::Internal(format!("db2 connect task failed: {e}")))??;

            Ok(Self {
                conn: Arc::new(Mutex::new(conn)),
                schema: spec.db2_schema(),
            })
        }

        async fn blocking<T, F>(&self, op: F) -> AppResult<T>
        where
            T: Send + 'static,
            F: FnOnce(&odbc_api::Connection<'static>) -> AppResult<T> + Send + 'static,
        {
            let conn = Arc::clone(&self.conn);
            tokio::task::spawn_blocking(move || {
                let guard = conn
                    .lock()
                    .map_err(|_| AppError::Internal("db2 connection mutex poisoned".to_string()))?;
                op(&*guard)
            })
            .await
            .map_err(|e| AppError::Internal(format!("db2 task failed: {e}")))?
        }
    }

    #[async_trait]
    impl Catalog for Db2Catalog {
        fn kind(&self) -> BackendKind {
            BackendKind::Db2
        }

        async fn current_database(&mut self) -> AppResult<String> {
            let result = self
                .blocking(|conn| {
                    read_text(conn, "SELECT CURRENT SERVER FROM SYSIBM.SYSDUMMY1", ())
                })
                .await?;
            Ok(result
                .rows
                .into_iter()
                .next()
                .and_then(|row| row.into_iter().next())
                .and_then(|v| v.as_str().map(|s| s.trim().to_string()))
                .unwrap_or_default())
        }

        async fn list_schemas(&mut self) -> AppResult<Vec<String>> {
            Ok(vec![self.schema.clone()])
        }

        async fn list_tables(&mut self, schema: &str) -> AppResult<Vec<String>> {
            let schema = schema.to_string();
            let result = self
                .blocking(move |conn| {
                    let schema = schema.as_str().into_parameter();
                    read_text(
                        conn,
                        "SELECT TABNAME FROM SYSCAT.TABLES WHERE TABSCHEMA = ? AND TYPE = 'T' ORDER BY TABNAME",
                        &schema,
                    )
                })
                .await?;
            Ok(first_column(result))
        }

        async fn list_columns(&mut self, schema: &str, table: &str) -> AppResult<Vec<ColumnInfo>> {
            let schema = schema.to_string();
            let table = table.to_string();
            let result = self
                .blocking(move |conn| {
                    let schema = schema.as_str().into_parameter();
                    let table = table.as_str().into_parameter();
                    read_text(
                        conn,
                        "SELECT COLNAME, TYPENAME, LENGTH FROM SYSCAT.COLUMNS \
                         WHERE TABSCHEMA = ? AND TABNAME = ? ORDER BY COLNO",
                        (&schema, &table),
                    )
                })
                .await?;

            Ok(result
                .rows
                .into_iter()
                .filter_map(|row| {
                    let mut cells = row.into_iter();
                    let name = cells.next()?.as_str()?.trim().to_string();
                    let data_type = cells.next()?.as_str()?.trim().to_uppercase();
                    let length = cells
                        .next()
                        .and_then(|v| v.as_str().and_then(|s| s.trim().parse::<i64>().ok()));
                    Some(ColumnInfo::new(name, data_type).with_length(length))
                })
                .collect())
        }

        async fn fetch(&mut self, sql: &str) -> AppResult<PreviewResult> {
            let sql = sql.to_string();
            self.blocking(move |conn| read_text(conn, &sql, ())).await
        }

        async fn close(self: Box<Self>) {
            // the handle is released when the last Arc drops
            drop(self);
        }
    }

    fn first_column(result: PreviewResult) -> Vec<String> {
        result
            .rows
            .into_iter()
            .filter_map(|row| {
                row.into_iter()
                    .next()
                    .and_then(|v| v.as_str().map(|s| s.trim().to_string()))
            })
            .collect()
    }

    /// Runs `sql` and reads every cell as text.
    fn read_text(
        conn: &odbc_api::Connection<'static>,
        sql: &str,
        params: impl ParameterCollectionRef,
    ) -> AppResult<PreviewResult> {
        let Some(mut cursor) = conn.execute(sql, params, None).map_err(query_error)? else {
            return Ok(PreviewResult {
                columns: Vec::new(),
                rows: Vec::new(),
            });
        };

        let columns = cursor
            .column_names()
            .map_err(query_error)?
            .collect::<Result<Vec<String>, _>>()
            .map_err(query_error)?;

        let buffers =
            TextRowSet::for_cursor(BATCH_SIZE, &mut cursor, Some(MAX_TEXT_LEN)).map_err(query_error)?;
        let mut row_cursor = cursor.bind_buffer(buffers).map_err(query_error)?;

        let mut rows = Vec::new();
        while let Some(batch) = row_cursor.fetch().map_err(query_error)? {
            for row in 0..batch.num_rows() {
                let mut values = Vec::with_capacity(batch.num_cols());
                for col in 0..batch.num_cols() {
                    let value = match batch.at_as_str(col, row) {
                        Ok(Some(text)) => Value::String(text.to_string()),
                        Ok(None) => Value::Null,
                        Err(_) => batch
                            .at(col, row)
                            .map(|bytes| Value::String(String::from_utf8_lossy(bytes).into_owned()))
                            .unwrap_or(Value::Null),
                    };
                    values.push(value);
                }
                rows.push(values);
            }
        }

        Ok(PreviewResult { columns, rows })
    }
}
