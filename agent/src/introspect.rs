//! Schema introspection and bounded previews.
//!
//! Everything here works against one open [`Catalog`], so the same code
//! serves DB2, MySQL and PostgreSQL. Identifiers supplied by callers are
//! resolved against the live catalog before any SQL is generated.

use indexmap::IndexMap;
use serde_json::Value;

use common::errors::{AppError, AppResult};
use common::models::connection::BackendKind;
use common::models::schema::{
    ColumnInfo, DatabaseMetadata, PreviewResult, SchemaMapping, TableMetadata,
};
use common::utils::IdentifierValidator;

use crate::backends::Catalog;

/// Schemas of the connection, system schemas removed.
pub async fn list_user_schemas(catalog: &mut dyn Catalog) -> AppResult<Vec<String>> {
    let kind = catalog.kind();
    let mut schemas: Vec<String> = catalog
        .list_schemas()
        .await?
        .into_iter()
        .filter(|s| !kind.is_system_schema(s))
        .collect();
    schemas.sort();
    Ok(schemas)
}

/// Builds the `"database:schema"` → table → columns mapping.
pub async fn build_schema_mapping(
    catalog: &mut dyn Catalog,
    database: &str,
) -> AppResult<SchemaMapping> {
    let mut mapping = SchemaMapping::new();
    for schema in list_user_schemas(catalog).await? {
        let mut tables = IndexMap::new();
        for table in catalog.list_tables(&schema).await? {
            let columns = catalog.list_columns(&schema, &table).await?;
            tables.insert(table, columns);
        }
        mapping.insert(database, &schema, tables);
    }

    tracing::debug!(
        kind = %catalog.kind(),
        database,
        schemas = mapping.len(),
        "schema mapping built"
    );
    Ok(mapping)
}

/// Catalog spelling of `requested` within `schema`.
pub async fn resolve_table(
    catalog: &mut dyn Catalog,
    schema: &str,
    requested: &str,
) -> AppResult<String> {
    IdentifierValidator::validate(requested)?;
    let dialect = catalog.dialect();
    let tables = catalog.list_tables(schema).await?;
    dialect
        .resolve(tables.iter().map(String::as_str), &dialect.normalize_table(requested))
        .or_else(|| dialect.resolve(tables.iter().map(String::as_str), requested))
        .map(str::to_string)
        .ok_or_else(|| AppError::CatalogQuery(format!("unknown table '{}' in schema '{}'", requested, schema)))
}

/// Columns of one table, with DB2 lengths.
pub async fn table_columns(
    catalog: &mut dyn Catalog,
    schema: &str,
    table: &str,
) -> AppResult<Vec<ColumnInfo>> {
    let table = resolve_table(catalog, schema, table).await?;
    catalog.list_columns(schema, &table).await
}

/// Name and type of each column, as `/listschema` reports them.
pub async fn table_schema(
    catalog: &mut dyn Catalog,
    schema: &str,
    table: &str,
) -> AppResult<Vec<ColumnInfo>> {
    Ok(table_columns(catalog, schema, table)
        .await?
        .iter()
        .map(ColumnInfo::without_length)
        .collect())
}

/// First `limit` rows of a table.
pub async fn preview_table(
    catalog: &mut dyn Catalog,
    schema: &str,
    table: &str,
    limit: u32,
) -> AppResult<PreviewResult> {
    let table = resolve_table(catalog, schema, table).await?;
    let catalog_columns: Vec<String> = catalog
        .list_columns(schema, &table)
        .await?
        .into_iter()
        .map(|c| c.name)
        .collect();

    let sql = catalog.dialect().preview_sql(schema, &table, limit);
    tracing::debug!(kind = %catalog.kind(), %sql, "running preview");
    let mut result = catalog.fetch(&sql).await?;

    if catalog.kind() != BackendKind::Db2 || result.columns.is_empty() {
        result.columns = catalog_columns;
    }
    Ok(result)
}

/// Values of one column, at most `cap` of them.
pub async fn column_values(
    catalog: &mut dyn Catalog,
    schema: &str,
    table: &str,
    column: &str,
    cap: u32,
) -> AppResult<Vec<Value>> {
    IdentifierValidator::validate(column)?;
    let table = resolve_table(catalog, schema, table).await?;
    let columns = catalog.list_columns(schema, &table).await?;
    let dialect = catalog.dialect();
    let column = dialect
        .resolve(columns.iter().map(|c| c.name.as_str()), column)
        .map(str::to_string)
        .ok_or_else(|| {
            AppError::CatalogQuery(format!("unknown column '{}' in table '{}'", column, table))
        })?;

    let sql = dialect.column_values_sql(schema, &table, &column, cap);
    let result = catalog.fetch(&sql).await?;
    Ok(result
        .rows
        .into_iter()
        .filter_map(|row| row.into_iter().next())
        .collect())
}

/// Current database name plus every table of `schema` with its columns.
pub async fn metadata(catalog: &mut dyn Catalog, schema: &str) -> AppResult<DatabaseMetadata> {
    let database = catalog.current_database().await?;
    let mut tables = Vec::new();
    for name in catalog.list_tables(schema).await? {
        let columns = catalog.list_columns(schema, &name).await?;
        tables.push(TableMetadata { name, columns });
    }
    Ok(DatabaseMetadata { database, tables })
}

/// `schema.table` for every base table outside the system schemas.
pub async fn qualified_tables(catalog: &mut dyn Catalog) -> AppResult<Vec<String>> {
    let mut names = Vec::new();
    for schema in list_user_schemas(catalog).await? {
        for table in catalog.list_tables(&schema).await? {
            names.push(format!("{}.{}", schema, table));
        }
    }
    Ok(names)
}

/// Splits `"schema.table"`; a bare name falls back to `default_schema`.
pub fn split_qualified<'a>(name: &'a str, default_schema: &'a str) -> (&'a str, &'a str) {
    match name.split_once('.') {
        Some((schema, table)) if !schema.is_empty() && !table.is_empty() => (schema, table),
        _ => (default_schema, name),
    }
}
