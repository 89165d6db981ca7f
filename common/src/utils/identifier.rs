//! SQL identifier handling.
//!
//! Table and column names coming from requests are never spliced into SQL
//! as-is: they are first resolved against names read from the live catalog,
//! and the catalog's spelling is then quoted for the target dialect.

use crate::errors::{AppError, AppResult};
use crate::models::connection::BackendKind;

const MAX_IDENTIFIER_LEN: usize = 128;

/// Cheap syntactic checks applied before any catalog lookup.
pub struct IdentifierValidator;

impl IdentifierValidator {
    /// Rejects empty, oversized or control-character identifiers.
    pub fn validate(name: &str) -> AppResult<()> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(AppError::Validation("identifier must not be empty".into()));
        }
        if trimmed.chars().count() > MAX_IDENTIFIER_LEN {
            return Err(AppError::Validation(format!(
                "identifier longer than {} characters",
                MAX_IDENTIFIER_LEN
            )));
        }
        if trimmed.chars().any(char::is_control) {
            return Err(AppError::Validation(
                "identifier contains control characters".into(),
            ));
        }
        Ok(())
    }
}

/// Per-backend SQL text generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SqlDialect(BackendKind);

impl SqlDialect {
    pub fn new(kind: BackendKind) -> Self {
        Self(kind)
    }

    pub fn kind(&self) -> BackendKind {
        self.0
    }

    /// Quotes one identifier, doubling any embedded quote character.
    pub fn quote_ident(&self, name: &str) -> String {
        match self.0 {
            BackendKind::MySql => format!("`{}`", name.replace('`', "``")),
            BackendKind::Postgres | BackendKind::Db2 => format!("\"{}\"", name.replace('"', "\"\"")),
        }
    }

    /// Table name as it should be looked up in the catalog.
    ///
    /// DB2 stores unquoted identifiers upper-cased; the other backends keep
    /// the caller's casing.
    pub fn normalize_table(&self, name: &str) -> String {
        match self.0 {
            BackendKind::Db2 => name.trim().to_uppercase(),
            _ => name.trim().to_string(),
        }
    }

    /// Finds `requested` among catalog names, returning the catalog spelling.
    pub fn resolve<'a, I>(&self, catalog: I, requested: &str) -> Option<&'a str>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let requested = requested.trim();
        let folded = requested.to_uppercase();
        let mut folded_match = None;
        for name in catalog {
            if name == requested {
                return Some(name);
            }
            if self.0 == BackendKind::Db2 && folded_match.is_none() && name == folded {
                folded_match = Some(name);
            }
        }
        folded_match
    }

    pub fn table_ref(&self, schema: &str, table: &str) -> String {
        format!("{}.{}", self.quote_ident(schema), self.quote_ident(table))
    }

    /// Bounded `SELECT *` over one table.
    pub fn preview_sql(&self, schema: &str, table: &str, limit: u32) -> String {
        self.limited(format!("SELECT * FROM {}", self.table_ref(schema, table)), limit)
    }

    /// Bounded single-column scan.
    pub fn column_values_sql(&self, schema: &str, table: &str, column: &str, cap: u32) -> String {
        self.limited(
            format!(
                "SELECT {} FROM {}",
                self.quote_ident(column),
                self.table_ref(schema, table)
            ),
            cap,
        )
    }

    fn limited(&self, select: String, limit: u32) -> String {
        match self.0 {
            BackendKind::Db2 => format!("{} FETCH FIRST {} ROWS ONLY", select, limit),
            BackendKind::MySql | BackendKind::Postgres => format!("{} LIMIT {}", select, limit),
        }
    }
}
