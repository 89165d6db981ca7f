//! Shared data models.

pub mod connection;
pub mod schema;
pub mod tally;

pub use connection::{BackendKind, ConnectForm, ConnectionSpec};
pub use schema::{ColumnInfo, DatabaseMetadata, PreviewResult, SchemaMapping, TableMetadata};
pub use tally::{CompanyRecord, TallyPayload, Voucher};
