//! Utility functions and helpers.

pub mod id_generator;
pub mod identifier;

pub use id_generator::IdGenerator;
pub use identifier::{IdentifierValidator, SqlDialect};
