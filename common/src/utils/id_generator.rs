//! Unique ID generator.

use uuid::Uuid;

/// Generates identifiers for requests and browser sessions.
pub struct IdGenerator;

impl IdGenerator {
    /// Hyphenated UUID used as request ID.
    pub fn request_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// Opaque session identifier (32 hex characters).
    pub fn session_id() -> String {
        Uuid::new_v4().simple().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_is_unique() {
        let id1 = IdGenerator::session_id();
        let id2 = IdGenerator::session_id();
        assert_ne!(id1, id2);
        assert_eq!(id1.len(), 32);
        assert!(id1.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
