//! Store key derivation for rate windows.

use crate::error::{RateWindowError, Result};

/// Default prefix of window keys.
pub const DEFAULT_KEY_PREFIX: &str = "limit";

/// A key that uniquely identifies one identifier's window in the store.
///
/// Rendered as `{prefix}:{identifier}`. Distinct identifiers map to distinct
/// keys as long as callers keep identifiers themselves disjoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WindowKey {
    /// Namespace shared by all windows of one limiter
    pub prefix: String,
    /// The limited identifier (client, API key, resource)
    pub identifier: String,
}

impl WindowKey {
    /// Create a window key, rejecting empty identifiers.
    pub fn new(prefix: &str, identifier: &str) -> Result<Self> {
        if identifier.is_empty() {
            return Err(RateWindowError::InvalidArgument(
                "identifier must be a non-empty string".to_string(),
            ));
        }

        Ok(Self {
            prefix: prefix.to_string(),
            identifier: identifier.to_string(),
        })
    }

    /// The key as stored.
    pub fn to_store_key(&self) -> String {
        format!("{}:{}", self.prefix, self.identifier)
    }
}

impl std::fmt::Display for WindowKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_store_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_key_creation() {
        let key = WindowKey::new(DEFAULT_KEY_PREFIX, "client_a").unwrap();

        assert_eq!(key.prefix, "limit");
        assert_eq!(key.identifier, "client_a");
        assert_eq!(key.to_store_key(), "limit:client_a");
    }

    #[test]
    fn test_window_key_display() {
        let key = WindowKey::new("api", "k1").unwrap();
        assert_eq!(key.to_string(), "api:k1");
    }

    #[test]
    fn test_empty_identifier_rejected() {
        let err = WindowKey::new(DEFAULT_KEY_PREFIX, "").unwrap_err();
        assert!(matches!(err, RateWindowError::InvalidArgument(_)));
    }

    #[test]
    fn test_distinct_identifiers_distinct_keys() {
        let key1 = WindowKey::new(DEFAULT_KEY_PREFIX, "a").unwrap();
        let key2 = WindowKey::new(DEFAULT_KEY_PREFIX, "b").unwrap();

        assert_ne!(key1, key2);
        assert_ne!(key1.to_store_key(), key2.to_store_key());
    }
}
