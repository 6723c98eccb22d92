use std::time::Duration;

use crate::error::CacheError;

/// Shared key/value store with expiring entries.
pub trait Cache: Send + Sync {
    /// Fetch the value stored at `key`, if present and not expired.
    fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Atomically store `value` at `key` unless a live entry already exists.
    ///
    /// Returns `true` when this call stored the value and `false` when the key
    /// was already held. Among concurrent callers for the same key at most one
    /// observes `true`.
    fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, CacheError>;
}
