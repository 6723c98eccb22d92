use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::Middleware;
use crate::cache::Cache;
use crate::context::Context;
use crate::error::CacheError;

/// Drops redelivered messages.
///
/// The inbound payload is expected to be a JSON object carrying a `mid`
/// (string or number). The first delivery of a given `mid` claims the key
/// `key_prefix + mid` in the cache for `ttl` and proceeds; any later delivery
/// of the same `mid` within that window aborts the chain.
///
/// The filter fails open: a payload without a usable `mid`, a cache error,
/// or a panic inside the cache backend lets the message through. This
/// middleware runs ahead of the recovery boundary, so the backend call is
/// guarded here.
pub struct DedupMiddleware {
    cache: Arc<dyn Cache>,
    key_prefix: String,
    ttl: Duration,
}

#[derive(Deserialize)]
struct Envelope {
    mid: Option<Value>,
}

impl DedupMiddleware {
    pub fn new(cache: Arc<dyn Cache>, key_prefix: impl Into<String>, ttl: Duration) -> Self {
        Self {
            cache,
            key_prefix: key_prefix.into(),
            ttl,
        }
    }

    /// Cache key used for a given message id.
    #[must_use]
    pub fn key_for(&self, mid: &str) -> String {
        format!("{}{}", self.key_prefix, mid)
    }
}

/// Extract the message id from a JSON payload.
pub(crate) fn extract_mid(payload: &[u8]) -> Option<String> {
    let envelope: Envelope = serde_json::from_slice(payload).ok()?;
    match envelope.mid? {
        Value::String(s) if !s.is_empty() => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl Middleware for DedupMiddleware {
    fn handle(&self, c: &mut Context) {
        let session = c.session().map(|s| s.to_string()).unwrap_or_default();

        let Some(mid) = extract_mid(c.payload()) else {
            debug!(
                session = %session,
                topic = %c.topic(),
                "No usable mid in payload, skipping dedup"
            );
            c.next();
            return;
        };

        let key = self.key_for(&mid);
        let claimed = panic::catch_unwind(AssertUnwindSafe(|| {
            self.cache.set_if_absent(&key, &session, self.ttl)
        }))
        .unwrap_or_else(|_| Err(CacheError("backend panicked".to_string())));

        match claimed {
            Ok(true) => c.next(),
            Ok(false) => {
                warn!(
                    session = %session,
                    topic = %c.topic(),
                    mid = %mid,
                    "Duplicate message dropped"
                );
                c.abort();
            }
            Err(e) => {
                warn!(
                    session = %session,
                    mid = %mid,
                    error = %e,
                    "Dedup cache unavailable, processing message anyway"
                );
                c.next();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_mid() {
        assert_eq!(extract_mid(br#"{"mid":"abc123","x":1}"#).as_deref(), Some("abc123"));
        assert_eq!(extract_mid(br#"{"mid":42}"#).as_deref(), Some("42"));
        assert_eq!(extract_mid(br#"{"mid":""}"#), None);
        assert_eq!(extract_mid(br#"{"mid":null}"#), None);
        assert_eq!(extract_mid(br#"{"mid":{"a":1}}"#), None);
        assert_eq!(extract_mid(br#"{"other":1}"#), None);
        assert_eq!(extract_mid(b"[1,2,3]"), None);
        assert_eq!(extract_mid(b"garbage"), None);
    }
}
