//! Error types shared across the router.
//!
//! Construction problems (missing configuration, unreadable TLS material, a
//! refused connection) are fatal to [`Router`](crate::router::Router)
//! creation. Subscription failures surface synchronously from
//! [`Group::listen`](crate::router::Group::listen). Per-message failures are
//! handed back to the handler that triggered them and never leak into other
//! in-flight dispatches.

use std::fmt;
use std::path::PathBuf;

/// Error reported by a [`Transport`](crate::transport::Transport) implementation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The operation needs an established broker connection.
    NotConnected,
    /// The broker (or client library) refused the operation.
    Rejected(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::NotConnected => write!(f, "transport is not connected"),
            TransportError::Rejected(reason) => write!(f, "rejected by transport: {}", reason),
        }
    }
}

impl std::error::Error for TransportError {}

/// Error reported by a [`Cache`](crate::cache::Cache) backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheError(pub String);

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cache error: {}", self.0)
    }
}

impl std::error::Error for CacheError {}

/// Router error
///
/// Returned by router construction, [`Group::listen`](crate::router::Group::listen)
/// and the publishing helpers on [`Context`](crate::context::Context).
#[derive(Debug)]
pub enum RouterError {
    /// A required configuration value was left empty.
    MissingParam(&'static str),
    /// Configuration values are present but inconsistent.
    InvalidConfig(String),
    /// Client certificate material could not be loaded.
    Tls {
        /// File that failed to load
        path: PathBuf,
        /// Why it was rejected
        reason: String,
    },
    /// The transport refused to connect.
    Connect(TransportError),
    /// The transport refused a subscription.
    Subscribe {
        /// Full topic filter that was requested
        topic: String,
        source: TransportError,
    },
    /// A publish did not complete.
    Publish {
        /// Destination topic
        topic: String,
        source: TransportError,
    },
    /// The inbound payload could not be decoded into the requested type.
    Decode(serde_json::Error),
    /// An outbound value could not be serialised.
    Encode(serde_json::Error),
    /// The owning router has been dropped.
    RouterClosed,
}

impl fmt::Display for RouterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouterError::MissingParam(name) => write!(f, "{} is required", name),
            RouterError::InvalidConfig(msg) => write!(f, "invalid configuration: {}", msg),
            RouterError::Tls { path, reason } => {
                write!(f, "failed to load TLS material '{}': {}", path.display(), reason)
            }
            RouterError::Connect(e) => write!(f, "fail to init transport client: {}", e),
            RouterError::Subscribe { topic, source } => {
                write!(f, "subscribe to '{}' failed: {}", topic, source)
            }
            RouterError::Publish { topic, source } => {
                write!(f, "publish to '{}' failed: {}", topic, source)
            }
            RouterError::Decode(e) => write!(f, "payload decode failed: {}", e),
            RouterError::Encode(e) => write!(f, "payload encode failed: {}", e),
            RouterError::RouterClosed => write!(f, "router has been dropped"),
        }
    }
}

impl std::error::Error for RouterError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RouterError::Connect(e) => Some(e),
            RouterError::Subscribe { source, .. } | RouterError::Publish { source, .. } => {
                Some(source)
            }
            RouterError::Decode(e) | RouterError::Encode(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_param_message() {
        assert_eq!(
            RouterError::MissingParam("broker").to_string(),
            "broker is required"
        );
    }

    #[test]
    fn test_connect_error_keeps_source() {
        let err = RouterError::Connect(TransportError::Rejected("bad credentials".into()));
        assert_eq!(
            err.to_string(),
            "fail to init transport client: rejected by transport: bad credentials"
        );
        assert!(std::error::Error::source(&err).is_some());
    }
}
