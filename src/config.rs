//! # Configuration Module
//!
//! Router and transport configuration, loadable from YAML/JSON or TOML files
//! and overridable from `MQROUTE_*` environment variables.
//!
//! ## Example
//!
//! ```yaml
//! name: billing
//! dedup: true
//! prefix: prod
//! expiration_secs: 300
//! transport:
//!   broker: ssl://broker.internal:8883
//!   client_id: billing-1
//!   ca_cert_path: /etc/mqroute/ca.crt
//!   client_cert_path: /etc/mqroute/client.crt
//!   client_key_path: /etc/mqroute/client.key
//!   keep_alive_secs: 10
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Field |
//! |---|---|
//! | `MQROUTE_NAME` | `name` |
//! | `MQROUTE_DEDUP` | `dedup` (`true`/`false`/`1`/`0`) |
//! | `MQROUTE_PREFIX` | `prefix` |
//! | `MQROUTE_EXPIRATION` | `expiration_secs` |
//! | `MQROUTE_BROKER` | `transport.broker` |
//! | `MQROUTE_CLIENT_ID` | `transport.client_id` |

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::warn;

use crate::error::RouterError;

/// Default dedup key lifetime in seconds.
pub const DEFAULT_EXPIRATION_SECS: u64 = 300;
/// Default keep-alive and ping timeout in seconds.
pub const DEFAULT_KEEP_ALIVE_SECS: u64 = 10;

fn default_expiration() -> u64 {
    DEFAULT_EXPIRATION_SECS
}

fn default_keep_alive() -> u64 {
    DEFAULT_KEEP_ALIVE_SECS
}

/// Broker connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Broker URI, e.g. `ssl://host:8883`
    pub broker: String,
    pub client_id: String,
    /// CA bundle used to verify the broker; loaded best-effort
    pub ca_cert_path: Option<PathBuf>,
    pub client_cert_path: Option<PathBuf>,
    pub client_key_path: Option<PathBuf>,
    /// Seconds between keep-alive pings; `0` selects the default
    pub keep_alive_secs: u64,
    /// Seconds to wait for a ping response; `0` selects the default
    pub ping_timeout_secs: u64,
    pub clean_session: bool,
    /// Ask the transport to deliver in order within each QoS level
    pub order_matters: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            broker: String::new(),
            client_id: String::new(),
            ca_cert_path: None,
            client_cert_path: None,
            client_key_path: None,
            keep_alive_secs: default_keep_alive(),
            ping_timeout_secs: default_keep_alive(),
            clean_session: false,
            order_matters: false,
        }
    }
}

impl TransportConfig {
    pub fn validate(&self) -> Result<(), RouterError> {
        if self.broker.trim().is_empty() {
            return Err(RouterError::MissingParam("broker"));
        }
        if self.client_id.trim().is_empty() {
            return Err(RouterError::MissingParam("client_id"));
        }
        match (&self.client_cert_path, &self.client_key_path) {
            (Some(_), None) => Err(RouterError::MissingParam("client_key_path")),
            (None, Some(_)) => Err(RouterError::MissingParam("client_cert_path")),
            _ => Ok(()),
        }
    }

    #[must_use]
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(non_zero_or_default(self.keep_alive_secs))
    }

    #[must_use]
    pub fn ping_timeout(&self) -> Duration {
        Duration::from_secs(non_zero_or_default(self.ping_timeout_secs))
    }
}

fn non_zero_or_default(secs: u64) -> u64 {
    if secs == 0 {
        DEFAULT_KEEP_ALIVE_SECS
    } else {
        secs
    }
}

/// Router construction configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RouterConfig {
    /// Logical router name; part of the dedup key namespace
    pub name: String,
    /// Drop redelivered messages carrying an already-seen `mid`
    #[serde(default)]
    pub dedup: bool,
    /// Optional namespace prepended to dedup keys
    #[serde(default)]
    pub prefix: String,
    /// Lifetime of a dedup key in seconds
    #[serde(default = "default_expiration")]
    pub expiration_secs: u64,
    #[serde(default)]
    pub transport: TransportConfig,
}

impl RouterConfig {
    /// Configuration with defaults for everything but the required fields.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        broker: impl Into<String>,
        client_id: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            dedup: false,
            prefix: String::new(),
            expiration_secs: DEFAULT_EXPIRATION_SECS,
            transport: TransportConfig {
                broker: broker.into(),
                client_id: client_id.into(),
                ..TransportConfig::default()
            },
        }
    }

    /// Load configuration from a `.yaml`/`.yml`/`.json` or `.toml` file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        let config = match ext.as_deref() {
            Some("toml") => toml::from_str(&content)
                .with_context(|| format!("Invalid TOML in {}", path.display()))?,
            _ => serde_yaml::from_str(&content)
                .with_context(|| format!("Invalid YAML in {}", path.display()))?,
        };
        Ok(config)
    }

    /// Apply `MQROUTE_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply `MQROUTE_*` overrides from an arbitrary lookup.
    ///
    /// Unparseable values are logged and ignored.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("MQROUTE_NAME") {
            self.name = v;
        }
        if let Some(v) = lookup("MQROUTE_DEDUP") {
            match v.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.dedup = true,
                "0" | "false" | "no" | "off" => self.dedup = false,
                other => warn!(value = %other, "Ignoring invalid MQROUTE_DEDUP"),
            }
        }
        if let Some(v) = lookup("MQROUTE_PREFIX") {
            self.prefix = v;
        }
        if let Some(v) = lookup("MQROUTE_EXPIRATION") {
            match v.parse() {
                Ok(secs) => self.expiration_secs = secs,
                Err(_) => warn!(value = %v, "Ignoring invalid MQROUTE_EXPIRATION"),
            }
        }
        if let Some(v) = lookup("MQROUTE_BROKER") {
            self.transport.broker = v;
        }
        if let Some(v) = lookup("MQROUTE_CLIENT_ID") {
            self.transport.client_id = v;
        }
    }

    /// Check everything that can be checked without touching the network or
    /// the filesystem.
    pub fn validate(&self) -> Result<(), RouterError> {
        if self.name.trim().is_empty() {
            return Err(RouterError::MissingParam("name"));
        }
        if self.dedup && self.expiration_secs == 0 {
            return Err(RouterError::InvalidConfig(
                "expiration_secs must be greater than zero when dedup is enabled".to_string(),
            ));
        }
        self.transport.validate()
    }

    /// Namespace for dedup keys: `<prefix>:mid:<name>:` or `mid:<name>:`.
    #[must_use]
    pub fn dedup_key_prefix(&self) -> String {
        if self.prefix.is_empty() {
            format!("mid:{}:", self.name)
        } else {
            format!("{}:mid:{}:", self.prefix, self.name)
        }
    }

    #[must_use]
    pub fn expiration(&self) -> Duration {
        Duration::from_secs(self.expiration_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_dedup_key_prefix() {
        let mut config = RouterConfig::new("billing", "tcp://b", "c1");
        assert_eq!(config.dedup_key_prefix(), "mid:billing:");
        config.prefix = "prod".into();
        assert_eq!(config.dedup_key_prefix(), "prod:mid:billing:");
    }

    #[test]
    fn test_validate_required_fields() {
        let config = RouterConfig::new("", "tcp://b", "c1");
        assert!(matches!(config.validate(), Err(RouterError::MissingParam("name"))));

        let config = RouterConfig::new("r", "", "c1");
        assert!(matches!(config.validate(), Err(RouterError::MissingParam("broker"))));

        let config = RouterConfig::new("r", "tcp://b", " ");
        assert!(matches!(
            config.validate(),
            Err(RouterError::MissingParam("client_id"))
        ));
    }

    #[test]
    fn test_validate_cert_without_key() {
        let mut config = RouterConfig::new("r", "tcp://b", "c1");
        config.transport.client_cert_path = Some("/tmp/client.crt".into());
        assert!(matches!(
            config.validate(),
            Err(RouterError::MissingParam("client_key_path"))
        ));
    }

    #[test]
    fn test_validate_dedup_needs_expiration() {
        let mut config = RouterConfig::new("r", "tcp://b", "c1");
        config.dedup = true;
        config.expiration_secs = 0;
        assert!(matches!(config.validate(), Err(RouterError::InvalidConfig(_))));
    }

    #[test]
    fn test_zero_keep_alive_uses_default() {
        let mut transport = TransportConfig::default();
        transport.keep_alive_secs = 0;
        transport.ping_timeout_secs = 30;
        assert_eq!(transport.keep_alive(), Duration::from_secs(10));
        assert_eq!(transport.ping_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_load_yaml_with_defaults() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "name: orders\ndedup: true\ntransport:\n  broker: tcp://localhost:1883\n  client_id: orders-1\n"
        )
        .unwrap();

        let config = RouterConfig::from_path(file.path()).unwrap();
        assert_eq!(config.name, "orders");
        assert!(config.dedup);
        assert_eq!(config.expiration_secs, 300);
        assert_eq!(config.transport.keep_alive_secs, 10);
        assert!(!config.transport.clean_session);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_toml() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "name = \"orders\"\nprefix = \"stage\"\nexpiration_secs = 60\n\n[transport]\nbroker = \"tcp://b:1883\"\nclient_id = \"o\"\norder_matters = true\n"
        )
        .unwrap();

        let config = RouterConfig::from_path(file.path()).unwrap();
        assert_eq!(config.prefix, "stage");
        assert_eq!(config.expiration(), Duration::from_secs(60));
        assert!(config.transport.order_matters);
    }

    #[test]
    fn test_load_missing_file_reports_path() {
        let err = RouterConfig::from_path("/no/such/mqroute.yaml").unwrap_err();
        assert!(err.to_string().contains("/no/such/mqroute.yaml"));
    }

    #[test]
    fn test_overrides_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("MQROUTE_NAME", "override"),
            ("MQROUTE_DEDUP", "on"),
            ("MQROUTE_EXPIRATION", "not-a-number"),
            ("MQROUTE_BROKER", "tcp://other:1883"),
        ]
        .into_iter()
        .collect();

        let mut config = RouterConfig::new("orig", "tcp://b", "c1");
        config.apply_overrides_from(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.name, "override");
        assert!(config.dedup);
        assert_eq!(config.expiration_secs, 300);
        assert_eq!(config.transport.broker, "tcp://other:1883");
        assert_eq!(config.transport.client_id, "c1");
    }
}
