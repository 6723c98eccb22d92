use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::tls::TlsMaterial;
use crate::config::TransportConfig;
use crate::error::{RouterError, TransportError};

/// Delivery guarantee requested for a publish or subscription.
///
/// The router never interprets the level; it is handed through to the
/// transport untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum QoS {
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

impl TryFrom<u8> for QoS {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            other => Err(format!("invalid QoS level {other}")),
        }
    }
}

impl From<QoS> for u8 {
    fn from(qos: QoS) -> Self {
        qos as u8
    }
}

impl fmt::Display for QoS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", u8::from(*self))
    }
}

/// An inbound (or recorded outbound) message as seen by the router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Concrete topic the message was published on
    pub topic: String,
    pub qos: QoS,
    pub retained: bool,
    /// Raw payload bytes; usually JSON
    pub payload: Vec<u8>,
}

impl Message {
    #[must_use]
    pub fn new(topic: impl Into<String>, qos: QoS, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            qos,
            retained: false,
            payload: payload.into(),
        }
    }

    /// Payload rendered as text for diagnostics (lossy for non-UTF-8 bytes).
    #[must_use]
    pub fn payload_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

/// Callback invoked by the transport for every delivery matching a subscription.
///
/// Transports may invoke callbacks from several worker threads at once.
pub type MessageCallback = Arc<dyn Fn(Message) + Send + Sync>;

/// Everything a transport needs to establish its broker session.
#[derive(Clone)]
pub struct ConnectOptions {
    pub broker: String,
    pub client_id: String,
    /// Certificate material, when the connection is TLS-secured
    pub tls: Option<TlsMaterial>,
    pub keep_alive: Duration,
    pub ping_timeout: Duration,
    pub clean_session: bool,
    /// When `false` the transport may hand deliveries to the application
    /// concurrently and out of order.
    pub order_matters: bool,
    /// Invoked for deliveries that match no registered subscription
    pub default_handler: Option<MessageCallback>,
}

impl ConnectOptions {
    /// Build connect options from configuration, loading any TLS material
    /// from disk.
    pub fn from_config(config: &TransportConfig) -> Result<Self, RouterError> {
        config.validate()?;
        let tls = TlsMaterial::from_config(config)?;
        Ok(Self {
            broker: config.broker.clone(),
            client_id: config.client_id.clone(),
            tls,
            keep_alive: config.keep_alive(),
            ping_timeout: config.ping_timeout(),
            clean_session: config.clean_session,
            order_matters: config.order_matters,
            default_handler: None,
        })
    }

    #[must_use]
    pub fn with_default_handler(mut self, handler: MessageCallback) -> Self {
        self.default_handler = Some(handler);
        self
    }
}

impl fmt::Debug for ConnectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectOptions")
            .field("broker", &self.broker)
            .field("client_id", &self.client_id)
            .field("tls", &self.tls)
            .field("keep_alive", &self.keep_alive)
            .field("ping_timeout", &self.ping_timeout)
            .field("clean_session", &self.clean_session)
            .field("order_matters", &self.order_matters)
            .field("default_handler", &self.default_handler.is_some())
            .finish()
    }
}

/// The publish/subscribe capability the router is built on.
///
/// Every call is synchronous from the caller's point of view: implementations
/// wait for the broker's acknowledgement (or failure) before returning. Any
/// timeout policy belongs to the implementation.
pub trait Transport: Send + Sync {
    /// Establish the broker session.
    fn connect(&self, options: &ConnectOptions) -> Result<(), TransportError>;

    /// Register `callback` for every delivery matching `filter`.
    fn subscribe(
        &self,
        filter: &str,
        qos: QoS,
        callback: MessageCallback,
    ) -> Result<(), TransportError>;

    /// Publish `payload` to `topic`.
    fn publish(
        &self,
        topic: &str,
        qos: QoS,
        retained: bool,
        payload: &[u8],
    ) -> Result<(), TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qos_from_u8() {
        assert_eq!(QoS::try_from(0).unwrap(), QoS::AtMostOnce);
        assert_eq!(QoS::try_from(2).unwrap(), QoS::ExactlyOnce);
        assert!(QoS::try_from(3).is_err());
    }

    #[test]
    fn test_qos_deserializes_from_number() {
        let qos: QoS = serde_json::from_str("1").unwrap();
        assert_eq!(qos, QoS::AtLeastOnce);
        assert!(serde_json::from_str::<QoS>("7").is_err());
    }

    #[test]
    fn test_payload_str_is_lossy() {
        let msg = Message::new("a/b", QoS::AtMostOnce, vec![0x68, 0x69, 0xff]);
        assert_eq!(msg.payload_str(), "hi\u{fffd}");
    }
}
