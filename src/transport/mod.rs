//! # Transport Module
//!
//! The router never talks to a broker directly. It depends on the small
//! [`Transport`] capability (connect, subscribe, publish) so that any client
//! library can sit underneath it.
//!
//! - [`Transport`] / [`MessageCallback`] - the consumed capability
//! - [`ConnectOptions`] - broker address, client id, TLS material, keep-alive,
//!   ping timeout, session and ordering flags, and the fallback handler
//! - [`TlsMaterial`] - PEM files read at construction time
//! - [`topic_matches`] - MQTT-style filter matching (`+`, `#`)
//! - [`MemoryTransport`] - in-process implementation for tests and demos

mod core;
mod memory;
mod tls;
mod topic;

pub use core::{ConnectOptions, Message, MessageCallback, QoS, Transport};
pub use memory::{DeliveryMode, MemoryTransport};
pub use tls::{ClientIdentity, TlsMaterial};
pub use topic::topic_matches;
