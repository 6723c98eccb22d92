//! # mqroute
//!
//! **mqroute** is a middleware-based dispatch router for MQTT-style
//! publish/subscribe messaging. Applications register topic subscriptions
//! with chains of handlers; for every inbound message the router builds a
//! pooled execution [`Context`], runs the chain, and takes care of the
//! cross-cutting concerns every consumer ends up writing by hand:
//! redelivery deduplication, request/response access logging and panic
//! containment.
//!
//! ## Architecture
//!
//! - **[`router`]** - [`Router`] (composition root) and [`Group`] (topic-prefix
//!   scope with its own handler chain)
//! - **[`context`]** - per-delivery state machine and the context pool
//! - **[`middleware`]** - the [`Middleware`] trait plus dedup, logger,
//!   recovery and metrics middleware
//! - **[`transport`]** - the [`Transport`] capability the router consumes,
//!   TLS material loading, topic-filter matching and an in-process
//!   [`MemoryTransport`]
//! - **[`cache`]** - the [`Cache`] capability used by dedup, with an LRU-bounded
//!   [`MemoryCache`]
//! - **[`config`]** - router/transport configuration from files and `MQROUTE_*`
//!   environment variables
//! - **[`telemetry`]** - `tracing-subscriber` setup
//! - **[`publisher`]** - publishing outside of a handler chain
//! - **[`ids`]** - ULID-backed session ids used for log correlation
//!
//! ## Chain execution
//!
//! Handlers follow the "onion" model: code before [`Context::next`] runs on
//! the way in, code after it runs on the way out once every downstream
//! handler has returned. [`Context::abort`] stops the chain without skipping
//! the way out of the handlers that already ran.
//!
//! The default root chain is `dedup (optional) -> logger -> recovery`, so the
//! recovery boundary wraps user handlers directly and the logger still sees
//! the response recorded before a panic.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use mqroute::{handler, Context, MemoryCache, MemoryTransport, QoS, Router, RouterConfig};
//!
//! let mut config = RouterConfig::new("billing", "ssl://broker:8883", "billing-1");
//! config.dedup = true;
//!
//! let router = Router::builder(config)
//!     .transport(Arc::new(MemoryTransport::new()))
//!     .cache(Arc::new(MemoryCache::new()))
//!     .build()?;
//!
//! router.group("billing/").listen("+/invoice", QoS::AtLeastOnce, [handler(|c: &mut Context| {
//!     #[derive(serde::Deserialize)]
//!     struct Invoice { mid: String, amount: u64 }
//!
//!     match c.bind_json::<Invoice>() {
//!         Ok(inv) => {
//!             let _ = c.respond_json("billing/ack", QoS::AtLeastOnce, false, &inv.mid);
//!         }
//!         Err(e) => tracing::warn!(error = %e, "Bad invoice"),
//!     }
//! })])?;
//! ```

pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod ids;
pub mod middleware;
pub mod publisher;
pub mod router;
pub mod telemetry;
pub mod transport;

pub use cache::{Cache, MemoryCache};
pub use config::{RouterConfig, TransportConfig};
pub use context::{Context, Response};
pub use error::{CacheError, RouterError, TransportError};
pub use ids::SessionId;
pub use middleware::{handler, Handler, Middleware};
pub use publisher::Publisher;
pub use router::{Group, Router, RouterBuilder};
pub use transport::{MemoryTransport, Message, QoS, Transport};
