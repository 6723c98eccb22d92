//! # Middleware Module
//!
//! The [`Middleware`] trait and the built-in chain elements.
//!
//! Every router starts with the same default chain, in this order:
//!
//! 1. [`DedupMiddleware`] (only when dedup is enabled)
//! 2. [`LoggerMiddleware`]
//! 3. [`RecoveryMiddleware`]
//!
//! Recovery comes last so that its panic boundary sits directly around the
//! user's handlers, while the logger still sees the outcome on its way out.
//! [`MetricsMiddleware`] is opt-in.

mod core;
mod dedup;
mod logger;
mod metrics;
mod recovery;

pub use core::{handler, Handler, Middleware};
pub use dedup::DedupMiddleware;
pub use logger::{DispatchRecord, LoggerMiddleware, NO_RESPONSE};
pub use metrics::MetricsMiddleware;
pub use recovery::RecoveryMiddleware;
