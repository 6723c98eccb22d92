//! # Context Module
//!
//! Per-delivery execution state and the pool that recycles it.
//!
//! - [`Context`] - handler chain cursor, inbound message, session id,
//!   recorded [`Response`] and a typed key/value bag
//! - [`ContextPool`] / [`PooledContext`] - thread-safe free-list; a context is
//!   owned by exactly one delivery at a time and returns to the pool when its
//!   guard drops

mod core;
mod pool;

pub use core::{Context, Response, ABORT_INDEX};
pub use pool::{ContextPool, PooledContext};
