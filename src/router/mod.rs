//! # Router Module
//!
//! Composition root of the crate: the [`Router`] owns the transport
//! connection and the context pool, and hands out [`Group`]s that bind topic
//! filters to handler chains.
//!
//! ## Dispatch path
//!
//! For every delivery the transport invokes the callback registered by
//! [`Group::listen`], which
//!
//! 1. takes a [`Context`](crate::context::Context) from the pool,
//! 2. installs the route's frozen chain, route label, message and a fresh
//!    session id,
//! 3. runs the chain from its first handler,
//! 4. returns the context to the pool (also when a panic escapes).
//!
//! Deliveries are independent: the transport may run any number of them
//! concurrently and nothing here reorders or batches them.

mod core;
mod group;

pub use core::{Router, RouterBuilder};
pub use group::Group;

pub(crate) use core::RouterShared;
