//! # Cache Module
//!
//! Key/value capability used by the dedup middleware. The router only needs
//! two operations: a plain lookup and an atomic "set if absent with TTL"
//! that tells the caller whether it won the race.
//!
//! [`MemoryCache`] is an LRU-bounded in-process implementation; production
//! deployments plug in a shared store (Redis `SET NX EX` and friends) behind
//! the same [`Cache`] trait.

mod core;
mod memory;

pub use core::Cache;
pub use memory::MemoryCache;
