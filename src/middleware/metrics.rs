use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use super::Middleware;
use crate::context::Context;

/// Middleware collecting dispatch counters
///
/// Counts deliveries, responses and aborted chains and accumulates the time
/// spent in the downstream chain. All counters are lock-free atomics, so one
/// instance can be shared by every route (wrap it in an `Arc` and add a clone
/// of the handle wherever it should observe traffic).
///
/// Not installed by default; add it with
/// [`Router::add_middleware`](crate::router::Router::add_middleware).
pub struct MetricsMiddleware {
    dispatch_count: AtomicUsize,
    response_count: AtomicUsize,
    abort_count: AtomicUsize,
    total_latency_ns: AtomicU64,
}

impl Default for MetricsMiddleware {
    fn default() -> Self {
        Self {
            dispatch_count: AtomicUsize::new(0),
            response_count: AtomicUsize::new(0),
            abort_count: AtomicUsize::new(0),
            total_latency_ns: AtomicU64::new(0),
        }
    }
}

impl MetricsMiddleware {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliveries that passed through this middleware
    #[must_use]
    pub fn dispatch_count(&self) -> usize {
        self.dispatch_count.load(Ordering::Relaxed)
    }

    /// Deliveries for which a handler recorded a response
    #[must_use]
    pub fn response_count(&self) -> usize {
        self.response_count.load(Ordering::Relaxed)
    }

    /// Deliveries whose chain was aborted downstream
    #[must_use]
    pub fn abort_count(&self) -> usize {
        self.abort_count.load(Ordering::Relaxed)
    }

    /// Mean time spent in the downstream chain.
    ///
    /// Returns zero if no delivery has been observed yet.
    #[must_use]
    pub fn average_latency(&self) -> Duration {
        let count = self.dispatch_count.load(Ordering::Relaxed) as u64;
        if count == 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos(self.total_latency_ns.load(Ordering::Relaxed) / count)
        }
    }
}

impl Middleware for MetricsMiddleware {
    fn handle(&self, c: &mut Context) {
        let start = Instant::now();
        c.next();
        let elapsed = u64::try_from(start.elapsed().as_nanos()).unwrap_or(u64::MAX);

        self.dispatch_count.fetch_add(1, Ordering::Relaxed);
        self.total_latency_ns.fetch_add(elapsed, Ordering::Relaxed);
        if c.response().is_some() {
            self.response_count.fetch_add(1, Ordering::Relaxed);
        }
        if c.is_aborted() {
            self.abort_count.fetch_add(1, Ordering::Relaxed);
        }
    }
}
