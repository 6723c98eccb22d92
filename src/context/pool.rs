use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use super::core::Context;

/// Free-list of reusable [`Context`] objects.
///
/// `get` pops an idle context (or builds one with the factory) and wraps it in
/// a [`PooledContext`] guard. When the guard is dropped, including while a
/// panic unwinds through it, the context is reset and pushed back, unless
/// `max_idle` contexts are already waiting.
pub struct ContextPool {
    free: Mutex<Vec<Context>>,
    factory: Box<dyn Fn() -> Context + Send + Sync>,
    max_idle: usize,
    created: AtomicUsize,
}

impl ContextPool {
    pub const DEFAULT_MAX_IDLE: usize = 1024;

    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> Context + Send + Sync + 'static,
    {
        Self {
            free: Mutex::new(Vec::new()),
            factory: Box::new(factory),
            max_idle: Self::DEFAULT_MAX_IDLE,
            created: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn with_max_idle(mut self, max_idle: usize) -> Self {
        self.max_idle = max_idle;
        self
    }

    /// Take exclusive ownership of a context until the guard is dropped.
    pub fn get(&self) -> PooledContext<'_> {
        let reused = self.free.lock().pop();
        let ctx = reused.unwrap_or_else(|| {
            self.created.fetch_add(1, Ordering::Relaxed);
            (self.factory)()
        });
        PooledContext { pool: self, ctx }
    }

    fn put(&self, mut ctx: Context) {
        ctx.reset();
        let mut free = self.free.lock();
        if free.len() < self.max_idle {
            free.push(ctx);
        }
    }

    /// Contexts currently waiting for reuse.
    #[must_use]
    pub fn idle(&self) -> usize {
        self.free.lock().len()
    }

    /// Contexts built by the factory so far.
    #[must_use]
    pub fn created(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }
}

/// A [`Context`] borrowed from a [`ContextPool`].
pub struct PooledContext<'a> {
    pool: &'a ContextPool,
    ctx: Context,
}

impl Deref for PooledContext<'_> {
    type Target = Context;

    fn deref(&self) -> &Context {
        &self.ctx
    }
}

impl DerefMut for PooledContext<'_> {
    fn deref_mut(&mut self) -> &mut Context {
        &mut self.ctx
    }
}

impl Drop for PooledContext<'_> {
    fn drop(&mut self) {
        self.pool.put(std::mem::take(&mut self.ctx));
    }
}
