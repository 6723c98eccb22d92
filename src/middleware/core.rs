use std::sync::Arc;

use crate::context::Context;

/// A unit of the handler chain.
///
/// Middleware and terminal handlers share this one shape: they receive the
/// delivery's [`Context`] and steer the chain only through it, by calling
/// [`Context::next`], [`Context::abort`] or writing to its key/value bag.
///
/// Any `Fn(&mut Context) + Send + Sync` closure is a `Middleware`.
pub trait Middleware: Send + Sync {
    fn handle(&self, c: &mut Context);
}

impl<F> Middleware for F
where
    F: Fn(&mut Context) + Send + Sync,
{
    fn handle(&self, c: &mut Context) {
        self(c)
    }
}

/// Shared, type-erased chain element.
pub type Handler = Arc<dyn Middleware>;

/// Wrap a closure as a [`Handler`].
pub fn handler<F>(f: F) -> Handler
where
    F: Fn(&mut Context) + Send + Sync + 'static,
{
    Arc::new(f)
}
