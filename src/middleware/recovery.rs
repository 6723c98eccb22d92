use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Once;

use tracing::error;

use super::Middleware;
use crate::context::Context;

// Coroutine-local: a delivery coroutine that yields inside the boundary may
// resume on another worker thread. Off-coroutine these fall back to
// thread-local storage.
may::coroutine_local!(static BOUNDARY_DEPTH: Cell<usize> = Cell::new(0));
may::coroutine_local!(static CAPTURED: RefCell<Option<Backtrace>> = RefCell::new(None));

static HOOK: Once = Once::new();

/// Chain the process panic hook with one that records the backtrace at the
/// panic site while a recovery boundary is active on the current coroutine
/// (or thread, outside the runtime). The capture is forced so the trace does
/// not depend on `RUST_BACKTRACE`. Panics outside a boundary still reach the
/// previous hook.
fn install_hook() {
    HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if BOUNDARY_DEPTH.with(Cell::get) > 0 {
                CAPTURED.with(|slot| *slot.borrow_mut() = Some(Backtrace::force_capture()));
            } else {
                previous(info);
            }
        }));
    });
}

struct Boundary;

impl Boundary {
    fn enter() -> Self {
        BOUNDARY_DEPTH.with(|d| d.set(d.get() + 1));
        Boundary
    }

    /// Take the backtrace recorded by the hook for the last caught panic.
    fn take_captured() -> Option<Backtrace> {
        CAPTURED.with(|slot| slot.borrow_mut().take())
    }
}

impl Drop for Boundary {
    fn drop(&mut self) {
        BOUNDARY_DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Panic boundary for everything after it in the chain.
///
/// A panic raised downstream is caught, logged with its backtrace and the
/// delivery's session id, and the chain is aborted. Middleware placed before
/// the boundary (the logger, by default) then finishes normally, so the
/// access log still shows whatever response was recorded before the panic.
pub struct RecoveryMiddleware {
    recovered: AtomicUsize,
}

impl RecoveryMiddleware {
    #[must_use]
    pub fn new() -> Self {
        install_hook();
        Self {
            recovered: AtomicUsize::new(0),
        }
    }

    /// Number of panics caught so far.
    #[must_use]
    pub fn recovered(&self) -> usize {
        self.recovered.load(Ordering::Relaxed)
    }
}

impl Default for RecoveryMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

impl Middleware for RecoveryMiddleware {
    fn handle(&self, c: &mut Context) {
        let outcome = {
            let _boundary = Boundary::enter();
            panic::catch_unwind(AssertUnwindSafe(|| c.next()))
        };

        if let Err(payload) = outcome {
            self.recovered.fetch_add(1, Ordering::Relaxed);
            let backtrace = Boundary::take_captured()
                .map(|bt| bt.to_string())
                .unwrap_or_default();
            let session = c.session().map(|s| s.to_string()).unwrap_or_default();
            error!(
                session = %session,
                route = %c.route().unwrap_or("-"),
                topic = %c.topic(),
                panic_message = %panic_message(payload.as_ref()),
                backtrace = %backtrace,
                "[Recovery] panic recovered"
            );
            c.abort();
        }
    }
}
