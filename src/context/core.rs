use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::RouterError;
use crate::ids::SessionId;
use crate::middleware::Handler;
use crate::router::RouterShared;
use crate::transport::{Message, QoS};

/// Cursor value marking an aborted chain; larger than any real chain length.
pub const ABORT_INDEX: isize = isize::MAX / 2;

/// Outbound message recorded by [`Context::respond`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub topic: String,
    pub qos: QoS,
    pub retained: bool,
    pub payload: Vec<u8>,
}

impl Response {
    #[must_use]
    pub fn payload_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

type Value = Box<dyn Any + Send + Sync>;

/// Per-delivery execution state.
///
/// A `Context` carries the frozen handler chain of the route that matched,
/// the cursor into that chain, the inbound message with its session id, the
/// response (if a handler published one) and an open-ended key/value bag for
/// middleware that need to pass data down the chain.
///
/// ## Chain execution
///
/// [`start`](Self::start) runs the first handler. A handler hands control to
/// the rest of the chain by calling [`next`](Self::next); code placed after
/// that call runs once every downstream handler has returned. Handlers that
/// do not call `next` are followed by the remaining handlers anyway, as soon
/// as the enclosing `next` loop regains control. [`abort`](Self::abort) stops
/// the chain: no handler after the current one runs, while the handlers that
/// already entered still finish their post-`next` code.
///
/// Contexts are pooled and reused; everything is cleared between deliveries.
pub struct Context {
    handlers: Option<Arc<[Handler]>>,
    index: isize,
    message: Option<Message>,
    session: Option<SessionId>,
    route: Option<Arc<str>>,
    response: Option<Response>,
    keys: Option<HashMap<String, Value>>,
    router: Weak<RouterShared>,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    /// Context with no owning router. `respond` fails with
    /// [`RouterError::RouterClosed`] on a detached context.
    #[must_use]
    pub fn new() -> Self {
        Self::with_router(Weak::new())
    }

    pub(crate) fn with_router(router: Weak<RouterShared>) -> Self {
        Self {
            handlers: None,
            index: -1,
            message: None,
            session: None,
            route: None,
            response: None,
            keys: None,
            router,
        }
    }

    /// Install the handler chain for the next [`start`](Self::start).
    pub fn set_handlers(&mut self, handlers: impl Into<Arc<[Handler]>>) {
        self.handlers = Some(handlers.into());
        self.index = -1;
    }

    /// Store the inbound message and mint a fresh session id for it.
    pub fn set_message(&mut self, message: Message) {
        self.message = Some(message);
        self.session = Some(SessionId::new());
    }

    pub(crate) fn set_route(&mut self, route: Arc<str>) {
        self.route = Some(route);
    }

    /// Clear all per-delivery state. The router back-reference survives.
    pub fn reset(&mut self) {
        self.handlers = None;
        self.index = -1;
        self.message = None;
        self.session = None;
        self.route = None;
        self.response = None;
        if let Some(keys) = self.keys.as_mut() {
            keys.clear();
        }
    }

    /// Run the first handler of the chain.
    pub fn start(&mut self) {
        self.index = 0;
        if let Some(handler) = self.current() {
            handler.handle(self);
        }
    }

    /// Run the handlers after the current one.
    ///
    /// Calling `next` when no handlers remain, or after `abort`, does nothing.
    pub fn next(&mut self) {
        self.index = self.index.saturating_add(1);
        while let Some(handler) = self.current() {
            handler.handle(self);
            self.index = self.index.saturating_add(1);
        }
    }

    /// Prevent any further handler from running.
    pub fn abort(&mut self) {
        self.index = ABORT_INDEX;
    }

    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.index >= ABORT_INDEX
    }

    fn current(&self) -> Option<Handler> {
        let i = usize::try_from(self.index).ok()?;
        self.handlers.as_ref()?.get(i).map(Arc::clone)
    }

    /// Number of handlers in the installed chain.
    #[must_use]
    pub fn chain_len(&self) -> usize {
        self.handlers.as_ref().map_or(0, |h| h.len())
    }

    #[must_use]
    pub fn message(&self) -> Option<&Message> {
        self.message.as_ref()
    }

    /// Topic of the inbound message, or `""` before one is set.
    #[must_use]
    pub fn topic(&self) -> &str {
        self.message.as_ref().map_or("", |m| m.topic.as_str())
    }

    #[must_use]
    pub fn qos(&self) -> QoS {
        self.message.as_ref().map_or(QoS::AtMostOnce, |m| m.qos)
    }

    #[must_use]
    pub fn payload(&self) -> &[u8] {
        self.message
            .as_ref()
            .map(|m| m.payload.as_slice())
            .unwrap_or_default()
    }

    /// Correlation id of the current delivery.
    #[must_use]
    pub fn session(&self) -> Option<SessionId> {
        self.session
    }

    /// Short label of the route this delivery matched (`t1`, `t2`, ...).
    #[must_use]
    pub fn route(&self) -> Option<&str> {
        self.route.as_deref()
    }

    /// Last response recorded by [`respond`](Self::respond).
    #[must_use]
    pub fn response(&self) -> Option<&Response> {
        self.response.as_ref()
    }

    /// Store a value in the key/value bag, replacing any previous value.
    pub fn set<T>(&mut self, key: impl Into<String>, value: T)
    where
        T: Any + Send + Sync,
    {
        self.keys
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), Box::new(value));
    }

    /// Look up `key`. Returns `None` if it is missing or holds another type.
    #[must_use]
    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.keys.as_ref()?.get(key)?.downcast_ref::<T>()
    }

    /// Like [`get`](Self::get) but panics when the key is absent.
    ///
    /// # Panics
    ///
    /// Panics if `key` is missing or holds a value of another type.
    #[must_use]
    #[allow(clippy::panic)]
    pub fn must_get<T: Any>(&self, key: &str) -> &T {
        match self.get(key) {
            Some(value) => value,
            None => panic!("Key \"{}\" does not exist", key),
        }
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.keys.as_ref().is_some_and(|k| k.contains_key(key))
    }

    /// Remove `key` from the bag, returning whether it was present.
    pub fn remove(&mut self, key: &str) -> bool {
        self.keys
            .as_mut()
            .is_some_and(|k| k.remove(key).is_some())
    }

    /// Decode the inbound JSON payload.
    pub fn bind_json<T: DeserializeOwned>(&self) -> Result<T, RouterError> {
        serde_json::from_slice(self.payload()).map_err(RouterError::Decode)
    }

    /// Publish `payload` to `topic` and record it as this delivery's response.
    ///
    /// The response is only recorded once the transport accepted the publish;
    /// a later successful call replaces it.
    pub fn respond(
        &mut self,
        topic: impl Into<String>,
        qos: QoS,
        retained: bool,
        payload: impl Into<Vec<u8>>,
    ) -> Result<(), RouterError> {
        let router = self.router.upgrade().ok_or(RouterError::RouterClosed)?;
        let topic = topic.into();
        let payload = payload.into();
        router.publisher.publish(&topic, qos, retained, &payload)?;
        self.response = Some(Response {
            topic,
            qos,
            retained,
            payload,
        });
        Ok(())
    }

    /// Serialise `value` as JSON and [`respond`](Self::respond) with it.
    pub fn respond_json<T: Serialize + ?Sized>(
        &mut self,
        topic: impl Into<String>,
        qos: QoS,
        retained: bool,
        value: &T,
    ) -> Result<(), RouterError> {
        let payload = serde_json::to_vec(value).map_err(RouterError::Encode)?;
        self.respond(topic, qos, retained, payload)
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("chain_len", &self.chain_len())
            .field("index", &self.index)
            .field("topic", &self.topic())
            .field("session", &self.session)
            .field("route", &self.route)
            .field("response", &self.response.is_some())
            .field("keys", &self.keys.as_ref().map_or(0, HashMap::len))
            .finish()
    }
}
