use std::sync::{Arc, Weak};

use tracing::{debug, info};

use super::core::RouterShared;
use crate::error::RouterError;
use crate::middleware::Handler;
use crate::transport::{Message, MessageCallback, QoS};

/// A topic-prefix scope with its own handler chain.
///
/// Cloning a group, or deriving one with [`group`](Self::group), copies the
/// chain: later `add_middleware` calls on either side never show up on the
/// other. [`listen`](Self::listen) freezes the chain as it is at that moment
/// for the subscription it registers.
#[derive(Clone)]
pub struct Group {
    topic: String,
    handlers: Vec<Handler>,
    router: Weak<RouterShared>,
}

impl Group {
    pub(crate) fn root(router: Weak<RouterShared>) -> Self {
        Self {
            topic: String::new(),
            handlers: Vec::new(),
            router,
        }
    }

    /// Topic prefix of this scope.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Child scope whose prefix is this prefix followed by `topic`.
    #[must_use]
    pub fn group(&self, topic: impl Into<String>) -> Group {
        Group {
            topic: format!("{}{}", self.topic, topic.into()),
            handlers: self.handlers.clone(),
            router: Weak::clone(&self.router),
        }
    }

    pub fn add_middleware(&mut self, middleware: Handler) -> &mut Self {
        self.handlers.push(middleware);
        self
    }

    pub fn add_middlewares<I>(&mut self, middlewares: I) -> &mut Self
    where
        I: IntoIterator<Item = Handler>,
    {
        self.handlers.extend(middlewares);
        self
    }

    /// Subscribe to `self.topic + sub_topic` and run this group's chain
    /// followed by `handlers` for every delivery.
    ///
    /// The prefix and sub-topic are concatenated as-is. Fails if the router
    /// is gone or the transport refuses the subscription; nothing is retried.
    pub fn listen<I>(&self, sub_topic: &str, qos: QoS, handlers: I) -> Result<(), RouterError>
    where
        I: IntoIterator<Item = Handler>,
    {
        let shared = self.router.upgrade().ok_or(RouterError::RouterClosed)?;
        let filter = format!("{}{}", self.topic, sub_topic);

        let chain: Arc<[Handler]> = self
            .handlers
            .iter()
            .cloned()
            .chain(handlers)
            .collect::<Vec<_>>()
            .into();
        let route = shared.next_route_label();

        let chain_len = chain.len();
        let weak = Weak::clone(&self.router);
        let callback_route = Arc::clone(&route);
        let callback: MessageCallback = Arc::new(move |message: Message| {
            match weak.upgrade() {
                Some(shared) => shared.dispatch(&chain, &callback_route, message),
                None => debug!(topic = %message.topic, "Router dropped, ignoring delivery"),
            }
        });

        shared
            .transport
            .subscribe(&filter, qos, callback)
            .map_err(|source| RouterError::Subscribe {
                topic: filter.clone(),
                source,
            })?;

        info!(
            topic = %filter,
            qos = %qos,
            route = %route,
            handlers = chain_len,
            "Subscribed"
        );
        Ok(())
    }
}

impl std::fmt::Debug for Group {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Group")
            .field("topic", &self.topic)
            .field("handlers", &self.handlers.len())
            .finish_non_exhaustive()
    }
}
