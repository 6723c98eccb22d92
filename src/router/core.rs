//! Router core: construction, shared state and the per-delivery dispatch path.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::group::Group;
use crate::cache::Cache;
use crate::config::RouterConfig;
use crate::context::{Context, ContextPool};
use crate::error::RouterError;
use crate::middleware::{
    DedupMiddleware, Handler, LoggerMiddleware, RecoveryMiddleware,
};
use crate::publisher::Publisher;
use crate::transport::{ConnectOptions, Message, MessageCallback, QoS, Transport};

/// State shared between the [`Router`], its [`Group`]s, the subscription
/// callbacks and every pooled [`Context`].
///
/// Groups, callbacks and contexts only hold a `Weak` reference; the router
/// handle is the sole owner.
pub(crate) struct RouterShared {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) publisher: Publisher,
    pub(crate) pool: ContextPool,
    routes: AtomicUsize,
}

impl RouterShared {
    /// Short sequential label for a new subscription: `t1`, `t2`, ...
    pub(crate) fn next_route_label(&self) -> Arc<str> {
        let n = self.routes.fetch_add(1, Ordering::Relaxed) + 1;
        Arc::from(format!("t{n}"))
    }

    /// Run `chain` for one inbound message on a pooled context.
    pub(crate) fn dispatch(&self, chain: &Arc<[Handler]>, route: &Arc<str>, message: Message) {
        let mut c = self.pool.get();
        c.set_handlers(Arc::clone(chain));
        c.set_route(Arc::clone(route));
        c.set_message(message);
        c.start();
    }
}

/// Message dispatch router.
///
/// Owns the transport connection, the root handler chain and the context
/// pool. Subscriptions are registered through [`Group`]s derived from the
/// router; each group starts from a copy of the root chain as it was when
/// the group was created.
///
/// ```rust,ignore
/// let transport = Arc::new(MemoryTransport::new());
/// let router = Router::builder(RouterConfig::new("orders", "tcp://broker:1883", "orders-1"))
///     .transport(transport)
///     .build()?;
///
/// let devices = router.group("devices/");
/// devices.listen("+/cmd", QoS::AtLeastOnce, [handler(|c: &mut Context| {
///     let _ = c.respond("devices/ack", QoS::AtLeastOnce, false, "ok");
/// })])?;
/// ```
pub struct Router {
    config: RouterConfig,
    shared: Arc<RouterShared>,
    root: Group,
}

impl Router {
    #[must_use]
    pub fn builder(config: RouterConfig) -> RouterBuilder {
        RouterBuilder::new(config)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    #[must_use]
    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// New group scoped under `topic`, seeded with a copy of the root chain.
    #[must_use]
    pub fn group(&self, topic: impl Into<String>) -> Group {
        self.root.group(topic)
    }

    /// Append to the root chain. Groups created before this call are not
    /// affected.
    pub fn add_middleware(&mut self, middleware: Handler) -> &mut Self {
        self.root.add_middleware(middleware);
        self
    }

    pub fn add_middlewares<I>(&mut self, middlewares: I) -> &mut Self
    where
        I: IntoIterator<Item = Handler>,
    {
        self.root.add_middlewares(middlewares);
        self
    }

    /// Subscribe directly on the root scope.
    pub fn listen<I>(&self, topic: &str, qos: QoS, handlers: I) -> Result<(), RouterError>
    where
        I: IntoIterator<Item = Handler>,
    {
        self.root.listen(topic, qos, handlers)
    }

    /// Number of middleware currently on the root chain.
    #[must_use]
    pub fn middleware_count(&self) -> usize {
        self.root.handler_count()
    }

    #[must_use]
    pub fn publisher(&self) -> Publisher {
        self.shared.publisher.clone()
    }

    /// Pooled contexts waiting for reuse.
    #[must_use]
    pub fn idle_contexts(&self) -> usize {
        self.shared.pool.idle()
    }

    /// Contexts allocated by the pool since construction.
    #[must_use]
    pub fn contexts_created(&self) -> usize {
        self.shared.pool.created()
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("name", &self.config.name)
            .field("dedup", &self.config.dedup)
            .field("middlewares", &self.root.handler_count())
            .finish_non_exhaustive()
    }
}

fn default_fallback() -> MessageCallback {
    Arc::new(|msg: Message| {
        warn!(topic = %msg.topic, qos = %msg.qos, "No handler registered for topic");
    })
}

/// Builder for [`Router`].
///
/// A transport is always required; a cache is required when the
/// configuration enables dedup.
pub struct RouterBuilder {
    config: RouterConfig,
    transport: Option<Arc<dyn Transport>>,
    cache: Option<Arc<dyn Cache>>,
    fallback: Option<MessageCallback>,
    logger: Option<LoggerMiddleware>,
    max_idle_contexts: usize,
}

impl RouterBuilder {
    fn new(config: RouterConfig) -> Self {
        Self {
            config,
            transport: None,
            cache: None,
            fallback: None,
            logger: None,
            max_idle_contexts: ContextPool::DEFAULT_MAX_IDLE,
        }
    }

    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Cache backing the dedup middleware.
    #[must_use]
    pub fn cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Handler for deliveries that match no subscription. Defaults to a
    /// warning in the log.
    #[must_use]
    pub fn fallback<F>(mut self, fallback: F) -> Self
    where
        F: Fn(Message) + Send + Sync + 'static,
    {
        self.fallback = Some(Arc::new(fallback));
        self
    }

    /// Replace the default access-log middleware settings.
    #[must_use]
    pub fn logger(mut self, logger: LoggerMiddleware) -> Self {
        self.logger = Some(logger);
        self
    }

    #[must_use]
    pub fn max_idle_contexts(mut self, max_idle: usize) -> Self {
        self.max_idle_contexts = max_idle;
        self
    }

    /// Validate the configuration, load TLS material, connect the transport
    /// and install the default middleware chain.
    pub fn build(self) -> Result<Router, RouterError> {
        let RouterBuilder {
            config,
            transport,
            cache,
            fallback,
            logger,
            max_idle_contexts,
        } = self;

        config.validate()?;
        let transport = transport.ok_or(RouterError::MissingParam("transport"))?;
        let dedup_cache = match (config.dedup, cache) {
            (true, Some(cache)) => Some(cache),
            (true, None) => return Err(RouterError::MissingParam("cache")),
            (false, _) => None,
        };

        let fallback = fallback.unwrap_or_else(default_fallback);
        let options = ConnectOptions::from_config(&config.transport)?.with_default_handler(fallback);

        transport.connect(&options).map_err(RouterError::Connect)?;
        info!(
            router = %config.name,
            broker = %options.broker,
            client_id = %options.client_id,
            tls = options.tls.is_some(),
            dedup = config.dedup,
            "Transport connected"
        );

        let shared = Arc::new_cyclic(|weak| {
            let weak = weak.clone();
            RouterShared {
                publisher: Publisher::new(Arc::clone(&transport)),
                transport,
                pool: ContextPool::new(move || Context::with_router(weak.clone()))
                    .with_max_idle(max_idle_contexts),
                routes: AtomicUsize::new(0),
            }
        });

        let mut root = Group::root(Arc::downgrade(&shared));
        if let Some(cache) = dedup_cache {
            debug!(key_prefix = %config.dedup_key_prefix(), "Dedup enabled");
            root.add_middleware(Arc::new(DedupMiddleware::new(
                cache,
                config.dedup_key_prefix(),
                config.expiration(),
            )));
        }
        root.add_middleware(Arc::new(logger.unwrap_or_default()));
        root.add_middleware(Arc::new(RecoveryMiddleware::new()));

        Ok(Router {
            config,
            shared,
            root,
        })
    }
}
