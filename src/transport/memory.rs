//! In-process transport.
//!
//! `MemoryTransport` stands in for a broker connection: subscriptions are kept
//! in a table, [`MemoryTransport::deliver`] plays the role of the broker
//! pushing a message to this client, and everything published is recorded
//! for inspection. It is what the test-suite and the throughput bench run on,
//! and it is handy for exercising handler chains without a broker.
//!
//! Deliveries are either run inline on the caller's thread or handed to one
//! `may` coroutine each, which reproduces a client library invoking callbacks
//! from a pool of workers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use may::coroutine::{self, JoinHandle};
use parking_lot::Mutex;
use tracing::{debug, error, warn};

use super::core::{ConnectOptions, Message, MessageCallback, QoS, Transport};
use super::topic::topic_matches;
use crate::error::TransportError;

/// How [`MemoryTransport`] hands deliveries to subscription callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Run the callback on the thread calling `deliver`.
    Inline,
    /// Run every delivery in its own coroutine.
    Coroutine {
        /// Coroutine stack size in bytes
        stack_size: usize,
    },
}

impl DeliveryMode {
    /// 256 KB: enough for a recovery boundary to format a backtrace.
    pub const DEFAULT_STACK_SIZE: usize = 0x40000;

    #[must_use]
    pub fn coroutine() -> Self {
        DeliveryMode::Coroutine {
            stack_size: Self::DEFAULT_STACK_SIZE,
        }
    }
}

struct Subscription {
    filter: String,
    qos: QoS,
    callback: MessageCallback,
}

#[derive(Default)]
struct State {
    options: Option<ConnectOptions>,
    subscriptions: Vec<Subscription>,
    published: Vec<Message>,
}

/// Broker-less [`Transport`] implementation.
pub struct MemoryTransport {
    mode: DeliveryMode,
    state: Mutex<State>,
    in_flight: Mutex<Vec<JoinHandle<()>>>,
    fail_connect: AtomicBool,
    fail_subscribe: AtomicBool,
    fail_publish: AtomicBool,
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTransport {
    /// Transport delivering inline on the caller's thread.
    #[must_use]
    pub fn new() -> Self {
        Self::with_mode(DeliveryMode::Inline)
    }

    #[must_use]
    pub fn with_mode(mode: DeliveryMode) -> Self {
        Self {
            mode,
            state: Mutex::new(State::default()),
            in_flight: Mutex::new(Vec::new()),
            fail_connect: AtomicBool::new(false),
            fail_subscribe: AtomicBool::new(false),
            fail_publish: AtomicBool::new(false),
        }
    }

    /// Make subsequent `connect` calls fail.
    pub fn fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent `subscribe` calls fail.
    pub fn fail_subscribe(&self, fail: bool) {
        self.fail_subscribe.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent `publish` calls fail.
    pub fn fail_publish(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state.lock().options.is_some()
    }

    /// Options passed to the last successful `connect`.
    #[must_use]
    pub fn connect_options(&self) -> Option<ConnectOptions> {
        self.state.lock().options.clone()
    }

    /// Registered subscription filters in registration order.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<(String, QoS)> {
        self.state
            .lock()
            .subscriptions
            .iter()
            .map(|s| (s.filter.clone(), s.qos))
            .collect()
    }

    /// Every message published so far, oldest first.
    #[must_use]
    pub fn published(&self) -> Vec<Message> {
        self.state.lock().published.clone()
    }

    /// Drain the publish log, returning what it held.
    pub fn take_published(&self) -> Vec<Message> {
        std::mem::take(&mut self.state.lock().published)
    }

    /// Coroutine deliveries that have not finished yet.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        let mut in_flight = self.in_flight.lock();
        in_flight.retain(|h| !h.is_done());
        in_flight.len()
    }

    /// Simulate the broker delivering `message` to this client.
    ///
    /// Every subscription whose filter matches receives its own copy. When
    /// nothing matches, the default handler from the connect options (if
    /// any) is invoked instead. Returns the number of matching subscriptions.
    pub fn deliver(&self, message: Message) -> usize {
        let (callbacks, fallback, ordered) = {
            let state = self.state.lock();
            let callbacks: Vec<MessageCallback> = state
                .subscriptions
                .iter()
                .filter(|s| topic_matches(&s.filter, &message.topic))
                .map(|s| Arc::clone(&s.callback))
                .collect();
            let fallback = state
                .options
                .as_ref()
                .and_then(|o| o.default_handler.clone());
            let ordered = state.options.as_ref().is_some_and(|o| o.order_matters);
            (callbacks, fallback, ordered)
        };

        if callbacks.is_empty() {
            debug!(topic = %message.topic, "No subscription matched delivery");
            if let Some(fallback) = fallback {
                fallback(message);
            }
            return 0;
        }

        let matched = callbacks.len();
        for callback in callbacks {
            self.run(callback, message.clone(), ordered);
        }
        matched
    }

    /// Block until every coroutine-dispatched delivery has finished,
    /// including deliveries started by those deliveries.
    pub fn wait_idle(&self) {
        loop {
            let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.in_flight.lock());
            if handles.is_empty() {
                return;
            }
            for handle in handles {
                if handle.join().is_err() {
                    warn!("Delivery coroutine terminated by a panic");
                }
            }
        }
    }

    fn run(&self, callback: MessageCallback, message: Message, ordered: bool) {
        let stack_size = match self.mode {
            DeliveryMode::Coroutine { stack_size } if !ordered => stack_size,
            _ => {
                callback(message);
                return;
            }
        };

        let topic = message.topic.clone();
        // SAFETY: may::coroutine::Builder::spawn() is unsafe because of the
        // coroutine runtime's own requirements (no thread-local borrows held
        // across yields). The closure owns everything it touches.
        let spawned = unsafe {
            coroutine::Builder::new()
                .stack_size(stack_size)
                .spawn(move || callback(message))
        };
        match spawned {
            Ok(handle) => {
                let mut in_flight = self.in_flight.lock();
                in_flight.retain(|h| !h.is_done());
                in_flight.push(handle);
            }
            Err(e) => {
                error!(
                    topic = %topic,
                    error = %e,
                    stack_size = stack_size,
                    "Failed to spawn delivery coroutine - message dropped"
                );
            }
        }
    }
}

impl Transport for MemoryTransport {
    fn connect(&self, options: &ConnectOptions) -> Result<(), TransportError> {
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(TransportError::Rejected(format!(
                "connection to {} refused",
                options.broker
            )));
        }
        self.state.lock().options = Some(options.clone());
        Ok(())
    }

    fn subscribe(
        &self,
        filter: &str,
        qos: QoS,
        callback: MessageCallback,
    ) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if state.options.is_none() {
            return Err(TransportError::NotConnected);
        }
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(TransportError::Rejected(format!(
                "subscription to '{}' refused",
                filter
            )));
        }
        state.subscriptions.push(Subscription {
            filter: filter.to_string(),
            qos,
            callback,
        });
        Ok(())
    }

    fn publish(
        &self,
        topic: &str,
        qos: QoS,
        retained: bool,
        payload: &[u8],
    ) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if state.options.is_none() {
            return Err(TransportError::NotConnected);
        }
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(TransportError::Rejected(format!(
                "publish to '{}' refused",
                topic
            )));
        }
        state.published.push(Message {
            topic: topic.to_string(),
            qos,
            retained,
            payload: payload.to_vec(),
        });
        Ok(())
    }
}
