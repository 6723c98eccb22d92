//! Publishing outside of a handler chain.
//!
//! Handlers answer through [`Context::respond`](crate::context::Context::respond);
//! everything else (timers, startup announcements, background jobs) uses a
//! [`Publisher`] obtained from [`Router::publisher`](crate::router::Router::publisher).

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::RouterError;
use crate::transport::{QoS, Transport};

/// Cloneable handle onto the router's transport.
#[derive(Clone)]
pub struct Publisher {
    transport: Arc<dyn Transport>,
}

impl Publisher {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Publish raw bytes to `topic`.
    pub fn publish(
        &self,
        topic: &str,
        qos: QoS,
        retained: bool,
        payload: &[u8],
    ) -> Result<(), RouterError> {
        match self.transport.publish(topic, qos, retained, payload) {
            Ok(()) => {
                debug!(
                    topic = %topic,
                    qos = %qos,
                    retained = retained,
                    bytes = payload.len(),
                    "Published message"
                );
                Ok(())
            }
            Err(source) => {
                warn!(topic = %topic, error = %source, "Publish failed");
                Err(RouterError::Publish {
                    topic: topic.to_string(),
                    source,
                })
            }
        }
    }

    /// Serialise `value` as JSON and publish it (not retained).
    pub fn publish_json<T: Serialize + ?Sized>(
        &self,
        topic: &str,
        qos: QoS,
        value: &T,
    ) -> Result<(), RouterError> {
        let payload = serde_json::to_vec(value).map_err(RouterError::Encode)?;
        self.publish(topic, qos, false, &payload)
    }
}

impl fmt::Debug for Publisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publisher").finish_non_exhaustive()
    }
}
