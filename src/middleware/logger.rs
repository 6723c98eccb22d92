use std::fmt;
use std::time::{Duration, Instant};

use tracing::info;

use super::Middleware;
use crate::context::Context;

/// Marker rendered in place of the outbound half when nothing was published.
pub const NO_RESPONSE: &str = "(no response)";

/// One inbound/outbound exchange as written to the access log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchRecord {
    pub session: String,
    pub route: String,
    pub inbound_topic: String,
    pub inbound_payload: String,
    /// `(topic, payload)` of the recorded response
    pub outbound: Option<(String, String)>,
    pub latency: Duration,
}

impl DispatchRecord {
    /// Latency in whole microseconds, saturating at `u64::MAX`.
    #[must_use]
    pub fn latency_micros(&self) -> u64 {
        u64::try_from(self.latency.as_micros()).unwrap_or(u64::MAX)
    }
}

impl fmt::Display for DispatchRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sid = &self.session;
        writeln!(f, "[{sid}] >>> MQTT {}", self.inbound_topic)?;
        writeln!(f, "[{sid}] {}", self.inbound_payload)?;
        match &self.outbound {
            Some((topic, payload)) => {
                writeln!(f, "[{sid}] <<< MQTT {topic}")?;
                writeln!(f, "[{sid}] {payload}")?;
            }
            None => writeln!(f, "[{sid}] <<< MQTT {NO_RESPONSE}")?,
        }
        write!(f, "[{sid}] {} | {:>13?}", self.route, self.latency)
    }
}

/// Access log middleware.
///
/// Captures the inbound topic and payload, runs the rest of the chain, then
/// reads back the recorded response (if any) and emits a single INFO event
/// on target `mqroute::access` tying both halves to the session id.
/// Payload text longer than `max_payload` bytes is truncated in the record.
pub struct LoggerMiddleware {
    max_payload: usize,
}

impl LoggerMiddleware {
    pub const DEFAULT_MAX_PAYLOAD: usize = 4096;

    #[must_use]
    pub fn new() -> Self {
        Self {
            max_payload: Self::DEFAULT_MAX_PAYLOAD,
        }
    }

    #[must_use]
    pub fn with_max_payload(max_payload: usize) -> Self {
        Self { max_payload }
    }

    fn render(&self, bytes: &[u8]) -> String {
        let text = String::from_utf8_lossy(bytes);
        if text.len() <= self.max_payload {
            return text.into_owned();
        }
        let mut end = self.max_payload;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...({} bytes)", &text[..end], bytes.len())
    }
}

impl Default for LoggerMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

impl Middleware for LoggerMiddleware {
    fn handle(&self, c: &mut Context) {
        let start = Instant::now();
        let session = c.session().map(|s| s.to_string()).unwrap_or_default();
        let route = c.route().unwrap_or("-").to_string();
        let inbound_topic = c.topic().to_string();
        let inbound_payload = self.render(c.payload());

        c.next();

        let latency = start.elapsed();
        let outbound = c
            .response()
            .map(|r| (r.topic.clone(), self.render(&r.payload)));
        let record = DispatchRecord {
            session,
            route,
            inbound_topic,
            inbound_payload,
            outbound,
            latency,
        };

        let (outbound_topic, outbound_payload) = match &record.outbound {
            Some((t, p)) => (t.as_str(), p.as_str()),
            None => (NO_RESPONSE, ""),
        };
        info!(
            target: "mqroute::access",
            session = %record.session,
            route = %record.route,
            inbound_topic = %record.inbound_topic,
            inbound_payload = %record.inbound_payload,
            outbound_topic = %outbound_topic,
            outbound_payload = %outbound_payload,
            aborted = c.is_aborted(),
            latency_us = record.latency_micros(),
            "\n{record}"
        );
    }
}
