//! MQTT 3.1.1 protocol types and session engine.
//!
//! This module carries exactly what the hub client needs from MQTT: a
//! credentialed CONNECT handshake, one subscription, QoS 0/1 publishes, and
//! a periodic service tick that drains inbound packets and keeps the
//! connection alive. It is not a general-purpose MQTT library.
//!
//! The engine in [`session`] works over any type implementing
//! [`Connection`](crate::network::Connection), so tests drive it with
//! in-memory connections and production drives it with a TLS stream.

/// The MQTT session engine.
pub mod session;

pub use session::Session;

/// Quality of Service levels for MQTT messages.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum QoS {
    /// At most once delivery. Fire-and-forget: no acknowledgment is
    /// awaited and a message lost in transit is lost silently. The hub
    /// client's default flow uses only this level.
    AtMostOnce = 0,
    /// At least once delivery.
    AtLeastOnce = 1,
    /// Exactly once delivery.
    ExactlyOnce = 2,
}

/// An outbound message, created per publish call.
///
/// Messages are fire-and-forget: nothing is persisted and no redelivery
/// is attempted. The identifier is assigned by the facade from a counter
/// that increments on every successful publish and wraps at `u16::MAX`.
#[derive(Debug, Clone, Copy)]
pub struct Message<'a> {
    /// The message payload. Bounded by the session's packet buffer.
    pub payload: &'a [u8],
    /// Delivery guarantee level.
    pub qos: QoS,
    /// Per-client-instance identifier. Only placed on the wire for
    /// QoS 1 and 2 publishes.
    pub id: u16,
    /// Broker-retained flag.
    pub retained: bool,
    /// Redelivery flag.
    pub duplicate: bool,
}

/// A capability invoked for every inbound message on the subscribed
/// topic filter.
///
/// The handler is registered once, at subscribe time, and owned by the
/// session for the session's lifetime. It runs synchronously inside
/// [`Session::service`]; the topic and payload views are transient and
/// must be copied if they are needed after the call returns.
pub trait MessageHandler {
    /// Called with the matched topic and the message payload.
    fn on_message(&mut self, topic: &str, payload: &[u8]);
}

/// Whether `topic` matches `filter` under MQTT 3.1.1 wildcard rules.
///
/// `+` matches exactly one level, `#` matches the remainder of the topic
/// including the parent level itself.
pub fn filter_matches(filter: &str, topic: &str) -> bool {
    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');
    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => continue,
            (Some(pattern), Some(level)) if pattern == level => continue,
            (None, None) => return true,
            _ => return false,
        }
    }
}
