//! The Azure IoT Hub client facade.
//!
//! [`Client`] sequences the startup phases — time synchronization, TLS
//! transport, MQTT authentication, subscription — and owns the connection
//! state afterwards. Application code only ever talks to this type:
//! `connect` once, `publish` at will, and `service` from a periodic
//! scheduler slot.
//!
//! The facade is not internally thread-safe. One serialized execution
//! context must own it; see the crate-level docs.

use core::fmt::Write as _;

use embedded_hal::delay::DelayNs;
use heapless::String;

use crate::network::error::{Error, TransportError};
use crate::network::mqtt::{Message, MessageHandler, QoS, Session};
use crate::network::{Connection, TlsConnect};
use crate::time::{self, TimeSource};

/// The hub's REST/MQTT API version, baked into the MQTT username.
const API_VERSION: &str = "2016-11-14";

/// The cadence at which the external scheduler should invoke
/// [`Client::service`], in milliseconds.
pub const SERVICE_INTERVAL_MS: u32 = 100;

/// A broker endpoint. Immutable after construction.
#[derive(Debug, Clone, Copy)]
pub struct Endpoint<'a> {
    /// Hub hostname, e.g. `my-hub.azure-devices.net`.
    pub host: &'a str,
    /// Broker port, conventionally 8883.
    pub port: u16,
    /// Root CA certificate (PEM) used to validate the peer.
    pub root_ca: &'a [u8],
    /// Client certificate (PEM) for mutual TLS, if used.
    pub client_cert: Option<&'a [u8]>,
    /// Client private key (PEM) for mutual TLS, if used.
    pub client_key: Option<&'a [u8]>,
}

impl<'a> Endpoint<'a> {
    /// An endpoint authenticated by a shared-secret credential only.
    pub fn new(host: &'a str, port: u16, root_ca: &'a [u8]) -> Self {
        Self {
            host,
            port,
            root_ca,
            client_cert: None,
            client_key: None,
        }
    }

    /// An endpoint that additionally presents a client certificate and
    /// key during the handshake (mutual TLS).
    pub fn with_client_auth(
        host: &'a str,
        port: u16,
        root_ca: &'a [u8],
        client_cert: &'a [u8],
        client_key: &'a [u8],
    ) -> Self {
        Self {
            host,
            port,
            root_ca,
            client_cert: Some(client_cert),
            client_key: Some(client_key),
        }
    }
}

/// A load-time configuration value did not fit its fixed-size buffer.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct ConfigError;

/// MQTT credentials derived from the device identity and the hub host.
///
/// Immutable after construction. The username follows the hub's
/// convention: `{host}/{device-id}/api-version=2016-11-14`.
#[derive(Debug, Clone)]
pub struct Credentials<'a> {
    /// MQTT client identifier: the device id.
    pub client_id: &'a str,
    /// Derived username.
    pub username: String<192>,
    /// Pre-shared or token credential.
    pub password: &'a str,
}

impl<'a> Credentials<'a> {
    /// Derive credentials for `device_id` on the hub at `host`.
    pub fn new(host: &str, device_id: &'a str, secret: &'a str) -> Result<Self, ConfigError> {
        let mut username = String::new();
        write!(username, "{host}/{device_id}/api-version={API_VERSION}")
            .map_err(|_| ConfigError)?;
        Ok(Self {
            client_id: device_id,
            username,
            password: secret,
        })
    }
}

/// The fixed publish topic and subscribe filter for one device.
#[derive(Debug, Clone)]
pub struct Topics {
    publish: String<160>,
    subscribe: String<160>,
}

impl Topics {
    /// Derive the device-to-cloud topic and cloud-to-device filter from
    /// the device identifier.
    pub fn for_device(device_id: &str) -> Result<Self, ConfigError> {
        let mut publish = String::new();
        write!(publish, "devices/{device_id}/messages/events/").map_err(|_| ConfigError)?;
        let mut subscribe = String::new();
        write!(subscribe, "devices/{device_id}/messages/devicebound/#")
            .map_err(|_| ConfigError)?;
        Ok(Self { publish, subscribe })
    }

    /// The device-to-cloud event topic.
    pub fn publish(&self) -> &str {
        &self.publish
    }

    /// The cloud-to-device topic filter.
    pub fn subscribe(&self) -> &str {
        &self.subscribe
    }
}

/// The facade's connection state. Transitions are strictly sequential;
/// there are no concurrent connect attempts.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ConnectionState {
    /// No session exists.
    Disconnected,
    /// The time synchronization gate is running.
    TimeSyncing,
    /// The TLS transport is being established.
    TransportConnecting,
    /// The MQTT CONNECT handshake is in flight.
    Authenticating,
    /// The subscription is being established.
    Subscribing,
    /// Fully connected; publishes are accepted.
    Connected,
    /// A connect attempt failed after the time gate.
    Failed,
}

/// An error from [`Client::connect`], tagged with the phase that failed.
///
/// Time synchronization never appears here: the gate retries internally
/// until it succeeds.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ConnectError {
    /// The client is already connected; no second session is opened.
    AlreadyConnected,
    /// TCP or TLS establishment failed.
    Transport(TransportError),
    /// The broker rejected the MQTT handshake.
    Authentication(Error),
    /// The broker rejected the subscription.
    Subscribe(Error),
}

/// An error from [`Client::publish`].
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum PublishError {
    /// The client is not in the `Connected` state; nothing was sent.
    NotConnected,
    /// The session failed to send the message.
    Session(Error),
}

/// An error from [`Client::service`]: the tick lost the transport.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct ServiceError(pub Error);

/// The Azure IoT Hub client.
///
/// Generic over the TLS stream type `C` and the inbound message handler
/// `H`; both are fixed by the platform integration at connect time.
pub struct Client<'a, C: Connection, H: MessageHandler> {
    endpoint: Endpoint<'a>,
    credentials: Credentials<'a>,
    topics: Topics,
    keep_alive_secs: u16,
    state: ConnectionState,
    session: Option<Session<C, H>>,
    next_message_id: u16,
}

impl<'a, C: Connection, H: MessageHandler> Client<'a, C, H> {
    /// Create a disconnected client for `device_id`.
    pub fn new(
        endpoint: Endpoint<'a>,
        credentials: Credentials<'a>,
        device_id: &str,
        keep_alive_secs: u16,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            endpoint,
            credentials,
            topics: Topics::for_device(device_id)?,
            keep_alive_secs,
            state: ConnectionState::Disconnected,
            session: None,
            next_message_id: 0,
        })
    }

    /// The current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether publishes are currently accepted.
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// The topics this client publishes and subscribes on.
    pub fn topics(&self) -> &Topics {
        &self.topics
    }

    /// Connect to the hub.
    ///
    /// Runs the startup sequence strictly in order: the time
    /// synchronization gate (blocking, unbounded retries, never fails
    /// outward), then the TLS transport, then the MQTT handshake, then
    /// the one subscription with `handler`. After success the caller must
    /// invoke [`Client::service`] every [`SERVICE_INTERVAL_MS`]
    /// milliseconds for the lifetime of the connection.
    ///
    /// A failure in any phase after the gate leaves the client in
    /// [`ConnectionState::Failed`]; the caller decides whether to retry
    /// the whole sequence.
    pub fn connect<N, T, D>(
        &mut self,
        transport: &mut N,
        time_source: &mut T,
        delay: &mut D,
        handler: H,
    ) -> Result<(), ConnectError>
    where
        N: TlsConnect<Connection = C>,
        T: TimeSource,
        D: DelayNs,
    {
        if self.state == ConnectionState::Connected {
            return Err(ConnectError::AlreadyConnected);
        }

        // TLS certificate validation needs a plausible clock first.
        self.state = ConnectionState::TimeSyncing;
        let _ = time::synchronize(time_source, delay);

        self.state = ConnectionState::TransportConnecting;
        info!(
            "connecting to {=str}:{=u16}",
            self.endpoint.host, self.endpoint.port
        );
        let connection = match transport.connect(&self.endpoint) {
            Ok(connection) => connection,
            Err(e) => {
                warn!("transport connect failed: {}", e);
                self.state = ConnectionState::Failed;
                return Err(ConnectError::Transport(e));
            }
        };

        self.state = ConnectionState::Authenticating;
        let mut session =
            match Session::connect(connection, &self.credentials, self.keep_alive_secs) {
                Ok(session) => session,
                Err(e) => {
                    warn!("authentication failed: {}", e);
                    self.state = ConnectionState::Failed;
                    return Err(ConnectError::Authentication(e));
                }
            };

        self.state = ConnectionState::Subscribing;
        info!("subscribing to {=str}", self.topics.subscribe());
        if let Err(e) = session.subscribe(self.topics.subscribe(), QoS::AtMostOnce, handler) {
            warn!("subscribe failed: {}", e);
            self.state = ConnectionState::Failed;
            return Err(ConnectError::Subscribe(e));
        }

        self.session = Some(session);
        self.state = ConnectionState::Connected;
        info!("connected");
        Ok(())
    }

    /// Publish an event to the device-to-cloud topic.
    ///
    /// Fails with [`PublishError::NotConnected`] unless the client is in
    /// the `Connected` state; no bytes touch the transport in that case.
    /// Each successful publish consumes one message identifier; the
    /// counter wraps at `u16::MAX`, which is not an error.
    ///
    /// When the underlying session reports that the transport died, the
    /// client drops to `Disconnected` so the next attempt fails fast
    /// instead of writing into a dead stream.
    pub fn publish(&mut self, payload: &[u8], qos: QoS, retained: bool) -> Result<(), PublishError> {
        if self.state != ConnectionState::Connected {
            return Err(PublishError::NotConnected);
        }
        let Some(session) = self.session.as_mut() else {
            return Err(PublishError::NotConnected);
        };

        let message = Message {
            payload,
            qos,
            id: self.next_message_id,
            retained,
            duplicate: false,
        };
        match session.publish(self.topics.publish.as_str(), &message) {
            Ok(()) => {
                self.next_message_id = self.next_message_id.wrapping_add(1);
                Ok(())
            }
            Err(e) => {
                warn!("publish failed: {}", e);
                let transport_dropped = !session.is_connected();
                if transport_dropped {
                    self.session = None;
                    self.state = ConnectionState::Disconnected;
                }
                Err(PublishError::Session(e))
            }
        }
    }

    /// Service the connection: drain inbound messages and keep-alive.
    ///
    /// Call every [`SERVICE_INTERVAL_MS`] milliseconds with a monotonic
    /// millisecond timestamp from the scheduler. The call never blocks
    /// beyond the work currently buffered, so it is safe to share the
    /// scheduler with other periodic tasks. A no-op while no session is
    /// live. On a transport failure the client drops to `Disconnected`
    /// and surfaces the error.
    pub fn service(&mut self, now_ms: u64) -> Result<(), ServiceError> {
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        match session.service(now_ms) {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!("service tick failed: {}", e);
                let transport_dropped = !session.is_connected();
                if transport_dropped {
                    self.session = None;
                    self.state = ConnectionState::Disconnected;
                }
                Err(ServiceError(e))
            }
        }
    }
}

impl<C: Connection, H: MessageHandler> core::fmt::Debug for Client<'_, C, H> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Client")
            .field("host", &self.endpoint.host)
            .field("port", &self.endpoint.port)
            .field("state", &self.state)
            .field("topics", &self.topics)
            .field("next_message_id", &self.next_message_id)
            .finish_non_exhaustive()
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for ConnectionState {
    fn format(&self, f: defmt::Formatter) {
        match self {
            ConnectionState::Disconnected => defmt::write!(f, "Disconnected"),
            ConnectionState::TimeSyncing => defmt::write!(f, "TimeSyncing"),
            ConnectionState::TransportConnecting => defmt::write!(f, "TransportConnecting"),
            ConnectionState::Authenticating => defmt::write!(f, "Authenticating"),
            ConnectionState::Subscribing => defmt::write!(f, "Subscribing"),
            ConnectionState::Connected => defmt::write!(f, "Connected"),
            ConnectionState::Failed => defmt::write!(f, "Failed"),
        }
    }
}
