//! An MQTT 3.1.1 session engine for the hub connection.
//!
//! The session owns the connection, the single subscription, and the
//! registered message handler. Inbound delivery happens only as a side
//! effect of [`Session::service`]; there is no receive thread.

use super::{Message, MessageHandler, QoS, filter_matches};
use crate::hub::Credentials;
use crate::network::error::Error;
use crate::network::{Connection, Read};
use heapless::{String, Vec};

// MQTT Control Packet types
const CONNECT: u8 = 0x10;
const CONNACK: u8 = 0x20;
const PUBLISH: u8 = 0x30;
const SUBSCRIBE: u8 = 0x82;
const SUBACK: u8 = 0x90;
const PINGREQ: u8 = 0xC0;
const PINGRESP: u8 = 0xD0;

// Protocol constants
const PROTOCOL_NAME: &[u8] = b"MQTT";
const PROTOCOL_LEVEL: u8 = 4; // MQTT 3.1.1

// CONNECT flags
const CLEAN_SESSION_FLAG: u8 = 0x02;
const PASSWORD_FLAG: u8 = 0x40;
const USERNAME_FLAG: u8 = 0x80;

/// Largest accepted packet body.
const PACKET_BUFFER_SIZE: usize = 1024;

/// Capacity of the inbound reassembly buffer: one maximal frame (type
/// byte, up to four remaining-length bytes, body).
const RX_BUFFER_SIZE: usize = PACKET_BUFFER_SIZE + 5;

/// An MQTT 3.1.1 session bound to one broker connection.
///
/// The engine supports exactly what the hub client needs: a credentialed
/// connect handshake, one subscription with a stored handler, publishes,
/// and a periodic service tick. On any transport-level failure the
/// session marks itself disconnected; subsequent calls fail with
/// [`Error::NotOpen`] and the owner is expected to rebuild the session
/// from a fresh connection.
pub struct Session<C: Connection, H: MessageHandler> {
    connection: C,
    handler: Option<H>,
    filter: Option<String<128>>,
    rx: Vec<u8, RX_BUFFER_SIZE>,
    keep_alive_ms: u64,
    last_ping_ms: Option<u64>,
    next_packet_id: u16,
    is_connected: bool,
}

impl<C: Connection, H: MessageHandler> Session<C, H> {
    /// Establish an MQTT session over an already connected stream.
    ///
    /// Sends a CONNECT packet with protocol level 4, the client
    /// identifier, username, and password from `credentials`, then waits
    /// for the broker's CONNACK. CONNACK return codes 1 through 5 (bad
    /// protocol version, identifier rejected, server unavailable, bad
    /// credentials, not authorized) all surface as
    /// [`Error::ConnectionRefused`].
    pub fn connect(
        mut connection: C,
        credentials: &Credentials<'_>,
        keep_alive_secs: u16,
    ) -> Result<Self, Error> {
        // --- Variable Header ---
        let mut vh: Vec<u8, 10> = Vec::new();
        put_slice(&mut vh, &(PROTOCOL_NAME.len() as u16).to_be_bytes())?;
        put_slice(&mut vh, PROTOCOL_NAME)?;
        put_byte(&mut vh, PROTOCOL_LEVEL)?;
        put_byte(&mut vh, CLEAN_SESSION_FLAG | USERNAME_FLAG | PASSWORD_FLAG)?;
        put_slice(&mut vh, &keep_alive_secs.to_be_bytes())?;

        // --- Payload ---
        let mut payload: Vec<u8, 512> = Vec::new();
        put_str(&mut payload, credentials.client_id)?;
        put_str(&mut payload, credentials.username.as_str())?;
        put_str(&mut payload, credentials.password)?;

        let remaining_len = vh.len() + payload.len();

        // --- Fixed Header ---
        let mut fixed_header: Vec<u8, 5> = Vec::new();
        put_byte(&mut fixed_header, CONNECT)?;
        encode_remaining_length(&mut fixed_header, remaining_len)
            .map_err(|_| Error::ProtocolError)?;

        // Write packet to the connection
        connection
            .write(&fixed_header)
            .map_err(|_| Error::WriteError)?;
        connection.write(&vh).map_err(|_| Error::WriteError)?;
        connection.write(&payload).map_err(|_| Error::WriteError)?;
        connection.flush().map_err(|_| Error::WriteError)?;

        // Wait for and parse CONNACK
        let mut connack_buf = [0u8; 4];
        read_exact(&mut connection, &mut connack_buf)?;

        if connack_buf[0] != CONNACK {
            return Err(Error::ProtocolError);
        }

        if connack_buf[1] != 2 {
            return Err(Error::ProtocolError);
        }

        // Check connection acknowledgement status
        match connack_buf[3] {
            0 => Ok(Self {
                connection,
                handler: None,
                filter: None,
                rx: Vec::new(),
                keep_alive_ms: u64::from(keep_alive_secs) * 1000,
                last_ping_ms: None,
                next_packet_id: 1,
                is_connected: true,
            }),
            1..=5 => Err(Error::ConnectionRefused),
            _ => Err(Error::ProtocolError),
        }
    }

    /// Whether the session still believes its transport is alive.
    pub fn is_connected(&self) -> bool {
        self.is_connected
    }

    /// Subscribe to a topic filter and register the inbound handler.
    ///
    /// The session supports exactly one subscription; a second call is a
    /// protocol misuse and fails with [`Error::ProtocolError`]. The
    /// handler is owned by the session from here on and is invoked from
    /// [`Session::service`] for every inbound message whose topic matches
    /// the filter.
    pub fn subscribe(&mut self, filter: &str, qos: QoS, handler: H) -> Result<(), Error> {
        if !self.is_connected {
            return Err(Error::NotOpen);
        }
        if self.handler.is_some() {
            return Err(Error::ProtocolError);
        }

        let stored_filter = String::try_from(filter).map_err(|_| Error::ProtocolError)?;

        let packet_id = self.next_packet_id;

        // --- Variable Header (Packet Identifier) and Payload ---
        let mut packet: Vec<u8, 256> = Vec::new();
        put_slice(&mut packet, &packet_id.to_be_bytes())?;
        put_str(&mut packet, filter)?;
        put_byte(&mut packet, qos as u8)?;

        // --- Fixed Header ---
        let mut fixed_header: Vec<u8, 5> = Vec::new();
        put_byte(&mut fixed_header, SUBSCRIBE)?;
        encode_remaining_length(&mut fixed_header, packet.len())
            .map_err(|_| Error::ProtocolError)?;

        if let Err(e) = self.write_packet(&fixed_header, &packet) {
            return Err(self.on_transport_error(e));
        }

        // Wait for SUBACK
        let mut suback_buf = [0u8; 5];
        if let Err(e) = read_exact(&mut self.connection, &mut suback_buf) {
            return Err(self.on_transport_error(e));
        }

        if suback_buf[0] != SUBACK || suback_buf[1] != 3 {
            return Err(Error::ProtocolError);
        }

        // Check packet identifier
        let suback_packet_id = u16::from_be_bytes([suback_buf[2], suback_buf[3]]);
        if suback_packet_id != packet_id {
            return Err(Error::ProtocolError);
        }

        // Check the subscription return code
        match suback_buf[4] {
            0..=2 => {}
            0x80 => return Err(Error::ConnectionRefused),
            _ => return Err(Error::ProtocolError),
        }

        self.next_packet_id = self.next_packet_id.wrapping_add(1).max(1);
        self.filter = Some(stored_filter);
        self.handler = Some(handler);
        Ok(())
    }

    /// Publish a message to a topic.
    ///
    /// Fails immediately with [`Error::NotOpen`] when the session is not
    /// connected; nothing touches the transport in that case. For
    /// [`QoS::AtMostOnce`] no acknowledgment is awaited and the message
    /// identifier stays off the wire. A transport-level write failure
    /// drops the session to disconnected.
    pub fn publish(&mut self, topic: &str, message: &Message<'_>) -> Result<(), Error> {
        if !self.is_connected {
            return Err(Error::NotOpen);
        }

        let mut packet: Vec<u8, PACKET_BUFFER_SIZE> = Vec::new();

        // --- Variable Header ---
        put_str(&mut packet, topic)?;
        if message.qos != QoS::AtMostOnce {
            put_slice(&mut packet, &message.id.to_be_bytes())?;
        }

        // --- Payload ---
        put_slice(&mut packet, message.payload)?;

        // --- Fixed Header ---
        let mut flags = PUBLISH | ((message.qos as u8) << 1);
        if message.duplicate {
            flags |= 0x08;
        }
        if message.retained {
            flags |= 0x01;
        }
        let mut fixed_header: Vec<u8, 5> = Vec::new();
        put_byte(&mut fixed_header, flags)?;
        encode_remaining_length(&mut fixed_header, packet.len())
            .map_err(|_| Error::ProtocolError)?;

        if let Err(e) = self.write_packet(&fixed_header, &packet) {
            return Err(self.on_transport_error(e));
        }
        Ok(())
    }

    /// Service the session: drain inbound packets and keep the
    /// connection alive.
    ///
    /// Must be called periodically (the hub client is designed around a
    /// 100 ms cadence) with a monotonic millisecond timestamp supplied by
    /// the scheduler. Inbound bytes accumulate in the session's
    /// reassembly buffer; a packet split across ticks by the transport is
    /// carried over and dispatched once its remaining bytes arrive.
    /// Complete PUBLISH packets whose topic matches the subscription go
    /// to the handler exactly once; packets on non-matching topics and
    /// non-PUBLISH packets are consumed without dispatch. A PINGREQ is
    /// sent once the keep-alive interval has elapsed since the previous
    /// ping (or since the first tick).
    ///
    /// The call never blocks waiting for data: the connection's `read`
    /// must return `Ok(0)` when nothing is buffered.
    pub fn service(&mut self, now_ms: u64) -> Result<(), Error> {
        if !self.is_connected {
            return Err(Error::NotOpen);
        }

        loop {
            let mut scratch = [0u8; 64];
            // Dispatching below keeps at most one partial frame buffered,
            // and an oversized frame fails before the buffer fills, so
            // there is always room to make progress.
            let want = (RX_BUFFER_SIZE - self.rx.len()).min(scratch.len());
            if want == 0 {
                return Err(Error::ProtocolError);
            }
            match self.connection.read(&mut scratch[..want]) {
                Ok(0) => break,
                Ok(n) => {
                    self.rx
                        .extend_from_slice(&scratch[..n])
                        .map_err(|_| Error::ProtocolError)?;
                    self.dispatch_complete_frames()?;
                }
                Err(_) => return Err(self.on_transport_error(Error::ReadError)),
            }
        }

        let last_ping = *self.last_ping_ms.get_or_insert(now_ms);
        if self.keep_alive_ms > 0 && now_ms.saturating_sub(last_ping) >= self.keep_alive_ms {
            let ping = [PINGREQ, 0];
            if let Err(e) = self.write_packet(&ping, &[]) {
                return Err(self.on_transport_error(e));
            }
            self.last_ping_ms = Some(now_ms);
        }

        Ok(())
    }

    /// Dispatch every complete frame sitting at the front of the
    /// reassembly buffer; an incomplete tail stays buffered for the next
    /// tick.
    fn dispatch_complete_frames(&mut self) -> Result<(), Error> {
        while let Some((header_len, body_len)) = frame_boundary(&self.rx)? {
            let total = header_len + body_len;
            if self.rx.len() < total {
                break;
            }

            let type_byte = self.rx[0];
            if type_byte & 0xF0 == PUBLISH {
                let body = &self.rx[header_len..total];
                if body.len() < 2 {
                    return Err(Error::ProtocolError);
                }
                let topic_len = u16::from_be_bytes([body[0], body[1]]) as usize;
                if 2 + topic_len > body.len() {
                    return Err(Error::ProtocolError);
                }
                let topic = core::str::from_utf8(&body[2..2 + topic_len])
                    .map_err(|_| Error::ProtocolError)?;

                // QoS 1/2 publishes carry a packet identifier before the
                // payload.
                let qos_bits = (type_byte >> 1) & 0x03;
                let mut payload_start = 2 + topic_len;
                if qos_bits > 0 {
                    payload_start += 2;
                    if payload_start > body.len() {
                        return Err(Error::ProtocolError);
                    }
                }
                let payload = &body[payload_start..];

                if let (Some(filter), Some(handler)) =
                    (self.filter.as_ref(), self.handler.as_mut())
                {
                    if filter_matches(filter.as_str(), topic) {
                        handler.on_message(topic, payload);
                    }
                }
            } else if type_byte & 0xF0 == PINGRESP {
                debug!("keep-alive acknowledged");
            }
            // Anything else (stray acknowledgments included) carries
            // nothing to dispatch; dropping the frame keeps the stream
            // framed.

            let len = self.rx.len();
            self.rx.copy_within(total..len, 0);
            self.rx.truncate(len - total);
        }
        Ok(())
    }

    fn write_packet(&mut self, fixed_header: &[u8], body: &[u8]) -> Result<(), Error> {
        self.connection
            .write(fixed_header)
            .map_err(|_| Error::WriteError)?;
        if !body.is_empty() {
            self.connection.write(body).map_err(|_| Error::WriteError)?;
        }
        self.connection.flush().map_err(|_| Error::WriteError)?;
        Ok(())
    }

    /// Transport-level failures kill the session; protocol-level ones
    /// leave it usable.
    fn on_transport_error(&mut self, e: Error) -> Error {
        if matches!(
            e,
            Error::WriteError | Error::ReadError | Error::ConnectionClosed
        ) {
            self.is_connected = false;
        }
        e
    }
}

impl<C: Connection, H: MessageHandler> core::fmt::Debug for Session<C, H> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Session")
            .field("filter", &self.filter)
            .field("buffered", &self.rx.len())
            .field("keep_alive_ms", &self.keep_alive_ms)
            .field("last_ping_ms", &self.last_ping_ms)
            .field("next_packet_id", &self.next_packet_id)
            .field("is_connected", &self.is_connected)
            .finish_non_exhaustive()
    }
}

/// Locate the frame at the front of the reassembly buffer.
///
/// Returns the header length (type byte plus remaining-length field) and
/// the body length once the header is fully decodable, `None` while more
/// bytes are needed, and an error for an unterminated length field or a
/// body larger than the session accepts.
fn frame_boundary(rx: &[u8]) -> Result<Option<(usize, usize)>, Error> {
    if rx.is_empty() {
        return Ok(None);
    }
    let mut body_len = 0usize;
    let mut multiplier = 1usize;
    for i in 0..4 {
        let Some(&byte) = rx.get(1 + i) else {
            return Ok(None);
        };
        body_len += (byte as usize & 127) * multiplier;
        multiplier *= 128;
        if byte & 0x80 == 0 {
            if body_len > PACKET_BUFFER_SIZE {
                return Err(Error::ProtocolError);
            }
            return Ok(Some((2 + i, body_len)));
        }
    }
    Err(Error::ProtocolError)
}

fn put_byte<const N: usize>(buf: &mut Vec<u8, N>, byte: u8) -> Result<(), Error> {
    buf.push(byte).map_err(|_| Error::ProtocolError)
}

fn put_slice<const N: usize>(buf: &mut Vec<u8, N>, bytes: &[u8]) -> Result<(), Error> {
    buf.extend_from_slice(bytes).map_err(|_| Error::ProtocolError)
}

/// Append a UTF-8 string field with its two-byte length prefix.
fn put_str<const N: usize>(buf: &mut Vec<u8, N>, s: &str) -> Result<(), Error> {
    let bytes = s.as_bytes();
    if bytes.len() > usize::from(u16::MAX) {
        return Err(Error::ProtocolError);
    }
    put_slice(buf, &(bytes.len() as u16).to_be_bytes())?;
    put_slice(buf, bytes)
}

fn read_exact<C: Read>(connection: &mut C, buf: &mut [u8]) -> Result<(), Error> {
    let mut total_read = 0;
    while total_read < buf.len() {
        match connection.read(&mut buf[total_read..]) {
            Ok(0) => return Err(Error::ConnectionClosed),
            Ok(n) => total_read += n,
            Err(_) => return Err(Error::ReadError),
        }
    }
    Ok(())
}

/// Encode the remaining length field for an MQTT packet.
fn encode_remaining_length(buf: &mut Vec<u8, 5>, mut len: usize) -> Result<(), ()> {
    loop {
        if buf.is_full() {
            return Err(());
        }
        let mut byte = (len % 128) as u8;
        len /= 128;
        if len > 0 {
            byte |= 0x80;
        }
        buf.push(byte).unwrap(); // `is_full` check above ensures this won't panic
        if len == 0 {
            break;
        }
    }
    Ok(())
}
