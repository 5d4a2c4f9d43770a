//! A network abstraction layer for embedded systems.
//!
//! The client core never opens sockets itself. The platform integration
//! implements these traits on top of its own TCP/TLS/UDP stack and hands
//! the resulting connections to the session and time-sync layers. All
//! traits are synchronous: the crate is driven by one cooperative
//! execution context.

#![allow(missing_docs)]

/// Common error types for network operations
pub mod error;

/// MQTT 3.1.1 session engine and protocol types
pub mod mqtt;

use crate::hub::Endpoint;
use error::TransportError;

/// Re-exports of common traits
pub mod prelude {
    pub use super::{Close, Connection, Read, TlsConnect, UdpSocket, Write};
}

// Core synchronous traits
pub trait Read {
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Read data from the connection
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;
}

pub trait Write {
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Write data to the connection
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error>;
    /// Flush the write buffer
    fn flush(&mut self) -> Result<(), Self::Error>;
}

pub trait Close {
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Close the connection
    fn close(self) -> Result<(), Self::Error>;
}

/// A synchronous byte-stream connection.
pub trait Connection: Read + Write + Close {}

/// A connector that opens a TLS-secured stream to a broker endpoint.
///
/// Implementations perform the TCP connection and the TLS handshake,
/// validating the peer against the endpoint's root CA. When the endpoint
/// carries a client certificate and key, the handshake is mutual TLS.
///
/// The process-wide wall clock must be synchronized before calling
/// [`connect`](TlsConnect::connect); certificate validity checks fail on
/// a device that still thinks it is 1970. See [`crate::time`].
pub trait TlsConnect {
    /// The connected stream type produced on success.
    type Connection: Connection;
    /// Open a connection to the endpoint and complete the TLS handshake.
    fn connect(&mut self, endpoint: &Endpoint<'_>) -> Result<Self::Connection, TransportError>;
}

/// A connectionless UDP socket, used by the SNTP time source.
pub trait UdpSocket {
    type Error: core::fmt::Debug;
    /// Send a datagram to `remote` (a `host:port` string).
    fn send_to(&mut self, remote: &str, buf: &[u8]) -> Result<usize, Self::Error>;
    /// Receive a single datagram into `buf`, returning its length and the
    /// sender address.
    fn recv_from(&mut self, buf: &mut [u8]) -> Result<(usize, &str), Self::Error>;
}
