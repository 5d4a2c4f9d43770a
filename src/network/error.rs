//! Common error types for network operations

/// A common error type for network operations.
///
/// This enum defines a set of common errors that can occur when working
/// with network connections and the MQTT session. It is designed to be
/// simple and portable for `no_std` environments.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Error {
    /// An operation was attempted on a connection that is not open.
    NotOpen,
    /// An error occurred during a write operation.
    WriteError,
    /// An error occurred during a read operation.
    ReadError,
    /// A connection attempt was refused.
    ConnectionRefused,
    /// A timeout occurred.
    Timeout,
    /// The connection was closed.
    ConnectionClosed,
    /// A protocol-specific error occurred.
    ProtocolError,
}

/// An error raised while establishing the TLS transport.
///
/// Network-level failures (DNS, TCP refusal, timeouts) and TLS-level
/// failures (certificate validation, protocol negotiation) are kept
/// distinguishable so the caller can report the right phase.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum TransportError {
    /// A failure below the TLS layer.
    Network(Error),
    /// A failure reported by the TLS stack, carrying the stack's raw
    /// numeric code. Vendor TLS stacks use codes at or below `-0x1000`.
    Tls(i32),
}

impl TransportError {
    /// Decode the TLS failure into a readable reason, best-effort.
    ///
    /// Returns `None` for network-level errors and for TLS codes outside
    /// the decode table; the raw code in [`TransportError::Tls`] remains
    /// available either way, so a failed decode is never fatal.
    pub fn tls_reason(&self) -> Option<&'static str> {
        match self {
            TransportError::Network(_) => None,
            TransportError::Tls(code) => tls_strerror(*code),
        }
    }
}

/// Decode a TLS-stack numeric error code into a static reason string.
///
/// The table covers the handshake failures worth reporting on a device
/// console. Codes above `-0x1000` are not TLS codes by convention and
/// never decode.
pub fn tls_strerror(code: i32) -> Option<&'static str> {
    if code > -0x1000 {
        return None;
    }
    match code {
        -0x2700 => Some("peer certificate verification failed"),
        -0x2180 => Some("certificate has an invalid signature"),
        -0x7080 => Some("no root CA configured for verification"),
        -0x7200 => Some("invalid TLS record received"),
        -0x7280 => Some("TLS handshake message malformed"),
        -0x7780 => Some("fatal alert received from peer"),
        -0x7880 => Some("peer closed the connection"),
        _ => None,
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Error {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Error::NotOpen => defmt::write!(f, "NotOpen"),
            Error::WriteError => defmt::write!(f, "WriteError"),
            Error::ReadError => defmt::write!(f, "ReadError"),
            Error::ConnectionRefused => defmt::write!(f, "ConnectionRefused"),
            Error::Timeout => defmt::write!(f, "Timeout"),
            Error::ConnectionClosed => defmt::write!(f, "ConnectionClosed"),
            Error::ProtocolError => defmt::write!(f, "ProtocolError"),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for TransportError {
    fn format(&self, f: defmt::Formatter) {
        match self {
            TransportError::Network(e) => defmt::write!(f, "Network({})", e),
            TransportError::Tls(code) => match tls_strerror(*code) {
                Some(reason) => defmt::write!(f, "Tls({=i32}: {=str})", *code, reason),
                None => defmt::write!(f, "Tls({=i32})", *code),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_known_tls_codes() {
        assert_eq!(
            tls_strerror(-0x2700),
            Some("peer certificate verification failed")
        );
        assert_eq!(tls_strerror(-0x7880), Some("peer closed the connection"));
    }

    #[test]
    fn unknown_tls_code_is_not_decoded() {
        assert_eq!(tls_strerror(-0x5f5f), None);
    }

    #[test]
    fn codes_outside_the_tls_range_never_decode() {
        // -0x2700 truncated to a small code must not hit the table.
        assert_eq!(tls_strerror(-0x27), None);
        assert_eq!(tls_strerror(0), None);
    }

    #[test]
    fn network_errors_carry_no_tls_reason() {
        assert_eq!(TransportError::Network(Error::Timeout).tls_reason(), None);
        assert_eq!(
            TransportError::Tls(-0x7780).tls_reason(),
            Some("fatal alert received from peer")
        );
    }
}
