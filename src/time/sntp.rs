//! SNTP v4 client used as the gate's default time source.
//!
//! Sends a single 48-byte request over a [`UdpSocket`] and parses the
//! server's transmit timestamp. Validation is deliberately strict: a
//! short datagram, a non-server mode, an unsynchronized stratum, or a
//! zero timestamp all fail the attempt, and the gate retries.

use super::TimeSource;
use crate::network::UdpSocket;

/// The default time source: Google's public NTP service.
pub const DEFAULT_SERVER: &str = "time.google.com:123";

/// Size of an SNTP packet without extensions.
const NTP_PACKET_SIZE: usize = 48;

/// LI=0, VN=4, mode=3 (client request).
const NTP_CLIENT_REQUEST: u8 = 0x23;

/// Seconds between the NTP epoch (1900) and the unix epoch (1970).
const NTP_UNIX_OFFSET: u64 = 2_208_988_800;

/// Highest stratum still considered synchronized.
const MAX_STRATUM: u8 = 15;

/// Errors from a single SNTP query attempt.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum SntpError {
    /// The socket failed to send or receive.
    Network,
    /// The datagram was short, malformed, or not a server reply.
    InvalidResponse,
    /// The server reported an unsynchronized or invalid stratum.
    InvalidStratum,
}

#[cfg(feature = "defmt")]
impl defmt::Format for SntpError {
    fn format(&self, f: defmt::Formatter) {
        match self {
            SntpError::Network => defmt::write!(f, "Network"),
            SntpError::InvalidResponse => defmt::write!(f, "InvalidResponse"),
            SntpError::InvalidStratum => defmt::write!(f, "InvalidStratum"),
        }
    }
}

/// An SNTP client bound to one server address.
#[derive(Debug)]
pub struct SntpClient<'a, U: UdpSocket> {
    socket: U,
    server: &'a str,
}

impl<'a, U: UdpSocket> SntpClient<'a, U> {
    /// Create a client that queries `server` (a `host:port` string).
    pub fn new(socket: U, server: &'a str) -> Self {
        Self { socket, server }
    }
}

impl<U: UdpSocket> TimeSource for SntpClient<'_, U> {
    type Error = SntpError;

    fn fetch(&mut self) -> Result<u64, Self::Error> {
        let mut request = [0u8; NTP_PACKET_SIZE];
        request[0] = NTP_CLIENT_REQUEST;
        self.socket
            .send_to(self.server, &request)
            .map_err(|_| SntpError::Network)?;

        let mut response = [0u8; NTP_PACKET_SIZE];
        let (len, _) = self
            .socket
            .recv_from(&mut response)
            .map_err(|_| SntpError::Network)?;
        if len < NTP_PACKET_SIZE {
            return Err(SntpError::InvalidResponse);
        }

        // Mode must be server (4) or broadcast (5).
        let mode = response[0] & 0x07;
        if mode != 4 && mode != 5 {
            return Err(SntpError::InvalidResponse);
        }

        let stratum = response[1];
        if stratum == 0 || stratum > MAX_STRATUM {
            return Err(SntpError::InvalidStratum);
        }

        // Transmit timestamp, seconds field. A zero or pre-unix-epoch
        // value means the server never answered with real time.
        let ntp_secs = u64::from(u32::from_be_bytes([
            response[40],
            response[41],
            response[42],
            response[43],
        ]));
        ntp_secs
            .checked_sub(NTP_UNIX_OFFSET)
            .ok_or(SntpError::InvalidResponse)
    }
}
