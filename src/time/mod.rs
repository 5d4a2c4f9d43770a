//! Process-wide wall clock and the time synchronization gate.
//!
//! Embedded devices commonly boot with an epoch or otherwise implausible
//! clock, and TLS certificate validation cannot succeed until the clock
//! falls inside the certificates' validity windows. This module owns the
//! process-wide time state: [`synchronize`] is its single writer, every
//! other component (the TLS integration above all) only reads it through
//! [`now`].
//!
//! Initialization contract: [`synchronize`] must run to completion before
//! any TLS handshake is attempted. The hub facade enforces this ordering.

pub mod sntp;

use core::sync::atomic::{AtomicU64, Ordering};
use embedded_hal::delay::DelayNs;

/// Fixed backoff between failed synchronization attempts.
const RETRY_BACKOFF_MS: u32 = 1000;

/// Unix seconds set by the gate; zero means "never synchronized".
static WALL_CLOCK_SECS: AtomicU64 = AtomicU64::new(0);

/// A network source of wall-clock time.
pub trait TimeSource {
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Query the source once, returning unix seconds on success.
    fn fetch(&mut self) -> Result<u64, Self::Error>;
}

/// The current wall-clock time in unix seconds, or `None` before the
/// first successful synchronization.
pub fn now() -> Option<u64> {
    match WALL_CLOCK_SECS.load(Ordering::Relaxed) {
        0 => None,
        secs => Some(secs),
    }
}

fn set(unix_secs: u64) {
    WALL_CLOCK_SECS.store(unix_secs, Ordering::Relaxed);
}

/// Run the time synchronization gate to completion.
///
/// Queries the source until it produces a timestamp, sleeping for a fixed
/// one-second backoff after every failure. The loop is deliberately
/// unbounded and has no cancellation path: nothing downstream of the gate
/// can work without a plausible clock, so there is no useful way to give
/// up. The caller blocks for up to the backoff interval per attempt,
/// which is acceptable only because the gate runs once, at startup,
/// before steady-state periodic work begins.
///
/// On success the process-wide clock is set as a side effect and the
/// timestamp is returned. This function never fails outward.
pub fn synchronize<T: TimeSource, D: DelayNs>(source: &mut T, delay: &mut D) -> u64 {
    loop {
        match source.fetch() {
            Ok(unix_secs) => {
                set(unix_secs);
                info!("time synchronized: {=u64}", unix_secs);
                return unix_secs;
            }
            Err(_) => {
                warn!("time sync attempt failed, retrying");
                delay.delay_ms(RETRY_BACKOFF_MS);
            }
        }
    }
}
