//! # libiothub - Azure IoT Hub client for embedded devices
//!
//! A small Rust library that connects an embedded device to Azure IoT Hub
//! over MQTT/TLS, publishes device-to-cloud events, and delivers
//! cloud-to-device messages to a registered handler. It is designed for
//! `no_std` environments and is transport agnostic: the platform supplies
//! the TLS stream, the UDP socket used for time synchronization, and a
//! delay provider, all through small traits.
//!
//! ## What it does
//!
//! - **Time synchronization**: queries an SNTP server and sets the
//!   process-wide wall clock before any TLS handshake is attempted, since
//!   certificate validity checks need a plausible clock. The gate retries
//!   with a fixed backoff until it succeeds.
//! - **TLS transport**: a [`network::TlsConnect`] implementation opens a
//!   TLS 1.2+ stream to the hub endpoint, optionally with a client
//!   certificate for mutual TLS.
//! - **MQTT session**: an MQTT 3.1.1 engine handles the credentialed
//!   CONNECT handshake, one subscription with a stored message handler,
//!   QoS 0/1 publishes, and keep-alive pings.
//! - **Client facade**: [`hub::Client`] sequences the phases and owns the
//!   connection state.
//!
//! ## Usage sketch
//!
//! ```rust,ignore
//! use libiothub::hub::{Client, Credentials, Endpoint};
//! use libiothub::network::mqtt::QoS;
//!
//! let endpoint = Endpoint::new("my-hub.azure-devices.net", 8883, ROOT_CA_PEM);
//! let credentials = Credentials::new(endpoint.host, "dev1", SAS_TOKEN)?;
//! let mut client = Client::new(endpoint, credentials, "dev1", 60)?;
//!
//! // `tls`, `sntp` and `delay` come from the platform integration.
//! client.connect(&mut tls, &mut sntp, &mut delay, handler)?;
//! client.publish(b"hello", QoS::AtMostOnce, false)?;
//!
//! // Invoked from the platform scheduler every 100 ms.
//! client.service(now_ms)?;
//! ```
//!
//! ## Concurrency
//!
//! The crate is single-threaded and cooperative by design. Nothing in it
//! is internally thread-safe: one serialized execution context must own
//! the client and drive `service` at a fixed cadence. Hosts with real
//! threads should wrap the facade in a single-owner task or a mutex.
//!
//! ## Optional Features
//!
//! - `std`: Enable standard library support (default: disabled)
//! - `defmt`: Enable defmt logging support for embedded debugging

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(missing_docs)]
#![warn(missing_debug_implementations)]

#[macro_use]
mod fmt;

/// Network abstraction layer: transport traits, error types, and the MQTT
/// session engine.
pub mod network;

/// Wall-clock state and network time synchronization.
///
/// TLS certificate validation needs a plausible clock; this module owns
/// the process-wide time state and the blocking synchronization gate that
/// fills it in from an SNTP server at startup.
pub mod time;

/// The Azure IoT Hub client facade.
///
/// Sequences time sync, TLS transport, and the MQTT session into a single
/// `connect`/`publish`/`service` surface.
pub mod hub;
