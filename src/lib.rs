//! # Sensor MQTT Publisher
//!
//! `sensor-mqtt-publisher` is the `no_std`, asynchronous MQTT session layer of a
//! board that samples a temperature / humidity sensor, shows the values on a
//! character LCD and publishes them to a broker over a lossy link, built upon
//! the [Embassy](https://embassy.dev/) async ecosystem.
//!
//! ## Core Features
//!
//! - **`no_std` & `no_alloc`:** Buffers, the poll set and the in-flight table
//!   are fixed-capacity and owned by one [`Session`] value.
//! - **Bounded everything:** connect attempts, per-attempt CONNACK waits and
//!   the run-loop are all limited by counts or caller-supplied budgets.
//! - **QoS 0, 1 & 2:** Exactly-once publishes run the full
//!   PUBLISH / PUBREC / PUBREL / PUBCOMP handshake, keyed by random message ids.
//! - **Transport Agnostic:** A flexible `MqttTransport` trait; the bundled
//!   [`TcpTransport`] speaks plain TCP, optionally through a SOCKS5 proxy.
//!
//! ## Architecture
//!
//! ```ignore
//! let mut session = Session::new(transport, rng, ClientConfig::DEFAULT)?;
//! session.negotiate_security(&mut store, &credentials)?;
//! session.try_to_connect().await?;
//! session.publish(TEMPERATURE_TOPIC, b"23.500000", QoS::ExactlyOnce).await?;
//! session.process_and_wait(Duration::from_secs(2)).await?;
//! ```
//!
//! For the full firmware loop, hand the session and a [`TelemetryModule`] to
//! [`MqttRuntime`](runtime::MqttRuntime).

#![cfg_attr(not(test), no_std)]

#[macro_use]
mod fmt;

pub mod config;
pub mod error;
pub mod events;
pub mod inflight;
pub mod packet;
pub mod poll;
pub mod resolver;
pub mod runtime;
pub mod security;
pub mod session;
pub mod socks;
pub mod transport;
pub mod util;

#[cfg(test)]
mod test_utils;

// Re-export key types for easier access at the crate root.
pub use config::ClientConfig;
pub use error::MqttError;
pub use events::MqttEvent;
pub use packet::QoS;
pub use runtime::TelemetryModule;
pub use session::{Session, SessionState};
pub use transport::{MqttTransport, TcpTransport, TransportKind};
