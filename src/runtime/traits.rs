//! Application hooks driven by the `MqttRuntime`.
//!
//! Callbacks are synchronous. Whatever a module wants on the wire goes into a
//! `PublishOutbox`, and the runtime sends it once the callback has returned.

use core::fmt;

use embassy_time::Duration;

use crate::packet::QoS;

/// Sink for publishes queued from inside `on_tick` / `on_start`.
///
/// # Example
///
/// ```ignore
/// fn on_tick(&mut self, outbox: &mut dyn PublishOutbox) -> Result<Duration, ModuleError> {
///     outbox.publish("/sensor/board/state", b"online", QoS::AtMostOnce);
///     Ok(Duration::from_secs(30))
/// }
/// ```
pub trait PublishOutbox {
    /// Returns `false` when the request did not fit and was dropped.
    fn publish(&mut self, topic: &str, payload: &[u8], qos: QoS) -> bool;
}

/// A module failure the runtime cannot recover from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ModuleError {
    /// Name of the failing operation.
    pub operation: &'static str,
    /// Error code reported by the collaborator.
    pub code: i32,
}

impl fmt::Display for ModuleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.operation, self.code)
    }
}

/// Application logic ticked by the runtime. Kept object-safe so firmware can
/// hand over a `&mut dyn MqttModule`.
pub trait MqttModule {
    /// Returns the delay until the next tick (60 s by default). An error stops
    /// the runtime, which disconnects and hands the error back.
    fn on_tick(&mut self, _outbox: &mut dyn PublishOutbox) -> Result<Duration, ModuleError> {
        Ok(Duration::from_secs(60))
    }

    /// Runs after every successful (re)connect.
    fn on_start(&mut self, _outbox: &mut dyn PublishOutbox) {}
}

/// Keeps the session alive without publishing anything.
pub struct NoopModule;

impl MqttModule for NoopModule {}

impl<M: MqttModule + ?Sized> MqttModule for &mut M {
    fn on_tick(&mut self, outbox: &mut dyn PublishOutbox) -> Result<Duration, ModuleError> {
        (**self).on_tick(outbox)
    }

    fn on_start(&mut self, outbox: &mut dyn PublishOutbox) {
        (**self).on_start(outbox)
    }
}
