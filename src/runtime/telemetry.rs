//! Board telemetry: temperature and humidity samples published on a fixed cadence.

use core::fmt::Write;

use embassy_time::Duration;
use heapless::String;

use super::traits::{ModuleError, MqttModule, PublishOutbox};
use crate::config::{HUMIDITY_TOPIC, PUBLISH_QOS, SAMPLE_INTERVAL, TEMPERATURE_TOPIC};
use crate::packet::QoS;

/// Capacity of a formatted reading or display line.
const TEXT_SIZE: usize = 32;

/// One sample from the temperature / humidity sensor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    /// Degrees Celsius.
    pub temperature: f64,
    /// Relative humidity in percent.
    pub humidity: f64,
}

/// The sensor driver could not produce a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SensorError {
    pub code: i32,
}

pub trait SensorReader {
    fn sample(&mut self) -> Result<Reading, SensorError>;
}

/// A character display with a few fixed lines (the 16x2 LCD).
pub trait LineDisplay {
    fn show(&mut self, line: u8, text: &str);
}

/// Publishes every sensor sample to the temperature and humidity topics.
pub struct TelemetryModule<S, D> {
    sensor: S,
    display: D,
    interval: Duration,
    qos: QoS,
}

impl<S: SensorReader, D: LineDisplay> TelemetryModule<S, D> {
    pub fn new(sensor: S, display: D) -> Self {
        Self {
            sensor,
            display,
            interval: SAMPLE_INTERVAL,
            qos: PUBLISH_QOS,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_qos(mut self, qos: QoS) -> Self {
        self.qos = qos;
        self
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    fn publish_value(&self, outbox: &mut dyn PublishOutbox, topic: &str, value: f64) {
        let mut payload: String<TEXT_SIZE> = String::new();
        if write!(payload, "{:.6}", value).is_err() {
            warn!("{}: reading out of range", topic);
            return;
        }
        outbox.publish(topic, payload.as_bytes(), self.qos);
    }
}

impl<S: SensorReader, D: LineDisplay> MqttModule for TelemetryModule<S, D> {
    fn on_tick(&mut self, outbox: &mut dyn PublishOutbox) -> Result<Duration, ModuleError> {
        let reading = self.sensor.sample().map_err(|e| {
            error!("sensor_sample_fetch: {}", e.code);
            ModuleError {
                operation: "sensor_sample_fetch",
                code: e.code,
            }
        })?;
        info!(
            "{:.1} C ; {:.1} %RH",
            reading.temperature, reading.humidity
        );

        self.publish_value(outbox, TEMPERATURE_TOPIC, reading.temperature);
        self.publish_value(outbox, HUMIDITY_TOPIC, reading.humidity);

        let mut line: String<TEXT_SIZE> = String::new();
        if write!(line, "T: {:.1} C", reading.temperature).is_ok() {
            self.display.show(0, &line);
        }
        line.clear();
        if write!(line, "RH: {:.1} %", reading.humidity).is_ok() {
            self.display.show(1, &line);
        }

        Ok(self.interval)
    }
}
