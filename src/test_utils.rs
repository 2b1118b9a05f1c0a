//! Scripted transport, RNG and frame builders shared by the unit tests.

use std::collections::VecDeque;
use std::string::{String, ToString};
use std::vec::Vec;

use embassy_time::Duration;
use rand_core::{Error as RandError, RngCore, impls};

use crate::config::ClientConfig;
use crate::runtime::{LineDisplay, Reading, SensorError, SensorReader};
use crate::session::Session;
use crate::transport::{ConnectTarget, MqttTransport, SocketHandle, TransportError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockError {
    Refused,
    Closed,
    Write,
    Poll,
    Unsupported,
}

impl TransportError for MockError {
    fn is_fatal(&self) -> bool {
        *self == MockError::Unsupported
    }
}

/// A transport that replays scripted inbound bytes and records what is sent.
#[derive(Debug, Default)]
pub struct MockTransport {
    inbound: VecDeque<Vec<u8>>,
    pub sent: Vec<Vec<u8>>,
    pub open_calls: usize,
    pub recv_calls: usize,
    pub aborts: usize,
    pub closes: usize,
    /// CONNACK return code queued on every successful `open`.
    pub auto_connack: Option<u8>,
    pub refuse_open: bool,
    /// `open` reports a configuration the transport cannot serve.
    pub misconfigured: bool,
    pub fail_send: bool,
    /// Fails the send that would record frame number `n`, once.
    pub fail_send_at: Option<usize>,
    fail_readable: bool,
    peer_closed: bool,
    handle: u16,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A broker that accepts every connection.
    pub fn accepting() -> Self {
        Self {
            auto_connack: Some(0),
            ..Self::default()
        }
    }

    pub fn push_inbound(&mut self, bytes: &[u8]) {
        self.inbound.push_back(bytes.to_vec());
    }

    pub fn close_from_peer(&mut self) {
        self.peer_closed = true;
    }

    pub fn fail_readable(&mut self) {
        self.fail_readable = true;
    }

    /// Sent frames with the given fixed header byte.
    pub fn sent_with_header(&self, header: u8) -> Vec<&[u8]> {
        self.sent
            .iter()
            .filter(|frame| frame.first() == Some(&header))
            .map(|frame| frame.as_slice())
            .collect()
    }
}

impl MqttTransport for MockTransport {
    type Error = MockError;

    async fn open(&mut self, _target: ConnectTarget<'_, '_>) -> Result<SocketHandle, MockError> {
        self.open_calls += 1;
        if self.misconfigured {
            return Err(MockError::Unsupported);
        }
        if self.refuse_open {
            return Err(MockError::Refused);
        }
        self.peer_closed = false;
        if let Some(code) = self.auto_connack {
            self.inbound.push_back(connack(code));
        }
        self.handle += 1;
        Ok(SocketHandle(self.handle))
    }

    async fn send(&mut self, buf: &[u8]) -> Result<(), MockError> {
        if self.fail_send || self.fail_send_at == Some(self.sent.len()) {
            self.fail_send_at = None;
            return Err(MockError::Write);
        }
        self.sent.push(buf.to_vec());
        Ok(())
    }

    async fn recv(&mut self, buf: &mut [u8]) -> Result<usize, MockError> {
        self.recv_calls += 1;
        let Some(mut chunk) = self.inbound.pop_front() else {
            return if self.peer_closed {
                Err(MockError::Closed)
            } else {
                Ok(0)
            };
        };
        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        if n < chunk.len() {
            self.inbound.push_front(chunk.split_off(n));
        }
        Ok(n)
    }

    async fn readable(&mut self) -> Result<(), MockError> {
        if self.fail_readable {
            return Err(MockError::Poll);
        }
        if self.inbound.is_empty() && !self.peer_closed {
            core::future::pending::<()>().await;
        }
        Ok(())
    }

    fn abort(&mut self) {
        self.aborts += 1;
        self.inbound.clear();
    }

    async fn close(&mut self) {
        self.closes += 1;
    }
}

/// An RNG that cycles through a fixed list of values.
pub struct SequenceRng {
    values: Vec<u32>,
    next: usize,
}

impl SequenceRng {
    pub fn new(values: &[u32]) -> Self {
        Self {
            values: values.to_vec(),
            next: 0,
        }
    }
}

impl RngCore for SequenceRng {
    fn next_u32(&mut self) -> u32 {
        let value = self.values[self.next % self.values.len()];
        self.next += 1;
        value
    }

    fn next_u64(&mut self) -> u64 {
        impls::next_u64_via_u32(self)
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        impls::fill_bytes_via_next(self, dest)
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), RandError> {
        self.fill_bytes(dest);
        Ok(())
    }
}

/// Defaults with a retry policy short enough for unit tests.
pub fn fast_config() -> ClientConfig<'static> {
    ClientConfig {
        connect_tries: 3,
        connect_timeout: Duration::from_millis(20),
        retry_sleep: Duration::from_millis(5),
        ..ClientConfig::DEFAULT
    }
}

pub type TestSession = Session<'static, MockTransport, SequenceRng>;

pub fn session(transport: MockTransport, ids: &[u32]) -> TestSession {
    Session::new(transport, SequenceRng::new(ids), fast_config()).unwrap()
}

/// A session that already completed the CONNECT / CONNACK exchange.
pub fn connected_session(ids: &[u32]) -> TestSession {
    let mut session = session(MockTransport::accepting(), ids);
    embassy_futures::block_on(session.try_to_connect()).unwrap();
    session
}

pub fn connack(code: u8) -> Vec<u8> {
    std::vec![0x20, 0x02, 0x00, code]
}

fn ack(header: u8, id: u16) -> Vec<u8> {
    let [hi, lo] = id.to_be_bytes();
    std::vec![header, 0x02, hi, lo]
}

pub fn puback(id: u16) -> Vec<u8> {
    ack(0x40, id)
}

pub fn pubrec(id: u16) -> Vec<u8> {
    ack(0x50, id)
}

pub fn pubrel(id: u16) -> Vec<u8> {
    ack(0x62, id)
}

pub fn pubcomp(id: u16) -> Vec<u8> {
    ack(0x70, id)
}

pub fn pingresp() -> Vec<u8> {
    std::vec![0xD0, 0x00]
}

pub fn disconnect() -> Vec<u8> {
    std::vec![0xE0, 0x00]
}

/// A sensor that returns the given readings in order, then fails with `-5`.
pub struct ScriptedSensor {
    readings: Vec<Reading>,
    pub samples: usize,
}

impl ScriptedSensor {
    pub fn new(readings: &[Reading]) -> Self {
        Self {
            readings: readings.to_vec(),
            samples: 0,
        }
    }
}

impl SensorReader for ScriptedSensor {
    fn sample(&mut self) -> Result<Reading, SensorError> {
        let reading = self
            .readings
            .get(self.samples)
            .copied()
            .ok_or(SensorError { code: -5 });
        self.samples += 1;
        reading
    }
}

#[derive(Default)]
pub struct RecordingDisplay {
    pub lines: [String; 2],
}

impl LineDisplay for RecordingDisplay {
    fn show(&mut self, line: u8, text: &str) {
        self.lines[usize::from(line)] = text.to_string();
    }
}
