//! The poll set: the socket a session is currently watching for readability.
//!
//! A session owns exactly one socket, so the set holds at most one handle. It
//! is filled when the transport opens and emptied on every disconnect, which
//! keeps it non-empty only while the session is connecting or connected.

use embassy_time::{Duration, Timer};
use futures::future::{Either, select};

use crate::error::MqttError;
use crate::transport::{MqttTransport, SocketHandle};

#[derive(Debug, Default)]
pub struct PollSet {
    socket: Option<SocketHandle>,
}

impl PollSet {
    pub const fn new() -> Self {
        Self { socket: None }
    }

    /// Starts watching the socket of a freshly opened transport.
    pub fn prepare(&mut self, socket: SocketHandle) {
        self.socket = Some(socket);
    }

    pub fn clear(&mut self) {
        self.socket = None;
    }

    pub fn len(&self) -> usize {
        usize::from(self.socket.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.socket.is_none()
    }

    pub fn contains(&self, socket: SocketHandle) -> bool {
        self.socket == Some(socket)
    }

    /// Waits until the watched socket is readable or `timeout` elapses.
    ///
    /// Returns the number of readable sockets: `0` on timeout (or when nothing
    /// is watched), `1` when data can be read.
    pub async fn wait_readable<T: MqttTransport>(
        &self,
        transport: &mut T,
        timeout: Duration,
    ) -> Result<usize, MqttError<T::Error>> {
        if self.socket.is_none() {
            return Ok(0);
        }

        let readable = transport.readable();
        let deadline = Timer::after(timeout);
        match select(core::pin::pin!(readable), core::pin::pin!(deadline)).await {
            Either::Left((Ok(()), _)) => Ok(1),
            Either::Left((Err(e), _)) => {
                error!("poll: {:?}", e);
                Err(MqttError::Poll(e))
            }
            Either::Right(((), _)) => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{MockTransport, connack};
    use embassy_futures::block_on;
    use embassy_time::Instant;

    #[test]
    fn test_prepare_and_clear() {
        let mut poll = PollSet::new();
        assert!(poll.is_empty());

        poll.prepare(SocketHandle(3));
        assert_eq!(poll.len(), 1);
        assert!(poll.contains(SocketHandle(3)));
        assert!(!poll.contains(SocketHandle(4)));

        // Re-preparing replaces the watched socket, it never grows.
        poll.prepare(SocketHandle(4));
        assert_eq!(poll.len(), 1);
        assert!(poll.contains(SocketHandle(4)));

        poll.clear();
        assert_eq!(poll.len(), 0);
    }

    #[test]
    fn test_empty_set_returns_immediately() {
        let poll = PollSet::new();
        let mut transport = MockTransport::new();
        let start = Instant::now();
        let ready = block_on(poll.wait_readable(&mut transport, Duration::from_secs(5))).unwrap();
        assert_eq!(ready, 0);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_timeout_reports_zero() {
        let mut poll = PollSet::new();
        poll.prepare(SocketHandle(1));
        let mut transport = MockTransport::new();
        let ready = block_on(poll.wait_readable(&mut transport, Duration::from_millis(20))).unwrap();
        assert_eq!(ready, 0);
    }

    #[test]
    fn test_pending_data_reports_one() {
        let mut poll = PollSet::new();
        poll.prepare(SocketHandle(1));
        let mut transport = MockTransport::new();
        transport.push_inbound(&connack(0));
        let ready = block_on(poll.wait_readable(&mut transport, Duration::from_secs(5))).unwrap();
        assert_eq!(ready, 1);
    }

    #[test]
    fn test_poll_failure_is_reported() {
        let mut poll = PollSet::new();
        poll.prepare(SocketHandle(1));
        let mut transport = MockTransport::new();
        transport.fail_readable();
        let result = block_on(poll.wait_readable(&mut transport, Duration::from_secs(5)));
        assert!(matches!(result, Err(MqttError::Poll(_))));
    }
}
