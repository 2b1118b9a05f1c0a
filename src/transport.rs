//! # MQTT Transport Abstraction
//!
//! This module defines the `MqttTransport` trait, which abstracts the socket the
//! session talks through (plain TCP, TLS, websockets, with or without a SOCKS5
//! proxy in front), and the `TransportKind` selected when a session is built.
//!
//! With the Rust 2024 Edition, this trait uses native `async fn`, removing the
//! need for the `#[async_trait]` macro.

use embassy_net::tcp::{ConnectError, Error as TcpError, State, TcpSocket};
use embassy_net::{IpAddress, IpEndpoint};
use embassy_time::{Duration, Timer};
use embedded_io_async::Write;

use crate::resolver::BrokerEndpoint;
use crate::security::TlsConfig;
use crate::socks::{self, Socks5Error};

/// The error type used by the packet codec, which never touches a transport.
///
/// It is uninhabited, so a codec error can always be widened into an error
/// carrying a real transport error type.
#[derive(Debug, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ErrorPlaceHolder {}

/// Transport-related errors.
pub trait TransportError: core::fmt::Debug {
    /// Whether the transport can never succeed with the current configuration.
    /// Such errors are not retried.
    fn is_fatal(&self) -> bool {
        false
    }
}

impl TransportError for ErrorPlaceHolder {}

/// Identifies the socket a transport currently has open.
///
/// This is what the poll set watches; transports hand out a fresh handle on
/// every successful `open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SocketHandle(pub u16);

/// Websocket framing parameters for the websocket transport kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WebSocketConfig<'a> {
    /// Value of the HTTP `Host` header.
    pub host: &'a str,
    /// Request path of the upgrade request.
    pub url: &'a str,
    /// How long the upgrade handshake may take.
    pub timeout: Duration,
}

/// The kind of transport a session runs over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind<'a> {
    Plain,
    WebSocket(WebSocketConfig<'a>),
    Secure(TlsConfig<'a>),
    SecureWebSocket(TlsConfig<'a>, WebSocketConfig<'a>),
}

impl<'a> TransportKind<'a> {
    /// Returns `true` if credentials must be installed before the transport is opened.
    pub fn is_secure(&self) -> bool {
        matches!(self, Self::Secure(_) | Self::SecureWebSocket(..))
    }

    pub fn tls(&self) -> Option<&TlsConfig<'a>> {
        match self {
            Self::Secure(tls) | Self::SecureWebSocket(tls, _) => Some(tls),
            _ => None,
        }
    }

    pub fn websocket(&self) -> Option<&WebSocketConfig<'a>> {
        match self {
            Self::WebSocket(ws) | Self::SecureWebSocket(_, ws) => Some(ws),
            _ => None,
        }
    }

    /// The broker port conventionally used by this transport kind.
    pub const fn default_port(&self) -> u16 {
        match self {
            Self::Plain => 1883,
            Self::Secure(_) => 8883,
            Self::WebSocket(_) | Self::SecureWebSocket(..) => 9001,
        }
    }
}

/// Everything a transport needs to open a connection to the broker.
#[derive(Debug, Clone, Copy)]
pub struct ConnectTarget<'t, 'a> {
    pub broker: &'t BrokerEndpoint,
    pub proxy: Option<&'t BrokerEndpoint>,
    pub kind: &'t TransportKind<'a>,
}

/// A trait representing a transport for MQTT packets.
#[allow(async_fn_in_trait)]
pub trait MqttTransport {
    /// The error type returned by the transport.
    type Error: TransportError;

    /// Opens a fresh connection to the broker, replacing any previous one.
    async fn open(&mut self, target: ConnectTarget<'_, '_>) -> Result<SocketHandle, Self::Error>;

    /// Sends a buffer of data over the transport.
    async fn send(&mut self, buf: &[u8]) -> Result<(), Self::Error>;

    /// Reads whatever is already buffered, without waiting for more.
    ///
    /// Returns `Ok(0)` when nothing is pending. A connection closed by the peer
    /// is reported as an error.
    async fn recv(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;

    /// Completes once `recv` has data to return (or the peer closed).
    async fn readable(&mut self) -> Result<(), Self::Error>;

    /// Drops the connection immediately, without a graceful close.
    fn abort(&mut self);

    /// Closes the connection gracefully.
    async fn close(&mut self);
}

/// Errors reported by [`TcpTransport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TcpTransportError {
    /// The socket reported an error.
    Tcp(TcpError),
    /// The TCP handshake failed.
    Connect(ConnectError),
    /// The TCP handshake did not finish in time.
    ConnectTimeout,
    /// The peer closed the connection.
    ConnectionClosed,
    /// The SOCKS5 proxy refused or garbled the tunnel request.
    Socks(Socks5Error<TcpError>),
    /// TLS and websocket kinds need a platform socket that implements them.
    Unsupported,
    /// IPv6 endpoints require the `proto-ipv6` stack feature.
    AddressFamily,
}

impl TransportError for TcpTransportError {
    fn is_fatal(&self) -> bool {
        matches!(self, Self::Unsupported | Self::AddressFamily)
    }
}

/// TCP transport implementation using `embassy-net`.
pub struct TcpTransport<'a> {
    socket: TcpSocket<'a>,
    timeout: Duration,
    opened: u16,
}

impl<'a> TcpTransport<'a> {
    /// Creates a new `TcpTransport` with the given socket and connect timeout.
    pub fn new(socket: TcpSocket<'a>, timeout: Duration) -> Self {
        Self {
            socket,
            timeout,
            opened: 0,
        }
    }

    fn endpoint(endpoint: &BrokerEndpoint) -> Result<IpEndpoint, TcpTransportError> {
        match endpoint.ip() {
            core::net::IpAddr::V4(v4) => Ok(IpEndpoint::new(IpAddress::Ipv4(v4), endpoint.port())),
            core::net::IpAddr::V6(_) => Err(TcpTransportError::AddressFamily),
        }
    }

    /// A helper function to perform a TCP connect with a timeout.
    async fn connect_with_timeout(&mut self, remote: IpEndpoint) -> Result<(), TcpTransportError> {
        // Use `select` to race the handshake against a timer.
        let connect_fut = self.socket.connect(remote);
        let timer = Timer::after(self.timeout);

        match futures::future::select(core::pin::pin!(connect_fut), core::pin::pin!(timer)).await {
            futures::future::Either::Left((Ok(()), _)) => Ok(()),
            futures::future::Either::Left((Err(e), _)) => {
                debug!("TCP connect error: {:?}", e);
                Err(TcpTransportError::Connect(e))
            }
            futures::future::Either::Right(((), _)) => {
                debug!("TCP connect timeout");
                Err(TcpTransportError::ConnectTimeout)
            }
        }
    }
}

impl<'a> MqttTransport for TcpTransport<'a> {
    type Error = TcpTransportError;

    async fn open(&mut self, target: ConnectTarget<'_, '_>) -> Result<SocketHandle, Self::Error> {
        if !matches!(target.kind, TransportKind::Plain) {
            return Err(TcpTransportError::Unsupported);
        }
        if self.socket.state() != State::Closed {
            self.socket.abort();
        }

        match target.proxy {
            Some(proxy) => {
                self.connect_with_timeout(Self::endpoint(proxy)?).await?;
                socks::connect(&mut self.socket, target.broker)
                    .await
                    .map_err(TcpTransportError::Socks)?;
            }
            None => {
                self.connect_with_timeout(Self::endpoint(target.broker)?)
                    .await?;
            }
        }

        self.opened = self.opened.wrapping_add(1);
        Ok(SocketHandle(self.opened))
    }

    async fn send(&mut self, buf: &[u8]) -> Result<(), Self::Error> {
        trace!("TCP TX ({} bytes): {:02X?}", buf.len(), buf);

        self.socket.write_all(buf).await.map_err(|e| {
            debug!("TCP write error: {:?}", e);
            TcpTransportError::Tcp(e)
        })?;

        // Flush to ensure data is actually sent to the network
        self.socket.flush().await.map_err(TcpTransportError::Tcp)
    }

    async fn recv(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if !self.socket.can_recv() {
            return if self.socket.may_recv() {
                Ok(0)
            } else {
                Err(TcpTransportError::ConnectionClosed)
            };
        }

        match self.socket.read(buf).await {
            // If the peer closes the connection, read returns 0.
            Ok(0) => Err(TcpTransportError::ConnectionClosed),
            Ok(n) => {
                trace!("TCP read: {} bytes", n);
                Ok(n)
            }
            Err(e) => Err(TcpTransportError::Tcp(e)),
        }
    }

    async fn readable(&mut self) -> Result<(), Self::Error> {
        self.socket.wait_read_ready().await;
        Ok(())
    }

    fn abort(&mut self) {
        self.socket.abort();
    }

    async fn close(&mut self) {
        self.socket.close();
        let _ = self.socket.flush().await;
    }
}
