//! # MQTT Publisher Session
//!
//! The session owns the transport, the receive and transmit buffers, the poll
//! set and the table of pending publishes, and drives the connection through
//! `Idle -> Connecting -> Connected -> Disconnected`.
//!
//! Everything happens on the task that owns the session. The only points where
//! it suspends are the bounded readability wait, the transport connect and the
//! backoff sleep between connect attempts.

use embassy_time::{Duration, Instant, Timer};
use rand_core::RngCore;

use crate::config::{APP_MAX_IN_FLIGHT, APP_MQTT_BUFFER_SIZE, ClientConfig};
use crate::error::{MqttError, ProtocolError};
use crate::events::{self, MqttEvent, Reaction, Transition};
use crate::inflight::InFlight;
use crate::packet::{
    self, Ack, AckKind, Connect, Disconnect, EncodePacket, PingReq, Publish, QoS,
};
use crate::poll::PollSet;
use crate::resolver::{Endpoints, resolve_endpoints};
use crate::security::{CredentialStore, Credentials, install_credentials};
use crate::transport::{ConnectTarget, MqttTransport};

/// Connection state of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SessionState {
    Idle,
    Connecting,
    Connected,
    Disconnected,
}

/// Outcome of a keep-alive tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum KeepAlive {
    /// The keep-alive interval has not elapsed yet.
    NotDue,
    /// A PINGREQ went out; the PINGRESP may already be waiting.
    PingSent,
}

/// One logical client-broker connection.
///
/// `BUF` is the size of each of the receive and transmit buffers, `INFLIGHT`
/// the number of acknowledged publishes that may be pending at once.
pub struct Session<
    'a,
    T,
    R,
    const BUF: usize = APP_MQTT_BUFFER_SIZE,
    const INFLIGHT: usize = APP_MAX_IN_FLIGHT,
> where
    T: MqttTransport,
    R: RngCore,
{
    transport: T,
    rng: R,
    config: ClientConfig<'a>,
    endpoints: Endpoints,
    state: SessionState,
    connected: bool,
    poll: PollSet,
    rx_buf: [u8; BUF],
    rx_len: usize,
    tx_buf: [u8; BUF],
    inflight: InFlight<INFLIGHT>,
    keep_alive: Option<Duration>,
    last_tx: Instant,
    security_ready: bool,
}

impl<'a, T, R, const BUF: usize, const INFLIGHT: usize> Session<'a, T, R, BUF, INFLIGHT>
where
    T: MqttTransport,
    R: RngCore,
{
    /// Creates an idle session, resolving the broker and proxy endpoints.
    ///
    /// A malformed address is a configuration defect and fails here, before
    /// any socket is touched.
    pub fn new(transport: T, rng: R, config: ClientConfig<'a>) -> Result<Self, MqttError<T::Error>> {
        let endpoints = resolve_endpoints(&config)?;
        info!("MQTT broker {}", endpoints.broker);
        let keep_alive = (config.keep_alive_secs > 0)
            .then(|| Duration::from_secs(u64::from(config.keep_alive_secs)));

        Ok(Self {
            transport,
            rng,
            config,
            endpoints,
            state: SessionState::Idle,
            connected: false,
            poll: PollSet::new(),
            rx_buf: [0; BUF],
            rx_len: 0,
            tx_buf: [0; BUF],
            inflight: InFlight::new(),
            keep_alive,
            last_tx: Instant::now(),
            security_ready: false,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The connection flag, set by CONNACK and cleared by any disconnect.
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn poll_set(&self) -> &PollSet {
        &self.poll
    }

    pub fn in_flight(&self) -> &InFlight<INFLIGHT> {
        &self.inflight
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub fn config(&self) -> &ClientConfig<'a> {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Registers TLS credentials ahead of the first secure connection.
    ///
    /// Runs at most once per session; the credential store keeps entries for
    /// the life of the process. A no-op for non-secure transports.
    pub fn negotiate_security<S: CredentialStore + ?Sized>(
        &mut self,
        store: &mut S,
        credentials: &Credentials<'_>,
    ) -> Result<usize, MqttError<T::Error>> {
        if !self.config.transport.is_secure() || self.security_ready {
            return Ok(0);
        }
        let installed = install_credentials(store, credentials)?;
        debug!("{} credential(s) installed", installed);
        self.security_ready = true;
        Ok(installed)
    }

    /// Resets the session for a fresh connect attempt.
    fn init(&mut self) {
        self.rx_len = 0;
        self.inflight.clear();
        self.poll.clear();
        self.connected = false;
        self.state = SessionState::Connecting;
    }

    /// Opens the transport and sends CONNECT.
    ///
    /// On success the session is `Connecting` with the socket in the poll set;
    /// the CONNACK is picked up by [`input`](Self::input).
    pub async fn connect(&mut self) -> Result<(), MqttError<T::Error>> {
        if self.config.transport.is_secure() && !self.security_ready {
            warn!("secure transport without negotiated credentials");
        }
        self.init();

        let target = ConnectTarget {
            broker: &self.endpoints.broker,
            proxy: self.endpoints.proxy.as_ref(),
            kind: &self.config.transport,
        };
        let socket = match self.transport.open(target).await {
            Ok(socket) => socket,
            Err(e) => {
                self.state = SessionState::Disconnected;
                return Err(MqttError::Transport(e));
            }
        };
        self.poll.prepare(socket);

        let mut connect = Connect::new(
            self.config.client_id,
            self.config.keep_alive_secs,
            self.config.clean_session,
        );
        if let Some(login) = self.config.login {
            connect = connect.with_login(login.username, login.password);
        }
        if let Err(e) = self.send_packet(&connect).await {
            self.abort();
            return Err(e);
        }
        Ok(())
    }

    /// Connects with the configured retry policy.
    ///
    /// Each attempt opens the transport, sends CONNECT and waits up to the
    /// per-attempt timeout for the CONNACK. A failed attempt aborts the
    /// half-open transport. Attempts that fail without using up the timeout
    /// are followed by the retry sleep.
    pub async fn try_to_connect(&mut self) -> Result<(), MqttError<T::Error>> {
        let tries = self.config.connect_tries;
        for attempt in 1..=tries {
            info!("mqtt_connect attempt {}/{}", attempt, tries);

            if let Err(e) = self.connect().await {
                error!("mqtt_connect: {:?}", e);
                if e.is_fatal() {
                    return Err(e);
                }
                Timer::after(self.config.retry_sleep).await;
                continue;
            }

            let timed_out = match self
                .poll
                .wait_readable(&mut self.transport, self.config.connect_timeout)
                .await
            {
                Ok(0) => true,
                Ok(_) => {
                    if let Err(e) = self.input().await {
                        error!("mqtt_input: {:?}", e);
                    }
                    false
                }
                Err(_) => false,
            };

            if self.connected {
                return Ok(());
            }

            warn!("mqtt_connect attempt {} failed", attempt);
            self.abort();
            if !timed_out {
                Timer::after(self.config.retry_sleep).await;
            }
        }

        error!("mqtt_connect: giving up after {} attempts", tries);
        Err(MqttError::ConnectExhausted { attempts: tries })
    }

    /// Reads whatever the transport has buffered and handles every complete
    /// packet in arrival order.
    ///
    /// A frame that does not fit the receive buffer, or fails to decode, leaves
    /// the byte stream out of sync; the connection is dropped.
    pub async fn input(&mut self) -> Result<(), MqttError<T::Error>> {
        let free = &mut self.rx_buf[self.rx_len..];
        if free.is_empty() {
            error!("mqtt_input: packet larger than {} byte buffer", BUF);
            self.abort();
            return Err(MqttError::BufferTooSmall);
        }

        match self.transport.recv(free).await {
            Ok(n) => self.rx_len += n,
            Err(e) => {
                error!("mqtt_input: {:?}", e);
                self.handle_event(MqttEvent::Disconnect).await?;
                return Err(MqttError::Transport(e));
            }
        }

        loop {
            let len = match packet::frame_len(&self.rx_buf[..self.rx_len]) {
                Ok(Some(len)) => len,
                Ok(None) => break,
                Err(e) => {
                    error!("mqtt_input: {:?}", e);
                    self.abort();
                    return Err(MqttError::cast_transport_error(e));
                }
            };
            let event = match packet::decode(&self.rx_buf[..len], self.config.protocol_version) {
                Ok(Some(packet)) => MqttEvent::from(&packet),
                Ok(None) => break,
                Err(e) => {
                    error!("mqtt_input: {:?}", e);
                    self.abort();
                    return Err(e);
                }
            };
            self.rx_buf.copy_within(len..self.rx_len, 0);
            self.rx_len -= len;

            self.handle_event(event).await?;
        }
        Ok(())
    }

    /// Applies the reaction `event` calls for in the current state.
    async fn handle_event(&mut self, event: MqttEvent) -> Result<(), MqttError<T::Error>> {
        trace!("event {:?} in {:?}", event, self.state);
        match events::dispatch(self.state, &event) {
            Reaction::Transition(Transition::Connected { session_present }) => {
                info!("MQTT client connected (session present: {})", session_present);
                self.state = SessionState::Connected;
                self.connected = true;
            }
            Reaction::Transition(Transition::Refused(code)) => {
                error!("mqtt_connect: CONNACK refused: {:?}", code);
                self.abort();
                return Err(MqttError::ConnectionRefused(code));
            }
            Reaction::Transition(Transition::Disconnected) => {
                info!("MQTT client disconnected");
                self.abort();
            }
            Reaction::Complete { id, qos } => {
                let done = match qos {
                    QoS::ExactlyOnce => self.inflight.pubcomp(id),
                    _ => self.inflight.puback(id),
                };
                match done {
                    Some(_) => debug!("publish {} acknowledged", id),
                    None => warn!("acknowledgement for unknown message id {}", id),
                }
            }
            Reaction::Release(id) => {
                if !self.inflight.pubrec(id) {
                    warn!("PUBREC for unknown message id {}", id);
                }
                if let Err(e) = self.send_packet(&Ack::new(AckKind::PubRel, id)).await {
                    error!("mqtt_publish_qos2_release: {:?}", e);
                }
            }
            Reaction::Ignore => {}
        }
        Ok(())
    }

    /// Sends PINGREQ once the keep-alive interval has passed without any
    /// transmission.
    pub async fn live(&mut self) -> Result<KeepAlive, MqttError<T::Error>> {
        if !self.connected {
            return Err(MqttError::NotConnected);
        }
        let Some(interval) = self.keep_alive else {
            return Ok(KeepAlive::NotDue);
        };
        if self.last_tx.elapsed() < interval {
            return Ok(KeepAlive::NotDue);
        }

        if let Err(e) = self.send_packet(&PingReq).await {
            error!("mqtt_live: {:?}", e);
            self.abort();
            return Err(e);
        }
        Ok(KeepAlive::PingSent)
    }

    /// Services the connection for up to `budget`.
    ///
    /// Returns early if the connection drops. Any read, parse, poll or
    /// keep-alive failure ends the window and is returned; reconnecting is up
    /// to the caller.
    pub async fn process_and_wait(&mut self, budget: Duration) -> Result<(), MqttError<T::Error>> {
        let start = Instant::now();
        let mut remaining = budget;

        while remaining > Duration::from_ticks(0) && self.connected {
            let ready = match self.poll.wait_readable(&mut self.transport, remaining).await {
                Ok(ready) => ready,
                Err(e) => {
                    self.abort();
                    return Err(e);
                }
            };
            if ready > 0 {
                self.input().await?;
            }

            if !self.connected {
                break;
            }
            // A PINGRESP may already be queued; drain once without waiting.
            if self.live().await? == KeepAlive::PingSent {
                self.input().await?;
            }

            remaining = budget
                .checked_sub(start.elapsed())
                .unwrap_or(Duration::from_ticks(0));
        }
        Ok(())
    }

    /// Publishes `payload` to `topic`. QoS 1 and 2 publishes get a fresh
    /// random message id.
    ///
    /// Returns the id (`None` for QoS 0) once the transport accepted the
    /// write; broker acknowledgements arrive later through
    /// [`input`](Self::input).
    pub async fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
    ) -> Result<Option<u16>, MqttError<T::Error>> {
        if !self.connected {
            return Err(MqttError::WriteNotConnected);
        }
        if topic.is_empty() {
            return Err(MqttError::Protocol(ProtocolError::EmptyTopic));
        }
        let packet_id = match qos {
            QoS::AtMostOnce => None,
            _ if self.inflight.is_full() => return Err(MqttError::InFlightFull),
            _ => Some(
                self.inflight
                    .allocate_id(&mut self.rng)
                    .ok_or(MqttError::InFlightFull)?,
            ),
        };

        let publish = Publish {
            topic,
            qos,
            payload,
            packet_id,
            dup: false,
            retain: false,
        };
        if let Err(e) = self.send_packet(&publish).await {
            error!("mqtt_publish({}): {:?}", topic, e);
            if matches!(e, MqttError::TransportWrite(_)) {
                self.abort();
            }
            return Err(e);
        }

        if let Some(id) = packet_id {
            self.inflight
                .track(id, qos)
                .map_err(|_| MqttError::InFlightFull)?;
        }
        debug!("published {} bytes to {} (id {:?})", payload.len(), topic, packet_id);
        Ok(packet_id)
    }

    /// Sends DISCONNECT if connected and closes the transport.
    pub async fn disconnect(&mut self) -> Result<(), MqttError<T::Error>> {
        let result = if self.connected {
            self.send_packet(&Disconnect).await
        } else {
            Ok(())
        };
        self.transport.close().await;
        self.poll.clear();
        self.connected = false;
        if self.state != SessionState::Idle {
            self.state = SessionState::Disconnected;
        }
        result
    }

    /// Drops the connection without a handshake.
    fn abort(&mut self) {
        self.rx_len = 0;
        self.transport.abort();
        self.poll.clear();
        self.connected = false;
        self.state = SessionState::Disconnected;
    }

    async fn send_packet<P: EncodePacket>(&mut self, packet: &P) -> Result<(), MqttError<T::Error>> {
        let len = packet::encode_into(packet, &mut self.tx_buf, self.config.protocol_version)?;
        self.transport
            .send(&self.tx_buf[..len])
            .await
            .map_err(MqttError::TransportWrite)?;
        self.last_tx = Instant::now();
        Ok(())
    }
}
