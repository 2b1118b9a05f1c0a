//! The runtime loop: keeps the session connected and drives a module's cadence.

use core::convert::Infallible;

use embassy_time::Instant;
use rand_core::RngCore;

use super::publisher::{BufferedOutbox, PublishRequestReceiver};
use super::traits::{ModuleError, MqttModule};
use crate::config::{APP_MAX_IN_FLIGHT, APP_MQTT_BUFFER_SIZE};
use crate::error::MqttError;
use crate::packet::QoS;
use crate::session::Session;
use crate::transport::MqttTransport;

/// Publishes a module may queue per callback.
pub const OUTBOX_CAPACITY: usize = 4;
pub const OUTBOX_TOPIC_SIZE: usize = 64;
pub const OUTBOX_PAYLOAD_SIZE: usize = 64;

type Outbox = BufferedOutbox<OUTBOX_CAPACITY, OUTBOX_TOPIC_SIZE, OUTBOX_PAYLOAD_SIZE>;

/// Why the runtime stopped.
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RuntimeError<E> {
    /// A fatal session error: credentials, configuration or exhausted retries.
    Mqtt(MqttError<E>),
    /// The module gave up (e.g. the sensor failed).
    Module(ModuleError),
}

impl<E> From<MqttError<E>> for RuntimeError<E> {
    fn from(err: MqttError<E>) -> Self {
        RuntimeError::Mqtt(err)
    }
}

impl<E> From<ModuleError> for RuntimeError<E> {
    fn from(err: ModuleError) -> Self {
        RuntimeError::Module(err)
    }
}

/// Owns the session and one module, and runs them until something fatal happens.
///
/// Each pass connects if needed (with the session's retry policy), ticks the
/// module when its interval is due, publishes whatever the module and the
/// request channel queued, then services the connection until the next tick.
pub struct MqttRuntime<
    'a,
    'c,
    T,
    R,
    M,
    const BUF: usize = APP_MQTT_BUFFER_SIZE,
    const INFLIGHT: usize = APP_MAX_IN_FLIGHT,
    const DEPTH: usize = 4,
> where
    T: MqttTransport,
    R: RngCore,
    M: MqttModule,
{
    session: Session<'a, T, R, BUF, INFLIGHT>,
    module: M,
    requests: Option<PublishRequestReceiver<'c, DEPTH>>,
    outbox: Outbox,
    next_tick: Instant,
}

impl<'a, 'c, T, R, M, const BUF: usize, const INFLIGHT: usize, const DEPTH: usize>
    MqttRuntime<'a, 'c, T, R, M, BUF, INFLIGHT, DEPTH>
where
    T: MqttTransport,
    R: RngCore,
    M: MqttModule,
{
    pub fn new(session: Session<'a, T, R, BUF, INFLIGHT>, module: M) -> Self {
        Self {
            session,
            module,
            requests: None,
            outbox: Outbox::new(),
            next_tick: Instant::now(),
        }
    }

    /// Also publishes requests arriving from [`PublisherHandle`](super::PublisherHandle)s.
    pub fn with_requests(mut self, requests: PublishRequestReceiver<'c, DEPTH>) -> Self {
        self.requests = Some(requests);
        self
    }

    pub fn session(&self) -> &Session<'a, T, R, BUF, INFLIGHT> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session<'a, T, R, BUF, INFLIGHT> {
        &mut self.session
    }

    pub fn module(&self) -> &M {
        &self.module
    }

    /// Runs until a fatal error, then disconnects cleanly and returns the error.
    pub async fn run(&mut self) -> RuntimeError<T::Error> {
        let err = match self.serve().await {
            Ok(never) => match never {},
            Err(err) => err,
        };
        error!("runtime stopped: {:?}", err);

        if let Err(e) = self.session.disconnect().await {
            warn!("mqtt_disconnect: {:?}", e);
        }
        err
    }

    async fn serve(&mut self) -> Result<Infallible, RuntimeError<T::Error>> {
        loop {
            if !self.session.is_connected() {
                self.session.try_to_connect().await?;
                self.module.on_start(&mut self.outbox);
                self.next_tick = Instant::now();
            }

            if Instant::now() >= self.next_tick {
                let interval = self.module.on_tick(&mut self.outbox)?;
                self.next_tick = Instant::now() + interval;
            }

            self.flush().await?;

            let budget = self.next_tick.saturating_duration_since(Instant::now());
            if let Err(e) = self.session.process_and_wait(budget).await {
                if e.is_fatal() {
                    return Err(e.into());
                }
                warn!("mqtt_input: {:?}", e);
            }
        }
    }

    /// Publishes queued requests while the session stays connected. Whatever is
    /// left in the outbox goes out after the next reconnect.
    async fn flush(&mut self) -> Result<(), MqttError<T::Error>> {
        while self.session.is_connected() {
            let Some(req) = self.outbox.pop_front() else {
                break;
            };
            Self::publish(&mut self.session, &req.topic, &req.payload, req.qos).await?;
        }

        if let Some(requests) = &self.requests {
            while self.session.is_connected() {
                let Ok(req) = requests.try_receive() else {
                    break;
                };
                Self::publish(&mut self.session, req.topic, req.payload, req.qos).await?;
            }
        }
        Ok(())
    }

    /// Publish failures only matter to the runtime when they are fatal; a
    /// dropped connection is picked up by the next pass.
    async fn publish(
        session: &mut Session<'a, T, R, BUF, INFLIGHT>,
        topic: &str,
        payload: &[u8],
        qos: QoS,
    ) -> Result<(), MqttError<T::Error>> {
        match session.publish(topic, payload, qos).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!("mqtt_publish({}): {:?}", topic, e);
                Ok(())
            }
        }
    }
}
