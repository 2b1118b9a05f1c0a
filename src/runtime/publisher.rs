//! Publish request handling and outbox implementations.
//!
//! Other tasks hand readings to the session through a `PublisherHandle`
//! (an `embassy-sync` channel); modules queue theirs in a `BufferedOutbox`.
//! Either way the runtime performs the actual publish on the session's task.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, Receiver, Sender};
use heapless::{String, Vec};

use super::traits::PublishOutbox;
use crate::packet::QoS;

/// A publish borrowed from another task, queued on the runtime's channel.
///
/// Topic and payload are borrowed; firmware usually queues `'static` data.
#[derive(Debug, Clone)]
pub struct PublishRequest<'a> {
    pub topic: &'a str,
    pub payload: &'a [u8],
    pub qos: QoS,
}

pub type PublishRequestChannel<'a, const DEPTH: usize> =
    Channel<CriticalSectionRawMutex, PublishRequest<'a>, DEPTH>;

pub type PublishRequestSender<'a, const DEPTH: usize> =
    Sender<'a, CriticalSectionRawMutex, PublishRequest<'a>, DEPTH>;

pub type PublishRequestReceiver<'a, const DEPTH: usize> =
    Receiver<'a, CriticalSectionRawMutex, PublishRequest<'a>, DEPTH>;

/// Copyable sending side of the runtime's request channel.
#[derive(Clone, Copy)]
pub struct PublisherHandle<'a, const DEPTH: usize> {
    tx: PublishRequestSender<'a, DEPTH>,
}

impl<'a, const DEPTH: usize> PublisherHandle<'a, DEPTH> {
    pub fn new(tx: PublishRequestSender<'a, DEPTH>) -> Self {
        Self { tx }
    }

    /// Waits for room in the channel.
    pub async fn publish(&self, topic: &'a str, payload: &'a [u8], qos: QoS) {
        self.tx.send(PublishRequest { topic, payload, qos }).await;
    }

    /// Returns `false` instead of waiting when the channel is full.
    pub fn try_publish(&self, topic: &'a str, payload: &'a [u8], qos: QoS) -> bool {
        self.tx
            .try_send(PublishRequest { topic, payload, qos })
            .is_ok()
    }
}

/// A publish copied into the outbox, so it survives the module callback.
#[derive(Debug, Clone)]
pub struct OwnedPublishRequest<const TOPIC: usize, const PAYLOAD: usize> {
    pub topic: String<TOPIC>,
    pub payload: Vec<u8, PAYLOAD>,
    pub qos: QoS,
}

impl<const TOPIC: usize, const PAYLOAD: usize> OwnedPublishRequest<TOPIC, PAYLOAD> {
    fn copy(topic: &str, payload: &[u8], qos: QoS) -> Option<Self> {
        let Ok(topic) = String::try_from(topic) else {
            warn!("outbox: topic {} too long", topic);
            return None;
        };
        let Ok(payload) = Vec::from_slice(payload) else {
            warn!("outbox: {} byte payload too large", payload.len());
            return None;
        };
        Some(Self {
            topic,
            payload,
            qos,
        })
    }
}

/// FIFO of at most `CAP` publishes queued by a module between two flushes.
pub struct BufferedOutbox<const CAP: usize, const TOPIC: usize, const PAYLOAD: usize> {
    queue: Vec<OwnedPublishRequest<TOPIC, PAYLOAD>, CAP>,
}

impl<const CAP: usize, const TOPIC: usize, const PAYLOAD: usize>
    BufferedOutbox<CAP, TOPIC, PAYLOAD>
{
    pub const fn new() -> Self {
        Self { queue: Vec::new() }
    }

    /// Removes and returns the oldest queued request.
    pub fn pop_front(&mut self) -> Option<OwnedPublishRequest<TOPIC, PAYLOAD>> {
        if self.queue.is_empty() {
            return None;
        }
        Some(self.queue.remove(0))
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }
}

impl<const CAP: usize, const TOPIC: usize, const PAYLOAD: usize> Default
    for BufferedOutbox<CAP, TOPIC, PAYLOAD>
{
    fn default() -> Self {
        Self::new()
    }
}

impl<const CAP: usize, const TOPIC: usize, const PAYLOAD: usize> PublishOutbox
    for BufferedOutbox<CAP, TOPIC, PAYLOAD>
{
    fn publish(&mut self, topic: &str, payload: &[u8], qos: QoS) -> bool {
        let Some(req) = OwnedPublishRequest::copy(topic, payload, qos) else {
            return false;
        };
        if self.queue.push(req).is_err() {
            warn!("outbox full, dropping publish to {}", topic);
            return false;
        }
        true
    }
}
