//! MQTT Runtime Module
//!
//! Drives a [`Session`](crate::session::Session) for the lifetime of the
//! firmware: connecting with the retry policy, ticking application modules on
//! their cadence, publishing what they queue and reconnecting when the link
//! drops.
//!
//! # Publishing Pattern
//!
//! Modules never perform async I/O directly. Instead, they use the `PublishOutbox`
//! trait to queue publish requests. The runtime then performs the actual async
//! publishing after the module method returns. Other tasks publish through a
//! `PublisherHandle` backed by an `embassy-sync` channel.
//!
//! # Example
//!
//! ```ignore
//! let session = Session::new(transport, rng, ClientConfig::DEFAULT)?;
//! let module = TelemetryModule::new(dht22, lcd);
//! let mut runtime = MqttRuntime::new(session, module);
//! let err = runtime.run().await;
//! ```

pub(crate) mod event_loop;
pub(crate) mod publisher;
pub(crate) mod telemetry;
pub(crate) mod traits;

pub use event_loop::{
    MqttRuntime, OUTBOX_CAPACITY, OUTBOX_PAYLOAD_SIZE, OUTBOX_TOPIC_SIZE, RuntimeError,
};
pub use publisher::{
    BufferedOutbox, OwnedPublishRequest, PublishRequest, PublishRequestChannel,
    PublishRequestReceiver, PublishRequestSender, PublisherHandle,
};
pub use telemetry::{LineDisplay, Reading, SensorError, SensorReader, TelemetryModule};
pub use traits::{ModuleError, MqttModule, NoopModule, PublishOutbox};
