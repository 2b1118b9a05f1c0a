//! Protocol events and the pure dispatch that turns them into session reactions.
//!
//! Inbound packets are reduced to an owned [`MqttEvent`] before anything is
//! decided, so the receive buffer is free again by the time the session acts
//! on a [`Reaction`] (which may mean sending a reply).

use crate::error::ConnectReasonCode;
use crate::packet::{MqttPacket, QoS};
use crate::session::SessionState;

/// An event observed on the session's connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MqttEvent {
    ConnAck {
        session_present: bool,
        code: ConnectReasonCode,
    },
    /// The broker sent DISCONNECT, or the socket failed.
    Disconnect,
    PubAck {
        id: u16,
    },
    PubRec {
        id: u16,
    },
    PubComp {
        id: u16,
    },
    PingResp,
    /// An inbound publish; a publisher holds no subscriptions, so these are dropped.
    Publish {
        qos: QoS,
        packet_id: Option<u16>,
    },
    /// A packet type this session has no handling for.
    Unknown(u8),
}

impl From<&MqttPacket<'_>> for MqttEvent {
    fn from(packet: &MqttPacket<'_>) -> Self {
        match packet {
            MqttPacket::ConnAck(ack) => MqttEvent::ConnAck {
                session_present: ack.session_present,
                code: ConnectReasonCode::from(ack.return_code),
            },
            MqttPacket::Publish(publish) => MqttEvent::Publish {
                qos: publish.qos,
                packet_id: publish.packet_id,
            },
            MqttPacket::PubAck(ack) => MqttEvent::PubAck { id: ack.packet_id },
            MqttPacket::PubRec(ack) => MqttEvent::PubRec { id: ack.packet_id },
            MqttPacket::PubComp(ack) => MqttEvent::PubComp { id: ack.packet_id },
            MqttPacket::PubRel(_) => MqttEvent::Unknown(crate::packet::PUBREL),
            MqttPacket::PingResp => MqttEvent::PingResp,
            MqttPacket::Disconnect => MqttEvent::Disconnect,
            MqttPacket::Other(kind) => MqttEvent::Unknown(*kind),
        }
    }
}

/// A change of connection state requested by an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Transition {
    Connected { session_present: bool },
    Refused(ConnectReasonCode),
    Disconnected,
}

/// What the session must do in response to an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Reaction {
    Transition(Transition),
    /// The final acknowledgement for `id` arrived (PUBACK for at-least-once,
    /// PUBCOMP for exactly-once).
    Complete { id: u16, qos: QoS },
    /// PUBREC for `id` arrived; reply with PUBREL.
    Release(u16),
    Ignore,
}

/// Decides how a session in `state` reacts to `event`.
pub fn dispatch(state: SessionState, event: &MqttEvent) -> Reaction {
    match *event {
        MqttEvent::ConnAck {
            session_present,
            code,
        } => {
            if state != SessionState::Connecting {
                warn!("CONNACK while {:?}, ignored", state);
                return Reaction::Ignore;
            }
            if code.is_success() {
                Reaction::Transition(Transition::Connected { session_present })
            } else {
                Reaction::Transition(Transition::Refused(code))
            }
        }
        MqttEvent::Disconnect => match state {
            SessionState::Connecting | SessionState::Connected => {
                Reaction::Transition(Transition::Disconnected)
            }
            SessionState::Idle | SessionState::Disconnected => Reaction::Ignore,
        },
        MqttEvent::PubAck { id } => Reaction::Complete {
            id,
            qos: QoS::AtLeastOnce,
        },
        MqttEvent::PubRec { id } => Reaction::Release(id),
        MqttEvent::PubComp { id } => Reaction::Complete {
            id,
            qos: QoS::ExactlyOnce,
        },
        MqttEvent::PingResp => {
            debug!("PINGRESP");
            Reaction::Ignore
        }
        MqttEvent::Publish { qos, packet_id } => {
            debug!("unexpected PUBLISH (qos {:?}, id {:?}), dropped", qos, packet_id);
            Reaction::Ignore
        }
        MqttEvent::Unknown(kind) => {
            debug!("unhandled packet type {}", kind);
            Reaction::Ignore
        }
    }
}
