//! # MQTT Packet Structures and Serialization
//!
//! This module defines the MQTT 3.1 / 3.1.1 control packets a publisher needs and
//! the traits for encoding and decoding them to and from a byte buffer.

use crate::error::{MqttError, ProtocolError};
use crate::util::{self, CodecResult, read_u16, read_utf8_string, write_binary, write_utf8_string};

/// Represents the Quality of Service (QoS) levels for MQTT messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum QoS {
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

impl QoS {
    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(Self::AtMostOnce),
            1 => Some(Self::AtLeastOnce),
            2 => Some(Self::ExactlyOnce),
            _ => None,
        }
    }
}

/// The protocol revision announced in CONNECT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProtocolVersion {
    /// MQTT 3.1, protocol name `MQIsdp`, level 3.
    V3_1,
    /// MQTT 3.1.1, protocol name `MQTT`, level 4.
    V3_1_1,
}

impl ProtocolVersion {
    pub fn protocol_name(&self) -> &'static str {
        match self {
            Self::V3_1 => "MQIsdp",
            Self::V3_1_1 => "MQTT",
        }
    }

    pub fn level(&self) -> u8 {
        match self {
            Self::V3_1 => 3,
            Self::V3_1_1 => 4,
        }
    }
}

pub(crate) const CONNECT: u8 = 1;
pub(crate) const CONNACK: u8 = 2;
pub(crate) const PUBLISH: u8 = 3;
pub(crate) const PUBACK: u8 = 4;
pub(crate) const PUBREC: u8 = 5;
pub(crate) const PUBREL: u8 = 6;
pub(crate) const PUBCOMP: u8 = 7;
pub(crate) const PINGREQ: u8 = 12;
pub(crate) const PINGRESP: u8 = 13;
pub(crate) const DISCONNECT: u8 = 14;

/// A trait for packets that can be encoded into a byte buffer.
pub trait EncodePacket {
    fn encode(&self, buf: &mut [u8], version: ProtocolVersion) -> CodecResult<usize>;
}

/// A trait for packets that can be decoded from a byte buffer.
pub trait DecodePacket<'a>: Sized {
    fn decode(buf: &'a [u8], version: ProtocolVersion) -> CodecResult<Self>;
}

/// An enumeration of the MQTT control packets a broker may send to a publisher.
#[derive(Debug)]
pub enum MqttPacket<'a> {
    ConnAck(ConnAck),
    Publish(Publish<'a>),
    PubAck(Ack),
    PubRec(Ack),
    PubRel(Ack),
    PubComp(Ack),
    PingResp,
    Disconnect,
    /// A well-formed packet of a type a publisher has no use for.
    Other(u8),
}

/// Returns the total length of the first complete packet in `buf`, or `None`
/// if more bytes are needed.
pub fn frame_len(buf: &[u8]) -> CodecResult<Option<usize>> {
    if buf.is_empty() {
        return Ok(None);
    }
    let mut cursor = 1;
    let Some(remaining_len) = util::try_read_variable_byte_integer(&mut cursor, buf)? else {
        return Ok(None);
    };
    let total = cursor + remaining_len;
    Ok((buf.len() >= total).then_some(total))
}

/// Decodes one complete packet (as delimited by [`frame_len`]) into an `MqttPacket`.
pub fn decode<'a, T>(
    buf: &'a [u8],
    version: ProtocolVersion,
) -> Result<Option<MqttPacket<'a>>, MqttError<T>> {
    if buf.is_empty() {
        return Ok(None);
    }

    let packet_type = buf[0] >> 4;
    let packet = match packet_type {
        CONNACK => MqttPacket::ConnAck(
            ConnAck::decode(buf, version).map_err(MqttError::cast_transport_error)?,
        ),
        PUBLISH => MqttPacket::Publish(
            Publish::decode(buf, version).map_err(MqttError::cast_transport_error)?,
        ),
        PUBACK => MqttPacket::PubAck(
            Ack::decode_kind(buf, AckKind::PubAck).map_err(MqttError::cast_transport_error)?,
        ),
        PUBREC => MqttPacket::PubRec(
            Ack::decode_kind(buf, AckKind::PubRec).map_err(MqttError::cast_transport_error)?,
        ),
        PUBREL => MqttPacket::PubRel(
            Ack::decode_kind(buf, AckKind::PubRel).map_err(MqttError::cast_transport_error)?,
        ),
        PUBCOMP => MqttPacket::PubComp(
            Ack::decode_kind(buf, AckKind::PubComp).map_err(MqttError::cast_transport_error)?,
        ),
        PINGRESP => MqttPacket::PingResp,
        DISCONNECT => MqttPacket::Disconnect,
        0 | 15 => {
            return Err(MqttError::Protocol(ProtocolError::InvalidPacketType(
                packet_type,
            )));
        }
        other => MqttPacket::Other(other),
    };

    Ok(Some(packet))
}

fn rest(buf: &mut [u8], cursor: usize) -> CodecResult<&mut [u8]> {
    buf.get_mut(cursor..).ok_or(MqttError::BufferTooSmall)
}

/// Copies `bytes` into `buf` at `cursor`, advancing it.
fn put(buf: &mut [u8], cursor: &mut usize, bytes: &[u8]) -> CodecResult<()> {
    buf.get_mut(*cursor..*cursor + bytes.len())
        .ok_or(MqttError::BufferTooSmall)?
        .copy_from_slice(bytes);
    *cursor += bytes.len();
    Ok(())
}

/// Writes the fixed header in front of content staged at `CONTENT_START` and
/// compacts the packet. Returns the total packet length.
fn finish(buf: &mut [u8], header: u8, content_end: usize) -> CodecResult<usize> {
    let remaining_len = content_end - CONTENT_START;
    buf[0] = header;
    let len_bytes = util::write_variable_byte_integer_len(&mut buf[1..CONTENT_START], remaining_len)?;
    let header_len = 1 + len_bytes;
    buf.copy_within(CONTENT_START..content_end, header_len);
    Ok(header_len + remaining_len)
}

/// Content is staged after room for the type byte and a four-byte length.
const CONTENT_START: usize = 5;

fn staging(buf: &[u8]) -> CodecResult<usize> {
    if buf.len() < CONTENT_START {
        return Err(MqttError::BufferTooSmall);
    }
    Ok(CONTENT_START)
}

// --- CONNECT Packet ---
#[derive(Debug)]
pub struct Connect<'a> {
    pub clean_session: bool,
    pub keep_alive: u16,
    pub client_id: &'a str,
    pub username: Option<&'a str>,
    pub password: Option<&'a [u8]>,
}

impl<'a> Connect<'a> {
    pub fn new(client_id: &'a str, keep_alive: u16, clean_session: bool) -> Self {
        Self {
            client_id,
            keep_alive,
            clean_session,
            username: None,
            password: None,
        }
    }

    pub fn with_login(mut self, username: &'a str, password: Option<&'a [u8]>) -> Self {
        self.username = Some(username);
        self.password = password;
        self
    }
}

impl<'a> EncodePacket for Connect<'a> {
    fn encode(&self, buf: &mut [u8], version: ProtocolVersion) -> CodecResult<usize> {
        let mut cursor = staging(buf)?;
        cursor += write_utf8_string(rest(buf, cursor)?, version.protocol_name())?;

        let mut flags = 0;
        if self.clean_session {
            flags |= 0x02;
        }
        if self.username.is_some() {
            flags |= 0x80;
            // A password without a username is not allowed by the protocol.
            if self.password.is_some() {
                flags |= 0x40;
            }
        }
        put(buf, &mut cursor, &[version.level(), flags])?;
        put(buf, &mut cursor, &self.keep_alive.to_be_bytes())?;

        cursor += write_utf8_string(rest(buf, cursor)?, self.client_id)?;
        if let Some(username) = self.username {
            cursor += write_utf8_string(rest(buf, cursor)?, username)?;
            if let Some(password) = self.password {
                cursor += write_binary(rest(buf, cursor)?, password)?;
            }
        }

        finish(buf, CONNECT << 4, cursor)
    }
}

// --- CONNACK Packet ---
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnAck {
    pub session_present: bool,
    pub return_code: u8,
}

impl<'a> DecodePacket<'a> for ConnAck {
    fn decode(buf: &'a [u8], _version: ProtocolVersion) -> CodecResult<Self> {
        match buf {
            [_, 2, flags, code] => Ok(Self {
                session_present: (flags & 0x01) != 0,
                return_code: *code,
            }),
            _ => Err(MqttError::Protocol(ProtocolError::MalformedPacket)),
        }
    }
}

// --- PUBLISH Packet ---
#[derive(Debug)]
pub struct Publish<'a> {
    pub topic: &'a str,
    pub qos: QoS,
    pub payload: &'a [u8],
    pub packet_id: Option<u16>,
    pub dup: bool,
    pub retain: bool,
}

impl<'a> DecodePacket<'a> for Publish<'a> {
    fn decode(buf: &'a [u8], _version: ProtocolVersion) -> CodecResult<Self> {
        let flags = buf
            .first()
            .ok_or(MqttError::Protocol(ProtocolError::MalformedPacket))?
            & 0x0F;
        let qos = QoS::from_bits((flags >> 1) & 0x03)
            .ok_or(MqttError::Protocol(ProtocolError::MalformedPacket))?;

        let mut cursor = 1;
        let remaining_len = util::read_variable_byte_integer(&mut cursor, buf)?;
        let end = cursor + remaining_len;
        let buf = buf
            .get(..end)
            .ok_or(MqttError::Protocol(ProtocolError::MalformedPacket))?;

        let topic = read_utf8_string(&mut cursor, buf)?;

        let packet_id = if qos != QoS::AtMostOnce {
            Some(read_u16(&mut cursor, buf)?)
        } else {
            None
        };

        let payload = &buf[cursor..];

        Ok(Publish {
            topic,
            qos,
            payload,
            packet_id,
            dup: flags & 0x08 != 0,
            retain: flags & 0x01 != 0,
        })
    }
}

impl<'a> EncodePacket for Publish<'a> {
    fn encode(&self, buf: &mut [u8], _version: ProtocolVersion) -> CodecResult<usize> {
        if self.topic.is_empty() {
            return Err(MqttError::Protocol(ProtocolError::EmptyTopic));
        }
        let mut cursor = staging(buf)?;

        // Topic name
        cursor += write_utf8_string(rest(buf, cursor)?, self.topic)?;

        // Packet ID (only for QoS > 0)
        if self.qos != QoS::AtMostOnce {
            let id = self
                .packet_id
                .ok_or(MqttError::Protocol(ProtocolError::MalformedPacket))?;
            put(buf, &mut cursor, &id.to_be_bytes())?;
        }

        // Payload
        put(buf, &mut cursor, self.payload)?;

        let mut header = (PUBLISH << 4) | ((self.qos as u8) << 1);
        if self.dup {
            header |= 0x08;
        }
        if self.retain {
            header |= 0x01;
        }
        finish(buf, header, cursor)
    }
}

// --- PUBACK / PUBREC / PUBREL / PUBCOMP Packets ---

/// Which of the four publish acknowledgement packets an [`Ack`] is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AckKind {
    PubAck,
    PubRec,
    PubRel,
    PubComp,
}

impl AckKind {
    fn header(&self) -> u8 {
        match self {
            Self::PubAck => PUBACK << 4,
            Self::PubRec => PUBREC << 4,
            // PUBREL carries the reserved flag bits 0b0010.
            Self::PubRel => (PUBREL << 4) | 0x02,
            Self::PubComp => PUBCOMP << 4,
        }
    }
}

/// A publish acknowledgement, carrying only the message identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    pub kind: AckKind,
    pub packet_id: u16,
}

impl Ack {
    pub fn new(kind: AckKind, packet_id: u16) -> Self {
        Self { kind, packet_id }
    }

    fn decode_kind(buf: &[u8], kind: AckKind) -> CodecResult<Self> {
        match buf {
            [_, 2, hi, lo] => Ok(Self {
                kind,
                packet_id: u16::from_be_bytes([*hi, *lo]),
            }),
            _ => Err(MqttError::Protocol(ProtocolError::MalformedPacket)),
        }
    }
}

impl EncodePacket for Ack {
    fn encode(&self, buf: &mut [u8], _version: ProtocolVersion) -> CodecResult<usize> {
        let mut cursor = 0;
        put(buf, &mut cursor, &[self.kind.header(), 0x02])?;
        put(buf, &mut cursor, &self.packet_id.to_be_bytes())?;
        Ok(cursor)
    }
}

// --- PINGREQ Packet ---
#[derive(Debug)]
pub struct PingReq;

impl EncodePacket for PingReq {
    fn encode(&self, buf: &mut [u8], _version: ProtocolVersion) -> CodecResult<usize> {
        let mut cursor = 0;
        put(buf, &mut cursor, &[PINGREQ << 4, 0x00])?;
        Ok(cursor)
    }
}

// --- DISCONNECT Packet ---
#[derive(Debug)]
pub struct Disconnect;

impl EncodePacket for Disconnect {
    fn encode(&self, buf: &mut [u8], _version: ProtocolVersion) -> CodecResult<usize> {
        let mut cursor = 0;
        put(buf, &mut cursor, &[DISCONNECT << 4, 0x00])?;
        Ok(cursor)
    }
}

/// Encodes `packet` into `buf`, widening codec errors to the caller's error type.
pub(crate) fn encode_into<P: EncodePacket, T>(
    packet: &P,
    buf: &mut [u8],
    version: ProtocolVersion,
) -> Result<usize, MqttError<T>> {
    packet
        .encode(buf, version)
        .map_err(MqttError::<T>::cast_transport_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode<P: EncodePacket>(packet: &P) -> std::vec::Vec<u8> {
        let mut buf = [0u8; 128];
        let n = packet.encode(&mut buf, ProtocolVersion::V3_1_1).unwrap();
        buf[..n].to_vec()
    }

    #[test]
    fn test_connect_encoding() {
        let bytes = encode(&Connect::new("dev", 60, true));
        assert_eq!(
            bytes,
            [
                0x10, 15, // fixed header
                0x00, 0x04, b'M', b'Q', b'T', b'T', // protocol name
                4, 0x02, 0x00, 60, // level, flags, keep-alive
                0x00, 0x03, b'd', b'e', b'v', // client id
            ]
        );
    }

    #[test]
    fn test_connect_v3_1_with_login() {
        let packet = Connect::new("c", 10, false).with_login("u", Some(b"pw"));
        let mut buf = [0u8; 64];
        let n = packet.encode(&mut buf, ProtocolVersion::V3_1).unwrap();
        let bytes = &buf[..n];

        assert_eq!(&bytes[2..10], &[0x00, 0x06, b'M', b'Q', b'I', b's', b'd', b'p']);
        assert_eq!(bytes[10], 3);
        assert_eq!(bytes[11], 0xC0);
        assert_eq!(
            &bytes[14..],
            &[0x00, 0x01, b'c', 0x00, 0x01, b'u', 0x00, 0x02, b'p', b'w']
        );
        assert_eq!(bytes[1] as usize, n - 2);
    }

    #[test]
    fn test_connect_does_not_fit() {
        let mut buf = [0u8; 12];
        assert!(matches!(
            Connect::new("a-rather-long-client-id", 60, true)
                .encode(&mut buf, ProtocolVersion::V3_1_1),
            Err(MqttError::BufferTooSmall)
        ));
    }

    #[test]
    fn test_publish_qos2_encoding() {
        let bytes = encode(&Publish {
            topic: "/t/temp",
            qos: QoS::ExactlyOnce,
            payload: b"23.500000",
            packet_id: Some(42),
            dup: false,
            retain: false,
        });
        assert_eq!(bytes[0], 0x34);
        assert_eq!(bytes[1] as usize, 2 + 7 + 2 + 9);
        assert_eq!(&bytes[2..11], b"\x00\x07/t/temp");
        assert_eq!(&bytes[11..13], &[0x00, 42]);
        assert_eq!(&bytes[13..], b"23.500000");
    }

    #[test]
    fn test_publish_qos0_has_no_id() {
        let bytes = encode(&Publish {
            topic: "a",
            qos: QoS::AtMostOnce,
            payload: b"x",
            packet_id: Some(7),
            dup: false,
            retain: true,
        });
        assert_eq!(bytes, [0x31, 4, 0x00, 0x01, b'a', b'x']);
    }

    #[test]
    fn test_publish_rejects_empty_topic() {
        let mut buf = [0u8; 32];
        let packet = Publish {
            topic: "",
            qos: QoS::AtMostOnce,
            payload: b"x",
            packet_id: None,
            dup: false,
            retain: false,
        };
        assert!(matches!(
            packet.encode(&mut buf, ProtocolVersion::V3_1_1),
            Err(MqttError::Protocol(ProtocolError::EmptyTopic))
        ));
    }

    #[test]
    fn test_publish_decode() {
        let frame = [0x3B, 9, 0x00, 0x03, b'a', b'/', b'b', 0x12, 0x34, b'h', b'i'];
        let publish = Publish::decode(&frame, ProtocolVersion::V3_1_1).unwrap();
        assert_eq!(publish.topic, "a/b");
        assert_eq!(publish.qos, QoS::AtLeastOnce);
        assert_eq!(publish.packet_id, Some(0x1234));
        assert_eq!(publish.payload, b"hi");
        assert!(publish.dup);
        assert!(publish.retain);
    }

    #[test]
    fn test_ack_encoding() {
        assert_eq!(encode(&Ack::new(AckKind::PubRel, 42)), [0x62, 0x02, 0x00, 42]);
        assert_eq!(encode(&Ack::new(AckKind::PubAck, 0x0102)), [0x40, 0x02, 0x01, 0x02]);
        assert_eq!(encode(&PingReq), [0xC0, 0x00]);
        assert_eq!(encode(&Disconnect), [0xE0, 0x00]);
    }

    #[test]
    fn test_decode_acknowledgements() {
        let packet = decode::<()>(&[0x50, 0x02, 0x00, 42], ProtocolVersion::V3_1_1).unwrap();
        assert!(matches!(
            packet,
            Some(MqttPacket::PubRec(Ack {
                kind: AckKind::PubRec,
                packet_id: 42
            }))
        ));

        let packet = decode::<()>(&[0x70, 0x02, 0x00, 42], ProtocolVersion::V3_1_1).unwrap();
        assert!(matches!(packet, Some(MqttPacket::PubComp(ack)) if ack.packet_id == 42));
    }

    #[test]
    fn test_decode_connack() {
        let packet = decode::<()>(&[0x20, 0x02, 0x01, 0x05], ProtocolVersion::V3_1_1).unwrap();
        assert!(matches!(
            packet,
            Some(MqttPacket::ConnAck(ConnAck {
                session_present: true,
                return_code: 5
            }))
        ));
        assert!(decode::<()>(&[0x20, 0x01, 0x00], ProtocolVersion::V3_1_1).is_err());
    }

    #[test]
    fn test_decode_other_and_reserved_types() {
        let packet = decode::<()>(&[0x90, 0x03, 0x00, 0x01, 0x00], ProtocolVersion::V3_1_1);
        assert!(matches!(packet, Ok(Some(MqttPacket::Other(9)))));

        let packet = decode::<()>(&[0xF0, 0x00], ProtocolVersion::V3_1_1);
        assert!(matches!(
            packet,
            Err(MqttError::Protocol(ProtocolError::InvalidPacketType(15)))
        ));

        assert!(matches!(
            decode::<()>(&[], ProtocolVersion::V3_1_1),
            Ok(None)
        ));
    }

    #[test]
    fn test_frame_len() {
        assert_eq!(frame_len(&[]).unwrap(), None);
        assert_eq!(frame_len(&[0x20]).unwrap(), None);
        assert_eq!(frame_len(&[0x20, 0x02, 0x00]).unwrap(), None);
        assert_eq!(frame_len(&[0x20, 0x02, 0x00, 0x00, 0xD0]).unwrap(), Some(4));
        assert_eq!(frame_len(&[0xD0, 0x00]).unwrap(), Some(2));
        assert_eq!(frame_len(&[0x30, 0x80]).unwrap(), None);
    }
}
