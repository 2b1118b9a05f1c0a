//! # Error Types
//!
//! This module defines the error types used throughout the publisher session,
//! from credential and configuration defects that abort before the first
//! connection attempt to transport and protocol failures that feed the
//! reconnect policy.

use crate::resolver::AddressParseError;
use crate::security::CredentialError;
use crate::transport::{self, ErrorPlaceHolder};

/// The primary error enum for the MQTT session.
///
/// It is generic over the transport error type `T`, allowing it to wrap
/// specific errors from the underlying network transport (e.g., TCP, TLS).
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MqttError<T> {
    /// An error occurred in the underlying transport layer.
    Transport(T),
    /// Waiting for the socket to become readable failed.
    Poll(T),
    /// An outbound packet could not be handed to the transport.
    TransportWrite(T),
    /// A publish was attempted without a connected socket to write to.
    WriteNotConnected,
    /// A protocol-level error occurred, indicating a violation of the MQTT specification.
    Protocol(ProtocolError),
    /// The connection was refused by the broker. The enclosed code provides the reason.
    ConnectionRefused(ConnectReasonCode),
    /// The session is not currently connected to the broker.
    NotConnected,
    /// The buffer provided for an operation was too small.
    BufferTooSmall,
    /// The security subsystem rejected a credential.
    Credential(CredentialError),
    /// A configured address could not be parsed.
    AddressParse(AddressParseError),
    /// Every connect attempt allowed by the retry policy failed.
    ConnectExhausted { attempts: u32 },
    /// No free slot (or no free message id) for another in-flight publish.
    InFlightFull,
    /// The transport cannot provide the requested transport kind.
    Unsupported,
}

/// Implements the `From` trait to allow for automatic conversion of any transport
/// error into an `MqttError`. This is what allows the `?` operator to work
/// seamlessly on `Result`s from the transport layer.
impl<T: transport::TransportError> From<T> for MqttError<T> {
    fn from(err: T) -> Self {
        MqttError::Transport(err)
    }
}

impl<T> MqttError<T> {
    /// Converts an error produced by the packet codec into an error carrying
    /// the client's transport error type.
    ///
    /// Codec errors are typed with the uninhabited [`ErrorPlaceHolder`], so the
    /// transport-carrying variants cannot occur and the conversion is total.
    pub fn cast_transport_error(other: MqttError<ErrorPlaceHolder>) -> MqttError<T> {
        match other {
            MqttError::Transport(never)
            | MqttError::Poll(never)
            | MqttError::TransportWrite(never) => match never {},
            MqttError::Protocol(p) => MqttError::Protocol(p),
            MqttError::ConnectionRefused(c) => MqttError::ConnectionRefused(c),
            MqttError::NotConnected => MqttError::NotConnected,
            MqttError::WriteNotConnected => MqttError::WriteNotConnected,
            MqttError::BufferTooSmall => MqttError::BufferTooSmall,
            MqttError::Credential(c) => MqttError::Credential(c),
            MqttError::AddressParse(a) => MqttError::AddressParse(a),
            MqttError::ConnectExhausted { attempts } => MqttError::ConnectExhausted { attempts },
            MqttError::InFlightFull => MqttError::InFlightFull,
            MqttError::Unsupported => MqttError::Unsupported,
        }
    }

}

impl<T: transport::TransportError> MqttError<T> {
    /// Returns `true` for errors that no amount of retrying can fix.
    pub fn is_fatal(&self) -> bool {
        match self {
            MqttError::Transport(e) => e.is_fatal(),
            MqttError::Credential(_)
            | MqttError::AddressParse(_)
            | MqttError::ConnectExhausted { .. }
            | MqttError::Unsupported => true,
            _ => false,
        }
    }
}

impl<T> From<AddressParseError> for MqttError<T> {
    fn from(err: AddressParseError) -> Self {
        MqttError::AddressParse(err)
    }
}

impl<T> From<CredentialError> for MqttError<T> {
    fn from(err: CredentialError) -> Self {
        MqttError::Credential(err)
    }
}

/// Represents the reason codes for a connection refusal (`CONNACK`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectReasonCode {
    /// The connection was accepted.
    Success,
    /// The broker does not support the requested MQTT protocol version.
    UnacceptableProtocolVersion,
    /// The client identifier is not valid.
    IdentifierRejected,
    /// The broker is unavailable.
    ServerUnavailable,
    /// The username or password is not valid.
    BadUserNameOrPassword,
    /// The client is not authorized to connect.
    NotAuthorized,
    /// An unknown or unspecified error occurred.
    Other(u8),
}

impl ConnectReasonCode {
    pub fn is_success(&self) -> bool {
        *self == Self::Success
    }
}

impl From<u8> for ConnectReasonCode {
    fn from(val: u8) -> Self {
        match val {
            0 => Self::Success,
            1 => Self::UnacceptableProtocolVersion,
            2 => Self::IdentifierRejected,
            3 => Self::ServerUnavailable,
            4 => Self::BadUserNameOrPassword,
            5 => Self::NotAuthorized,
            _ => Self::Other(val),
        }
    }
}

impl From<ConnectReasonCode> for u8 {
    fn from(code: ConnectReasonCode) -> Self {
        match code {
            ConnectReasonCode::Success => 0,
            ConnectReasonCode::UnacceptableProtocolVersion => 1,
            ConnectReasonCode::IdentifierRejected => 2,
            ConnectReasonCode::ServerUnavailable => 3,
            ConnectReasonCode::BadUserNameOrPassword => 4,
            ConnectReasonCode::NotAuthorized => 5,
            ConnectReasonCode::Other(val) => val,
        }
    }
}

/// Enumerates specific MQTT protocol errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProtocolError {
    /// An invalid packet type was received.
    InvalidPacketType(u8),
    /// The server sent an invalid or unexpected response.
    InvalidResponse,
    /// The connection was closed by the broker.
    ConnectionClosed,
    /// A packet was received that was not correctly formed.
    MalformedPacket,
    /// The payload of a message exceeds the maximum allowable size.
    PayloadTooLarge,
    /// A string was not valid UTF-8.
    InvalidUtf8String,
    /// A publish was requested with an empty topic name.
    EmptyTopic,
}
