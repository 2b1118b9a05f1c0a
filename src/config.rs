//! Static configuration of the publisher.
//!
//! Everything here is a compile-time constant; changing it means a rebuild.
//! [`ClientConfig::DEFAULT`] bundles the constants into the value a
//! [`Session`](crate::session::Session) is built from.

use embassy_time::Duration;

use crate::packet::{ProtocolVersion, QoS};
use crate::resolver::AddressFamily;
use crate::transport::TransportKind;

/// Address of the broker.
pub const SERVER_ADDR: &str = "10.42.0.1";
/// Broker address when the network is configured for IPv6.
pub const SERVER_ADDR_V6: &str = "2001:db8::2";

/// Plain MQTT port.
pub const SERVER_PORT: u16 = 1883;
/// MQTT over TLS.
pub const SERVER_PORT_TLS: u16 = 8883;
/// MQTT over websockets (with or without TLS).
pub const SERVER_PORT_WEBSOCKET: u16 = 9001;

pub const SOCKS5_PROXY_ADDR: &str = SERVER_ADDR;
pub const SOCKS5_PROXY_PORT: u16 = 1080;

/// How long one connect attempt waits for CONNACK.
pub const APP_CONNECT_TIMEOUT: Duration = Duration::from_millis(2000);
/// Pause after a connect request could not even be sent.
pub const APP_SLEEP: Duration = Duration::from_millis(500);
/// Connect attempts before giving up.
pub const APP_CONNECT_TRIES: u32 = 10;

/// Size of each of the session's receive and transmit buffers.
pub const APP_MQTT_BUFFER_SIZE: usize = 128;
/// Exactly-once and at-least-once publishes awaiting acknowledgement.
pub const APP_MAX_IN_FLIGHT: usize = 8;

pub const MQTT_CLIENT_ID: &str = "sensor_publisher";
pub const MQTT_KEEP_ALIVE_SECS: u16 = 60;

pub const TEMPERATURE_TOPIC: &str = "/sensor/board/temperature";
pub const HUMIDITY_TOPIC: &str = "/sensor/board/humidity";

/// Delivery guarantee of the telemetry publishes.
pub const PUBLISH_QOS: QoS = QoS::ExactlyOnce;
/// Time between two sensor samples.
pub const SAMPLE_INTERVAL: Duration = Duration::from_secs(2);

/// SNI hostname presented by the secure transports.
pub const TLS_SNI_HOSTNAME: &str = "localhost";
/// Request path of the websocket upgrade.
pub const WEBSOCKET_URL: &str = "/mqtt";
pub const WEBSOCKET_TIMEOUT: Duration = Duration::from_secs(5);

/// Location of the SOCKS5 proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProxyConfig<'a> {
    pub addr: &'a str,
    pub port: u16,
}

/// Optional CONNECT credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Login<'a> {
    pub username: &'a str,
    pub password: Option<&'a [u8]>,
}

/// Everything a session needs to know about its broker and its retry policy.
#[derive(Debug, Clone, Copy)]
pub struct ClientConfig<'a> {
    pub client_id: &'a str,
    pub broker_addr: &'a str,
    pub broker_port: u16,
    pub family: AddressFamily,
    pub proxy: Option<ProxyConfig<'a>>,
    pub transport: TransportKind<'a>,
    pub protocol_version: ProtocolVersion,
    pub login: Option<Login<'a>>,
    pub keep_alive_secs: u16,
    pub clean_session: bool,
    pub connect_tries: u32,
    pub connect_timeout: Duration,
    pub retry_sleep: Duration,
}

impl ClientConfig<'static> {
    pub const DEFAULT: Self = Self {
        client_id: MQTT_CLIENT_ID,
        broker_addr: SERVER_ADDR,
        broker_port: SERVER_PORT,
        family: AddressFamily::Ipv4,
        proxy: None,
        transport: TransportKind::Plain,
        protocol_version: ProtocolVersion::V3_1_1,
        login: None,
        keep_alive_secs: MQTT_KEEP_ALIVE_SECS,
        clean_session: true,
        connect_tries: APP_CONNECT_TRIES,
        connect_timeout: APP_CONNECT_TIMEOUT,
        retry_sleep: APP_SLEEP,
    };
}

impl Default for ClientConfig<'static> {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl<'a> ClientConfig<'a> {
    /// Switches the transport and moves the broker to that transport's default port.
    pub fn with_transport(mut self, transport: TransportKind<'a>) -> Self {
        self.broker_port = transport.default_port();
        self.transport = transport;
        self
    }

    /// Routes the connection through the default SOCKS5 proxy.
    pub fn with_default_proxy(mut self) -> Self {
        let addr = match self.family {
            AddressFamily::Ipv4 => SOCKS5_PROXY_ADDR,
            AddressFamily::Ipv6 => SERVER_ADDR_V6,
        };
        self.proxy = Some(ProxyConfig {
            addr,
            port: SOCKS5_PROXY_PORT,
        });
        self
    }

    /// Uses the IPv6 broker address.
    pub fn ipv6(mut self) -> Self {
        self.family = AddressFamily::Ipv6;
        self.broker_addr = SERVER_ADDR_V6;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::{CA_CERT_TAG, PSK_TAG, PeerVerify, TlsConfig};
    use crate::transport::WebSocketConfig;

    #[test]
    fn test_default_matches_constants() {
        let config = ClientConfig::default();
        assert_eq!(config.broker_addr, SERVER_ADDR);
        assert_eq!(config.broker_port, SERVER_PORT);
        assert_eq!(config.connect_tries, 10);
        assert_eq!(config.connect_timeout, Duration::from_millis(2000));
        assert_eq!(config.transport, TransportKind::Plain);
        assert!(config.clean_session);
    }

    #[test]
    fn test_transport_selects_port() {
        let tls = TlsConfig {
            peer_verify: PeerVerify::Required,
            sec_tags: &[CA_CERT_TAG, PSK_TAG],
            hostname: Some(TLS_SNI_HOSTNAME),
        };
        let ws = WebSocketConfig {
            host: SERVER_ADDR,
            url: WEBSOCKET_URL,
            timeout: WEBSOCKET_TIMEOUT,
        };

        let secure = ClientConfig::DEFAULT.with_transport(TransportKind::Secure(tls));
        assert_eq!(secure.broker_port, SERVER_PORT_TLS);

        let websocket =
            ClientConfig::DEFAULT.with_transport(TransportKind::SecureWebSocket(tls, ws));
        assert_eq!(websocket.broker_port, SERVER_PORT_WEBSOCKET);
    }

    #[test]
    fn test_ipv6_proxy_follows_family() {
        let config = ClientConfig::DEFAULT.ipv6().with_default_proxy();
        assert_eq!(config.family, AddressFamily::Ipv6);
        assert_eq!(config.proxy.map(|p| p.addr), Some(SERVER_ADDR_V6));
        assert_eq!(config.proxy.map(|p| p.port), Some(SOCKS5_PROXY_PORT));
    }
}
