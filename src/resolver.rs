//! Broker (and SOCKS5 proxy) endpoint construction from static configuration.
//!
//! Resolution is a pure parse: no DNS, no sockets. A malformed address is a
//! build-time configuration defect and is never retried.

use core::fmt;
use core::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use crate::config::ClientConfig;

/// IP version the configured addresses are written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AddressFamily {
    Ipv4,
    Ipv6,
}

/// A configured address did not parse as the configured family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AddressParseError {
    pub family: AddressFamily,
}

/// Immutable address + port of the broker (or proxy).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrokerEndpoint {
    addr: SocketAddr,
}

impl BrokerEndpoint {
    pub fn ip(&self) -> IpAddr {
        self.addr.ip()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn family(&self) -> AddressFamily {
        match self.addr {
            SocketAddr::V4(_) => AddressFamily::Ipv4,
            SocketAddr::V6(_) => AddressFamily::Ipv6,
        }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        self.addr
    }
}

impl fmt::Display for BrokerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.addr.fmt(f)
    }
}

/// Parses `addr` as an address of `family` and pairs it with `port`.
pub fn resolve(
    addr: &str,
    port: u16,
    family: AddressFamily,
) -> Result<BrokerEndpoint, AddressParseError> {
    let ip = match family {
        AddressFamily::Ipv4 => addr.parse::<Ipv4Addr>().map(IpAddr::V4),
        AddressFamily::Ipv6 => addr.parse::<Ipv6Addr>().map(IpAddr::V6),
    }
    .map_err(|_| {
        error!("inet_pton: cannot parse {} as {:?}", addr, family);
        AddressParseError { family }
    })?;

    Ok(BrokerEndpoint {
        addr: SocketAddr::new(ip, port),
    })
}

/// The endpoints a session connects through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoints {
    pub broker: BrokerEndpoint,
    pub proxy: Option<BrokerEndpoint>,
}

/// Builds the broker endpoint, and the SOCKS5 proxy endpoint when one is configured.
pub fn resolve_endpoints(config: &ClientConfig<'_>) -> Result<Endpoints, AddressParseError> {
    let broker = resolve(config.broker_addr, config.broker_port, config.family)?;
    let proxy = match config.proxy {
        Some(proxy) => Some(resolve(proxy.addr, proxy.port, config.family)?),
        None => None,
    };
    Ok(Endpoints { broker, proxy })
}
