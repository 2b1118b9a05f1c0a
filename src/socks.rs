//! SOCKS5 tunnel setup (RFC 1928), no-authentication `CONNECT` only.
//!
//! The transport first opens a TCP connection to the proxy and then runs
//! [`connect`] over it; once it returns, the stream carries MQTT bytes to the
//! broker as if it were connected directly.

use embedded_io_async::{Read, ReadExactError, Write};

use crate::resolver::BrokerEndpoint;

const VERSION: u8 = 0x05;
const METHOD_NO_AUTH: u8 = 0x00;
const CMD_CONNECT: u8 = 0x01;
const ATYP_IPV4: u8 = 0x01;
const ATYP_DOMAIN: u8 = 0x03;
const ATYP_IPV6: u8 = 0x04;

/// Errors raised while negotiating the tunnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Socks5Error<E> {
    /// The underlying stream failed.
    Io(E),
    /// The proxy closed the stream mid-reply.
    UnexpectedEof,
    /// The proxy answered with a protocol version other than 5.
    BadVersion(u8),
    /// The proxy requires an authentication method we do not offer.
    NoAcceptableMethod,
    /// The proxy refused the `CONNECT` request with this reply code.
    Refused(u8),
    /// The reply carried an unknown address type.
    BadAddressType(u8),
}

impl<E> From<ReadExactError<E>> for Socks5Error<E> {
    fn from(err: ReadExactError<E>) -> Self {
        match err {
            ReadExactError::UnexpectedEof => Socks5Error::UnexpectedEof,
            ReadExactError::Other(e) => Socks5Error::Io(e),
        }
    }
}

/// Asks the proxy on the other end of `stream` to open a tunnel to `target`.
pub async fn connect<S>(stream: &mut S, target: &BrokerEndpoint) -> Result<(), Socks5Error<S::Error>>
where
    S: Read + Write,
{
    stream
        .write_all(&[VERSION, 1, METHOD_NO_AUTH])
        .await
        .map_err(Socks5Error::Io)?;

    let mut choice = [0u8; 2];
    stream.read_exact(&mut choice).await?;
    if choice[0] != VERSION {
        return Err(Socks5Error::BadVersion(choice[0]));
    }
    if choice[1] != METHOD_NO_AUTH {
        return Err(Socks5Error::NoAcceptableMethod);
    }

    let mut request = [0u8; 22];
    let len = encode_request(&mut request, target);
    stream
        .write_all(&request[..len])
        .await
        .map_err(Socks5Error::Io)?;
    stream.flush().await.map_err(Socks5Error::Io)?;

    let mut head = [0u8; 4];
    stream.read_exact(&mut head).await?;
    if head[0] != VERSION {
        return Err(Socks5Error::BadVersion(head[0]));
    }
    if head[1] != 0 {
        return Err(Socks5Error::Refused(head[1]));
    }

    // Bound address and port; we have no use for them but must drain them.
    let bound_len = match head[3] {
        ATYP_IPV4 => 4,
        ATYP_IPV6 => 16,
        ATYP_DOMAIN => {
            let mut n = [0u8; 1];
            stream.read_exact(&mut n).await?;
            n[0] as usize
        }
        other => return Err(Socks5Error::BadAddressType(other)),
    };
    let mut scratch = [0u8; 255 + 2];
    stream.read_exact(&mut scratch[..bound_len + 2]).await?;

    debug!("SOCKS5 tunnel open to {}", target);
    Ok(())
}

fn encode_request(buf: &mut [u8; 22], target: &BrokerEndpoint) -> usize {
    buf[..3].copy_from_slice(&[VERSION, CMD_CONNECT, 0x00]);
    let mut cursor = 3;
    match target.ip() {
        core::net::IpAddr::V4(v4) => {
            buf[cursor] = ATYP_IPV4;
            buf[cursor + 1..cursor + 5].copy_from_slice(&v4.octets());
            cursor += 5;
        }
        core::net::IpAddr::V6(v6) => {
            buf[cursor] = ATYP_IPV6;
            buf[cursor + 1..cursor + 17].copy_from_slice(&v6.octets());
            cursor += 17;
        }
    }
    buf[cursor..cursor + 2].copy_from_slice(&target.port().to_be_bytes());
    cursor + 2
}
