use std::{
    fmt::{Display, Formatter},
    io,
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr},
};

use bytes::{Buf, BufMut};
use serde::Serialize;

use crate::proxy::ProxyError;

#[derive(Debug, PartialEq, Eq, Clone, Serialize)]
pub enum SocksAddr {
    Ip(SocketAddr),
    Domain(String, u16),
}

impl Display for SocksAddr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SocksAddr::Ip(ip) => write!(f, "{}", ip),
            SocksAddr::Domain(host, port) => write!(f, "{}:{}", host, port),
        }
    }
}

pub struct SocksAddrType;

impl SocksAddrType {
    pub const V4: u8 = 0x1;
    pub const DOMAIN: u8 = 0x3;
    pub const V6: u8 = 0x4;
}

impl SocksAddr {
    /// Builds an endpoint from a configured `server` + `port` pair.
    /// IP literals become `Ip`, anything else is kept as a domain.
    pub fn from_server(server: &str, port: u16) -> Result<Self, ProxyError> {
        if server.is_empty() {
            return Err(ProxyError::InvalidConfig("empty server".to_owned()));
        }
        if server.len() > u8::MAX as usize {
            return Err(ProxyError::InvalidConfig(format!(
                "server name too long: {}",
                server
            )));
        }
        match server.parse::<IpAddr>() {
            Ok(ip) => Ok(Self::Ip((ip, port).into())),
            Err(_) => Ok(Self::Domain(server.to_owned(), port)),
        }
    }

    pub fn write_buf<T: BufMut>(&self, buf: &mut T) {
        match self {
            Self::Ip(SocketAddr::V4(addr)) => {
                buf.put_u8(SocksAddrType::V4);
                buf.put_slice(&addr.ip().octets());
                buf.put_u16(addr.port());
            }
            Self::Ip(SocketAddr::V6(addr)) => {
                buf.put_u8(SocksAddrType::V6);
                buf.put_slice(&addr.ip().octets());
                buf.put_u16(addr.port());
            }
            Self::Domain(domain, port) => {
                buf.put_u8(SocksAddrType::DOMAIN);
                buf.put_u8(domain.len() as u8);
                buf.put_slice(domain.as_bytes());
                buf.put_u16(*port);
            }
        }
    }

    /// Decodes `ATYP | ADDR | PORT`.
    /// An address kind outside of V4/DOMAIN/V6 is rejected rather than
    /// decoded into an empty address.
    pub fn peek_read(buf: &[u8]) -> Result<Self, ProxyError> {
        let mut cur = io::Cursor::new(buf);
        if cur.remaining() < 2 {
            return Err(invalid_buf());
        }

        let atyp = cur.get_u8();
        match atyp {
            SocksAddrType::V4 => {
                if cur.remaining() < 4 + 2 {
                    return Err(invalid_buf());
                }
                let addr = Ipv4Addr::from(cur.get_u32());
                let port = cur.get_u16();
                Ok(Self::Ip((addr, port).into()))
            }
            SocksAddrType::V6 => {
                if cur.remaining() < 16 + 2 {
                    return Err(invalid_buf());
                }
                let addr = Ipv6Addr::from(cur.get_u128());
                let port = cur.get_u16();
                Ok(Self::Ip((addr, port).into()))
            }
            SocksAddrType::DOMAIN => {
                let domain_len = cur.get_u8() as usize;
                if cur.remaining() < domain_len + 2 {
                    return Err(invalid_buf());
                }
                let mut buf = vec![0u8; domain_len];
                cur.copy_to_slice(&mut buf);
                let port = cur.get_u16();
                let domain_name = String::from_utf8(buf).map_err(|_| {
                    ProxyError::General("invalid domain name".to_owned())
                })?;
                Ok(Self::Domain(domain_name, port))
            }
            other => Err(ProxyError::AddressKind(other)),
        }
    }
}

fn invalid_buf() -> ProxyError {
    ProxyError::Io(io::Error::new(io::ErrorKind::UnexpectedEof, "invalid buf"))
}

impl From<SocketAddr> for SocksAddr {
    fn from(value: SocketAddr) -> Self {
        Self::Ip(value)
    }
}
