use std::{collections::HashMap, sync::Arc};

use serde_yaml::Value;

use crate::{
    config::internal::proxy::OutboundProxyProtocol,
    proxy::{AnyOutboundHandler, AnyProxy, Proxy, ProxyError, direct, reject, server},
};

pub mod http;
pub mod shadowsocks;
pub mod socks5;
pub mod trojan;
mod utils;
pub mod vmess;

/// Turns one `proxies` entry into a fleet member.
pub fn parse_proxy(mapping: HashMap<String, Value>) -> Result<AnyProxy, ProxyError> {
    let protocol = OutboundProxyProtocol::try_from(mapping)?;
    let handler = build_handler(&protocol)?;
    Ok(Arc::new(Proxy::new(handler)))
}

pub fn build_handler(
    protocol: &OutboundProxyProtocol,
) -> Result<AnyOutboundHandler, ProxyError> {
    let handler = match protocol {
        OutboundProxyProtocol::Direct(d) => direct::Handler::new(Some(d.name.clone())),
        OutboundProxyProtocol::Reject(r) => reject::Handler::new(Some(r.name.clone())),
        OutboundProxyProtocol::Ss(s) => server::Handler::try_from(s)?.into_any(),
        OutboundProxyProtocol::Socks5(s) => server::Handler::try_from(s)?.into_any(),
        OutboundProxyProtocol::Http(h) => server::Handler::try_from(h)?.into_any(),
        OutboundProxyProtocol::Trojan(t) => server::Handler::try_from(t)?.into_any(),
        OutboundProxyProtocol::Vmess(v) => server::Handler::try_from(v)?.into_any(),
    };
    Ok(handler)
}
