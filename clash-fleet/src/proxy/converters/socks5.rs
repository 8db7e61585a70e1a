use tracing::warn;

use crate::{
    config::internal::proxy::OutboundSocks5,
    proxy::{OutboundType, ProxyError, server::Handler},
};

use super::utils::server_addr;

impl TryFrom<&OutboundSocks5> for Handler {
    type Error = ProxyError;

    fn try_from(s: &OutboundSocks5) -> Result<Self, Self::Error> {
        if s.tls && s.skip_cert_verify {
            warn!("skipping TLS cert verification for {}", s.server);
        }
        if s.username.is_some() != s.password.is_some() {
            return Err(ProxyError::InvalidConfig(format!(
                "username and password must be set together for proxy {}",
                s.name
            )));
        }

        Ok(Handler::new(
            s.name.to_owned(),
            OutboundType::Socks5,
            server_addr(&s.name, &s.server, s.port)?,
            s.udp,
        ))
    }
}
