use tracing::warn;

use crate::{
    config::internal::proxy::OutboundHttp,
    proxy::{OutboundType, ProxyError, server::Handler},
};

use super::utils::server_addr;

impl TryFrom<&OutboundHttp> for Handler {
    type Error = ProxyError;

    fn try_from(s: &OutboundHttp) -> Result<Self, Self::Error> {
        if s.tls && s.skip_cert_verify {
            warn!("skipping TLS cert verification for {}", s.server);
        }

        Ok(Handler::new(
            s.name.to_owned(),
            OutboundType::Http,
            server_addr(&s.name, &s.server, s.port)?,
            false,
        ))
    }
}
