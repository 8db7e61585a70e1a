use tracing::warn;

use crate::{
    config::internal::proxy::OutboundTrojan,
    proxy::{OutboundType, ProxyError, server::Handler},
};

use super::utils::server_addr;

impl TryFrom<&OutboundTrojan> for Handler {
    type Error = ProxyError;

    fn try_from(s: &OutboundTrojan) -> Result<Self, Self::Error> {
        if s.skip_cert_verify.unwrap_or_default() {
            warn!("skipping TLS cert verification for {}", s.server);
        }
        if s.password.is_empty() {
            return Err(ProxyError::InvalidConfig(format!(
                "empty password for proxy {}",
                s.name
            )));
        }
        match s.network.as_deref() {
            None | Some("tcp") => {}
            Some("ws") if s.ws_opts.is_some() => {}
            Some("ws") => {
                return Err(ProxyError::InvalidConfig(
                    "ws_opts is required for ws".to_owned(),
                ));
            }
            Some(x) => {
                return Err(ProxyError::InvalidConfig(format!(
                    "unsupported network: {}",
                    x
                )));
            }
        }

        Ok(Handler::new(
            s.name.to_owned(),
            OutboundType::Trojan,
            server_addr(&s.name, &s.server, s.port)?,
            s.udp.unwrap_or_default(),
        ))
    }
}
