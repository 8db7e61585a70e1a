use tracing::warn;

use crate::{
    config::internal::proxy::OutboundVmess,
    proxy::{OutboundType, ProxyError, server::Handler},
};

use super::utils::server_addr;

impl TryFrom<&OutboundVmess> for Handler {
    type Error = ProxyError;

    fn try_from(s: &OutboundVmess) -> Result<Self, Self::Error> {
        if s.skip_cert_verify.unwrap_or_default() {
            warn!("skipping TLS cert verification for {}", s.server);
        }

        uuid::Uuid::parse_str(&s.uuid).map_err(|e| {
            ProxyError::InvalidConfig(format!("invalid uuid for proxy {}: {}", s.name, e))
        })?;

        let security = s.cipher.as_deref().unwrap_or("auto").to_lowercase();
        if !matches!(
            security.as_str(),
            "auto" | "none" | "zero" | "aes-128-gcm" | "chacha20-poly1305"
        ) {
            return Err(ProxyError::InvalidConfig(format!(
                "unsupported security {} for proxy {}",
                security, s.name
            )));
        }

        match s.network.as_deref() {
            None | Some("tcp") | Some("http") | Some("h2") | Some("grpc") => {}
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
            OutboundType::Vmess,
            server_addr(&s.name, &s.server, s.port)?,
            s.udp.unwrap_or(true),
        ))
    }
}
