use crate::{
    config::internal::proxy::OutboundShadowsocks,
    proxy::{OutboundType, ProxyError, server::Handler},
};

use super::utils::server_addr;

const SUPPORTED_CIPHERS: &[&str] = &[
    "aes-128-gcm",
    "aes-192-gcm",
    "aes-256-gcm",
    "chacha20-ietf-poly1305",
    "xchacha20-ietf-poly1305",
    "aes-128-cfb",
    "aes-192-cfb",
    "aes-256-cfb",
    "aes-128-ctr",
    "aes-192-ctr",
    "aes-256-ctr",
    "rc4-md5",
    "chacha20-ietf",
    "xchacha20",
    "2022-blake3-aes-128-gcm",
    "2022-blake3-aes-256-gcm",
    "2022-blake3-chacha20-poly1305",
];

impl TryFrom<&OutboundShadowsocks> for Handler {
    type Error = ProxyError;

    fn try_from(s: &OutboundShadowsocks) -> Result<Self, Self::Error> {
        let cipher = s.cipher.to_lowercase();
        if !SUPPORTED_CIPHERS.contains(&cipher.as_str()) {
            return Err(ProxyError::InvalidConfig(format!(
                "unsupported cipher {} for proxy {}",
                s.cipher, s.name
            )));
        }
        if let Some(plugin) = &s.plugin {
            if !matches!(plugin.as_str(), "obfs" | "v2ray-plugin" | "shadow-tls") {
                return Err(ProxyError::InvalidConfig(format!(
                    "unsupported plugin {} for proxy {}",
                    plugin, s.name
                )));
            }
        }

        Ok(Handler::new(
            s.name.to_owned(),
            OutboundType::Shadowsocks,
            server_addr(&s.name, &s.server, s.port)?,
            s.udp,
        ))
    }
}
