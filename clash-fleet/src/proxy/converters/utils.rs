use crate::{proxy::ProxyError, session::SocksAddr};

/// Checks the endpoint shared by every server based outbound.
pub(super) fn server_addr(
    name: &str,
    server: &str,
    port: u16,
) -> Result<SocksAddr, ProxyError> {
    if port == 0 {
        return Err(ProxyError::InvalidConfig(format!(
            "invalid port 0 for proxy {}",
            name
        )));
    }
    SocksAddr::from_server(server, port).map_err(|e| {
        ProxyError::InvalidConfig(format!("invalid server for proxy {}: {}", name, e))
    })
}
