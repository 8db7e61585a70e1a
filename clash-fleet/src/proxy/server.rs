use std::{io, sync::Arc};

use async_trait::async_trait;
use tokio::net::TcpStream;
use url::Url;

use crate::{
    proxy::{AnyOutboundHandler, OutboundHandler, OutboundType},
    session::SocksAddr,
};

/// Outbound to a remote proxy server whose protocol handshake is provided
/// elsewhere. Liveness is established by reaching the server endpoint.
pub struct Handler {
    name: String,
    proto: OutboundType,
    server: SocksAddr,
    udp: bool,
}

impl Handler {
    pub fn new(name: String, proto: OutboundType, server: SocksAddr, udp: bool) -> Self {
        Self {
            name,
            proto,
            server,
            udp,
        }
    }

    pub fn into_any(self) -> AnyOutboundHandler {
        Arc::new(self)
    }
}

#[async_trait]
impl OutboundHandler for Handler {
    fn name(&self) -> &str {
        &self.name
    }

    fn proto(&self) -> OutboundType {
        self.proto
    }

    async fn remote_addr(&self) -> Option<SocksAddr> {
        Some(self.server.clone())
    }

    async fn support_udp(&self) -> bool {
        self.udp
    }

    async fn url_test(&self, _url: &Url) -> io::Result<()> {
        let stream = match &self.server {
            SocksAddr::Ip(addr) => TcpStream::connect(addr).await?,
            SocksAddr::Domain(host, port) => {
                TcpStream::connect((host.as_str(), *port)).await?
            }
        };
        stream.set_nodelay(true)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tokio::net::TcpListener;
    use url::Url;

    use super::Handler;
    use crate::{
        proxy::{OutboundHandler, OutboundType},
        session::SocksAddr,
    };

    #[tokio::test]
    async fn test_server_url_test() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let url = Url::parse("http://www.gstatic.com/generate_204").unwrap();

        let up = Handler::new(
            "up".to_owned(),
            OutboundType::Shadowsocks,
            SocksAddr::Ip(addr),
            true,
        );
        up.url_test(&url).await.expect("server should be reachable");
        assert_eq!(up.remote_addr().await, Some(SocksAddr::Ip(addr)));

        drop(listener);
        let down = Handler::new(
            "down".to_owned(),
            OutboundType::Trojan,
            SocksAddr::Ip(addr),
            false,
        );
        assert!(down.url_test(&url).await.is_err());
    }
}
