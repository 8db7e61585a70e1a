use std::{io, sync::Arc};

use async_trait::async_trait;
use tokio::net::TcpStream;
use url::Url;

use crate::{
    common::errors::new_io_error,
    config::internal::proxy::PROXY_DIRECT,
    proxy::{AnyOutboundHandler, OutboundHandler, OutboundType},
    session::SocksAddr,
};

pub struct Handler {
    name: String,
}

impl Handler {
    #[allow(clippy::new_ret_no_self)]
    pub fn new(name: Option<String>) -> AnyOutboundHandler {
        Arc::new(Self {
            name: name.unwrap_or_else(|| PROXY_DIRECT.to_owned()),
        })
    }
}

#[async_trait]
impl OutboundHandler for Handler {
    fn name(&self) -> &str {
        &self.name
    }

    fn proto(&self) -> OutboundType {
        OutboundType::Direct
    }

    async fn remote_addr(&self) -> Option<SocksAddr> {
        None
    }

    async fn support_udp(&self) -> bool {
        true
    }

    /// reaching the test url's host is all a direct outbound has to prove
    async fn url_test(&self, url: &Url) -> io::Result<()> {
        let host = url
            .host_str()
            .ok_or_else(|| new_io_error(format!("no host in {}", url)))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| new_io_error(format!("no port for {}", url)))?;
        TcpStream::connect((host, port)).await.map(|_| ())
    }
}
