use std::{io, sync::Arc};

use async_trait::async_trait;
use url::Url;

use crate::{
    config::internal::proxy::PROXY_REJECT,
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
            name: name.unwrap_or_else(|| PROXY_REJECT.to_owned()),
        })
    }
}

#[async_trait]
impl OutboundHandler for Handler {
    fn name(&self) -> &str {
        &self.name
    }

    fn proto(&self) -> OutboundType {
        OutboundType::Reject
    }

    async fn remote_addr(&self) -> Option<SocksAddr> {
        None
    }

    async fn support_udp(&self) -> bool {
        false
    }

    async fn url_test(&self, _url: &Url) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::ConnectionRefused,
            "REJECT",
        ))
    }
}
