use std::io;

use mockall::mock;
use url::Url;

use super::{OutboundHandler, OutboundType};
use crate::session::SocksAddr;

mock! {
    pub DummyOutboundHandler {}

    #[async_trait::async_trait]
    impl OutboundHandler for DummyOutboundHandler {
        fn name(&self) -> &str;
        fn proto(&self) -> OutboundType;
        async fn remote_addr(&self) -> Option<SocksAddr>;
        async fn support_udp(&self) -> bool;
        async fn url_test(&self, url: &Url) -> io::Result<()>;
    }
}
