use std::{
    collections::{HashMap, VecDeque},
    fmt::{Debug, Display, Formatter},
    io,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use erased_serde::Serialize as ESerialize;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, trace};
use url::Url;

use crate::{common::timed_future::TimedFuture, session::SocksAddr};

pub mod converters;
pub mod direct;
pub mod reject;
pub mod server;

#[cfg(test)]
pub mod mocks;

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_DELAY_HISTORY: usize = 10;

#[derive(thiserror::Error, Debug)]
pub enum ProxyError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("proxy error: {0}")]
    General(String),
    #[error("invalid proxy config: {0}")]
    InvalidConfig(String),
    #[error("unsupported proxy type: {0}")]
    UnknownKind(String),
    #[error("unsupported address kind: {0:#04x}")]
    AddressKind(u8),
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboundType {
    Shadowsocks,
    Socks5,
    Http,
    Trojan,
    Vmess,

    Direct,
    Reject,
}

impl Display for OutboundType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            OutboundType::Shadowsocks => write!(f, "Shadowsocks"),
            OutboundType::Socks5 => write!(f, "Socks5"),
            OutboundType::Http => write!(f, "Http"),
            OutboundType::Trojan => write!(f, "Trojan"),
            OutboundType::Vmess => write!(f, "Vmess"),
            OutboundType::Direct => write!(f, "Direct"),
            OutboundType::Reject => write!(f, "Reject"),
        }
    }
}

/// The opaque capability of one upstream proxy.
/// Protocol framing lives behind this trait; the provider subsystem only
/// names, describes and probes handlers.
#[async_trait]
pub trait OutboundHandler: Sync + Send + Unpin {
    /// The name of the outbound handler
    fn name(&self) -> &str;

    /// The protocol of the outbound handler
    fn proto(&self) -> OutboundType;

    /// The proxy remote address
    async fn remote_addr(&self) -> Option<SocksAddr>;

    /// whether the outbound handler support UDP
    async fn support_udp(&self) -> bool;

    /// Runs a single liveness probe against `url` through this outbound.
    /// Callers bound it with a timeout, implementations need not.
    async fn url_test(&self, url: &Url) -> io::Result<()>;

    /// for API
    /// the map only contains basic information, liveness is added by [`Proxy`]
    async fn as_map(&self) -> HashMap<String, Box<dyn ESerialize + Send>> {
        let mut m: HashMap<String, Box<dyn ESerialize + Send>> = HashMap::new();
        m.insert("type".to_string(), Box::new(self.proto()));
        m.insert("udp".to_string(), Box::new(self.support_udp().await));
        if let Some(addr) = self.remote_addr().await {
            m.insert("server".to_string(), Box::new(addr.to_string()));
        }
        m
    }
}

pub type AnyOutboundHandler = Arc<dyn OutboundHandler>;

#[derive(Clone, Debug, Serialize)]
pub struct DelayHistory {
    time: DateTime<Utc>,
    delay: u16,
    #[serde(rename = "meanDelay")]
    mean_delay: u16,
}

/// One fleet member: the outbound handler plus the liveness record that
/// health checks write into.
pub struct Proxy {
    handler: AnyOutboundHandler,
    alive: AtomicBool,
    delay_history: RwLock<VecDeque<DelayHistory>>,
}

pub type AnyProxy = Arc<Proxy>;

impl Debug for Proxy {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Proxy")
            .field("name", &self.name())
            .field("proto", &self.proto())
            .field("alive", &self.alive())
            .finish()
    }
}

impl Proxy {
    pub fn new(handler: AnyOutboundHandler) -> Self {
        Self {
            handler,
            // never probed proxies are considered alive
            alive: AtomicBool::new(true),
            delay_history: RwLock::new(VecDeque::with_capacity(MAX_DELAY_HISTORY)),
        }
    }

    pub fn name(&self) -> &str {
        self.handler.name()
    }

    pub fn proto(&self) -> OutboundType {
        self.handler.proto()
    }

    pub fn handler(&self) -> AnyOutboundHandler {
        self.handler.clone()
    }

    pub fn alive(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }

    pub fn report_alive(&self, alive: bool) {
        self.alive.store(alive, Ordering::Relaxed)
    }

    pub async fn delay_history(&self) -> Vec<DelayHistory> {
        self.delay_history.read().await.iter().cloned().collect()
    }

    pub async fn last_delay(&self) -> u16 {
        let max = u16::MAX;
        if !self.alive() {
            return max;
        }
        self.delay_history
            .read()
            .await
            .back()
            .map(|x| x.delay)
            .unwrap_or(max)
    }

    /// Probes the proxy twice, the first round trip is the delay and the
    /// average of both is the mean delay. The outcome is recorded on this
    /// proxy whether it succeeds or not.
    pub async fn url_test(
        &self,
        url: &str,
        timeout: Option<Duration>,
    ) -> io::Result<(u16, u16)> {
        let url = Url::parse(url)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let timeout = timeout.unwrap_or(DEFAULT_PROBE_TIMEOUT);

        let result = match self.probe(&url, timeout).await {
            Ok(delay) => {
                let mean_delay = match self.probe(&url, timeout).await {
                    Ok(delay2) => ((delay as u32 + delay2 as u32) / 2) as u16,
                    Err(_) => 0,
                };
                Ok((delay, mean_delay))
            }
            Err(e) => Err(e),
        };

        self.report_alive(result.is_ok());

        let ins = DelayHistory {
            time: Utc::now(),
            delay: result.as_ref().map(|x| x.0).unwrap_or(0),
            mean_delay: result.as_ref().map(|x| x.1).unwrap_or(0),
        };
        let mut history = self.delay_history.write().await;
        history.push_back(ins);
        if history.len() > MAX_DELAY_HISTORY {
            history.pop_front();
        }

        debug!("{} alive: {}, delay: {:?}", self.name(), result.is_ok(), result);

        result
    }

    async fn probe(&self, url: &Url, timeout: Duration) -> io::Result<u16> {
        let probe = TimedFuture::new(self.handler.url_test(url), None);
        match tokio::time::timeout(timeout, probe).await {
            Ok((Ok(_), delay)) => {
                let delay = u16::try_from(delay.as_millis()).unwrap_or(u16::MAX);
                trace!("urltest for proxy {} with url {} took {}ms", self.name(), url, delay);
                Ok(delay)
            }
            Ok((Err(e), _)) => {
                debug!("urltest for proxy {} with url {} failed: {}", self.name(), url, e);
                Err(e)
            }
            Err(_) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("timeout for {}", url),
            )),
        }
    }

    pub async fn as_map(&self) -> HashMap<String, Box<dyn ESerialize + Send>> {
        let mut m = self.handler.as_map().await;
        m.insert("name".to_owned(), Box::new(self.name().to_owned()));
        m.insert("alive".to_owned(), Box::new(self.alive()));
        m.insert("history".to_owned(), Box::new(self.delay_history().await));
        m
    }
}

#[cfg(test)]
mod tests {
    use std::{io, sync::Arc, time::Duration};

    use url::Url;

    use super::{OutboundHandler, OutboundType, Proxy, mocks::MockDummyOutboundHandler};
    use crate::session::SocksAddr;

    fn mock_handler(
        name: &str,
        result: impl Fn() -> io::Result<()> + Send + Sync + 'static,
    ) -> MockDummyOutboundHandler {
        let mut handler = MockDummyOutboundHandler::new();
        handler.expect_name().return_const(name.to_owned());
        handler.expect_url_test().returning(move |_| result());
        handler
    }

    #[tokio::test]
    async fn test_proxy_records_alive() {
        let proxy = Proxy::new(Arc::new(mock_handler("ok", || Ok(()))));

        assert!(proxy.alive());
        assert_eq!(proxy.last_delay().await, u16::MAX);

        proxy
            .url_test("http://www.gstatic.com/generate_204", None)
            .await
            .expect("test failed");

        assert!(proxy.alive());
        assert_eq!(proxy.delay_history().await.len(), 1);
        assert!(proxy.last_delay().await < u16::MAX);
    }

    #[tokio::test]
    async fn test_proxy_records_dead_and_caps_history() {
        let proxy = Proxy::new(Arc::new(mock_handler("bad", || {
            Err(io::Error::other("connection refused"))
        })));

        for _ in 0..12 {
            assert!(
                proxy
                    .url_test("http://www.gstatic.com/generate_204", None)
                    .await
                    .is_err()
            );
        }

        assert!(!proxy.alive());
        assert_eq!(proxy.last_delay().await, u16::MAX);
        assert_eq!(proxy.delay_history().await.len(), 10);
    }

    #[tokio::test]
    async fn test_proxy_invalid_url() {
        let proxy = Proxy::new(Arc::new(mock_handler("ok", || Ok(()))));

        let err = proxy.url_test("not a url", None).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert!(proxy.delay_history().await.is_empty());
    }

    struct Hang;

    #[async_trait::async_trait]
    impl OutboundHandler for Hang {
        fn name(&self) -> &str {
            "hang"
        }

        fn proto(&self) -> OutboundType {
            OutboundType::Direct
        }

        async fn remote_addr(&self) -> Option<SocksAddr> {
            None
        }

        async fn support_udp(&self) -> bool {
            false
        }

        async fn url_test(&self, _url: &Url) -> io::Result<()> {
            futures::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_proxy_probe_timeout() {
        let proxy = Proxy::new(Arc::new(Hang));

        let err = proxy
            .url_test(
                "http://www.gstatic.com/generate_204",
                Some(Duration::from_millis(100)),
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
        assert!(!proxy.alive());
    }
}
